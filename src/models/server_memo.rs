use serde::{Deserialize, Serialize};

use super::{IdName, Memo};

/// A memo as the server stores it: the title line is kept apart from the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMemo {
    pub id: i64,
    #[serde(default)]
    pub memogroup: Option<IdName>,
    pub user: IdName,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub memotext: Option<String>,
    #[serde(default)]
    pub savetime: Option<i64>,
}

/// Reply to both fetch and save requests.
///
/// A missing `memo` means the server has no such memo, or deleted it while
/// saving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMemoReply {
    #[serde(default)]
    pub memo: Option<ServerMemo>,
    #[serde(alias = "user")]
    pub requester: IdName,
}

impl ServerMemoReply {
    pub fn new(memo: Option<ServerMemo>, requester: IdName) -> Self {
        Self { memo, requester }
    }

    /// Normalized local view of the returned memo, if any.
    pub fn to_local(&self) -> Option<Memo> {
        self.memo
            .as_ref()
            .map(|memo| memo.to_local(&self.requester))
    }
}

impl ServerMemo {
    /// Joins title and body, drops carriage returns, and marks the memo
    /// read-only when the requester is not its owner.
    pub fn to_local(&self, requester: &IdName) -> Memo {
        let text = format!(
            "{}{}",
            self.title.as_deref().unwrap_or_default(),
            self.memotext.as_deref().unwrap_or_default()
        )
        .replace('\r', "");

        Memo {
            id: self.id,
            text,
            group: self.memogroup.clone(),
            owner: Some(self.user.clone()),
            timestamp: self.savetime.filter(|t| *t != 0),
            readonly: self.user.id != requester.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_memo() -> ServerMemo {
        ServerMemo {
            id: 2,
            memogroup: None,
            user: IdName::new(1, "root"),
            title: Some("Title\r\n".to_string()),
            memotext: Some("Body".to_string()),
            savetime: Some(100),
        }
    }

    #[test]
    fn test_to_local_normalizes_text() {
        let reply = ServerMemoReply::new(Some(server_memo()), IdName::new(2, "root"));
        let memo = reply.to_local().unwrap();

        assert_eq!(memo.id, 2);
        assert_eq!(memo.text, "Title\nBody");
        assert_eq!(memo.timestamp, Some(100));
        assert_eq!(memo.owner, Some(IdName::new(1, "root")));
        assert!(memo.readonly);
    }

    #[test]
    fn test_owner_is_not_readonly() {
        let memo = server_memo().to_local(&IdName::new(1, "root"));
        assert!(!memo.readonly);
    }

    #[test]
    fn test_zero_savetime_is_absent() {
        let mut server = server_memo();
        server.savetime = Some(0);
        assert_eq!(server.to_local(&IdName::new(1, "root")).timestamp, None);
    }

    #[test]
    fn test_missing_memo_is_none() {
        let reply = ServerMemoReply::new(None, IdName::new(1, "root"));
        assert!(reply.to_local().is_none());
    }

    #[test]
    fn test_reply_accepts_user_as_requester() {
        let json = r#"{
            "memo": {
                "id": 3,
                "title": "Title 3\r\n",
                "memotext": "Body3",
                "savetime": 200,
                "memogroup": {"id": 2, "name": "memogroup 2"},
                "user": {"id": 5, "name": "username"}
            },
            "user": {"id": 1, "name": "root"}
        }"#;
        let reply: ServerMemoReply = serde_json::from_str(json).unwrap();
        assert_eq!(reply.requester, IdName::new(1, "root"));

        let memo = reply.to_local().unwrap();
        assert_eq!(memo.text, "Title 3\nBody3");
        assert_eq!(memo.group, Some(IdName::new(2, "memogroup 2")));
        assert!(memo.readonly);
    }

    #[test]
    fn test_reply_with_null_memo() {
        let reply: ServerMemoReply =
            serde_json::from_str(r#"{"memo": null, "requester": {"id": 1, "name": "root"}}"#)
                .unwrap();
        assert!(reply.memo.is_none());
    }
}
