use super::{MemoGroupsReply, SyncError};
use crate::db::GeneralStore;
use crate::models::IdName;

pub const GROUPS_KEY: &str = "memogroups";
pub const USER_KEY: &str = "user";

/// Memo groups from a fresh server reply, or the last cached list when the
/// server could not be reached.
///
/// A successful reply refreshes the cache (and the cached requester). The
/// original error comes back only when there is nothing cached either.
pub async fn groups_with_fallback(
    fetched: Result<MemoGroupsReply, SyncError>,
    store: &GeneralStore,
) -> Result<Vec<IdName>, SyncError> {
    match fetched {
        Ok(reply) => {
            store.put(GROUPS_KEY, &reply.memogroups).await?;
            if let Some(user) = &reply.requester {
                store.put(USER_KEY, user).await?;
            }
            Ok(reply.memogroups)
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to fetch memogroups");
            match store.get::<Vec<IdName>>(GROUPS_KEY).await? {
                Some(cached) => {
                    tracing::info!("serving memogroups cached in general store");
                    Ok(cached)
                }
                None => Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use tempfile::TempDir;

    async fn setup() -> (GeneralStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        (GeneralStore::new(pool), temp_dir)
    }

    fn offline() -> Result<MemoGroupsReply, SyncError> {
        Err(SyncError::Http("offline".to_string()))
    }

    #[tokio::test]
    async fn test_fresh_reply_is_cached() {
        let (store, _temp) = setup().await;
        let reply = MemoGroupsReply {
            memogroups: vec![IdName::new(1, "Home"), IdName::new(2, "Work")],
            requester: Some(IdName::new(7, "ana")),
        };

        let groups = groups_with_fallback(Ok(reply.clone()), &store).await.unwrap();
        assert_eq!(groups, reply.memogroups);

        let user: Option<IdName> = store.get(USER_KEY).await.unwrap();
        assert_eq!(user, Some(IdName::new(7, "ana")));

        let cached = groups_with_fallback(offline(), &store).await.unwrap();
        assert_eq!(cached, reply.memogroups);
    }

    #[tokio::test]
    async fn test_offline_without_cache_fails() {
        let (store, _temp) = setup().await;
        let result = groups_with_fallback(offline(), &store).await;
        assert!(matches!(result, Err(SyncError::Http(_))));
    }
}
