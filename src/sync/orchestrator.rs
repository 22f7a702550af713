//! Drains locally edited memos to the server, one memo at a time.

use super::{RemoteTransport, SyncError};
use crate::db::MemoRepository;
use crate::events::{MemoEvent, SyncStatus};
use crate::merge::merge;
use crate::models::{DualSnapshot, Memo};

/// Where the process stands in its session.
///
/// Starts as `AfterLogin` when the user just signed in, which asks for one
/// full drain before normal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    AfterLogin,
    Running,
}

/// What a drain did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Memos the server accepted
    pub pushed: usize,
    /// Memos merged with a newer server copy before pushing
    pub merged: usize,
    /// Memos removed locally (empty, or gone on the server)
    pub deleted: usize,
    /// `(old_id, new_id)` for new memos that got a server id
    pub reassigned: Vec<(i64, i64)>,
}

pub struct SyncOrchestrator<T: RemoteTransport> {
    repo: MemoRepository,
    transport: T,
    open_memo: Option<i64>,
}

impl<T: RemoteTransport> SyncOrchestrator<T> {
    pub fn new(repo: MemoRepository, transport: T) -> Self {
        Self {
            repo,
            transport,
            open_memo: None,
        }
    }

    pub fn repo(&self) -> &MemoRepository {
        &self.repo
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The memo currently shown to the user, if any. It gets an
    /// [`MemoEvent::OpenMemoReplaced`] when a drain merges into it.
    pub fn set_open_memo(&mut self, id: Option<i64>) {
        self.open_memo = id;
    }

    pub fn open_memo(&self) -> Option<i64> {
        self.open_memo
    }

    /// Persists a user edit and flags the store as dirty when something was
    /// actually written.
    pub async fn save_local(&self, memo: Memo) -> Result<Memo, SyncError> {
        let saved = self.repo.write_local_only(memo).await?;
        let dirty = self
            .repo
            .get_record(saved.id)
            .await?
            .is_some_and(|record| record.is_dirty());
        if dirty {
            self.repo.events().sync_status(SyncStatus::Dirty);
        }
        Ok(saved)
    }

    /// Runs one drain if the session just came from login, then marks the
    /// session as running.
    pub async fn resume(&mut self, phase: &mut SessionPhase) -> Result<Option<SyncReport>, SyncError> {
        match phase {
            SessionPhase::AfterLogin => {
                *phase = SessionPhase::Running;
                tracing::info!("first sync after login");
                self.save_all().await.map(Some)
            }
            SessionPhase::Running => Ok(None),
        }
    }

    /// Pushes every dirty memo, stopping at the first failure.
    ///
    /// Nothing is retried here; the memos left over stay dirty for the next
    /// drain.
    pub async fn save_all(&mut self) -> Result<SyncReport, SyncError> {
        let events = self.repo.events().clone();
        let mut dirty = match self.repo.list_dirty().await {
            Ok(dirty) => dirty,
            Err(e) => {
                events.sync_status(SyncStatus::Failed);
                return Err(e.into());
            }
        };

        if !dirty.is_empty() {
            tracing::info!(count = dirty.len(), "saving memos to server");
            events.sync_status(SyncStatus::Processing);
        }

        let mut report = SyncReport::default();
        while let Some(record) = dirty.pop() {
            let id = record.id;
            if let Err(e) = self.save_one(record, &mut report).await {
                tracing::error!(id, error = %e, "saving memo failed");
                events.status(format!("Failed to save memo {}: {}", id, e));
                events.sync_status(SyncStatus::Failed);
                return Err(e);
            }
        }

        events.sync_status(SyncStatus::Success);
        Ok(report)
    }

    async fn save_one(&mut self, record: DualSnapshot, report: &mut SyncReport) -> Result<(), SyncError> {
        let id = record.id;
        let mut local = record.local;
        let mut republish = false;

        if id >= 0 {
            let reply = self.transport.fetch_memo(id).await?;
            let remote = reply.to_local();

            if remote.is_none() {
                if local.text.is_empty() {
                    tracing::info!(id, "memo gone on server and empty locally, deleting");
                    self.repo.delete(id, None).await?;
                    report.deleted += 1;
                    return Ok(());
                }
                // unsynced local text outlives the server copy
                tracing::warn!(id, "memo gone on server but edited locally, saving it as new");
                self.repo.events().status(format!(
                    "Memo {} was deleted on the server, saving your copy as a new memo",
                    id
                ));
                republish = true;
            }

            let known = record.server.as_ref().and_then(|s| s.timestamp);
            if let (Some(remote), Some(server), Some(known)) = (remote, record.server.as_ref(), known) {
                if remote.timestamp.is_some_and(|saved| saved > known) {
                    tracing::info!(id, "server memo changed since last sync, merging");
                    local.text = merge(&server.text, &local.text, &remote.text);
                    local = self.repo.write_local_only(local).await?;
                    report.merged += 1;
                    if self.open_memo == Some(id) {
                        self.repo
                            .events()
                            .emit(MemoEvent::OpenMemoReplaced(local.clone()));
                    }
                }
            }
        } else if local.text.is_empty() {
            tracing::info!(id, "new memo has no content, deleting");
            self.repo.delete(id, None).await?;
            report.deleted += 1;
            return Ok(());
        }

        let reply = if republish {
            let outgoing = Memo {
                id: Memo::new_local_id(self.repo.now()),
                ..local
            };
            self.transport.push_memo(&outgoing).await?
        } else {
            self.transport.push_memo(&local).await?
        };
        match self.repo.reconcile_after_push(id, &reply).await? {
            Some(saved) => {
                report.pushed += 1;
                if saved.id != id {
                    report.reassigned.push((id, saved.id));
                    if self.open_memo == Some(id) {
                        self.open_memo = Some(saved.id);
                    }
                }
            }
            None => report.deleted += 1,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::db::init_db;
    use crate::events::EventBus;
    use crate::models::{IdName, ServerMemoReply};
    use crate::server::memos::MemoTable;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::broadcast::Receiver;
    use tokio::sync::Mutex;

    /// Server double backed by the reference server's memo table.
    #[derive(Default)]
    struct MockServer {
        table: Mutex<MemoTable>,
        time: AtomicI64,
        fail_push: AtomicBool,
        fetches: AtomicI64,
    }

    impl MockServer {
        fn user() -> IdName {
            IdName::new(1, "root")
        }

        async fn save(&self, memo_id: Option<i64>, text: &str) -> ServerMemoReply {
            // stays behind the local clock, which starts at 1000
            let now = self.time.fetch_add(10, Ordering::SeqCst) + 100;
            let memo = self
                .table
                .lock()
                .await
                .save(memo_id, None, text, &Self::user(), now)
                .unwrap();
            ServerMemoReply::new(memo, Self::user())
        }
    }

    #[async_trait]
    impl RemoteTransport for Arc<MockServer> {
        async fn fetch_memo(&self, id: i64) -> Result<ServerMemoReply, SyncError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let memo = self.table.lock().await.get(id);
            Ok(ServerMemoReply::new(memo, MockServer::user()))
        }

        async fn push_memo(&self, memo: &Memo) -> Result<ServerMemoReply, SyncError> {
            if self.fail_push.load(Ordering::SeqCst) {
                return Err(SyncError::Http("connection refused".to_string()));
            }
            let memo_id = (!memo.is_new()).then_some(memo.id);
            Ok(self.save(memo_id, &memo.text).await)
        }
    }

    struct TestContext {
        orchestrator: SyncOrchestrator<Arc<MockServer>>,
        server: Arc<MockServer>,
        events: Receiver<MemoEvent>,
        _temp_dir: TempDir,
    }

    impl TestContext {
        fn repo(&self) -> &MemoRepository {
            self.orchestrator.repo()
        }

        fn drain_events(&mut self) -> Vec<MemoEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                events.push(event);
            }
            events
        }
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        let time = Arc::new(AtomicI64::new(1_000));
        let clock: Clock = Arc::new(move || time.fetch_add(1, Ordering::SeqCst));
        let bus = EventBus::new();
        let events = bus.subscribe();
        let repo = MemoRepository::with_clock(pool, bus, clock);
        let server = Arc::new(MockServer::default());

        TestContext {
            orchestrator: SyncOrchestrator::new(repo, server.clone()),
            server,
            events,
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_new_memo_gets_server_id() {
        let mut ctx = setup().await;
        ctx.orchestrator
            .save_local(Memo::new(-2, "Hello\nworld"))
            .await
            .unwrap();

        let report = ctx.orchestrator.save_all().await.unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(report.reassigned, vec![(-2, 1)]);
        assert_eq!(ctx.server.fetches.load(Ordering::SeqCst), 0);

        assert!(ctx.repo().get_record(-2).await.unwrap().is_none());
        let record = ctx.repo().get_record(1).await.unwrap().unwrap();
        assert_eq!(record.local.text, "Hello\nworld");
        assert!(!record.is_dirty());

        assert_eq!(
            ctx.drain_events(),
            vec![
                MemoEvent::SyncStatus(SyncStatus::Dirty),
                MemoEvent::SyncStatus(SyncStatus::Processing),
                MemoEvent::IdChanged {
                    old_id: -2,
                    new_id: 1
                },
                MemoEvent::SyncStatus(SyncStatus::Success),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_new_memo_is_never_published() {
        let mut ctx = setup().await;
        ctx.orchestrator.save_local(Memo::new(-3, "")).await.unwrap();

        let report = ctx.orchestrator.save_all().await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.pushed, 0);
        assert!(ctx.server.table.lock().await.is_empty());
        assert!(ctx.repo().list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_of_synced_memo_is_pushed() {
        let mut ctx = setup().await;
        let reply = ctx.server.save(None, "Title\nBody").await;
        let fetched = ctx.repo().reconcile_after_fetch(&reply).await.unwrap().unwrap();

        let edited = Memo {
            text: "Title\nBody edited".to_string(),
            ..fetched
        };
        ctx.orchestrator.save_local(edited).await.unwrap();

        let report = ctx.orchestrator.save_all().await.unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(report.merged, 0);
        assert_eq!(ctx.server.fetches.load(Ordering::SeqCst), 1);

        let on_server = ctx.server.table.lock().await.get(1).unwrap();
        assert_eq!(on_server.memotext.as_deref(), Some("Body edited"));
        assert!(ctx.repo().list_dirty().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_server_edit_is_merged() {
        let mut ctx = setup().await;
        let reply = ctx.server.save(None, "List\n- eggs\n- milk\n").await;
        let fetched = ctx.repo().reconcile_after_fetch(&reply).await.unwrap().unwrap();
        ctx.orchestrator.set_open_memo(Some(fetched.id));

        // another device appends while we edit the first item
        ctx.server.save(Some(1), "List\n- eggs\n- milk\n- tea\n").await;
        let edited = Memo {
            text: "List\n- brown eggs\n- milk\n".to_string(),
            ..fetched
        };
        ctx.orchestrator.save_local(edited).await.unwrap();
        ctx.drain_events();

        let report = ctx.orchestrator.save_all().await.unwrap();
        assert_eq!(report.merged, 1);
        assert_eq!(report.pushed, 1);

        let expected = "List\n- brown eggs\n- milk\n- tea\n";
        let on_server = ctx.server.table.lock().await.get(1).unwrap();
        assert_eq!(on_server.memotext.as_deref(), Some("- brown eggs\n- milk\n- tea\n"));
        assert_eq!(ctx.repo().read(1).await.unwrap().unwrap().text, expected);

        let events = ctx.drain_events();
        assert!(events.iter().any(
            |e| matches!(e, MemoEvent::OpenMemoReplaced(memo) if memo.text == expected)
        ));
    }

    #[tokio::test]
    async fn test_memo_deleted_on_server_and_emptied_locally() {
        let mut ctx = setup().await;
        let reply = ctx.server.save(None, "Soon gone").await;
        let fetched = ctx.repo().reconcile_after_fetch(&reply).await.unwrap().unwrap();
        ctx.server.save(Some(1), "").await;

        ctx.orchestrator
            .save_local(Memo {
                text: String::new(),
                ..fetched
            })
            .await
            .unwrap();

        let report = ctx.orchestrator.save_all().await.unwrap();
        assert_eq!(report.deleted, 1);
        assert!(ctx.repo().get_record(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memo_deleted_on_server_keeps_local_edits() {
        let mut ctx = setup().await;
        let reply = ctx.server.save(None, "Keep\nold body").await;
        let fetched = ctx.repo().reconcile_after_fetch(&reply).await.unwrap().unwrap();
        ctx.server.save(Some(1), "").await;

        ctx.orchestrator
            .save_local(Memo {
                text: "Keep\nimportant unsynced edit".to_string(),
                ..fetched
            })
            .await
            .unwrap();
        ctx.orchestrator.set_open_memo(Some(1));
        ctx.drain_events();

        let report = ctx.orchestrator.save_all().await.unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(report.deleted, 0);
        assert_eq!(report.reassigned, vec![(1, 2)]);
        assert_eq!(ctx.orchestrator.open_memo(), Some(2));

        let on_server = ctx.server.table.lock().await.get(2).unwrap();
        assert_eq!(on_server.memotext.as_deref(), Some("important unsynced edit"));

        assert!(ctx.repo().get_record(1).await.unwrap().is_none());
        let record = ctx.repo().get_record(2).await.unwrap().unwrap();
        assert_eq!(record.local.text, "Keep\nimportant unsynced edit");
        assert!(!record.is_dirty());

        let events = ctx.drain_events();
        assert!(events.iter().any(|e| matches!(e, MemoEvent::Status(_))));
        assert!(events.contains(&MemoEvent::IdChanged {
            old_id: 1,
            new_id: 2
        }));
    }

    #[tokio::test]
    async fn test_push_failure_marks_failed_and_keeps_dirty() {
        let mut ctx = setup().await;
        ctx.orchestrator
            .save_local(Memo::new(-4, "keep me"))
            .await
            .unwrap();
        ctx.server.fail_push.store(true, Ordering::SeqCst);
        ctx.drain_events();

        let result = ctx.orchestrator.save_all().await;
        assert!(matches!(result, Err(SyncError::Http(_))));
        assert_eq!(ctx.repo().list_dirty().await.unwrap().len(), 1);

        let events = ctx.drain_events();
        assert_eq!(
            events.last(),
            Some(&MemoEvent::SyncStatus(SyncStatus::Failed))
        );
        assert!(events.iter().any(|e| matches!(e, MemoEvent::Status(_))));

        ctx.server.fail_push.store(false, Ordering::SeqCst);
        let report = ctx.orchestrator.save_all().await.unwrap();
        assert_eq!(report.pushed, 1);
    }

    #[tokio::test]
    async fn test_nothing_dirty_reports_success_only() {
        let mut ctx = setup().await;
        let report = ctx.orchestrator.save_all().await.unwrap();
        assert_eq!(report, SyncReport::default());
        assert_eq!(
            ctx.drain_events(),
            vec![MemoEvent::SyncStatus(SyncStatus::Success)]
        );
    }

    #[tokio::test]
    async fn test_resume_drains_once_after_login() {
        let mut ctx = setup().await;
        ctx.orchestrator.save_local(Memo::new(-1, "x")).await.unwrap();

        let mut phase = SessionPhase::AfterLogin;
        let report = ctx.orchestrator.resume(&mut phase).await.unwrap();
        assert_eq!(report.map(|r| r.pushed), Some(1));
        assert_eq!(phase, SessionPhase::Running);

        assert!(ctx.orchestrator.resume(&mut phase).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_memo_follows_reassignment() {
        let mut ctx = setup().await;
        ctx.orchestrator.save_local(Memo::new(-8, "draft")).await.unwrap();
        ctx.orchestrator.set_open_memo(Some(-8));

        ctx.orchestrator.save_all().await.unwrap();
        assert_eq!(ctx.orchestrator.open_memo(), Some(1));
    }
}
