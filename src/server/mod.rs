//! Reference memo server.
//!
//! Keeps memos in memory and speaks the same HTTP dialect the sync client
//! expects, which makes it usable both as a local authority and as a test
//! double for the HTTP transport.

pub mod auth;
pub mod memos;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::clock::Clock;
use crate::models::{IdName, ServerMemoReply};
use crate::sync::MemoGroupsReply;
use auth::{auth_middleware, ApiKeyEntry, ApiKeyStore, AuthUser};
use memos::{MemoTable, NotOwner};

/// Server config file structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerConfigFile {
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
    #[serde(default)]
    pub memogroups: Vec<IdName>,
}

impl ServerConfigFile {
    /// Reads the config file, falling back to an empty config (no keys, no
    /// groups) when it is missing or invalid.
    pub fn load(path: &FsPath) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str::<ServerConfigFile>(&contents) {
                Ok(config) => {
                    tracing::info!(
                        "Loaded {} API key(s) and {} memo group(s)",
                        config.api_keys.len(),
                        config.memogroups.len()
                    );
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
                tracing::warn!("No API keys loaded - all authenticated requests will fail");
                Self::default()
            }
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    api_keys: Arc<ApiKeyStore>,
    groups: Arc<Vec<IdName>>,
    memos: Arc<Mutex<MemoTable>>,
    clock: Clock,
}

impl AppState {
    pub fn new(config: ServerConfigFile, clock: Clock) -> Self {
        Self {
            api_keys: Arc::new(ApiKeyStore::new(config.api_keys)),
            groups: Arc::new(config.memogroups),
            memos: Arc::new(Mutex::new(MemoTable::new())),
            clock,
        }
    }
}

/// Builds the full router: `/health` is public, everything under
/// `/organizator` needs a valid API key.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/organizator/memo/", post(save_memo))
        .route("/organizator/memo/{id}", get(get_memo))
        .route("/organizator/memogroup/", get(list_groups))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn get_memo(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Json<ServerMemoReply> {
    let memo = state.memos.lock().await.get(id);
    Json(ServerMemoReply::new(memo, user))
}

/// Form fields of a save; a missing `memo_id` creates a memo.
#[derive(Debug, Deserialize)]
struct SaveMemoForm {
    group_id: Option<i64>,
    memo_id: Option<i64>,
    #[serde(default)]
    text: String,
}

async fn save_memo(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Form(form): Form<SaveMemoForm>,
) -> Result<Json<ServerMemoReply>, SaveRejected> {
    let group = form
        .group_id
        .and_then(|id| state.groups.iter().find(|g| g.id == id).cloned());
    let now = (state.clock)();

    let memo = state
        .memos
        .lock()
        .await
        .save(form.memo_id, group, &form.text, &user, now)?;
    Ok(Json(ServerMemoReply::new(memo, user)))
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// A save refused because the memo belongs to another user.
struct SaveRejected(NotOwner);

impl From<NotOwner> for SaveRejected {
    fn from(err: NotOwner) -> Self {
        Self(err)
    }
}

impl IntoResponse for SaveRejected {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: "not_owner",
            message: self.0.to_string(),
        };
        (StatusCode::FORBIDDEN, Json(body)).into_response()
    }
}

async fn list_groups(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Json<MemoGroupsReply> {
    Json(MemoGroupsReply {
        memogroups: state.groups.as_ref().clone(),
        requester: Some(user),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::system_clock;
    use crate::db::{init_db, MemoRepository};
    use crate::events::EventBus;
    use crate::models::Memo;
    use crate::sync::{HttpTransport, RemoteTransport, SyncError, SyncOrchestrator};
    use tempfile::TempDir;

    const KEY: &str = "test-key";

    fn config() -> ServerConfigFile {
        serde_yaml::from_str(
            r#"
api_keys:
  - key: "test-key"
    user_id: 1
    username: root
  - key: "other-key"
    user_id: 2
    username: ana
memogroups:
  - id: 3
    name: Work
"#,
        )
        .unwrap()
    }

    async fn spawn_server() -> String {
        let app = router(AppState::new(config(), system_clock()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_load_missing_config_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let config = ServerConfigFile::load(&temp_dir.path().join("nope.yaml"));
        assert!(config.api_keys.is_empty());
        assert!(config.memogroups.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_unknown_key() {
        let url = spawn_server().await;
        let transport = HttpTransport::new(url, "wrong");
        let result = transport.fetch_memo(1).await;
        assert!(matches!(
            result,
            Err(SyncError::Status { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn test_health_needs_no_key() {
        let url = spawn_server().await;
        HttpTransport::new(url, "wrong").check_health().await.unwrap();
    }

    #[tokio::test]
    async fn test_push_fetch_and_groups_over_http() {
        let url = spawn_server().await;
        let transport = HttpTransport::new(url, KEY);

        let memo = Memo::new(-5, "Shopping\r\n- eggs & milk").with_group(IdName::new(3, "Work"));
        let reply = transport.push_memo(&memo).await.unwrap();
        let saved = reply.to_local().unwrap();
        assert_eq!(saved.id, 1);
        assert_eq!(saved.text, "Shopping\n- eggs & milk");
        assert_eq!(saved.group, Some(IdName::new(3, "Work")));
        assert!(!saved.readonly);

        let fetched = transport.fetch_memo(1).await.unwrap();
        assert_eq!(fetched.to_local(), Some(saved));

        assert!(transport.fetch_memo(2).await.unwrap().memo.is_none());

        let groups = transport.fetch_groups().await.unwrap();
        assert_eq!(groups.memogroups, vec![IdName::new(3, "Work")]);
        assert_eq!(groups.requester, Some(IdName::new(1, "root")));
    }

    #[tokio::test]
    async fn test_save_by_non_owner_is_forbidden() {
        let url = spawn_server().await;
        let owner = HttpTransport::new(url.clone(), KEY);
        let other = HttpTransport::new(url, "other-key");

        let saved = owner
            .push_memo(&Memo::new(-1, "Mine\nprivate"))
            .await
            .unwrap()
            .to_local()
            .unwrap();

        let overwrite = Memo::new(saved.id, "Mine\noverwritten");
        let result = other.push_memo(&overwrite).await;
        assert!(matches!(
            result,
            Err(SyncError::Status { status: 403, .. })
        ));
        let delete = Memo::new(saved.id, "");
        assert!(other.push_memo(&delete).await.is_err());

        let fetched = other.fetch_memo(saved.id).await.unwrap().to_local().unwrap();
        assert_eq!(fetched.text, "Mine\nprivate");
        assert!(fetched.readonly);
    }

    #[tokio::test]
    async fn test_sync_against_server() {
        let url = spawn_server().await;
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        let repo = MemoRepository::new(pool, EventBus::new());
        let mut orchestrator = SyncOrchestrator::new(repo.clone(), HttpTransport::new(url, KEY));

        repo.write_local_only(Memo::new(-1, "First\nbody"))
            .await
            .unwrap();
        repo.write_local_only(Memo::new(-2, "")).await.unwrap();

        let report = orchestrator.save_all().await.unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.reassigned, vec![(-1, 1)]);

        let record = repo.get_record(1).await.unwrap().unwrap();
        assert_eq!(record.local.text, "First\nbody");
        assert!(!record.is_dirty());
        assert!(repo.list_dirty().await.unwrap().is_empty());
    }
}
