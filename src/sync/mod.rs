//! Synchronization of the local store with the memo server.
//!
//! The server is the single authority. Local edits are kept as the local
//! half of each record until a drain pushes them; when the server copy moved
//! on in the meantime the two are combined with a three-way merge first.
//!
//! # Usage
//!
//! ```no_run
//! use memosync::db::{init_db, MemoRepository};
//! use memosync::events::EventBus;
//! use memosync::sync::{HttpTransport, SyncOrchestrator};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = init_db(std::path::Path::new("memos.db")).await?;
//! let repo = MemoRepository::new(pool, EventBus::new());
//! let transport = HttpTransport::new("http://localhost:8080", "secret");
//! let report = SyncOrchestrator::new(repo, transport).save_all().await?;
//! println!("pushed {} memo(s)", report.pushed);
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod groups;
mod orchestrator;
mod transport;

pub use client::{HttpTransport, MemoGroupsReply};
pub use error::SyncError;
pub use groups::{groups_with_fallback, GROUPS_KEY, USER_KEY};
pub use orchestrator::{SessionPhase, SyncOrchestrator, SyncReport};
pub use transport::RemoteTransport;
