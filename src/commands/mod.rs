mod config_cmd;
mod groups;
mod memo;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use groups::GroupsCommand;
pub use memo::MemoCommand;
pub use sync_cmd::{try_auto_sync, SyncCommand};

use clap::ValueEnum;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
