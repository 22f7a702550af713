//! Sync CLI commands for pushing local edits to the server.

use clap::{Args, Subcommand};

use super::config_cmd::mask_key;
use memosync::config::Config;
use memosync::db::{MemoRepository, StoreError};
use memosync::sync::{HttpTransport, SyncError, SyncOrchestrator, SyncReport};

/// Sync with remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration, pending memos and server status
    Status,
}

impl SyncCommand {
    pub async fn run(&self, repo: &MemoRepository, config: &Config) -> Result<(), SyncCommandError> {
        match &self.command {
            None => self.sync(repo, config).await,
            Some(SyncSubcommand::Status) => self.status(repo, config).await,
        }
    }

    async fn sync(&self, repo: &MemoRepository, config: &Config) -> Result<(), SyncCommandError> {
        let transport = HttpTransport::from_config(&config.sync)?;
        let mut orchestrator = SyncOrchestrator::new(repo.clone(), transport);

        println!("Syncing with server...");
        let report = orchestrator.save_all().await?;
        print_report(&report);
        Ok(())
    }

    async fn status(&self, repo: &MemoRepository, config: &Config) -> Result<(), SyncCommandError> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        let dirty = repo.list_dirty().await?;
        let new = dirty.iter().filter(|r| r.local.is_new()).count();
        println!(
            "Pending:   {} memo(s) ({} new, {} edited)",
            dirty.len(),
            new,
            dirty.len() - new
        );

        let (Some(server_url), Some(api_key)) = (&config.sync.server_url, &config.sync.api_key)
        else {
            println!("Status:    Not configured");
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  sync:");
            println!("    server_url: \"http://localhost:8080\"");
            println!("    api_key: \"your-api-key\"");
            println!("    auto_sync: false");
            println!();
            println!("Or set environment variables:");
            println!("  MEMOSYNC_SYNC_URL");
            println!("  MEMOSYNC_SYNC_API_KEY");
            return Ok(());
        };

        println!("Server:    {}", server_url);
        println!("API Key:   {}", mask_key(api_key));
        println!(
            "Auto-sync: {}",
            if config.sync.auto_sync {
                "enabled"
            } else {
                "disabled"
            }
        );
        println!();

        print!("Server status: ");
        let transport = HttpTransport::new(server_url.as_str(), api_key.as_str());
        match transport.check_health().await {
            Ok(()) => println!("✓ connected"),
            Err(SyncError::Http(_)) => println!("✗ unreachable"),
            Err(e) => println!("✗ error: {}", e),
        }

        Ok(())
    }
}

fn print_report(report: &SyncReport) {
    if report.pushed == 0 && report.deleted == 0 {
        println!("Already up to date.");
        return;
    }
    println!("  ✓ {} memo(s) saved", report.pushed);
    if report.merged > 0 {
        println!("  ✓ {} merged with server changes", report.merged);
    }
    if report.deleted > 0 {
        println!("  ✓ {} removed", report.deleted);
    }
    for (old_id, new_id) in &report.reassigned {
        println!("  memo {} is now memo {}", old_id, new_id);
    }
    println!("Sync complete.");
}

/// Pushes dirty memos if auto_sync is enabled.
///
/// Failures are reported on stderr and otherwise ignored, so write commands
/// keep working offline.
pub async fn try_auto_sync(repo: &MemoRepository, config: &Config) {
    if !config.sync.auto_sync || !config.sync.is_configured() {
        return;
    }
    let transport = match HttpTransport::from_config(&config.sync) {
        Ok(transport) => transport,
        Err(_) => return,
    };
    if transport.check_health().await.is_err() {
        eprintln!("Auto-sync: server unreachable, skipping");
        return;
    }
    if let Err(e) = SyncOrchestrator::new(repo.clone(), transport)
        .save_all()
        .await
    {
        eprintln!("Auto-sync: {}", e);
    }
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    SyncError(SyncError),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::SyncError(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::SyncError(e) => Some(e),
        }
    }
}

impl From<SyncError> for SyncCommandError {
    fn from(e: SyncError) -> Self {
        SyncCommandError::SyncError(e)
    }
}

impl From<StoreError> for SyncCommandError {
    fn from(e: StoreError) -> Self {
        SyncCommandError::SyncError(SyncError::Store(e))
    }
}
