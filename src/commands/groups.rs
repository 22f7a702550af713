use clap::Args;
use sqlx::SqlitePool;

use super::OutputFormat;
use memosync::config::Config;
use memosync::db::GeneralStore;
use memosync::sync::{groups_with_fallback, HttpTransport, SyncError};

#[derive(Args)]
pub struct GroupsCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl GroupsCommand {
    pub async fn run(&self, pool: &SqlitePool, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let store = GeneralStore::new(pool.clone());
        let fetched = match HttpTransport::from_config(&config.sync) {
            Ok(transport) => transport.fetch_groups().await,
            Err(e) => Err(e),
        };
        let groups = match groups_with_fallback(fetched, &store).await {
            Ok(groups) => groups,
            Err(SyncError::NotConfigured) => {
                println!("No memo groups cached and sync is not configured");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&groups)?),
            OutputFormat::Text => {
                if groups.is_empty() {
                    println!("No memo groups found");
                    return Ok(());
                }
                println!("{:>6}  NAME", "ID");
                println!("{}", "-".repeat(40));
                for group in &groups {
                    println!("{:>6}  {}", group.id, group.name);
                }
            }
        }
        Ok(())
    }
}
