use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{try_auto_sync, ConfigCommand, GroupsCommand, MemoCommand, SyncCommand};
use memosync::config::Config;
use memosync::db::{init_db, MemoRepository};
use memosync::events::EventBus;

#[derive(Parser)]
#[command(name = "memosync")]
#[command(version)]
#[command(about = "Offline-first memos that sync with an organizator server", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Memo(MemoCommand),

    /// List memo groups (cached when the server is unreachable)
    Groups(GroupsCommand),

    /// Push local edits to the server
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memosync=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Config::load(cli.config)?;

    let Some(command) = cli.command else {
        println!("Use --help to see available commands");
        return Ok(());
    };

    if let Commands::Config(cmd) = &command {
        return cmd.run(&config);
    }

    let pool = init_db(&config.database_path.value).await?;
    let repo = MemoRepository::new(pool.clone(), EventBus::new());

    match &command {
        Commands::Memo(cmd) => {
            cmd.run(&repo, &pool, &config).await?;
            // Auto-sync AFTER write commands (only if command succeeded)
            if cmd.is_write() {
                try_auto_sync(&repo, &config).await;
            }
        }
        Commands::Groups(cmd) => cmd.run(&pool, &config).await?,
        Commands::Sync(cmd) => cmd.run(&repo, &config).await?,
        Commands::Config(_) => {}
    }

    Ok(())
}
