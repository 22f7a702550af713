use clap::Subcommand;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::io::{self, Read, Write};

use super::OutputFormat;
use memosync::config::Config;
use memosync::db::{GeneralStore, MemoRepository};
use memosync::models::{make_title_list, toggle_checkbox, IdName, Memo, MemoTitle};
use memosync::sync::{HttpTransport, RemoteTransport, GROUPS_KEY};

#[derive(Subcommand)]
pub enum MemoCommand {
    /// Create a new memo (reads stdin when TEXT is omitted)
    New {
        /// Memo text; the first line is the title
        text: Option<String>,

        /// Memo group ID
        #[arg(long)]
        group: Option<i64>,
    },

    /// Replace the text of a memo (reads stdin when TEXT is omitted)
    Edit {
        /// Memo ID
        id: i64,

        /// New memo text
        text: Option<String>,

        /// Move the memo to another group
        #[arg(long)]
        group: Option<i64>,
    },

    /// Show a memo, refreshed from the server when sync is configured
    Show {
        /// Memo ID
        id: i64,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List memos, most recently used first
    List {
        /// Only memos never saved to the server
        #[arg(long, conflicts_with = "dirty")]
        new: bool,

        /// Only memos with changes not yet on the server
        #[arg(long)]
        dirty: bool,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Toggle a checkbox ("- [ ]" / "- [x]") in a memo
    Check {
        /// Memo ID
        id: i64,

        /// Which checkbox, counting from 0
        index: usize,
    },

    /// Delete a memo (on the server too, at the next sync)
    Delete {
        /// Memo ID
        id: i64,

        /// Only drop the local copy
        #[arg(long)]
        local: bool,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl MemoCommand {
    /// Commands that change local memos and should be followed by auto-sync.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            MemoCommand::New { .. }
                | MemoCommand::Edit { .. }
                | MemoCommand::Check { .. }
                | MemoCommand::Delete { local: false, .. }
        )
    }

    pub async fn run(
        &self,
        repo: &MemoRepository,
        pool: &SqlitePool,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match self {
            MemoCommand::New { text, group } => {
                let text = text_or_stdin(text.as_deref())?;
                if text.trim().is_empty() {
                    return Err("Memo text cannot be empty".into());
                }

                let mut memo = Memo::new(Memo::new_local_id(repo.now()), text);
                if let Some(group_id) = group {
                    memo = memo.with_group(lookup_group(pool, *group_id).await?);
                }

                let created = repo.write_local_only(memo).await?;
                println!("Created {}", created);
                Ok(())
            }

            MemoCommand::Edit { id, text, group } => {
                let existing = editable(repo, *id).await?;
                let mut memo = Memo {
                    text: text_or_stdin(text.as_deref())?,
                    ..existing.clone()
                };
                if let Some(group_id) = group {
                    memo.group = Some(lookup_group(pool, *group_id).await?);
                }

                let saved = repo.write_local_only(memo).await?;
                if saved.timestamp == existing.timestamp {
                    println!("No changes to {}", saved);
                } else {
                    println!("Updated {}", saved);
                }
                Ok(())
            }

            MemoCommand::Show { id, format } => {
                let memo = match refresh(repo, config, *id).await? {
                    Some(memo) => memo,
                    None => return Err(format!("Memo {} not found", id).into()),
                };

                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&memo)?),
                    OutputFormat::Text => {
                        println!("{}", memo);
                        if let Some(group) = &memo.group {
                            println!("Group: {} ({})", group.name, group.id);
                        }
                        if let Some(owner) = &memo.owner {
                            println!("Owner: {}", owner.name);
                        }
                        if memo.readonly {
                            println!("Read-only");
                        }
                        println!();
                        println!("{}", memo.text);
                    }
                }
                Ok(())
            }

            MemoCommand::List { new, dirty, format } => {
                let records = if *new {
                    repo.list_new().await?
                } else if *dirty {
                    repo.list_dirty().await?
                } else {
                    repo.list_all().await?
                };

                if records.is_empty() {
                    println!("No memos found");
                    return Ok(());
                }

                let unsaved: HashSet<i64> = records
                    .iter()
                    .filter(|r| r.is_dirty())
                    .map(|r| r.id)
                    .collect();
                let titles = make_title_list(
                    records.iter().map(MemoTitle::from_snapshot).collect(),
                    &repo.access_times().await?,
                );

                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&titles)?),
                    OutputFormat::Text => {
                        println!("{:>15}  {:<6}  TITLE", "ID", "STATE");
                        println!("{}", "-".repeat(80));
                        for title in &titles {
                            println!(
                                "{:>15}  {:<6}  {}",
                                title.id,
                                state_label(title, unsaved.contains(&title.id)),
                                truncate(&title.title, 55)
                            );
                        }
                        println!("\nTotal: {} memo(s)", titles.len());
                    }
                }
                Ok(())
            }

            MemoCommand::Check { id, index } => {
                let existing = editable(repo, *id).await?;
                let text = toggle_checkbox(&existing.text, *index)
                    .ok_or_else(|| format!("Memo {} has no checkbox {}", id, index))?;

                let saved = repo.write_local_only(Memo { text, ..existing }).await?;
                println!("Updated {}", saved);
                Ok(())
            }

            MemoCommand::Delete { id, local, force } => {
                let Some(existing) = repo.read(*id).await? else {
                    return Err(format!("Memo {} not found", id).into());
                };

                if !force {
                    print!("Delete {}? [y/N] ", existing);
                    io::stdout().flush()?;
                    let mut input = String::new();
                    io::stdin().read_line(&mut input)?;
                    if !input.trim().eq_ignore_ascii_case("y") {
                        println!("Cancelled");
                        return Ok(());
                    }
                }

                if *local || existing.is_new() {
                    repo.delete(*id, None).await?;
                } else {
                    if existing.readonly {
                        return Err(format!("Memo {} is read-only", id).into());
                    }
                    // an empty save deletes the memo on the server
                    repo.write_local_only(Memo {
                        text: String::new(),
                        ..existing
                    })
                    .await?;
                }
                println!("Deleted memo {}", id);
                Ok(())
            }
        }
    }
}

fn text_or_stdin(text: Option<&str>) -> io::Result<String> {
    match text {
        Some(text) => Ok(text.to_string()),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

async fn editable(repo: &MemoRepository, id: i64) -> Result<Memo, Box<dyn std::error::Error>> {
    match repo.read(id).await? {
        Some(memo) if memo.readonly => Err(format!("Memo {} is read-only", id).into()),
        Some(memo) => Ok(memo),
        None => Err(format!("Memo {} not found", id).into()),
    }
}

/// Group by id from the cached group list, or a bare reference when it is
/// not cached.
async fn lookup_group(pool: &SqlitePool, id: i64) -> Result<IdName, Box<dyn std::error::Error>> {
    let cached: Vec<IdName> = GeneralStore::new(pool.clone())
        .get(GROUPS_KEY)
        .await?
        .unwrap_or_default();
    Ok(cached
        .into_iter()
        .find(|g| g.id == id)
        .unwrap_or_else(|| IdName::new(id, "")))
}

/// The local memo, reconciled with the server copy first when possible.
async fn refresh(
    repo: &MemoRepository,
    config: &Config,
    id: i64,
) -> Result<Option<Memo>, Box<dyn std::error::Error>> {
    if id < 0 || !config.sync.is_configured() {
        return Ok(repo.read(id).await?);
    }

    let transport = HttpTransport::from_config(&config.sync)?;
    match transport.fetch_memo(id).await {
        Ok(reply) => match repo.reconcile_after_fetch(&reply).await? {
            Some(memo) => Ok(Some(memo)),
            None => Ok(repo.read(id).await?),
        },
        Err(e) => {
            eprintln!("Warning: showing local copy, {}", e);
            Ok(repo.read(id).await?)
        }
    }
}

fn state_label(title: &MemoTitle, unsaved: bool) -> &'static str {
    if title.id < 0 {
        "new"
    } else if unsaved {
        "dirty"
    } else if title.readonly {
        "ro"
    } else {
        ""
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max - 3).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}
