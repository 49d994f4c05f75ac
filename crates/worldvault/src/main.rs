//! Worldvault - point-in-time snapshots of live world directories.
//!
//! This is the main entry point for the worldvault CLI.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use worldvault_engine::{BackupOptions, Engine, RestoreOptions, RestoreOutcome};
use worldvault_fs::{DimensionMask, LogSink, ProgressSink};
use worldvault_util::format_bytes;
use worldvault_util::log::{LogConfig, LogLevel};

/// Requester name used for task ownership and confirmation keys.
const REQUESTER: &str = "cli";

#[derive(Parser)]
#[command(name = "worldvault")]
#[command(author, version, about = "Point-in-time snapshots for live world directories", long_about = None)]
struct Cli {
    /// Instance root holding the world and snapshot directories
    #[arg(short, long, global = true, default_value = ".")]
    dir: PathBuf,

    /// Answer yes to every confirmation prompt
    #[arg(short, long, global = true)]
    yes: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List snapshots, newest first
    List,
    /// Capture the live world into a new snapshot
    Create {
        /// Snapshot name
        name: String,
        /// Description stored with the snapshot
        #[arg(short, long, default_value = "")]
        message: String,
        /// Replace an existing snapshot of the same name
        #[arg(short, long)]
        force: bool,
    },
    /// Restore a snapshot into the live world
    Restore {
        /// Snapshot name
        name: String,
        /// Restrict the restore to these dimensions (overworld, nether, end)
        #[arg(short = 'D', long = "dimension", value_name = "DIM")]
        dimensions: Vec<String>,
        /// Override the configured countdown length in seconds
        #[arg(long)]
        countdown: Option<u32>,
    },
    /// Delete a snapshot
    Delete {
        /// Snapshot name
        name: String,
    },
    /// Rename a snapshot, replacing an unlocked snapshot at the target name
    Rename {
        /// Current name
        old: String,
        /// New name
        new: String,
    },
    /// Show one snapshot in detail
    Info {
        /// Snapshot name
        name: String,
    },
    /// Protect a snapshot from deletion and overwrite
    Lock {
        /// Snapshot name
        name: String,
        /// Remove the lock instead of setting it
        #[arg(long)]
        release: bool,
    },
    /// Delete unlocked snapshots beyond the newest N
    Prune {
        /// How many unlocked snapshots to keep
        #[arg(short, long)]
        keep: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let engine = Engine::open(&cli.dir).await?;

    match cli.command {
        Commands::List => handle_list(&engine).await,
        Commands::Create {
            name,
            message,
            force,
        } => handle_create(&engine, &name, &message, force).await,
        Commands::Restore {
            name,
            dimensions,
            countdown,
        } => handle_restore(&engine, &name, &dimensions, countdown, cli.yes).await,
        Commands::Delete { name } => handle_delete(&engine, &name, cli.yes).await,
        Commands::Rename { old, new } => {
            engine.rename(&old, &new, REQUESTER).await?;
            println!("Renamed {} to {}", old, new);
            Ok(())
        }
        Commands::Info { name } => handle_info(&engine, &name).await,
        Commands::Lock { name, release } => {
            engine.set_locked(&name, !release).await?;
            if release {
                println!("Unlocked snapshot {}", name);
            } else {
                println!("Locked snapshot {}", name);
            }
            Ok(())
        }
        Commands::Prune { keep } => handle_prune(&engine, keep).await,
    }
}

/// Logs go to stderr so command output stays clean; `-v` opens up debug.
fn init_logging(verbose: bool) {
    let level = if verbose {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    };
    worldvault_util::log::init(LogConfig {
        level,
        ..Default::default()
    });
}

async fn handle_list(engine: &Engine) -> anyhow::Result<()> {
    let entries = engine.list().await?;
    if entries.is_empty() {
        println!("No snapshots found.");
        return Ok(());
    }

    println!(
        "{:<26} {:<20} {:>10}  {}",
        "NAME", "CREATED", "SIZE", "DESCRIPTION"
    );
    println!("{}", "-".repeat(72));
    for entry in &entries {
        let info = entry.info();
        let mut name = info.name.clone();
        if info.locked {
            name.push_str(" *");
        }
        let size = info
            .size_bytes
            .map_or_else(|| "unknown".to_string(), format_bytes);
        println!(
            "{:<26} {:<20} {:>10}  {}",
            name,
            info.date.format("%Y-%m-%d %H:%M:%S"),
            size,
            info.description
        );
    }
    println!();
    println!("* locked");
    Ok(())
}

async fn handle_create(
    engine: &Engine,
    name: &str,
    message: &str,
    force: bool,
) -> anyhow::Result<()> {
    let opts = BackupOptions {
        overwrite: force,
        requester: REQUESTER.to_string(),
        progress: progress_sink(),
        cancel: shutdown_token(),
    };
    let copied = engine.backup(name, message, opts).await?;
    println!("Created snapshot {} ({})", name, format_bytes(copied));
    Ok(())
}

async fn handle_restore(
    engine: &Engine,
    name: &str,
    dimensions: &[String],
    countdown: Option<u32>,
    yes: bool,
) -> anyhow::Result<()> {
    let mask = parse_dimensions(dimensions)?;
    let opts = RestoreOptions {
        mask,
        countdown_seconds: countdown,
        skip_confirmation: yes,
        on_tick: Some(Box::new(|remaining| {
            println!("Restoring in {remaining}...");
        })),
        requester: REQUESTER.to_string(),
        progress: progress_sink(),
        cancel: shutdown_token(),
    };

    let outcome = if yes {
        engine.restore(name, opts).await?
    } else {
        // The pipeline blocks on the confirmation manager; answer it
        // from the terminal while the restore waits.
        let answer = ask_confirmation(format!("Restore {name} over the live world?"));
        let restore = engine.restore(name, opts);
        tokio::pin!(restore);
        tokio::select! {
            outcome = &mut restore => outcome?,
            answered = answer => {
                engine
                    .confirmations()
                    .respond(REQUESTER, answered.unwrap_or(false))
                    .await;
                (&mut restore).await?
            }
        }
    };

    match outcome {
        RestoreOutcome::Completed => println!("Restored {}", name),
        RestoreOutcome::Declined => println!("Restore declined."),
        RestoreOutcome::Cancelled => println!("Restore cancelled."),
    }
    Ok(())
}

async fn handle_delete(engine: &Engine, name: &str, yes: bool) -> anyhow::Result<()> {
    if !yes {
        let confirmed = ask_confirmation(format!("Delete snapshot {name}?"))
            .await
            .unwrap_or(false);
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }
    engine.delete(name, REQUESTER).await?;
    println!("Deleted snapshot {}", name);
    Ok(())
}

async fn handle_info(engine: &Engine, name: &str) -> anyhow::Result<()> {
    let entry = engine.get(name).await?;
    let info = entry.info();
    println!("Name: {}", info.name);
    println!("Created: {}", info.date.format("%Y-%m-%d %H:%M:%S"));
    if !info.description.is_empty() {
        println!("Description: {}", info.description);
    }
    match info.size_bytes {
        Some(size) => println!("Size: {}", format_bytes(size)),
        None => println!("Size: unknown"),
    }
    println!("Locked: {}", if info.locked { "yes" } else { "no" });
    println!(
        "Materialized: {}",
        if entry.exists() { "yes" } else { "no" }
    );
    if info.live_marker {
        println!("This entry archives the pre-restore live state.");
    }
    Ok(())
}

async fn handle_prune(engine: &Engine, keep: usize) -> anyhow::Result<()> {
    let deleted = engine.prune(keep, REQUESTER).await?;
    if deleted.is_empty() {
        println!("Nothing to prune.");
        return Ok(());
    }
    for name in &deleted {
        println!("Deleted {}", name);
    }
    println!("Pruned {} snapshot(s).", deleted.len());
    Ok(())
}

fn parse_dimensions(names: &[String]) -> anyhow::Result<DimensionMask> {
    if names.is_empty() {
        return Ok(DimensionMask::ALL);
    }
    let mut mask = DimensionMask::NONE;
    for name in names {
        mask = mask
            | match name.to_lowercase().as_str() {
                "overworld" => DimensionMask::OVERWORLD,
                "nether" => DimensionMask::NETHER,
                "end" => DimensionMask::END,
                other => anyhow::bail!(
                    "Unknown dimension: {other} (expected overworld, nether, or end)"
                ),
            };
    }
    Ok(mask)
}

fn progress_sink() -> Arc<dyn ProgressSink> {
    Arc::new(LogSink::default())
}

/// Token fired by Ctrl-C, aborting countdowns and copies in flight.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let fired = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("Cancelling...");
            fired.cancel();
        }
    });
    token
}

/// Prompt on a plain OS thread so a never-answered prompt cannot keep
/// the runtime from shutting down.
fn ask_confirmation(question: String) -> tokio::sync::oneshot::Receiver<bool> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    std::thread::spawn(move || {
        print!("{question} [y/N] ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        let confirmed = std::io::stdin().read_line(&mut line).is_ok()
            && matches!(line.trim().to_lowercase().as_str(), "y" | "yes");
        let _ = tx.send(confirmed);
    });
    rx
}
