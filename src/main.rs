use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use bytesize::ByteSize;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use common::utils::format_duration;
use logging::Logger;
use model_manager::ProgressCallback;
use photo_curator::{read_photos, resolve_goal, PhotoCurator};
use settings::ConfigManager;

/// Photo Curator - model cache management and photo curation
#[derive(Parser)]
#[command(name = "photo-curator")]
#[command(author = "Photo Curator Team")]
#[command(version)]
#[command(about = "Manage curation models and curate photo collections")]
struct Cli {
    /// Configuration file (TOML); defaults to the platform config directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Model catalog and cache commands
    Models {
        #[command(subcommand)]
        action: ModelCommands,
    },
    /// Cluster a JSON photo collection by time, location and visual similarity
    Cluster {
        /// JSON array of photo items
        photos: PathBuf,
    },
    /// Rank a JSON photo collection against a goal
    Curate {
        /// JSON array of photo items
        photos: PathBuf,

        /// Built-in goal preset
        #[arg(short, long, conflicts_with = "goal_file")]
        goal: Option<String>,

        /// JSON goal file
        #[arg(long)]
        goal_file: Option<PathBuf>,

        /// Number of photos to select
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Spread the selection across the collection's moments
        #[arg(long, requires = "count")]
        smart: bool,
    },
    /// Compare a proposed selection with the user's final one
    Feedback {
        /// JSON array of proposed photo ids
        original: PathBuf,

        /// JSON array of kept photo ids
        user_final: PathBuf,
    },
}

#[derive(Subcommand)]
enum ModelCommands {
    /// List the model catalog with cache and residency state
    List,
    /// Load a model, retrying and falling back as configured
    Load {
        name: String,

        /// Give up waiting after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Evict cached artifacts until the cache is under its cap
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigManager::from_file(path)?,
        None => ConfigManager::new()?,
    };

    let _guard = Logger::init(&config.settings().logging)?;

    let curator = PhotoCurator::from_config(&config).await?;

    match cli.command {
        Commands::Models { action } => run_models(&curator, action).await,
        Commands::Cluster { photos } => {
            let items = read_photos(&photos)?;
            print_json(&curator.cluster(&items)?)
        }
        Commands::Curate {
            photos,
            goal,
            goal_file,
            count,
            smart,
        } => {
            let items = read_photos(&photos)?;
            let goal = resolve_goal(goal.as_deref(), goal_file.as_deref())?;

            let selected = match (smart, count) {
                (true, Some(target)) => curator.smart_select(&items, &goal, target)?,
                _ => curator.curate(&items, &goal, count)?,
            };

            print_json(&selected)
        }
        Commands::Feedback { original, user_final } => {
            let original = read_ids(&original)?;
            let user_final = read_ids(&user_final)?;

            let diff = curator.feedback(&original, &user_final);
            print_json(&diff)?;

            if let Some(rate) = diff.acceptance_rate() {
                eprintln!("Acceptance rate: {:.0}%", rate * 100.0);
            }

            Ok(())
        }
    }
}

async fn run_models(curator: &PhotoCurator, action: ModelCommands) -> Result<()> {
    match action {
        ModelCommands::List => {
            let loader = curator.loader();
            println!("{:<24} {:<10} {:>10}  {:<10} {}", "MODEL", "VERSION", "SIZE", "PRIORITY", "STATUS");

            for descriptor in curator.registry().list() {
                println!(
                    "{:<24} {:<10} {:>10}  {:<10} {:?}",
                    descriptor.name,
                    descriptor.version,
                    ByteSize::b(descriptor.size_bytes).to_string(),
                    descriptor.priority.to_string(),
                    loader.status(&descriptor.name),
                );
            }

            println!(
                "\nCached: {} of {}",
                ByteSize::b(loader.cached_bytes()),
                ByteSize::b(curator.settings().cache.max_bytes)
            );
            Ok(())
        }
        ModelCommands::Load { name, timeout } => {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
                    .progress_chars("#>-"),
            );
            bar.set_message(name.clone());

            let progress: ProgressCallback = {
                let bar = bar.clone();
                Arc::new(move |loaded, total| {
                    bar.set_length(total);
                    bar.set_position(loaded);
                })
            };

            let result = match timeout {
                Some(secs) => {
                    curator
                        .load_model_with_timeout(&name, Duration::from_secs(secs), Some(progress))
                        .await
                }
                None => curator.load_model(&name, Some(progress)).await,
            };
            bar.finish_and_clear();

            match result {
                Ok(outcome) => {
                    eprintln!(
                        "Loaded {} from {} in {} ({} attempts)",
                        outcome.served_by,
                        outcome.source,
                        format_duration(Duration::from_millis(outcome.load_time_ms)),
                        outcome.attempts
                    );
                    if let Some(message) = &outcome.user_message {
                        eprintln!("{}", message);
                    }
                    print_json(&outcome.summary())
                }
                Err(err) => {
                    if let Some(root) = err.downcast_ref::<common::Error>() {
                        let message = curator.error_handler().user_message(root, Some(&name));
                        eprintln!("{}: {}", message.title, message.message);
                        for action in &message.actions {
                            eprintln!("  - {}", action.description());
                        }
                    }
                    Err(err)
                }
            }
        }
        ModelCommands::Cleanup => {
            let report = curator.cleanup_cache().await?;

            for name in &report.evicted {
                println!("evicted  {}", name);
            }
            for name in &report.skipped {
                println!("skipped  {} (in use)", name);
            }
            println!(
                "Freed {}, {} remaining",
                ByteSize::b(report.freed_bytes),
                ByteSize::b(report.remaining_bytes)
            );
            Ok(())
        }
    }
}

fn read_ids(path: &std::path::Path) -> Result<Vec<String>> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
