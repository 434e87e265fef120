//! Scoreq CLI - producer/consumer utilities for the scoring queues
//! Talks to the queue store directly, using the same settings as the service.

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};

use scoreq_core::application::{shutdown_channel, QueueClient};
use scoreq_core::domain::{Message, QueueError};
use scoreq_core::port::time_provider::SystemTimeProvider;
use scoreq_core::port::ModelLoader;
use scoreq_infra_system::JsonModelLoader;
use scoreq_service::{open_store, ServiceSettings, SettingsArgs};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DUMMY_FEATURE_VALUE: f64 = 0.1;

#[derive(Parser)]
#[command(name = "scoreq")]
#[command(about = "Scoreq queue CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    settings: SettingsArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a queue
    Create {
        /// Queue name
        queue: String,
    },

    /// Delete a queue and its messages
    Delete {
        /// Queue name
        queue: String,
    },

    /// Push one message
    #[command(group(ArgGroup::new("body").required(true).args(["features", "json", "dummy"])))]
    Push {
        /// Queue name
        queue: String,

        /// Comma-separated feature values (e.g. 0.1,0.2,0.3)
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        features: Option<Vec<f64>>,

        /// Raw JSON object or array
        #[arg(long)]
        json: Option<String>,

        /// Push a dummy feature vector sized for the model
        #[arg(long)]
        dummy: bool,

        /// Model artifact used to size the dummy vector
        #[arg(long, requires = "dummy")]
        model: Option<String>,

        /// Dummy vector length (overrides the model)
        #[arg(long, requires = "dummy")]
        count: Option<usize>,
    },

    /// Pull one message
    Pull {
        /// Queue name
        queue: String,

        /// Poll until a message arrives
        #[arg(long)]
        wait: bool,

        /// Give up waiting after this many milliseconds
        #[arg(long, requires = "wait")]
        timeout_ms: Option<u64>,
    },

    /// Show every queue and its length
    Status,
}

#[derive(Tabled)]
struct QueueRow {
    queue: String,
    messages: usize,
    capacity: usize,
}

/// Build the message for `push` from exactly one of the body options
fn build_message(
    features: Option<Vec<f64>>,
    json: Option<String>,
    dummy_len: Option<usize>,
) -> Result<Message> {
    if let Some(features) = features {
        return Ok(Message::features(&features));
    }
    if let Some(raw) = json {
        let value: serde_json::Value = serde_json::from_str(&raw).context("Invalid JSON payload")?;
        if !(value.is_object() || value.is_array()) {
            bail!("JSON payload must be an object or an array");
        }
        return Ok(Message::new(value));
    }
    match dummy_len {
        Some(n) => Ok(Message::features(&vec![DUMMY_FEATURE_VALUE; n])),
        None => bail!("one of --features, --json or --dummy is required"),
    }
}

/// Dummy vector length: `--count`, else the model's feature count
fn dummy_len(count: Option<usize>, model_path: &Path) -> Result<usize> {
    if let Some(n) = count {
        return Ok(n);
    }
    let model = JsonModelLoader::new()
        .load(model_path)
        .with_context(|| format!("Failed to load model {}", model_path.display()))?;
    model
        .n_features()
        .context("Model does not declare a feature count; pass --count")
}

async fn pull(client: &QueueClient, queue: &str, wait: bool, timeout_ms: Option<u64>) -> Result<()> {
    if !wait {
        match client.pull(queue).await {
            Ok(msg) => println!("{}", serde_json::to_string_pretty(msg.as_value())?),
            Err(QueueError::Empty(_)) => {
                println!("{}", format!("Queue '{}' is empty", queue).yellow())
            }
            Err(e) => return Err(e.into()),
        }
        return Ok(());
    }

    let (shutdown_tx, mut shutdown_rx) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_tx.shutdown();
        }
    });

    let waiting = client.pull_wait(queue, WAIT_POLL_INTERVAL, &mut shutdown_rx);
    let pulled = match timeout_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), waiting).await {
            Ok(pulled) => pulled?,
            Err(_) => {
                println!(
                    "{}",
                    format!("No message on '{}' within {} ms", queue, ms).yellow()
                );
                return Ok(());
            }
        },
        None => waiting.await?,
    };

    match pulled {
        Some(msg) => println!("{}", serde_json::to_string_pretty(msg.as_value())?),
        None => println!("{}", "Interrupted".yellow()),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = ServiceSettings::load(&cli.settings).context("Failed to load settings")?;
    let store = open_store(&settings, Arc::new(SystemTimeProvider))
        .await
        .context("Failed to open queue store")?;
    let client = QueueClient::new(store);

    match cli.command {
        Commands::Create { queue } => {
            client.create(&queue).await?;
            println!("{}", format!("✓ Queue '{}' created", queue).green().bold());
        }

        Commands::Delete { queue } => {
            client.delete(&queue).await?;
            println!("{}", format!("✓ Queue '{}' deleted", queue).green().bold());
        }

        Commands::Push {
            queue,
            features,
            json,
            dummy,
            model,
            count,
        } => {
            let dummy_len = if dummy {
                let model_path = model
                    .map(std::path::PathBuf::from)
                    .unwrap_or_else(|| settings.model_path());
                Some(dummy_len(count, &model_path)?)
            } else {
                None
            };
            let message = build_message(features, json, dummy_len)?;
            client.push(&queue, message.clone()).await?;
            println!("{}", format!("✓ Pushed to '{}'", queue).green().bold());
            println!("  {} {}", "Message:".bold(), message);
        }

        Commands::Pull {
            queue,
            wait,
            timeout_ms,
        } => pull(&client, &queue, wait, timeout_ms).await?,

        Commands::Status => {
            println!("{}", "Queue Status".cyan().bold());
            println!(
                "  {} {} ({})",
                "Storage:".bold(),
                settings.storage_path,
                settings.storage_backend
            );
            println!();

            let capacity = client.capacity();
            let rows: Vec<QueueRow> = client
                .status()
                .await?
                .into_iter()
                .map(|info| QueueRow {
                    queue: info.name,
                    messages: info.len,
                    capacity,
                })
                .collect();

            if rows.is_empty() {
                println!("{}", "No queues".yellow());
            } else {
                println!("{}", Table::new(rows));
            }
        }
    }

    Ok(())
}
