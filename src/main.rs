use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use url::Url;

use websub_subscriber::config::Config;
use websub_subscriber::protocol::{
    AnnounceReport, SubscriptionDenial, SubscriptionValidation, SubscriptionVerification,
};
use websub_subscriber::storage::{SqliteRepository, StorageError};
use websub_subscriber::{Subscriber, SubscriberDelegate, Subscription};

/// Get the config directory path (~/.config/websub/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("websub"))
}

#[derive(Parser, Debug)]
#[command(name = "websub", about = "WebSub subscriber: discover hubs and manage subscriptions")]
struct Args {
    /// Config file (default: ~/.config/websub/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the canonical topic and hubs advertised by a URL
    Discover { topic: Url },
    /// Subscribe a callback to a topic
    Subscribe {
        topic: Url,
        #[arg(long)]
        callback: Url,
        /// Skip discovery and use this hub
        #[arg(long)]
        hub: Option<Url>,
        #[arg(long)]
        lease_seconds: Option<u32>,
    },
    /// Unsubscribe a callback from its topic
    Unsubscribe {
        #[arg(long)]
        callback: Url,
    },
    /// List subscriptions for a topic
    List { topic: Url },
    /// Apply a hub verification or denial; prints the challenge to echo back
    Verify {
        #[arg(long)]
        callback: Url,
        /// Treat BODY as JSON instead of a query string / form body
        #[arg(long)]
        json: bool,
        body: String,
    },
    /// Deliver pushed content from FILE to the subscription's handler
    Receive {
        #[arg(long)]
        callback: Url,
        file: PathBuf,
    },
}

/// Logs lifecycle events and writes received content to stdout.
struct CliDelegate;

#[async_trait]
impl SubscriberDelegate for CliDelegate {
    async fn on_received(&self, subscription: &Subscription, content: &[u8]) -> Result<()> {
        tracing::info!(topic = %subscription.topic, bytes = content.len(), "Content received");
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(content)
            .context("Failed to write content to stdout")?;
        stdout.flush()?;
        Ok(())
    }

    async fn on_verified(
        &self,
        subscription: &Subscription,
        verification: &SubscriptionVerification,
    ) -> Result<()> {
        tracing::info!(
            callback = %subscription.callback,
            mode = %verification.mode,
            lease_seconds = ?subscription.lease_seconds,
            "Verification accepted"
        );
        Ok(())
    }

    async fn on_denied(&self, subscription: &Subscription, denial: &SubscriptionDenial) -> Result<()> {
        tracing::warn!(
            callback = %subscription.callback,
            reason = ?denial.reason,
            "Subscription denied by hub"
        );
        Ok(())
    }
}

fn print_report(report: &AnnounceReport) {
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(status) => println!("{}  accepted ({})", outcome.hub, status),
            Err(e) => println!("{}  failed: {}", outcome.hub, e),
        }
    }
    if report.all_failed() {
        eprintln!("Warning: no hub accepted the request");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let (config_dir, config_path) = match &args.config {
        Some(path) => (
            path.parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            path.clone(),
        ),
        None => {
            let dir = get_config_dir()?;
            let path = dir.join("config.toml");
            (dir, path)
        }
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .user_agent(config.user_agent.clone())
        .build()
        .context("Failed to build HTTP client")?;

    let db_path = config.database_path_in(&config_dir);
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
    }
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let repository = match SqliteRepository::open(db_path_str).await {
        Ok(repository) => repository,
        Err(StorageError::Locked) => {
            eprintln!("Error: the subscription database is locked by another process.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let subscriber = Subscriber::new(client, repository, CliDelegate)
        .with_endpoint_policy(config.endpoint_policy())
        .with_max_discovery_bytes(config.max_discovery_bytes);

    match args.command {
        Command::Discover { topic } => {
            let found = subscriber.discover(&topic).await?;
            println!("topic: {}", found.topic());
            for hub in found.hubs() {
                println!("hub:   {}", hub);
            }
        }
        Command::Subscribe {
            topic,
            callback,
            hub,
            lease_seconds,
        } => {
            let lease_seconds = lease_seconds.or(config.default_lease_seconds);
            let report = subscriber
                .subscribe(&topic, &callback, lease_seconds, hub.as_ref())
                .await?;
            print_report(&report);
        }
        Command::Unsubscribe { callback } => {
            let report = subscriber.unsubscribe(&callback).await?;
            print_report(&report);
        }
        Command::List { topic } => {
            for subscription in subscriber.subscriptions(&topic).await? {
                let state = subscription
                    .state
                    .as_ref()
                    .map(|mark| mark.name())
                    .unwrap_or("new");
                println!(
                    "{}  {}  hubs={}",
                    subscription.callback,
                    state,
                    subscription.hubs.len()
                );
            }
        }
        Command::Verify {
            callback,
            json,
            body,
        } => {
            let validation = if json {
                SubscriptionValidation::from_json(body.as_bytes())?
            } else {
                SubscriptionValidation::from_form(body.trim_start_matches('?'))?
            };
            subscriber.verify(&validation, &callback).await?;
            if let SubscriptionValidation::Verifying(verification) = &validation {
                println!("{}", verification.challenge);
            }
        }
        Command::Receive { callback, file } => {
            let content = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            subscriber.receive(&content, &callback).await?;
        }
    }

    Ok(())
}
