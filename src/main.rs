//! Confluent Cloud CLI
//!
//! Thin command-line front end over the reconcilers.
//!
//! # Usage
//! ```bash
//! export CONFLUENT_EMAIL=ops@example.com CONFLUENT_PASSWORD=...
//!
//! # List clusters of the default account
//! confluent-cloud clusters
//!
//! # Create a topic with a custom retention
//! confluent-cloud topic create --cluster-id lkc-abc12 --name orders \
//!     --partitions 6 --config retention_ms=3600000
//!
//! # Create an API key (the secret is printed once)
//! confluent-cloud api-key create --cluster-id lkc-abc12
//! ```

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use confluent_cloud::config::DEFAULT_API_ENDPOINT;
use confluent_cloud::retry::RetryConfig;
use confluent_cloud::{
    Attributes, CallContext, DataSourceKind, Provider, ProviderConfig, ReadOutcome, ResourceKind,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// ============================================================
// CLI Definition
// ============================================================

#[derive(Parser)]
#[command(name = "confluent-cloud")]
#[command(about = "Manage Confluent Cloud clusters, topics and API keys", long_about = None)]
#[command(version)]
struct Cli {
    /// Control-plane base URL
    #[arg(long, env = "CONFLUENT_API_ENDPOINT", default_value = DEFAULT_API_ENDPOINT)]
    api_endpoint: String,

    /// Login email
    #[arg(long, env = "CONFLUENT_EMAIL")]
    email: String,

    /// Login password
    #[arg(long, env = "CONFLUENT_PASSWORD", hide_env_values = true)]
    password: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Attempts for mutating calls, including the first
    #[arg(long, default_value = "5")]
    max_attempts: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show an account (the default account unless --name is given)
    Account {
        #[arg(long)]
        name: Option<String>,
    },

    /// List clusters of an account
    Clusters {
        #[arg(long)]
        account: Option<String>,
    },

    /// Manage a cluster
    Cluster {
        #[command(subcommand)]
        command: ClusterCommand,
    },

    /// List topics of a cluster
    Topics {
        #[arg(long)]
        cluster_id: String,

        #[arg(long)]
        account: Option<String>,
    },

    /// Manage a topic
    Topic {
        #[command(subcommand)]
        command: TopicCommand,
    },

    /// Manage an API key
    ApiKey {
        #[command(subcommand)]
        command: ApiKeyCommand,
    },
}

#[derive(Subcommand)]
enum ClusterCommand {
    /// Provision a new cluster
    Create {
        #[arg(long)]
        name: String,

        /// Cloud provider: aws, gcp or azure
        #[arg(long)]
        provider: String,

        /// Cloud provider region (e.g. eu-west-1)
        #[arg(long)]
        region: String,

        /// LOW (single zone) or HIGH (multi zone)
        #[arg(long, default_value = "LOW")]
        durability: String,

        #[arg(long)]
        account: Option<String>,
    },

    /// Show a cluster by name
    Show {
        #[arg(long)]
        name: String,

        #[arg(long)]
        account: Option<String>,
    },

    /// Rename a cluster
    Rename {
        #[arg(long)]
        id: String,

        /// New name
        #[arg(long)]
        name: String,

        #[arg(long)]
        account: Option<String>,
    },

    /// Delete a cluster
    Delete {
        #[arg(long)]
        id: String,

        #[arg(long)]
        account: Option<String>,
    },
}

#[derive(Subcommand)]
enum TopicCommand {
    /// Create a topic and apply its configuration
    Create {
        #[arg(long)]
        cluster_id: String,

        #[arg(long)]
        name: String,

        #[arg(long, default_value = "3")]
        partitions: i64,

        /// Config attribute, e.g. retention_ms=3600000 (repeatable)
        #[arg(long = "config", value_parser = parse_key_val)]
        configs: Vec<(String, String)>,

        #[arg(long)]
        account: Option<String>,
    },

    /// Show a topic with its managed configuration
    Show {
        #[arg(long)]
        cluster_id: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        account: Option<String>,
    },

    /// Set the configuration of a topic; unset attributes revert to defaults
    SetConfig {
        #[arg(long)]
        cluster_id: String,

        #[arg(long)]
        name: String,

        /// Config attribute, e.g. retention_ms=3600000 (repeatable)
        #[arg(long = "config", value_parser = parse_key_val)]
        configs: Vec<(String, String)>,

        #[arg(long)]
        account: Option<String>,
    },

    /// Delete a topic
    Delete {
        #[arg(long)]
        cluster_id: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        account: Option<String>,
    },
}

#[derive(Subcommand)]
enum ApiKeyCommand {
    /// Create an API key; the secret is only shown here
    Create {
        #[arg(long)]
        cluster_id: String,

        #[arg(long)]
        account: Option<String>,
    },

    /// Delete an API key
    Delete {
        #[arg(long)]
        cluster_id: String,

        #[arg(long)]
        id: u64,

        #[arg(long)]
        account: Option<String>,
    },
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

/// Attributes addressing one topic
fn topic_key(cluster_id: &str, name: &str, account: Option<&str>) -> Attributes {
    let mut attrs = Attributes::new()
        .with("cluster_id", cluster_id)
        .with("name", name);
    if let Some(account) = account {
        attrs.set("account_id", account);
    }
    attrs
}

fn print_attributes(attributes: &Attributes) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(attributes)?);
    Ok(())
}

// ============================================================
// Main Entry Point
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    let config = ProviderConfig::new(cli.email, cli.password)
        .with_api_endpoint(cli.api_endpoint)
        .with_request_timeout(Duration::from_secs(cli.timeout))
        .with_retry(RetryConfig::with_max_attempts(cli.max_attempts));
    let provider = Provider::new(config).context("Invalid provider configuration")?;

    // Ctrl-C cancels whatever call is in flight
    let ctx = CallContext::new();
    let cancel = ctx.cancellation().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });

    match cli.command {
        Commands::Account { name } => {
            let mut query = Attributes::new();
            if let Some(name) = name {
                query.set("name", name);
            }
            match provider.lookup(&ctx, DataSourceKind::Account, &query).await? {
                ReadOutcome::Present(attrs) => print_attributes(&attrs)?,
                ReadOutcome::Absent => bail!("No matching account"),
            }
        }

        Commands::Clusters { account } => {
            let clusters = provider
                .control_plane()
                .list_clusters(&ctx, account.as_deref())
                .await?;

            println!("\n{:<14} {:<24} {:<8} {:<14} {:<12}", "ID", "NAME", "CLOUD", "REGION", "STATUS");
            println!("{}", "-".repeat(76));
            for cluster in &clusters {
                println!(
                    "{:<14} {:<24} {:<8} {:<14} {:<12}",
                    cluster.id, cluster.name, cluster.service_provider, cluster.region, cluster.status
                );
            }
            info!("✅ Listed {} clusters", clusters.len());
        }

        Commands::Cluster { command } => match command {
            ClusterCommand::Create { name, provider: cloud, region, durability, account } => {
                info!("➕ Creating cluster {} in {}/{}", name, cloud, region);
                let mut desired = Attributes::new()
                    .with("name", name)
                    .with("service_provider", cloud)
                    .with("region", region)
                    .with("durability", durability);
                if let Some(account) = account {
                    desired.set("account_id", account);
                }
                let applied = provider.create(&ctx, ResourceKind::Cluster, &desired).await?;
                print_attributes(&applied.attributes)?;
            }

            ClusterCommand::Show { name, account } => {
                let mut query = Attributes::new().with("name", name.as_str());
                if let Some(account) = account {
                    query.set("account_id", account);
                }
                match provider.lookup(&ctx, DataSourceKind::Cluster, &query).await? {
                    ReadOutcome::Present(attrs) => print_attributes(&attrs)?,
                    ReadOutcome::Absent => bail!("Cluster {} not found", name),
                }
            }

            ClusterCommand::Rename { id, name, account } => {
                info!("✏️  Renaming cluster {} to {}", id, name);
                let mut current = Attributes::new().with("id", id);
                if let Some(account) = account {
                    current.set("account_id", account);
                }
                let desired = Attributes::new().with("name", name);
                let applied = provider
                    .update(&ctx, ResourceKind::Cluster, &current, &desired)
                    .await?;
                print_attributes(&applied.attributes)?;
            }

            ClusterCommand::Delete { id, account } => {
                warn!("🗑️  Deleting cluster: {}", id);
                let mut current = Attributes::new().with("id", id.as_str());
                if let Some(account) = account {
                    current.set("account_id", account);
                }
                provider.delete(&ctx, ResourceKind::Cluster, &current).await?;
                println!("✅ Deleted cluster: {}", id);
            }
        },

        Commands::Topics { cluster_id, account } => {
            let cluster = provider
                .control_plane()
                .get_cluster(&ctx, account.as_deref(), &cluster_id)
                .await?
                .with_context(|| format!("Cluster {cluster_id} not found"))?;
            let topics = provider.data_plane(&cluster)?.list_topics(&ctx).await?;

            println!("\n{:<48} {:<10} {:<8}", "NAME", "PARTITIONS", "INTERNAL");
            println!("{}", "-".repeat(68));
            for topic in &topics {
                println!("{:<48} {:<10} {:<8}", topic.name, topic.partition_count(), topic.internal);
            }
            info!("✅ Listed {} topics", topics.len());
        }

        Commands::Topic { command } => match command {
            TopicCommand::Create { cluster_id, name, partitions, configs, account } => {
                info!("➕ Creating topic {} on {}", name, cluster_id);
                let mut desired = topic_key(&cluster_id, &name, account.as_deref())
                    .with("num_partitions", partitions);
                for (key, value) in configs {
                    desired.set(key, value);
                }
                let applied = provider.create(&ctx, ResourceKind::Topic, &desired).await?;
                print_attributes(&applied.attributes)?;
            }

            TopicCommand::Show { cluster_id, name, account } => {
                let key = topic_key(&cluster_id, &name, account.as_deref());
                match provider.read(&ctx, ResourceKind::Topic, &key).await? {
                    ReadOutcome::Present(applied) => print_attributes(&applied.attributes)?,
                    ReadOutcome::Absent => bail!("Topic {} not found on {}", name, cluster_id),
                }
            }

            TopicCommand::SetConfig { cluster_id, name, configs, account } => {
                info!("✏️  Updating config of topic {}", name);
                let current = topic_key(&cluster_id, &name, account.as_deref());
                let mut desired = current.clone();
                for (key, value) in configs {
                    desired.set(key, value);
                }
                let applied = provider
                    .update(&ctx, ResourceKind::Topic, &current, &desired)
                    .await?;
                print_attributes(&applied.attributes)?;
            }

            TopicCommand::Delete { cluster_id, name, account } => {
                warn!("🗑️  Deleting topic: {}", name);
                let current = topic_key(&cluster_id, &name, account.as_deref());
                provider.delete(&ctx, ResourceKind::Topic, &current).await?;
                println!("✅ Deleted topic: {}", name);
            }
        },

        Commands::ApiKey { command } => match command {
            ApiKeyCommand::Create { cluster_id, account } => {
                info!("🔐 Creating API key for {}", cluster_id);
                let mut desired = Attributes::new().with("cluster_id", cluster_id);
                if let Some(account) = account {
                    desired.set("account_id", account);
                }
                let applied = provider.create(&ctx, ResourceKind::ApiKey, &desired).await?;
                print_attributes(&applied.attributes)?;
                warn!("The secret cannot be retrieved again, store it now");
            }

            ApiKeyCommand::Delete { cluster_id, id, account } => {
                warn!("🗑️  Deleting API key: {}", id);
                let mut current = Attributes::new()
                    .with("cluster_id", cluster_id)
                    .with("id", id.to_string());
                if let Some(account) = account {
                    current.set("account_id", account);
                }
                provider.delete(&ctx, ResourceKind::ApiKey, &current).await?;
                println!("✅ Deleted API key: {}", id);
            }
        },
    }

    Ok(())
}
