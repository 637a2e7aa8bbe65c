//! LLMWatch CLI
//!
//! Runs the alert scheduler process and database management commands.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use llmwatch::alerting::{AlertEvaluator, AlertScheduler, MetricAggregator};
use llmwatch::config::Config;
use llmwatch::delivery::{DeliveryDispatcher, TokioRetryScheduler};
use llmwatch::store::{
    AlertConfigStore, AlertRepository, DeliveryStore, EventRepository, EventStore, MemoryStore,
    PostgresPool, TriggerStore, WebhookConfigStore, WebhookRepository,
};

/// LLMWatch - alerting engine for LLM usage monitoring
#[derive(Parser)]
#[command(name = "llmwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the alert scheduler
    Serve {
        /// Database URL
        #[arg(long, env = "LLMWATCH_DATABASE_URL")]
        database_url: Option<String>,

        /// Evaluation interval in seconds
        #[arg(long, default_value = "300", env = "LLMWATCH_INTERVAL_SECS")]
        interval_secs: u64,

        /// Run against an empty in-memory store instead of PostgreSQL
        #[arg(long)]
        memory: bool,
    },

    /// Database management
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Run database migrations
    Migrate {
        /// Database URL
        #[arg(long, env = "LLMWATCH_DATABASE_URL")]
        database_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let result = match cli.command {
        Commands::Serve {
            database_url,
            interval_secs,
            memory,
        } => run_serve(database_url, interval_secs, memory).await,
        Commands::Db { command } => run_db(command).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

struct Stores {
    events: Arc<dyn EventStore>,
    alerts: Arc<dyn AlertConfigStore>,
    triggers: Arc<dyn TriggerStore>,
    webhooks: Arc<dyn WebhookConfigStore>,
    deliveries: Arc<dyn DeliveryStore>,
}

async fn run_serve(
    database_url: Option<String>,
    interval_secs: u64,
    memory: bool,
) -> anyhow::Result<()> {
    let config = load_config(database_url);

    let stores = if memory {
        info!("Using in-memory store");
        let store = Arc::new(MemoryStore::new());
        Stores {
            events: store.clone(),
            alerts: store.clone(),
            triggers: store.clone(),
            webhooks: store.clone(),
            deliveries: store,
        }
    } else {
        let pool = PostgresPool::new(&config.database).await?;
        pool.health_check().await?;

        let alerts = Arc::new(AlertRepository::new(&pool));
        let webhooks = Arc::new(WebhookRepository::new(&pool));
        Stores {
            events: Arc::new(EventRepository::new(&pool)),
            alerts: alerts.clone(),
            triggers: alerts,
            webhooks: webhooks.clone(),
            deliveries: webhooks,
        }
    };

    let evaluator = Arc::new(AlertEvaluator::new(
        stores.alerts.clone(),
        stores.triggers.clone(),
        MetricAggregator::new(stores.events),
        config.scheduler.suppression_minutes,
    ));

    // Email delivery is wired up by the hosting service; the standalone
    // binary runs webhook-only.
    let dispatcher = Arc::new(DeliveryDispatcher::new(
        stores.triggers,
        stores.webhooks,
        stores.deliveries,
        None,
        Arc::new(TokioRetryScheduler),
        config.delivery.clone(),
    ));

    let scheduler = Arc::new(AlertScheduler::new(
        Duration::from_secs(interval_secs),
        evaluator,
        dispatcher,
        stores.alerts,
    ));

    scheduler.start();
    info!(interval_secs, "LLMWatch scheduler running, press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;

    scheduler.stop().await;
    Ok(())
}

async fn run_db(command: DbCommands) -> anyhow::Result<()> {
    match command {
        DbCommands::Migrate { database_url } => {
            let config = load_config(database_url);
            let pool = PostgresPool::new(&config.database).await?;
            pool.migrate().await?;
            info!("Migrations complete");
        }
    }
    Ok(())
}

fn load_config(database_url: Option<String>) -> Config {
    let mut config = Config::default();
    if let Some(url) = database_url {
        config.database.url = url;
    }
    config
}
