mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use build_catalog::ProviderType;
use build_catalog_store::CatalogStore;
use build_catalog_sync::{CatalogService, Scheduler, SharedSettings, SyncOrchestrator};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "build-catalog")]
#[command(about = "Keep a local catalog of game-server builds in sync with upstream providers")]
struct Cli {
    /// Config file (defaults to ~/.config/build-catalog/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one synchronization now
    Sync {
        /// Limit the run to these provider types (vanilla, paper, forge)
        #[arg(long = "provider")]
        providers: Vec<ProviderType>,
        /// Run even if another sync is in progress
        #[arg(long)]
        force: bool,
        /// Recorded in the run log
        #[arg(long)]
        actor: Option<String>,
    },
    /// List catalog entries
    List {
        #[arg(long)]
        provider: Option<ProviderType>,
        /// Include versions no longer offered upstream
        #[arg(long)]
        all: bool,
    },
    /// Show one catalog entry
    Show {
        provider: ProviderType,
        version: String,
    },
    /// Show recent synchronization runs
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        provider: Option<ProviderType>,
    },
    /// Run the background scheduler until interrupted
    Daemon,
    /// Delete inactive entries older than the given age
    Purge {
        #[arg(long)]
        older_than_days: u64,
    },
    /// Print effective sync settings and their bounds
    Settings,
}

/// Everything a command needs, wired from one config.
struct Catalog {
    store: Arc<CatalogStore>,
    orchestrator: Arc<SyncOrchestrator>,
    service: CatalogService,
    scheduler: Scheduler,
}

fn open_store(config: &AppConfig) -> Result<CatalogStore> {
    let path = config.database_path()?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create data directory: {}", dir.display()))?;
    }
    CatalogStore::open(&path).with_context(|| format!("failed to open catalog {}", path.display()))
}

fn open_catalog(config: &AppConfig) -> Result<Catalog> {
    let store = Arc::new(open_store(config)?);
    let adapters = build_catalog_upstream::build_adapters(&config.upstream()?);
    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::clone(&store),
        adapters,
        SharedSettings::new(config.sync.clone()),
    ));
    let (service, scheduler) = CatalogService::assemble(Arc::clone(&orchestrator));

    Ok(Catalog {
        store,
        orchestrator,
        service,
        scheduler,
    })
}

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    // A second init (tests, embedding) is harmless.
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Settings => {
            commands::settings::run(&config.sync);
            Ok(())
        }
        Command::Sync {
            providers,
            force,
            actor,
        } => {
            let catalog = open_catalog(&config)?;
            commands::sync::run(&catalog.service, providers, force, actor).await
        }
        Command::List { provider, all } => {
            let catalog = open_catalog(&config)?;
            commands::list::run(&catalog.service, &catalog.store, provider, all).await
        }
        Command::Show { provider, version } => {
            let catalog = open_catalog(&config)?;
            commands::show::run(&catalog.service, provider, &version).await
        }
        Command::History { limit, provider } => {
            let catalog = open_catalog(&config)?;
            commands::history::run(&catalog.service, limit, provider)
        }
        Command::Purge { older_than_days } => {
            let catalog = open_catalog(&config)?;
            commands::purge::run(&catalog.store, older_than_days)
        }
        Command::Daemon => {
            let catalog = open_catalog(&config)?;
            let recovered = catalog.orchestrator.recover_interrupted_runs()?;
            if recovered > 0 {
                info!("Marked {} interrupted run(s) as failed", recovered);
            }
            commands::daemon::run(&catalog.service, catalog.scheduler).await
        }
    }
}
