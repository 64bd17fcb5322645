//! Wiring & DI. Entry point: load config, bootstrap storage, inject into services, run UI.
//! No business logic here.

use dotenv::dotenv;
use pr_reviewers::adapters::persistence::{MemoryStore, SqliteStore};
use pr_reviewers::adapters::ui::TuiInputPort;
use pr_reviewers::ports::{
    InputPort, PullRequestRepository, TeamRepository, TxManager, UserRepository,
};
use pr_reviewers::shared::config::{AppConfig, LogFormat, StorageKind};
use pr_reviewers::usecases::{
    PullRequestService, RandomSource, TeamService, TransactionCoordinator, UserService,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Every port implemented by one storage backend.
struct Storage {
    teams: Arc<dyn TeamRepository>,
    users: Arc<dyn UserRepository>,
    pull_requests: Arc<dyn PullRequestRepository>,
    tx_manager: Arc<dyn TxManager>,
}

impl Storage {
    fn from_store<S>(store: Arc<S>) -> Self
    where
        S: TeamRepository + UserRepository + PullRequestRepository + TxManager + 'static,
    {
        Self {
            teams: store.clone(),
            users: store.clone(),
            pull_requests: store.clone(),
            tx_manager: store,
        }
    }
}

fn init_tracing(cfg: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| cfg.log_level_or_default().into());
    let registry = tracing_subscriber::registry().with(filter);
    match cfg.log_format_or_default() {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_loaded = dotenv();
    let cfg = AppConfig::load()?;
    init_tracing(&cfg);

    match &env_loaded {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(_) => info!("no .env found"),
    }

    let storage = match cfg.storage_or_default() {
        StorageKind::Sqlite => {
            let data_path = PathBuf::from(cfg.data_dir_or_default());
            let store = SqliteStore::connect(&data_path, cfg.busy_timeout())
                .await
                .map_err(|e| anyhow::anyhow!("SQLite connect failed: {}", e))?;
            info!(db = %store.db_path().display(), "using SQLite storage");
            Storage::from_store(Arc::new(store))
        }
        StorageKind::Memory => {
            info!("using in-memory storage; data is lost on exit");
            Storage::from_store(Arc::new(MemoryStore::new()))
        }
    };

    // --- Services ---
    let coordinator = Arc::new(TransactionCoordinator::new(storage.tx_manager));
    let pull_requests = Arc::new(PullRequestService::new(
        Arc::clone(&storage.pull_requests),
        Arc::clone(&storage.teams),
        Arc::clone(&coordinator),
        RandomSource::from_entropy(),
    ));
    let teams = Arc::new(TeamService::new(
        Arc::clone(&storage.teams),
        Arc::clone(&storage.users),
        Arc::clone(&coordinator),
    ));
    let users = Arc::new(UserService::new(
        Arc::clone(&storage.users),
        Arc::clone(&storage.pull_requests),
    ));

    // --- Run (interactive menu) ---
    let input_port: Arc<dyn InputPort> = Arc::new(TuiInputPort::new(pull_requests, teams, users));
    input_port
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    info!("bye");
    Ok(())
}
