use std::error::Error;
use std::sync::{Arc, RwLock};

use clap::Parser;
use tracing::info;

use smproxy_common::{ConfigPatch, ProxyConfig};
use smproxy_core::{CredentialPool, PoolSnapshot, SmitheryClient};
use smproxy_router::{AppState, app_router};
use smproxy_storage::{CONFIG_FILE, CREDENTIALS_FILE, CredentialsFile, FileStore};

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("smproxy failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();
    let store = Arc::new(FileStore::new(&cli.data_dir));

    let mut config = ProxyConfig::default();
    if let Some(file_patch) = store.read_json::<ConfigPatch>(CONFIG_FILE).await {
        config.apply(file_patch);
    }
    config.apply(ConfigPatch {
        host: cli.host.clone(),
        port: cli.port,
        ..ConfigPatch::default()
    });
    config.data_dir = cli.data_dir.clone();
    info!(
        host = %config.host,
        port = config.port,
        heartbeat_ms = config.heartbeat_ms,
        flush_interval_ms = config.flush_interval_ms,
        data_dir = %config.data_dir,
        "config loaded"
    );

    let pool = match store.read_json::<CredentialsFile>(CREDENTIALS_FILE).await {
        Some(record) => CredentialPool::restore(PoolSnapshot {
            credentials: record.credentials,
            cursor: record.index,
        }),
        None => CredentialPool::new(),
    };
    info!(credentials = pool.len(), "credential pool ready");

    let client = SmitheryClient::new()?;
    let state = AppState {
        client: Arc::new(client),
        pool: Arc::new(pool),
        store,
        config: Arc::new(RwLock::new(config.clone())),
    };
    let app = app_router(state);

    let bind = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("smproxy=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
