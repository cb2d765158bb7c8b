use std::sync::{Arc, RwLock};

use axum::Router;
use tracing::warn;

use smproxy_common::ProxyConfig;
use smproxy_core::{CredentialPool, StreamTuning, UpstreamClient};
use smproxy_storage::{CREDENTIALS_FILE, CredentialsFile, FileStore};

mod admin;
mod proxy;

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn UpstreamClient>,
    pub pool: Arc<CredentialPool>,
    pub store: Arc<FileStore>,
    pub config: Arc<RwLock<ProxyConfig>>,
}

impl AppState {
    pub(crate) fn tuning(&self) -> StreamTuning {
        let config = self.config_snapshot();
        StreamTuning {
            flush_interval: config.flush_interval(),
            heartbeat: config.heartbeat(),
        }
    }

    pub(crate) fn config_snapshot(&self) -> ProxyConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Best-effort snapshot write after any pool mutation. Concurrent
    /// writers can interleave here; the last write wins.
    pub(crate) async fn persist_pool(&self) {
        let snapshot = self.pool.snapshot();
        let record = CredentialsFile {
            credentials: snapshot.credentials,
            index: snapshot.cursor,
        };
        if let Err(err) = self.store.write_json(CREDENTIALS_FILE, &record).await {
            warn!(error = %err, "credential snapshot write failed");
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .merge(proxy::proxy_router())
        .merge(admin::admin_router())
        .with_state(state)
}
