//! HTTP boundary: JSON routes plus SSE streams over the orchestrator.

mod dto;
mod error;
mod routes;

pub use dto::{
    ConfigBody, DownloadQuery, GenerateBody, ImageQuery, PageInput, RegenerateBody, RetryBody,
    RetryFailedBody, ScanQuery,
};
pub use error::{ApiError, ApiResult};
pub use routes::router;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::orchestration::{Orchestrator, OrchestratorSettings};
use crate::providers::{ConfiguredProvider, ProviderConfigStore};
use crate::state::TaskStore;
use crate::storage::{scan_all, ImageStore};
use crate::Result;

/// Shared state handed to every route.
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub providers: Arc<ProviderConfigStore>,
    /// Set when the orchestrator follows the providers file; reset after
    /// configuration updates.
    pub configured: Option<Arc<ConfiguredProvider>>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, providers: Arc<ProviderConfigStore>) -> Self {
        Self {
            orchestrator,
            providers,
            configured: None,
        }
    }

    /// Wire the orchestrator to the active entry of the providers file.
    pub fn from_config(config: &AppConfig) -> Self {
        let providers = Arc::new(ProviderConfigStore::new(config.providers_path()));
        let configured = Arc::new(ConfiguredProvider::new(Arc::clone(&providers)));
        let orchestrator = Orchestrator::new(
            TaskStore::new(),
            ImageStore::new(config.history_root()),
            configured.clone(),
            OrchestratorSettings::from(config),
        );
        Self {
            orchestrator,
            providers,
            configured: Some(configured),
        }
    }
}

/// Rebuild task state from disk, bind, and serve until Ctrl-C.
pub async fn serve(config: AppConfig) -> Result<()> {
    let state = Arc::new(AppState::from_config(&config));

    match scan_all(state.orchestrator.images(), state.orchestrator.store()).await {
        Ok(reports) => info!(tasks = reports.len(), "Restored tasks from history"),
        Err(e) => warn!(error = %e, "History scan failed; starting empty"),
    }

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!(
        addr = %listener.local_addr()?,
        history = %config.history_root().display(),
        max_concurrent = config.effective_max_concurrent(),
        "Serving"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
