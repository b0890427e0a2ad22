//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::auth::AuthState;
use super::compactor::ContextCompactor;
use super::router::{AppState, create_router};
use crate::config::Config;
use crate::cache::ToolResultCache;
use crate::data::{DataService, HttpDataService};
use crate::provider::{CompletionProvider, FailoverProvider, OpenAiCompatProvider};
use crate::tools::ToolCatalog;
use crate::{Error, Result};

/// Action gateway server
pub struct Gateway {
    config: Config,
    data: Arc<dyn DataService>,
    provider: Arc<dyn CompletionProvider>,
}

impl Gateway {
    /// Create a gateway from validated configuration
    pub fn new(config: Config) -> Result<Self> {
        let data: Arc<dyn DataService> = Arc::new(HttpDataService::new(&config.data_service)?);

        let mut providers: Vec<Arc<dyn CompletionProvider>> = Vec::new();
        for provider_config in &config.providers {
            providers.push(Arc::new(OpenAiCompatProvider::new(provider_config)?));
            info!(
                provider = %provider_config.name,
                model = %provider_config.model,
                "Registered completion provider"
            );
        }
        let provider: Arc<dyn CompletionProvider> = Arc::new(FailoverProvider::new(providers));

        Ok(Self {
            config,
            data,
            provider,
        })
    }

    /// Run the gateway until a shutdown signal arrives
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let auth = Arc::new(AuthState::from_config(
            &self.config.auth,
            Arc::clone(&self.data),
        ));
        let cache = Arc::new(ToolResultCache::new(
            self.config.cache.enabled,
            self.config.cache.ttl,
        ));
        let compactor = ContextCompactor::new(
            self.config.summarization.clone(),
            self.config.chat.recent_window,
        );
        let state = Arc::new(AppState {
            data: Arc::clone(&self.data),
            provider: Arc::clone(&self.provider),
            cache,
            compactor,
            chat: self.config.chat.clone(),
            auth,
            tools: ToolCatalog::standard().to_provider_tools(),
        });

        let app = create_router(state);
        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("PERMGATE v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(providers = self.config.providers.len(), "Completion providers configured");
        info!(data_service = %self.config.data_service.base_url, "Data service");

        if self.config.auth.enabled {
            info!("AUTHENTICATION enabled (user tokens verified by data service)");
        } else {
            warn!("AUTHENTICATION disabled - gateway is open to all requests");
        }
        info!(
            "  POST http://{}:{}/chat  (SSE turn stream)",
            self.config.server.host, self.config.server.port
        );
        info!(
            "  POST http://{}:{}/chat/confirm  (approved mutations)",
            self.config.server.host, self.config.server.port
        );
        info!("============================================================");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Gateway stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
