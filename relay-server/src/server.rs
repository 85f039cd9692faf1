//! Server assembly and run loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use relay_hub::hooks::{DispatchLogger, EnvelopeValidator, SessionLogger};
use relay_hub::{Hooks, Hub, create_router};

use crate::config::ServerConfig;

/// How long to wait for sessions to drain after the listener stops.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The relay server: a hub plus its HTTP listener.
pub struct RelayServer {
    config: ServerConfig,
    hub: Arc<Hub>,
}

impl RelayServer {
    /// Creates a server with the standard handler table and hooks.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let hooks = Hooks::new()
            .with_before_dispatch(Arc::new(EnvelopeValidator))
            .with_after_dispatch(Arc::new(DispatchLogger))
            .with_on_connect(Arc::new(SessionLogger::connected()))
            .with_on_disconnect(Arc::new(SessionLogger::disconnected()));

        let hub = Hub::builder(config.hub.clone()).hooks(hooks).build();
        Self { config, hub }
    }

    /// Returns the hub.
    #[must_use]
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Runs until SIGINT/SIGTERM, then drains gracefully.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config.bind_address();
        let socket_addr: SocketAddr = addr
            .parse()
            .map_err(|source| ServerError::InvalidAddress { addr: addr.clone(), source })?;

        let listener = TcpListener::bind(socket_addr).await?;
        info!("relay server listening on {}", addr);

        self.hub.start();

        let shutdown = self.hub.shutdown_controller().clone();
        tokio::spawn(watch_signals(self.hub.clone()));

        let app = create_router(self.hub.clone());
        let wait = {
            let shutdown = shutdown.clone();
            async move { shutdown.wait_for_shutdown().await }
        };
        axum::serve(listener, app)
            .with_graceful_shutdown(wait)
            .await?;

        // The listener is gone; make sure every session observes the signal.
        self.hub.initiate_shutdown();
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while !self.hub.topology().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let remaining = self.hub.topology().len();
        if remaining > 0 {
            warn!(remaining, "sessions did not drain within {:?}", SHUTDOWN_GRACE);
        }
        shutdown.mark_complete();

        info!("relay server stopped");
        Ok(())
    }
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM and initiates hub shutdown.
async fn watch_signals(hub: Arc<Hub>) {
    wait_for_signal().await;
    hub.initiate_shutdown();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(sig) => sig,
        Err(error) => {
            warn!(%error, "failed to install SIGINT handler");
            return;
        }
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(error) => {
            warn!(%error, "failed to install SIGTERM handler");
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to install Ctrl+C handler");
        return;
    }
    info!("received Ctrl+C");
}

/// Server runtime errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured bind address does not parse
    #[error("invalid bind address {addr}: {source}")]
    InvalidAddress {
        /// The offending address string
        addr: String,
        /// The parse failure
        source: std::net::AddrParseError,
    },

    /// Listener or serve failure
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_server_new() {
        let server = RelayServer::new(ServerConfig::default());
        assert!(server.hub().topology().is_empty());
        assert!(!server.hub().is_shutting_down());
    }

    #[test]
    fn test_invalid_address_error() {
        let config = ServerConfig {
            server: crate::config::HttpConfig {
                host: "not an address".to_string(),
                port: 0,
            },
            ..Default::default()
        };
        let server = RelayServer::new(config);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let result = runtime.block_on(server.run());
        assert!(matches!(result, Err(ServerError::InvalidAddress { .. })));
    }
}
