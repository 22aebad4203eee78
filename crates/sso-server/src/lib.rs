//! # sso-server
//!
//! Axum server hosting the SAML identity provider and service provider
//! roles.
//!
//! ## Architecture
//!
//! Configuration is read once at startup. The role builders derived from it
//! live in a [`ConfigCell`](sso_protocol_saml::ConfigCell) and are rebuilt
//! on `SIGHUP`, so certificate rotation never needs a restart.
//!
//! ## Usage
//!
//! ```ignore
//! use sso_server::{Server, ServerConfig};
//!
//! let config = ServerConfig::from_env()?;
//! let server = Server::new(config)?;
//! server.run().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod actors;
pub mod config;
pub mod handlers;
pub mod pages;
pub mod router;
pub mod state;

#[cfg(test)]
mod test_keys;

pub use actors::SamlActors;
pub use config::ServerConfig;
pub use router::create_router;
pub use state::AppState;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// The SAML SSO server.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Creates a new server instance.
    ///
    /// Builds every enabled role; a configuration problem stops startup here.
    ///
    /// # Errors
    ///
    /// Returns the actor construction error.
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let state = AppState::new(config)?;
        let actors = state.actors.load();
        if let Some(idp) = &actors.idp {
            info!(entity_id = idp.idp().entity_id(), sp = idp.sp().entity_id(), "IdP role ready");
        }
        if let Some(sp) = &actors.sp {
            info!(entity_id = sp.sp().entity_id(), idp = sp.idp().entity_id(), "SP role ready");
        }
        Ok(Self { state })
    }

    /// Runs the server on the configured host and port.
    ///
    /// This blocks until it receives a shutdown signal.
    ///
    /// # Errors
    ///
    /// Fails if the address cannot be bound or serving fails.
    pub async fn run(self) -> anyhow::Result<()> {
        let config = self.state.config();
        let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
        let listener = TcpListener::bind(addr).await?;
        self.run_with_listener(listener).await
    }

    /// Runs the server on an already bound listener.
    ///
    /// # Errors
    ///
    /// Fails if serving fails.
    pub async fn run_with_listener(self, listener: TcpListener) -> anyhow::Result<()> {
        info!("Server listening on http://{}", listener.local_addr()?);

        spawn_reload_on_hangup(self.state.clone());
        let app = create_router(self.state);

        // Run server with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server shutdown complete");
        Ok(())
    }

    /// Returns the shared state.
    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }
}

/// Rebuilds the actors whenever the process receives `SIGHUP`.
#[cfg(unix)]
fn spawn_reload_on_hangup(state: AppState) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                warn!("cannot listen for SIGHUP, reload disabled: {}", e);
                return;
            }
        };
        while hangup.recv().await.is_some() {
            match state.reload() {
                Ok(()) => info!("configuration reloaded"),
                Err(e) => error!("reload failed, keeping current configuration: {:#}", e),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_state: AppState) {}

/// Waits for a shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
