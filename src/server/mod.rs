//! Socket-facing side of the server.
//!
//! - **`listener`**: binds the socket and runs the accept loop
//! - **`manager`**: spawns and supervises one task per connection
//! - **`dispatcher`**: runs the application [`Handler`] for each request

pub mod dispatcher;
pub mod listener;
pub mod manager;

use std::future::Future;
use std::net::SocketAddr;

use tracing::info;

use crate::config::Config;
use crate::error::BindError;

pub use dispatcher::{Dispatcher, Handler};
pub use listener::Listener;
pub use manager::{ConnectionManager, ShutdownReport};

/// A listener and connection manager wired together.
pub struct Server<H> {
    config: Config,
    listener: Listener,
    manager: ConnectionManager<H>,
}

impl<H: Handler> Server<H> {
    /// Binds the configured address and starts accepting.
    pub async fn bind(config: Config, handler: H) -> Result<Self, BindError> {
        let dispatcher = Dispatcher::new(handler, config.timeouts.handler);
        let manager = ConnectionManager::new(
            dispatcher,
            config.connection_settings(),
            config.limits.max_connections,
        );
        let listener = Listener::start(
            &config.server.listen_addr,
            config.server.backlog,
            manager.clone(),
        )
        .await?;

        Ok(Self {
            config,
            listener,
            manager,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn manager(&self) -> &ConnectionManager<H> {
        &self.manager
    }

    /// Stops accepting at once, then drains connections within the
    /// configured grace period.
    pub async fn shutdown(self) -> ShutdownReport {
        self.listener.stop().await;
        let report = self.manager.shutdown(self.config.timeouts.shutdown_grace).await;
        info!(
            drained = report.drained,
            forced = report.forced,
            "Shutdown complete"
        );
        report
    }

    /// Serves until `signal` resolves, then shuts down.
    pub async fn run_until<F>(self, signal: F) -> ShutdownReport
    where
        F: Future<Output = ()>,
    {
        signal.await;
        self.shutdown().await
    }
}
