//! HTTP server of the operations API.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::ApiConfig;
use crate::{RelayError, Result};

use super::handlers::AppState;
use super::router::{create_health_router, create_router};

/// Operations API server.
pub struct ApiServer {
    addr: SocketAddr,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: &ApiConfig, state: AppState) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| RelayError::Config(format!("invalid api address: {e}")))?;
        Ok(Self {
            addr,
            state: Arc::new(state),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until `shutdown` flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let router = create_router(self.state).merge(create_health_router());

        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Operations API listening on http://{}", local_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await?;
        Ok(())
    }
}
