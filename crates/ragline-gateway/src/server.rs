use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use ragline_core::Pipeline;
use ragline_core::config::GatewayConfig;
use ragline_memory::Corpus;
use tokio::sync::watch;

use crate::error::GatewayError;
use crate::router::build_router;

#[derive(Clone)]
pub(crate) struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub corpus: Arc<Corpus>,
    pub started_at: Instant,
}

pub struct GatewayServer {
    addr: SocketAddr,
    config: GatewayConfig,
    pipeline: Arc<Pipeline>,
    corpus: Arc<Corpus>,
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayServer {
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidAddress`] if `config.bind` is not an IP address.
    pub fn new(
        config: &GatewayConfig,
        pipeline: Arc<Pipeline>,
        corpus: Arc<Corpus>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self, GatewayError> {
        let ip: IpAddr = config
            .bind
            .parse()
            .map_err(|_| GatewayError::InvalidAddress(config.bind.clone()))?;

        if ip.is_unspecified() && config.auth_token.is_none() {
            tracing::warn!(%ip, "gateway reachable from other hosts without auth_token");
        }

        Ok(Self {
            addr: SocketAddr::new(ip, config.port),
            config: config.clone(),
            pipeline,
            corpus,
            shutdown_rx,
        })
    }

    /// Serve until the shutdown channel flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the server fails.
    pub async fn serve(self) -> Result<(), GatewayError> {
        let state = AppState {
            pipeline: self.pipeline,
            corpus: self.corpus,
            started_at: Instant::now(),
        };
        let router = build_router(
            state,
            self.config.auth_token,
            self.config.rate_limit,
            self.config.max_body_size,
        );

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::Bind(self.addr.to_string(), e))?;
        tracing::info!(addr = %self.addr, "gateway listening");

        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
            tracing::info!("gateway shutting down");
        })
        .await
        .map_err(|e| GatewayError::Server(format!("{e}")))
    }
}
