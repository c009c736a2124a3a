use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use warden_auth::{HmacStrategy, LocalWarden, WardenState};

use crate::backend::Backend;
use crate::config::AppConfig;
use crate::health::{self, HealthState};
use crate::sweeper::AccessTokenSweeper;

pub struct WardenServer {
    addr: SocketAddr,
    app: Router,
    shutdown: CancellationToken,
    sweeper: Option<JoinHandle<()>>,
}

/// Assembles the warden, management and health routes over `backend`.
pub fn build_app(cfg: &AppConfig, backend: &Backend) -> anyhow::Result<Router> {
    let tokens = HmacStrategy::new(&cfg.auth.system_secret)
        .map_err(|e| anyhow::anyhow!("invalid token secret: {e}"))?;
    let warden = LocalWarden::new(
        backend.grants.clone(),
        backend.policies.clone(),
        backend.groups.clone(),
        tokens,
        cfg.auth.issuer.clone(),
    );

    let state = WardenState::new(Arc::new(warden), backend.policies.clone(), backend.groups.clone())
        .with_pagination(cfg.auth.pagination)
        .with_guard(cfg.server.guard_admin_endpoints);

    let app = warden_auth::router(state)
        .merge(health::routes(HealthState::new(backend.clone())))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                    )
                })
                .on_response(|res: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                    span.record("http.status_code", tracing::field::display(res.status().as_u16()));
                    tracing::info!(
                        http.status = %res.status().as_u16(),
                        elapsed_ms = %latency.as_millis(),
                        "request handled"
                    );
                }),
        )
        .layer(axum::extract::DefaultBodyLimit::max(cfg.server.body_limit_bytes));

    Ok(app)
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    backend: Option<Backend>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            backend: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Uses `backend` instead of connecting the one named by the configuration.
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub async fn build(self) -> anyhow::Result<WardenServer> {
        let backend = match self.backend {
            Some(backend) => backend,
            None => Backend::connect(&self.config.storage, &self.config.auth).await?,
        };
        let app = build_app(&self.config, &backend)?;

        let shutdown = CancellationToken::new();
        let sweeper = AccessTokenSweeper::new(
            backend.grants.clone(),
            self.config.auth.access_token_lifespan,
            self.config.auth.sweep_interval,
        )
        .start(shutdown.child_token());

        Ok(WardenServer {
            addr: self.addr,
            app,
            shutdown,
            sweeper,
        })
    }
}

impl WardenServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Token that stops the server and its background tasks when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);

        let shutdown = self.shutdown.clone();
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
            .await?;

        shutdown.cancel();
        if let Some(sweeper) = self.sweeper
            && let Err(e) = sweeper.await
        {
            tracing::warn!(error = %e, "Access token sweeper ended abnormally");
        }
        Ok(())
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        _ = shutdown.cancelled() => {}
    }
}
