//! `ShellgateServer` — axum HTTP + `WebSocket` broker.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use shellgate_transport::Dialer;

use crate::auth::{IdentityProvider, OriginPolicy};
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::registry::SessionRegistry;
use crate::websocket::{LinkContext, ws_handler};

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handles shared with every link task.
    pub ctx: LinkContext,
    /// Validates bearer tokens at upgrade time.
    pub identity: Arc<dyn IdentityProvider>,
    /// Origin allow-list enforced at upgrade time.
    pub origins: OriginPolicy,
    /// When the broker started.
    pub started_at: Instant,
}

/// The session broker.
pub struct ShellgateServer {
    config: Arc<ServerConfig>,
    identity: Arc<dyn IdentityProvider>,
    dialer: Arc<dyn Dialer>,
    registry: Arc<SessionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    links: Arc<AtomicUsize>,
    started_at: Instant,
}

impl ShellgateServer {
    /// Create a broker around an identity provider and an SSH dialer.
    pub fn new(
        config: ServerConfig,
        identity: Arc<dyn IdentityProvider>,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            identity,
            dialer,
            registry: Arc::new(SessionRegistry::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            links: Arc::new(AtomicUsize::new(0)),
            started_at: Instant::now(),
        }
    }

    /// Build the axum router with all routes and layers.
    #[must_use]
    pub fn router(&self) -> Router {
        let state = AppState {
            ctx: LinkContext {
                config: self.config.clone(),
                registry: self.registry.clone(),
                dialer: self.dialer.clone(),
                links: self.links.clone(),
                shutdown: self.shutdown.token(),
            },
            identity: self.identity.clone(),
            origins: OriginPolicy::new(self.config.allowed_origins.clone()),
            started_at: self.started_at,
        };

        // Browser-facing API: CORS stays permissive, the origin policy at
        // the upgrade handshake is the real gate.
        Router::new()
            .route("/health", get(health_handler))
            .route("/ws", get(ws_handler))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve until the shutdown token fires.
    ///
    /// Returns the bound address (useful with `port = 0`) and the join
    /// handle of the accept loop.
    pub async fn listen(
        &self,
    ) -> std::io::Result<(SocketAddr, tokio::task::JoinHandle<std::io::Result<()>>)> {
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "listening");

        let app = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        });
        Ok((addr, handle))
    }

    /// Get the shutdown coordinator.
    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the broker configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the session registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let links = state.ctx.links.load(Ordering::Relaxed);
    Json(health::health_check(
        state.started_at,
        links,
        &state.ctx.registry,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SharedTokenProvider;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use shellgate_transport::{Transport, TransportError};
    use std::time::Duration;
    use tower::ServiceExt;

    struct NeverDialer;

    #[async_trait]
    impl Dialer for NeverDialer {
        async fn dial(
            &self,
            host: &str,
            port: u16,
            _timeout: Duration,
        ) -> Result<Box<dyn Transport>, TransportError> {
            Err(TransportError::Dial {
                host: host.into(),
                port,
                message: "unreachable".into(),
            })
        }
    }

    fn make_server() -> ShellgateServer {
        ShellgateServer::new(
            ServerConfig::default(),
            Arc::new(SharedTokenProvider::new("s3cret", "tester")),
            Arc::new(NeverDialer),
        )
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert!(!server.shutdown().is_shutting_down());
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["links"], 0);
        assert_eq!(parsed["active_sessions"], 0);
    }

    #[tokio::test]
    async fn ws_without_upgrade_headers_is_rejected() {
        let app = make_server().router();
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();

        // Not a WebSocket handshake at all.
        let resp = app.oneshot(req).await.unwrap();
        assert_ne!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_an_ephemeral_port() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown().shutdown();
        let _ = handle.await.unwrap();
    }
}
