//! HTTP admin listener.
//!
//! Exposes the published proxy context read-only:
//! - `GET /health` liveness and publication state (never authenticated)
//! - `GET /schemas` dialect, properties, and the schemas the caller may access
//! - `GET /server-info` probed backend version and the advertised version
//!
//! When proxy users are configured, everything but `/health` requires Basic auth.

use crate::auth::{ProxyUser, auth_middleware};
use crate::bootstrap::ProxyContext;
use crate::dialect::FetchSizeRule;
use crate::error::{ProxyError, ProxyResult};
use crate::models::TransactionType;
use crate::transport::Listener;
use async_trait::async_trait;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router, middleware};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// HTTP admin listener backed by axum.
pub struct AdminHttpListener {
    /// Host to bind to
    host: String,
    /// How long to wait for open connections after a shutdown signal
    graceful_timeout: Duration,
}

impl AdminHttpListener {
    pub fn new(host: impl Into<String>, graceful_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            graceful_timeout,
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self, port: u16) -> String {
        format!("{}:{}", self.host, port)
    }

    /// Serve on an already bound socket until `shutdown` resolves, then
    /// release the published context.
    pub async fn serve(
        listener: TcpListener,
        context: Arc<ProxyContext>,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> ProxyResult<()> {
        let app = router(context.clone());
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;

        release_context(&context).await;

        result.map_err(|e| {
            error!(error = %e, "HTTP server error");
            ProxyError::listener(format!("HTTP server error: {}", e))
        })
    }
}

#[async_trait]
impl Listener for AdminHttpListener {
    async fn start(&self, port: u16, context: Arc<ProxyContext>) -> ProxyResult<()> {
        let bind_addr = self.bind_addr(port);
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            ProxyError::listener(format!(
                "Failed to bind to {}: {}. Check that the port is available",
                bind_addr, e
            ))
        })?;
        info!(addr = %bind_addr, "Admin listener ready");

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();
        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let graceful_timeout = self.graceful_timeout;
        tokio::select! {
            result = Self::serve(listener, context.clone(), shutdown_signal) => {
                result?;
                info!("Admin listener stopped");
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = graceful_timeout.as_secs(),
                    "Waiting for connections to close (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(graceful_timeout) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {
                release_context(&context).await;
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "admin-http"
    }
}

/// Build the admin router over a proxy context.
pub fn router(context: Arc<ProxyContext>) -> Router {
    let protected = Router::new()
        .route("/schemas", get(schemas))
        .route("/server-info", get(server_info))
        .route_layer(middleware::from_fn_with_state(
            context.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(context)
}

async fn release_context(context: &ProxyContext) {
    if let Some(snapshot) = context.snapshot() {
        info!("Closing transaction engines and data sources");
        snapshot.close().await;
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    published: bool,
    statement_tracing: bool,
}

async fn health(State(context): State<Arc<ProxyContext>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        published: context.is_published(),
        statement_tracing: context.statement_tracing(),
    })
}

#[derive(Debug, Serialize)]
struct NodeView {
    name: String,
    url: String,
    database_type: String,
    closed: bool,
}

#[derive(Debug, Serialize)]
struct SchemaView {
    name: String,
    nodes: Vec<NodeView>,
    rule_tables: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    active_transactions: Option<usize>,
}

#[derive(Debug, Serialize)]
struct PropsView {
    sql_show: bool,
    frontend_flush_threshold: u32,
    max_connections_size_per_query: u32,
    fetch_driver: String,
    fetch_size: FetchSizeRule,
    #[serde(skip_serializing_if = "Option::is_none")]
    xa_transaction_manager: Option<String>,
}

#[derive(Debug, Serialize)]
struct SchemasResponse {
    dialect: String,
    database_type: String,
    transaction_type: TransactionType,
    props: PropsView,
    schemas: Vec<SchemaView>,
}

/// Schemas visible to the authenticated user, or all of them when the
/// listener runs without users.
async fn schemas(
    State(context): State<Arc<ProxyContext>>,
    user: Option<Extension<ProxyUser>>,
) -> Response {
    let Some(snapshot) = context.snapshot() else {
        return not_published();
    };
    let schema_contexts = snapshot.schema_contexts();
    let transaction_contexts = snapshot.transaction_contexts();
    let props = schema_contexts.props();

    let visible = schema_contexts
        .schemas()
        .filter(|schema| match &user {
            Some(Extension(user)) => user.can_access(schema.name()),
            None => true,
        })
        .collect::<Vec<_>>();

    let mut xa_transaction_manager = None;
    let mut views = Vec::with_capacity(visible.len());
    for schema in visible {
        let engine = transaction_contexts.get(schema.name());
        let active_transactions = match engine {
            Some(engine) => Some(engine.active_count().await),
            None => None,
        };
        if let Some(manager) = engine.and_then(|engine| engine.xa_transaction_manager()) {
            xa_transaction_manager.get_or_insert_with(|| manager.to_string());
        }
        views.push(SchemaView {
            name: schema.name().to_string(),
            nodes: schema
                .data_sources()
                .values()
                .map(|handle| NodeView {
                    name: handle.node().to_string(),
                    url: handle.parameters().masked_url(),
                    database_type: handle.db_type().to_string(),
                    closed: handle.is_closed(),
                })
                .collect(),
            rule_tables: schema.rules().tables.len(),
            transaction_engine: engine.map(|engine| engine.name().to_string()),
            active_transactions,
        });
    }

    Json(SchemasResponse {
        dialect: schema_contexts.dialect().tag.clone(),
        database_type: schema_contexts.database_type().to_string(),
        transaction_type: props.transaction_type(),
        props: PropsView {
            sql_show: props.sql_show(),
            frontend_flush_threshold: props.frontend_flush_threshold(),
            max_connections_size_per_query: props.max_connections_size_per_query(),
            fetch_driver: props.fetch_driver().to_string(),
            fetch_size: schema_contexts.fetch_size(),
            xa_transaction_manager,
        },
        schemas: views,
    })
    .into_response()
}

#[derive(Debug, Serialize)]
struct ServerInfoResponse {
    database_type: String,
    version: String,
    advertised_version: String,
}

async fn server_info(State(context): State<Arc<ProxyContext>>) -> Response {
    match context.server_info() {
        Some(info) => Json(ServerInfoResponse {
            database_type: info.database_type.to_string(),
            advertised_version: info.advertised_version(),
            version: info.version,
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": {
                    "code": "not_probed",
                    "message": "No backend server information has been recorded",
                }
            })),
        )
            .into_response(),
    }
}

fn not_published() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({
            "error": {
                "code": "not_published",
                "message": "The proxy context is not published yet",
            }
        })),
    )
        .into_response()
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
