//! Mutating admission webhook server for ForeignCluster resources

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use opentelemetry::{global, propagation::Extractor};
use tracing::{error, info, instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::cluster_info::ClusterInfoProvider;
use super::mutation::mutate;
use crate::crd::ForeignCluster;
use crate::error::{Error, Result};

struct HeaderExtractor<'a>(&'a HeaderMap);

impl<'a> Extractor for HeaderExtractor<'a> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v: &HeaderValue| v.to_str().ok())
    }
    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k: &HeaderName| k.as_str()).collect()
    }
}

async fn extract_trace_context(request: Request, next: Next) -> Response {
    let parent_cx = global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(request.headers()))
    });
    tracing::Span::current().set_parent(parent_cx);
    next.run(request).await
}

/// TLS configuration for the webhook server
#[derive(Clone, Debug)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

pub struct WebhookServer {
    provider: Arc<dyn ClusterInfoProvider>,
    tls_config: Option<TlsConfig>,
}

impl WebhookServer {
    pub fn new(provider: Arc<dyn ClusterInfoProvider>) -> Self {
        Self {
            provider,
            tls_config: None,
        }
    }

    pub fn with_tls(mut self, cert_path: String, key_path: String) -> Self {
        self.tls_config = Some(TlsConfig {
            cert_path,
            key_path,
        });
        self
    }

    pub fn router(self) -> Router {
        let router = Router::new()
            .route("/healthz", get(health_handler))
            .route("/mutate", post(mutate_handler));
        #[cfg(feature = "metrics")]
        let router = router.route("/metrics", get(metrics_handler));

        router
            .layer(middleware::from_fn(extract_trace_context))
            .layer(tower_http::trace::TraceLayer::new_for_http())
            .with_state(Arc::new(self))
    }

    /// Serve until the listener fails; TLS when configured
    pub async fn start(self, addr: SocketAddr) -> Result<()> {
        let tls_config = self.tls_config.clone();
        let app = self.router();

        match tls_config {
            Some(tls) => {
                let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
                let rustls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                    &tls.cert_path,
                    &tls.key_path,
                )
                .await
                .map_err(|e| {
                    Error::ConfigError(format!(
                        "Failed to load TLS material {} / {}: {e}",
                        tls.cert_path, tls.key_path
                    ))
                })?;

                info!("Starting webhook server on {} with TLS", addr);
                axum_server::bind_rustls(addr, rustls_config)
                    .serve(app.into_make_service())
                    .await
                    .map_err(|e| Error::WebhookError(format!("Server error: {e}")))?;
            }
            None => {
                info!("Starting webhook server on {} (plain HTTP)", addr);
                let listener = tokio::net::TcpListener::bind(addr)
                    .await
                    .map_err(|e| Error::WebhookError(format!("Failed to bind to {addr}: {e}")))?;
                axum::serve(listener, app)
                    .await
                    .map_err(|e| Error::WebhookError(format!("Server error: {e}")))?;
            }
        }

        Ok(())
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

#[cfg(feature = "metrics")]
async fn metrics_handler() -> impl IntoResponse {
    match crate::metrics::encode() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

#[instrument(skip(state, review))]
async fn mutate_handler(
    State(state): State<Arc<WebhookServer>>,
    Json(review): Json<AdmissionReview<ForeignCluster>>,
) -> impl IntoResponse {
    let request: std::result::Result<AdmissionRequest<ForeignCluster>, _> = review.try_into();

    match request {
        Ok(req) => {
            let response = mutate(state.provider.as_ref(), &req).await;
            (StatusCode::OK, Json(response.into_review()))
        }
        Err(e) => {
            error!("Failed to parse admission request: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(
                    AdmissionResponse::invalid(format!("Invalid admission request: {e}"))
                        .into_review(),
                ),
            )
        }
    }
}
