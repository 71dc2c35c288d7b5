//! Error types for the peering reflector

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    KubeError(#[from] kube::Error),

    /// The namespace mapper has no translation for the given namespace
    #[error("Namespace {0} has no translation")]
    NamespaceNotMapped(String),

    /// The object cache has no entry for the requested object
    #[error("{kind} {key} not found in cache")]
    CacheMiss { kind: String, key: String },

    /// A specialized reflector could not be built
    #[error("Failed to build {kind} reflector: {reason}")]
    ReflectorBuildError { kind: String, reason: String },

    /// A peering phase string could not be parsed
    #[error("Unknown peering phase: {0}")]
    UnknownPhase(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// HTTP request to a peer cluster failed
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Webhook error: {0}")]
    WebhookError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// True when the error is a cache miss or an API 404
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::CacheMiss { .. } => true,
            Error::KubeError(e) => is_not_found(e),
            _ => false,
        }
    }
}

/// True when the API server answered 404 NotFound
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}

/// True when the API server answered 409 AlreadyExists
///
/// 409 is also used for optimistic-concurrency conflicts, so the reason is checked.
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists")
}
