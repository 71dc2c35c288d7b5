//! Webhook Module
//!
//! Mutating admission webhook that seeds the identity and trust mode of
//! newly created ForeignCluster resources from the peer's authentication
//! service. Requests are always allowed; a failed lookup only means the
//! object is admitted unpatched.

pub mod cluster_info;
pub mod mutation;
pub mod server;

pub use cluster_info::{ClusterInfo, ClusterInfoProvider, HttpClusterInfoProvider};
pub use mutation::{identity_patch, mutate};
pub use server::{TlsConfig, WebhookServer};
