//! Peering reflector: cross-cluster resource reflection gated by peering phase
//!
//! Mirrors namespaced Kubernetes resources between a home cluster and a
//! peered foreign cluster. Each (kind, direction) only reflects while the
//! peering with the remote cluster is in a phase that allows it.

pub mod config;
pub mod crd;
pub mod error;
pub mod peering;
pub mod reflection;
pub mod telemetry;

#[cfg(feature = "metrics")]
pub mod metrics;

#[cfg(feature = "admission-webhook")]
pub mod webhook;

pub use crate::error::{Error, Result};
