//! Admission-time identity seeding for ForeignCluster resources
//!
//! A ForeignCluster created with an empty `spec.clusterIdentity` gets its
//! identity and trust mode filled in from the peer's authentication
//! service. The peering phase is never touched here; it is only ever
//! derived from the status once peering starts.

use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::cluster_info::{ClusterInfo, ClusterInfoProvider};
use crate::crd::{ForeignCluster, ForeignClusterSpec};
use crate::error::{Error, Result};

/// JSON patch operations completing `spec` with `info`
pub fn identity_patch(spec: &ForeignClusterSpec, info: &ClusterInfo) -> Vec<Value> {
    let mut patches = Vec::new();

    if spec.cluster_identity.cluster_id.is_empty() {
        patches.push(json!({
            "op": "add",
            "path": "/spec/clusterIdentity/clusterID",
            "value": info.identity.cluster_id
        }));
    }
    if spec.cluster_identity.cluster_name.is_empty() {
        patches.push(json!({
            "op": "add",
            "path": "/spec/clusterIdentity/clusterName",
            "value": info.identity.cluster_name
        }));
    }
    if spec.trust_mode != info.trust_mode {
        patches.push(json!({
            "op": "replace",
            "path": "/spec/trustMode",
            "value": info.trust_mode
        }));
    }

    patches
}

fn with_patch(response: AdmissionResponse, patches: Vec<Value>) -> Result<AdmissionResponse> {
    let patch: json_patch::Patch = serde_json::from_value(Value::Array(patches))?;
    response
        .with_patch(patch)
        .map_err(|e| Error::WebhookError(format!("Failed to serialize patch: {e}")))
}

/// Admission response for one ForeignCluster request; always allows
pub async fn mutate(
    provider: &dyn ClusterInfoProvider,
    req: &AdmissionRequest<ForeignCluster>,
) -> AdmissionResponse {
    let Some(object) = &req.object else {
        return AdmissionResponse::from(req);
    };
    if !object.spec.cluster_identity.is_empty() {
        debug!(uid = %req.uid, "ForeignCluster {} already has an identity", req.name);
        return AdmissionResponse::from(req);
    }

    let info = match provider.cluster_info(&object.spec.auth_url).await {
        Ok(info) => info,
        Err(e) => {
            warn!(
                uid = %req.uid,
                "Identity lookup for ForeignCluster {} failed, admitting as is: {}",
                req.name,
                e
            );
            return AdmissionResponse::from(req);
        }
    };

    let patches = identity_patch(&object.spec, &info);
    if patches.is_empty() {
        return AdmissionResponse::from(req);
    }

    let count = patches.len();
    match with_patch(AdmissionResponse::from(req), patches) {
        Ok(response) => {
            info!(
                uid = %req.uid,
                cluster_id = %info.identity.cluster_id,
                "Seeded identity of ForeignCluster {} with {} patches",
                req.name,
                count
            );
            response
        }
        Err(e) => {
            warn!(uid = %req.uid, "{}", e);
            AdmissionResponse::from(req)
        }
    }
}
