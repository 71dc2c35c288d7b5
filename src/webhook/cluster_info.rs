//! One-shot identity lookup against a peer's authentication service

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::crd::{RemoteClusterIdentity, TrustMode};
use crate::error::{Error, Result};

/// What a peer reports about itself, and whether its certificate verified
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterInfo {
    pub identity: RemoteClusterIdentity,
    pub trust_mode: TrustMode,
}

#[async_trait]
pub trait ClusterInfoProvider: Send + Sync {
    async fn cluster_info(&self, auth_url: &str) -> Result<ClusterInfo>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdsResponse {
    cluster_id: String,
    #[serde(default)]
    cluster_name: String,
}

/// [`ClusterInfoProvider`] calling `GET <authURL>/ids`
///
/// The lookup is tried with certificate verification first. A peer that
/// only answers once verification is disabled is reported as untrusted.
pub struct HttpClusterInfoProvider {
    verified: reqwest::Client,
    insecure: reqwest::Client,
}

impl HttpClusterInfoProvider {
    pub fn new(timeout: Duration) -> Result<Self> {
        let verified = reqwest::Client::builder().timeout(timeout).build()?;
        let insecure = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { verified, insecure })
    }

    async fn fetch(client: &reqwest::Client, url: &str) -> Result<RemoteClusterIdentity, reqwest::Error> {
        let ids: IdsResponse = client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(RemoteClusterIdentity {
            cluster_id: ids.cluster_id,
            cluster_name: ids.cluster_name,
        })
    }
}

#[async_trait]
impl ClusterInfoProvider for HttpClusterInfoProvider {
    #[instrument(skip(self))]
    async fn cluster_info(&self, auth_url: &str) -> Result<ClusterInfo> {
        if auth_url.is_empty() {
            return Err(Error::WebhookError("peer has no authURL".to_string()));
        }
        let url = format!("{}/ids", auth_url.trim_end_matches('/'));

        match Self::fetch(&self.verified, &url).await {
            Ok(identity) => Ok(ClusterInfo {
                identity,
                trust_mode: TrustMode::Trusted,
            }),
            Err(e) => {
                debug!("Verified lookup of {} failed, retrying insecurely: {}", url, e);
                let identity = Self::fetch(&self.insecure, &url).await?;
                Ok(ClusterInfo {
                    identity,
                    trust_mode: TrustMode::Untrusted,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider() -> HttpClusterInfoProvider {
        HttpClusterInfoProvider::new(Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_lookup_reads_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ids"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "clusterId": "c-123",
                "clusterName": "edge-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        // trailing slash is tolerated
        let info = provider()
            .cluster_info(&format!("{}/", server.uri()))
            .await
            .unwrap();
        assert_eq!(info.identity.cluster_id, "c-123");
        assert_eq!(info.identity.cluster_name, "edge-1");
        assert_eq!(info.trust_mode, TrustMode::Trusted);
    }

    #[tokio::test]
    async fn test_lookup_fails_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ids"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = provider().cluster_info(&server.uri()).await.unwrap_err();
        assert!(matches!(err, Error::HttpError(_)));
    }

    #[tokio::test]
    async fn test_lookup_rejects_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ids"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "x" })))
            .mount(&server)
            .await;

        assert!(provider().cluster_info(&server.uri()).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_auth_url() {
        assert!(matches!(
            provider().cluster_info("").await,
            Err(Error::WebhookError(_))
        ));
    }
}
