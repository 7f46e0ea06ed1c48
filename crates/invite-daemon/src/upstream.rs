//! HTTP client for the upstream platform API.
//!
//! Endpoints, relative to the configured base URL:
//!
//! - `GET  /communities` -> `["id", ...]`
//! - `GET  /communities/{id}/invites` -> `[InviteRecord, ...]`
//! - `GET  /communities/{id}/vanity` -> `{"code": "..." | null}` (404 = none)
//! - `PUT  /communities/{id}/members/{member}/roles/{role}`
//!
//! Identifiers are percent-encoded as single path segments.

use async_trait::async_trait;
use invite_tracker::{FetchError, GrantError, InviteSource, RoleGranter};
use invite_types::{CommunityId, InviteCode, InviteRecord, MemberId, RoleId};
use reqwest::{Client, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::error::{DaemonError, DaemonResult};

#[derive(Debug, Deserialize)]
struct VanityResponse {
    code: Option<InviteCode>,
}

/// Shared authenticated client
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: Url,
    token: String,
    timeout_ms: u64,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> DaemonResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            DaemonError::Config(format!("invalid upstream base URL {}: {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(DaemonError::Config(format!(
                "upstream base URL cannot carry a path: {}",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| DaemonError::Upstream(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
            timeout_ms: config.request_timeout_secs * 1000,
        })
    }

    /// Append `segments` to the base URL, encoding each as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`: the base URL can carry a path.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        debug!(url = %url, "GET upstream");
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| self.fetch_error(e))?;
        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, FetchError> {
        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| self.fetch_error(e))
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let message = response.text().await.unwrap_or_default();
            Err(FetchError::PermissionDenied(format!("{}: {}", status, message)))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(FetchError::Transient(format!("{}: {}", status, message)))
        }
    }

    fn fetch_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                timeout_ms: self.timeout_ms,
            }
        } else {
            FetchError::Transient(err.to_string())
        }
    }
}

/// [`InviteSource`] backed by the platform API
#[derive(Debug, Clone)]
pub struct HttpInviteSource {
    client: UpstreamClient,
}

impl HttpInviteSource {
    pub fn new(client: UpstreamClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InviteSource for HttpInviteSource {
    async fn list_invites(&self, community: &CommunityId) -> Result<Vec<InviteRecord>, FetchError> {
        let url = self
            .client
            .endpoint(&["communities", community.as_str(), "invites"]);
        self.client.get(url).await
    }

    async fn list_communities(&self) -> Result<Vec<CommunityId>, FetchError> {
        self.client.get(self.client.endpoint(&["communities"])).await
    }

    async fn vanity_code(&self, community: &CommunityId) -> Result<Option<InviteCode>, FetchError> {
        let response = self
            .client
            .client
            .get(
                self.client
                    .endpoint(&["communities", community.as_str(), "vanity"]),
            )
            .bearer_auth(&self.client.token)
            .send()
            .await
            .map_err(|e| self.client.fetch_error(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let vanity: VanityResponse = self.client.handle_response(response).await?;
        Ok(vanity.code)
    }
}

/// [`RoleGranter`] backed by the platform API
#[derive(Debug, Clone)]
pub struct HttpRoleGranter {
    client: UpstreamClient,
}

impl HttpRoleGranter {
    pub fn new(client: UpstreamClient) -> Self {
        Self { client }
    }

    fn grant_url(&self, community: &CommunityId, member: &MemberId, role: &RoleId) -> Url {
        self.client.endpoint(&[
            "communities",
            community.as_str(),
            "members",
            member.as_str(),
            "roles",
            role.as_str(),
        ])
    }
}

#[async_trait]
impl RoleGranter for HttpRoleGranter {
    async fn grant(
        &self,
        community: &CommunityId,
        member: &MemberId,
        role: &RoleId,
    ) -> Result<(), GrantError> {
        let response = self
            .client
            .client
            .put(self.grant_url(community, member, role))
            .bearer_auth(&self.client.token)
            .send()
            .await
            .map_err(|e| GrantError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => GrantError::RoleNotFound(role.clone()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                GrantError::Denied(format!("{}: {}", status, message))
            }
            _ => GrantError::Transport(format!("{}: {}", status, message)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> UpstreamConfig {
        UpstreamConfig {
            base_url: base_url.to_string(),
            token: "secret".to_string(),
            request_timeout_secs: 2,
        }
    }

    #[test]
    fn test_base_url_is_normalized() {
        for base in ["http://localhost:9000/api/", "http://localhost:9000/api"] {
            let client = UpstreamClient::new(&config(base)).unwrap();
            assert_eq!(
                client.endpoint(&["communities"]).as_str(),
                "http://localhost:9000/api/communities"
            );
            assert_eq!(client.timeout_ms, 2000);
        }
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(matches!(
            UpstreamClient::new(&config("not a url")),
            Err(DaemonError::Config(_))
        ));
        assert!(matches!(
            UpstreamClient::new(&config("mailto:ops@example.com")),
            Err(DaemonError::Config(_))
        ));
    }

    #[test]
    fn test_identifiers_stay_in_their_segment() {
        let client = UpstreamClient::new(&config("http://localhost:9000/api")).unwrap();
        let granter = HttpRoleGranter::new(client.clone());

        let url = granter.grant_url(
            &CommunityId::new("c1"),
            &MemberId::new("m1/roles/ADMIN#"),
            &RoleId::new("mapped-role"),
        );
        assert_eq!(
            url.path(),
            "/api/communities/c1/members/m1%2Froles%2FADMIN%23/roles/mapped-role"
        );
        assert_eq!(url.fragment(), None);
        assert_eq!(url.query(), None);

        let url = client.endpoint(&["communities", "c1?admin=1", "invites"]);
        assert_eq!(url.path(), "/api/communities/c1%3Fadmin=1/invites");
        assert_eq!(url.query(), None);

        let segments: Vec<_> = url.path_segments().unwrap().collect();
        assert_eq!(segments, vec!["api", "communities", "c1%3Fadmin=1", "invites"]);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_transient() {
        // Port 9 (discard) on localhost is not expected to accept HTTP.
        let client = UpstreamClient::new(&config("http://127.0.0.1:9")).unwrap();
        let source = HttpInviteSource::new(client);

        let err = source
            .list_invites(&CommunityId::new("c1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::Transient(_) | FetchError::Timeout { .. }
        ));
    }
}
