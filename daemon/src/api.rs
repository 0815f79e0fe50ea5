//! Invite API client.
//!
//! The queue worker only sees the [`InviteClient`] trait. The HTTP client
//! talks to the group-invite endpoint with a session cookie obtained
//! elsewhere; the dry-run client lets `watch --dry-run` exercise pacing
//! without touching the remote service.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ApiConfig;
use crate::error::{Error, Result};

/// Status and message returned by the remote service for one invite call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub message: String,
}

impl ApiResponse {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Performs the state-changing invite for one user.
///
/// `Err` means the request never produced a response (connection refused,
/// TLS failure, timeout when one is configured).
#[async_trait]
pub trait InviteClient: Send + Sync {
    async fn invite(&self, user_id: &str) -> Result<ApiResponse>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InviteBody<'a> {
    user_id: &'a str,
}

/// Group invite over HTTP.
pub struct HttpInviteClient {
    http: reqwest::Client,
    endpoint: String,
    auth_cookie: String,
}

impl HttpInviteClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        if config.group_id.is_empty() {
            return Err(Error::ConfigParse("api.group_id is not set".to_string()));
        }

        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        // Unbounded unless configured.
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            http: builder.build()?,
            endpoint: format!(
                "{}/groups/{}/invites",
                config.base_url.trim_end_matches('/'),
                config.group_id
            ),
            auth_cookie: config.auth_cookie.clone(),
        })
    }
}

#[async_trait]
impl InviteClient for HttpInviteClient {
    async fn invite(&self, user_id: &str) -> Result<ApiResponse> {
        debug!(user_id, endpoint = %self.endpoint, "Sending invite");

        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::COOKIE, format!("auth={}", self.auth_cookie))
            .json(&InviteBody { user_id })
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(ApiResponse::new(status, error_message(&body)))
    }
}

/// Pull `error.message` out of a JSON error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Logs the invite and reports success without any network traffic.
#[derive(Debug, Default)]
pub struct DryRunClient;

#[async_trait]
impl InviteClient for DryRunClient {
    async fn invite(&self, user_id: &str) -> Result<ApiResponse> {
        info!(user_id, "Dry run: invite not sent");
        Ok(ApiResponse::new(200, "dry run"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_reads_nested_json() {
        let body = r#"{"error":{"message":"User is already a member of this group","status_code":400}}"#;
        assert_eq!(
            error_message(body),
            "User is already a member of this group"
        );
    }

    #[test]
    fn error_message_falls_back_to_text() {
        assert_eq!(error_message("  Too Many Requests \n"), "Too Many Requests");
        assert_eq!(error_message(r#"{"message":"ok"}"#), "ok");
    }

    #[test]
    fn http_client_requires_group() {
        let config = ApiConfig {
            group_id: String::new(),
            ..ApiConfig::default()
        };
        assert!(matches!(
            HttpInviteClient::new(&config),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn http_client_builds_endpoint() {
        let config = ApiConfig {
            base_url: "https://example.invalid/api/1/".to_string(),
            group_id: "grp_123".to_string(),
            ..ApiConfig::default()
        };
        let client = HttpInviteClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint,
            "https://example.invalid/api/1/groups/grp_123/invites"
        );
    }

    #[tokio::test]
    async fn dry_run_reports_success() {
        let response = DryRunClient.invite("usr_1").await.unwrap();
        assert_eq!(response.status, 200);
    }
}
