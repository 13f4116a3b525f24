//! HTTP+JSON adapter for the authoritative store.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{
    ActivityList, ActivityPayload, ListFilter, RemoteActivity, RemoteClient, RemoteError,
    RemoteResult,
};
use crate::config::ClientConfig;
use crate::models::RemoteId;
use crate::util::{compact_text, is_http_url, normalize_text_option};

#[derive(Clone)]
pub struct HttpRemoteClient {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemoteClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteClient")
            .field("base_url", &self.base_url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl HttpRemoteClient {
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> RemoteResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            auth_token: normalize_text_option(auth_token),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    /// Build a client from resolved configuration; fails when no API URL is set.
    pub fn from_config(config: &ClientConfig) -> RemoteResult<Self> {
        let base_url = config.api_url.clone().ok_or_else(|| {
            RemoteError::InvalidConfiguration("STRIDE_API_URL is not set".to_string())
        })?;
        Self::new(base_url, config.api_token.clone(), config.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("Accept", "application/json");
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(parse_api_error(status, &body)));
        }
        Err(RemoteError::Api(parse_api_error(status, &body)))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> RemoteResult<T> {
        let response = self.send(request).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|error| {
            RemoteError::InvalidPayload(format!("{error}: {}", compact_text(&body)))
        })
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn health_check(&self) -> RemoteResult<()> {
        let request = self.client.get(self.url("/healthz"));
        match self.send(request).await {
            Ok(_) => Ok(()),
            Err(RemoteError::Unreachable(message)) => Err(RemoteError::Unreachable(message)),
            Err(error) => Err(RemoteError::Unreachable(error.to_string())),
        }
    }

    async fn list_activities(&self, filter: &ListFilter) -> RemoteResult<Vec<RemoteActivity>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(modified_since) = filter.modified_since {
            query.push(("modified_since", modified_since.to_string()));
        }
        if let Some(limit) = filter.limit {
            query.push(("limit", limit.to_string()));
        }
        if filter.include_deleted {
            query.push(("include_deleted", "true".to_string()));
        }

        let request = self.client.get(self.url("/v1/activities")).query(&query);
        let list: ActivityList = self.send_json(request).await?;
        Ok(list.activities)
    }

    async fn create_activity(&self, payload: &ActivityPayload) -> RemoteResult<RemoteActivity> {
        let request = self.client.post(self.url("/v1/activities")).json(payload);
        self.send_json(request).await
    }

    async fn update_activity(
        &self,
        id: &RemoteId,
        payload: &ActivityPayload,
    ) -> RemoteResult<RemoteActivity> {
        let request = self
            .client
            .patch(self.url(&format!("/v1/activities/{id}")))
            .json(payload);
        self.send_json(request).await
    }

    async fn delete_activity(&self, id: &RemoteId) -> RemoteResult<()> {
        let request = self
            .client
            .delete(self.url(&format!("/v1/activities/{id}")));
        self.send(request).await?;
        Ok(())
    }
}

fn map_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_connect() || error.is_timeout() {
        RemoteError::Unreachable(error.to_string())
    } else {
        RemoteError::Http(error)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> RemoteResult<String> {
    let base_url = normalize_text_option(Some(raw)).ok_or_else(|| {
        RemoteError::InvalidConfiguration("API URL must not be empty".to_string())
    })?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::InvalidConfiguration(
            "API URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("api.example.com".to_string()).is_err());
    }

    #[test]
    fn normalize_base_url_trims_trailing_slash() {
        assert_eq!(
            normalize_base_url("https://api.example.com/ ".to_string()).unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn parse_api_error_prefers_json_message() {
        let message = parse_api_error(StatusCode::BAD_REQUEST, r#"{"error":"bad kind"}"#);
        assert_eq!(message, "bad kind (400)");
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[test]
    fn client_debug_redacts_token() {
        let client = HttpRemoteClient::new(
            "https://api.example.com",
            Some("secret-token".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn health_check_reports_unreachable_for_closed_port() {
        let client =
            HttpRemoteClient::new("http://127.0.0.1:9", None, Duration::from_secs(2)).unwrap();
        let error = client.health_check().await.unwrap_err();
        assert!(matches!(error, RemoteError::Unreachable(_)));
    }
}
