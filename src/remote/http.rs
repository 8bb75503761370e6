use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Response, Url};
use serde_json::{json, Value};
use tracing::debug;

use super::{extract_lead_list, ApiError, LeadsApi};
use crate::lead::LeadStatus;

/// REST client for the leads API.
///
/// The bearer token belongs to the external auth collaborator; it is
/// pushed in through [`set_token`](Self::set_token) and replaced after a
/// re-login.
pub struct HttpLeadsApi {
    client: Client,
    base_url: Url,
    token: RwLock<Option<String>>,
}

impl HttpLeadsApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ApiError::Decode(format!("invalid base URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Decode(format!("base URL '{}' cannot carry a path", base_url)));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            token: RwLock::new(None),
        })
    }

    #[must_use]
    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.set_token(Some(token.into()));
        self
    }

    /// Replace (or drop) the bearer token.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.read().as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, ApiError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "Leads API returned an error status");
        Err(ApiError::from_status(status.as_u16(), message))
    }

    /// Body as JSON; an empty body reads as `null`.
    async fn body_json(response: Response) -> Result<Value, ApiError> {
        let bytes = response.bytes().await.map_err(|e| ApiError::Network(e.to_string()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl LeadsApi for HttpLeadsApi {
    async fn list_leads(&self) -> Result<Vec<Value>, ApiError> {
        let response = self.send(self.client.get(self.url(&["leads"]))).await?;
        extract_lead_list(Self::body_json(response).await?)
    }

    async fn patch_status(&self, id: &str, status: LeadStatus) -> Result<Value, ApiError> {
        let request = self
            .client
            .patch(self.url(&["leads", id]))
            .json(&json!({ "status": status.as_str() }));
        let response = self.send(request).await?;
        // The status is re-derived by the caller; an unreadable body is not fatal.
        Ok(Self::body_json(response).await.unwrap_or(Value::Null))
    }

    async fn delete_lead(&self, id: &str) -> Result<(), ApiError> {
        let response = self.send(self.client.delete(self.url(&["leads", id]))).await?;
        // 200 with a body and 204 without one are both fine
        debug!(lead_id = id, status = response.status().as_u16(), "Lead deleted remotely");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_segments() {
        let api = HttpLeadsApi::new("https://crm.example.com/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(api.url(&["leads"]).as_str(), "https://crm.example.com/api/leads");

        let api = HttpLeadsApi::new("https://crm.example.com/api", Duration::from_secs(1)).unwrap();
        assert_eq!(
            api.url(&["leads", "lead 1/2"]).as_str(),
            "https://crm.example.com/api/leads/lead%201%2F2"
        );
    }

    #[test]
    fn test_rejects_bad_base_url() {
        assert!(HttpLeadsApi::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpLeadsApi::new("mailto:crm@example.com", Duration::from_secs(1)).is_err());
    }
}
