// src/core/service_client.rs
//! Unified HTTP service client shared by the file API, CRM and cache clients.
//!
//! Base URLs for these services embed credentials, so log lines name the
//! service label and endpoint only.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{label} request to {endpoint} failed: {message}")]
    Transport {
        label: String,
        endpoint: String,
        message: String,
    },

    #[error("{label} returned status {status} for {endpoint}: {body}")]
    Status {
        label: String,
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("{label} response from {endpoint} could not be decoded: {message}")]
    Decode {
        label: String,
        endpoint: String,
        message: String,
    },
}

impl HttpError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct ServiceClient {
    client: reqwest::Client,
    base_url: String,
    label: String,
    bearer_token: Option<String>,
}

impl ServiceClient {
    /// Build the shared reqwest client
    pub fn build_http_client() -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(10))
            .build()
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            label: label.into(),
            bearer_token: None,
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn url(&self, endpoint: &str) -> String {
        if endpoint.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }

    fn transport_error(&self, endpoint: &str, e: reqwest::Error) -> HttpError {
        let message = if e.is_timeout() {
            "timed out".to_string()
        } else {
            // reqwest includes the full URL in its display; keep only the cause
            e.without_url().to_string()
        };
        HttpError::Transport {
            label: self.label.clone(),
            endpoint: endpoint.to_string(),
            message,
        }
    }

    fn decode_error(&self, endpoint: &str, message: impl Into<String>) -> HttpError {
        HttpError::Decode {
            label: self.label.clone(),
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    async fn check_status(&self, endpoint: &str, response: reqwest::Response) -> Result<reqwest::Response, HttpError> {
        let status = response.status();
        trace!("{} {} -> {}", self.label, endpoint, status);

        if status.is_success() {
            return Ok(response);
        }

        let mut body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }

        Err(HttpError::Status {
            label: self.label.clone(),
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    /// Generic GET request with query parameters, JSON response
    pub async fn get_json<R>(&self, endpoint: &str, query: &[(&str, &str)], timeout: Duration) -> Result<R, HttpError>
    where
        R: DeserializeOwned,
    {
        debug!("GET {} {}", self.label, endpoint);

        let response = self
            .authorize(self.client.get(self.url(endpoint)))
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;

        let response = self.check_status(endpoint, response).await?;
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;

        serde_json::from_str(&text).map_err(|e| self.decode_error(endpoint, e.to_string()))
    }

    /// Generic GET request returning the body bytes
    pub async fn get_bytes(&self, endpoint: &str, timeout: Duration) -> Result<Vec<u8>, HttpError> {
        debug!("GET {} {}", self.label, endpoint);

        let response = self
            .authorize(self.client.get(self.url(endpoint)))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;

        let response = self.check_status(endpoint, response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;

        Ok(bytes.to_vec())
    }

    /// Generic POST request with JSON
    pub async fn post_json<T, R>(&self, endpoint: &str, payload: &T, timeout: Duration) -> Result<R, HttpError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!("POST {} {}", self.label, endpoint);

        let response = self
            .authorize(self.client.post(self.url(endpoint)))
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;

        let response = self.check_status(endpoint, response).await?;
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;

        serde_json::from_str(&text).map_err(|e| self.decode_error(endpoint, e.to_string()))
    }
}
