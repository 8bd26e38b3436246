// src/relay/file_api.rs
//! Upstream bot platform file API: `getFile` metadata, then the download
//! endpoint. The bot token is part of both base URLs.

use crate::core::{HttpError, ServiceClient};
use crate::error::RelayError;
use crate::types::response::{FileApiResponse, FileInfo};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait FileApi: Send + Sync {
    /// Resolve a file id to its download path
    async fn resolve_path(&self, file_id: &str) -> Result<String, RelayError>;

    /// Download the bytes behind a resolved path
    async fn download(&self, file_path: &str) -> Result<Vec<u8>, RelayError>;
}

pub struct BotFileApi {
    api: ServiceClient,
    files: ServiceClient,
    metadata_timeout: Duration,
    download_timeout: Duration,
}

impl BotFileApi {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        bot_token: &str,
        metadata_timeout: Duration,
        download_timeout: Duration,
    ) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            api: ServiceClient::with_client(http.clone(), format!("{}/bot{}", base, bot_token), "file-api"),
            files: ServiceClient::with_client(http, format!("{}/file/bot{}", base, bot_token), "file-download"),
            metadata_timeout,
            download_timeout,
        }
    }
}

fn describe(e: &HttpError) -> String {
    // the platform answers errors as JSON with a description field
    if let Some(body) = e.body() {
        if let Ok(parsed) = serde_json::from_str::<FileApiResponse<FileInfo>>(body) {
            if let Some(description) = parsed.description {
                return format!("status {}: {}", e.status().unwrap_or_default(), description);
            }
        }
    }
    e.to_string()
}

#[async_trait]
impl FileApi for BotFileApi {
    async fn resolve_path(&self, file_id: &str) -> Result<String, RelayError> {
        let metadata_error = |message: String| RelayError::Metadata {
            file_id: file_id.to_string(),
            message,
        };

        let response: FileApiResponse<FileInfo> = self
            .api
            .get_json("getFile", &[("file_id", file_id)], self.metadata_timeout)
            .await
            .map_err(|e| metadata_error(describe(&e)))?;

        if !response.ok {
            return Err(metadata_error(
                response
                    .description
                    .unwrap_or_else(|| "platform reported failure".to_string()),
            ));
        }

        response
            .result
            .and_then(|info| info.file_path)
            .filter(|path| !path.trim().is_empty())
            .ok_or_else(|| metadata_error("response carried no file_path".to_string()))
    }

    async fn download(&self, file_path: &str) -> Result<Vec<u8>, RelayError> {
        let bytes = self
            .files
            .get_bytes(file_path, self.download_timeout)
            .await
            .map_err(|e| RelayError::Download {
                file_path: file_path.to_string(),
                message: describe(&e),
            })?;

        if bytes.is_empty() {
            return Err(RelayError::Download {
                file_path: file_path.to_string(),
                message: "empty body".to_string(),
            });
        }
        Ok(bytes)
    }
}
