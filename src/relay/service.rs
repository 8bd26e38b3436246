// src/relay/service.rs
use super::file_api::FileApi;
use super::naming::{build_filename, NamingScheme};
use super::storage::{DurableStore, StoreOutcome};
use crate::cache::Cache;
use crate::classifier::is_ephemeral_reference;
use crate::error::RelayError;
use crate::throttle::{acquire_or_cancel, Throttle, Unthrottled};
use crate::types::{FieldName, PermanentFile};
use crate::utils::{content_type_for, extension_or_default};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Resolved paths stay valid for about an hour upstream
const PATH_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

fn path_cache_key(file_id: &str) -> String {
    format!("relay:file_path:{}", file_id)
}

/// Converts ephemeral platform file ids into durable files
#[derive(Clone)]
pub struct RelayService {
    file_api: Arc<dyn FileApi>,
    store: Arc<dyn DurableStore>,
    cache: Cache,
    download_throttle: Arc<dyn Throttle>,
    naming: NamingScheme,
}

impl RelayService {
    pub fn new(file_api: Arc<dyn FileApi>, store: Arc<dyn DurableStore>) -> Self {
        Self {
            file_api,
            store,
            cache: Cache::in_memory(),
            download_throttle: Arc::new(Unthrottled),
            naming: NamingScheme::default(),
        }
    }

    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_download_throttle(mut self, throttle: Arc<dyn Throttle>) -> Self {
        self.download_throttle = throttle;
        self
    }

    pub fn with_naming(mut self, naming: NamingScheme) -> Self {
        self.naming = naming;
        self
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    /// Best-effort relay: the permanent URL, or `ephemeral_ref` unchanged when
    /// any step fails.
    pub async fn relay(&self, ephemeral_ref: &str, field: FieldName, owner_id: Option<&str>) -> String {
        match self.try_relay(ephemeral_ref, field, owner_id).await {
            Ok(file) => file.public_url,
            Err(e) => {
                warn!(
                    "Relay of {} for {} failed, keeping original reference: {}",
                    field,
                    owner_id.unwrap_or("-"),
                    e
                );
                ephemeral_ref.to_string()
            }
        }
    }

    pub async fn try_relay(
        &self,
        ephemeral_ref: &str,
        field: FieldName,
        owner_id: Option<&str>,
    ) -> Result<PermanentFile, RelayError> {
        self.try_relay_with_cancel(ephemeral_ref, field, owner_id, &CancellationToken::new())
            .await
    }

    /// Relay with cancellation. Cancellation is honoured only while waiting for
    /// a download permit; once bytes are moving the relay runs to completion.
    pub async fn try_relay_with_cancel(
        &self,
        ephemeral_ref: &str,
        field: FieldName,
        owner_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<PermanentFile, RelayError> {
        let file_id = ephemeral_ref.trim();
        if !is_ephemeral_reference(file_id) {
            return Err(RelayError::NotEphemeral(file_id.to_string()));
        }

        let (file_path, from_cache) = self.resolve_path(file_id).await?;

        if !acquire_or_cancel(self.download_throttle.as_ref(), cancel).await {
            return Err(RelayError::Cancelled);
        }

        let data = match self.file_api.download(&file_path).await {
            Ok(data) => data,
            Err(e) => {
                if from_cache {
                    self.cache.delete(&path_cache_key(file_id)).await;
                }
                return Err(e);
            }
        };

        let extension = extension_or_default(&file_path);
        let filename = build_filename(
            owner_id,
            field,
            Utc::now().date_naive(),
            &self.naming.suffix(&data),
            &extension,
        );

        let outcome = self.store.store(&filename, &data).await?;
        let public_url = self.store.public_url(&filename);

        match outcome {
            StoreOutcome::Written => info!(
                "Relayed {} for {} -> {} ({} bytes)",
                field,
                owner_id.unwrap_or("-"),
                filename,
                data.len()
            ),
            StoreOutcome::AlreadyPresent => info!(
                "Relay of {} for {} matched existing file {}",
                field,
                owner_id.unwrap_or("-"),
                filename
            ),
        }

        Ok(PermanentFile {
            filename,
            byte_size: data.len() as u64,
            content_type: content_type_for(&file_path),
            public_url,
        })
    }

    async fn resolve_path(&self, file_id: &str) -> Result<(String, bool), RelayError> {
        let key = path_cache_key(file_id);
        if let Some(path) = self.cache.get(&key).await {
            debug!("File path cache hit for {}", file_id);
            return Ok((path, true));
        }

        let path = self.file_api.resolve_path(file_id).await?;
        self.cache.set(&key, &path, PATH_CACHE_TTL).await;
        Ok((path, false))
    }
}
