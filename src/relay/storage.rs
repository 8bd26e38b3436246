// src/relay/storage.rs
use crate::core::FsOps;
use crate::error::StorageError;
use crate::relay::naming::owner_field_prefix;
use crate::types::FieldName;
use crate::utils::join_url;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Written,
    /// A file with this name already existed and was kept
    AlreadyPresent,
}

/// Permanent storage for relayed files
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Write `data` under `filename`. Names are never overwritten.
    async fn store(&self, filename: &str, data: &[u8]) -> Result<StoreOutcome, StorageError>;

    /// Public URL of the newest stored file for this owner and field
    async fn find_existing(&self, owner_id: &str, field: FieldName) -> Result<Option<String>, StorageError>;

    fn public_url(&self, filename: &str) -> String;
}

/// Local directory served statically under a public base URL
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Filenames are flat: no separators, no parent references
    fn path_for(&self, filename: &str) -> Result<PathBuf, StorageError> {
        if filename.is_empty()
            || filename.contains("..")
            || filename.contains('/')
            || filename.contains('\\')
            || filename.starts_with('.')
        {
            return Err(StorageError::InvalidKey(filename.to_string()));
        }
        Ok(self.root.join(filename))
    }
}

#[async_trait]
impl DurableStore for LocalStore {
    async fn store(&self, filename: &str, data: &[u8]) -> Result<StoreOutcome, StorageError> {
        let path = self.path_for(filename)?;

        match FsOps::write_new_file(&path, data).await {
            Ok(()) => {
                info!("Stored {} ({} bytes)", filename, data.len());
                Ok(StoreOutcome::Written)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("Keeping existing file {}", filename);
                Ok(StoreOutcome::AlreadyPresent)
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn find_existing(&self, owner_id: &str, field: FieldName) -> Result<Option<String>, StorageError> {
        let prefix = owner_field_prefix(Some(owner_id), field);
        // Unresolved owners share the ownerless prefix; never match those files
        if !prefix.starts_with("contact-") {
            return Ok(None);
        }
        let found = FsOps::find_latest_with_prefix(&self.root, &prefix).await?;
        Ok(found.map(|name| self.public_url(&name)))
    }

    fn public_url(&self, filename: &str) -> String {
        join_url(&self.public_base_url, filename)
    }
}
