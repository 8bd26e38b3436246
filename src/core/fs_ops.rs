// src/core/fs_ops.rs
//! File system operations for the durable store

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

pub struct FsOps;

impl FsOps {
    /// Ensure directory exists
    pub async fn ensure_dir_exists(path: &Path) -> std::io::Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).await?;
            info!("Created directory: {}", path.display());
        }
        Ok(())
    }

    /// Write bytes to a file that must not exist yet.
    ///
    /// Data lands in a uniquely named `.part` sibling first and is hard-linked
    /// into place, so a partially written file is never visible under its
    /// final name and an existing final file is never replaced. Only the final
    /// name existing yields `AlreadyExists`; stale partials are ignored.
    pub async fn write_new_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            Self::ensure_dir_exists(parent).await?;
        }

        if fs::try_exists(path).await? {
            return Err(std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            ));
        }

        let partial = Self::partial_path(path);
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial)
            .await?;

        let written = async {
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        let linked = match written {
            Ok(()) => fs::hard_link(&partial, path).await,
            Err(e) => Err(e),
        };
        let _ = fs::remove_file(&partial).await;
        linked
    }

    fn partial_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.part", uuid::Uuid::new_v4().simple()));
        path.with_file_name(name)
    }

    /// Newest (lexicographically greatest) regular file in `dir` whose name
    /// starts with `prefix`. Names embed an ISO date, so lexicographic order
    /// follows creation date.
    pub async fn find_latest_with_prefix(dir: &Path, prefix: &str) -> std::io::Result<Option<String>> {
        if !dir.exists() {
            return Ok(None);
        }

        let mut latest: Option<String> = None;
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !name.starts_with(prefix) || name.ends_with(".part") {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if latest.as_deref().map_or(true, |current| name.as_str() > current) {
                latest = Some(name);
            }
        }

        Ok(latest)
    }
}
