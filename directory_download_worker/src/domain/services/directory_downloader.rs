use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use common::helper::error_chain_fmt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    domain::entities::remote_object::RemoteObject,
    ports::object_store::{ObjectStore, ObjectStoreError},
};

pub const PREFIX_SEPARATOR: char = '/';

/// Copies "directories" of an object storage to the local filesystem
///
/// Objects are listed and copied one by one, in the order returned by the object storage.
pub struct DirectoryDownloader {
    object_store: Arc<dyn ObjectStore>,
}

#[derive(thiserror::Error)]
pub enum DownloadDirectoryError {
    #[error("Failed to list objects under {prefix}")]
    ListObjects {
        prefix: String,
        #[source]
        source: ObjectStoreError,
    },
    #[error("The object {name} would be written outside of the destination directory")]
    UnsafeObjectName { name: String },
    #[error("Failed to create directory {path}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to create file {path}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to copy the object {name} to {path}")]
    ReadObject {
        name: String,
        path: PathBuf,
        #[source]
        source: ObjectStoreError,
    },
    #[error("Failed to write file {path}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("The download was cancelled")]
    Cancelled,
}

impl std::fmt::Debug for DownloadDirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl DirectoryDownloader {
    pub fn new(object_store: Arc<dyn ObjectStore>) -> Self {
        Self { object_store }
    }

    /// Downloads every object whose name starts with `remote_prefix` into `local_dir`
    ///
    /// The path of each object relative to the prefix is kept: `prefix/sub/b.txt` is written to
    /// `local_dir/sub/b.txt`. Objects ending with a separator are directory markers and only create
    /// a directory.
    ///
    /// The first error aborts the whole download. Files already written are left in place.
    ///
    /// # Arguments
    /// * `cancel_token` - checked before each listing request and each object, and while copying
    /// * `remote_prefix` - the remote directory, a separator is appended if missing
    /// * `local_dir` - the destination directory
    ///
    /// # Returns
    /// The local paths of the downloaded files
    #[tracing::instrument(name = "Downloading directory", skip(self, cancel_token))]
    pub async fn download_directory(
        &self,
        cancel_token: &CancellationToken,
        remote_prefix: &str,
        local_dir: &Path,
    ) -> Result<Vec<PathBuf>, DownloadDirectoryError> {
        let prefix = normalize_prefix(remote_prefix);

        let mut downloaded_files = vec![];
        let mut continuation_token = None;

        loop {
            if cancel_token.is_cancelled() {
                return Err(DownloadDirectoryError::Cancelled);
            }

            let page = self
                .object_store
                .list_page(&prefix, continuation_token)
                .await
                .map_err(|source| DownloadDirectoryError::ListObjects {
                    prefix: prefix.clone(),
                    source,
                })?;

            for object in page.objects {
                if cancel_token.is_cancelled() {
                    return Err(DownloadDirectoryError::Cancelled);
                }

                if let Some(local_path) = self
                    .download_listed_object(cancel_token, &prefix, &object, local_dir)
                    .await?
                {
                    downloaded_files.push(local_path);
                }
            }

            continuation_token = match page.next_continuation_token {
                Some(token) => Some(token),
                None => break,
            };
        }

        info!(
            "Downloaded {} files in directory {}:",
            downloaded_files.len(),
            local_dir.display()
        );
        for file in &downloaded_files {
            info!("  - {}", file.display());
        }

        Ok(downloaded_files)
    }

    /// Mirrors one listed object under `local_dir`
    ///
    /// # Returns
    /// The path of the written file, `None` if the object did not produce a file
    async fn download_listed_object(
        &self,
        cancel_token: &CancellationToken,
        prefix: &str,
        object: &RemoteObject,
        local_dir: &Path,
    ) -> Result<Option<PathBuf>, DownloadDirectoryError> {
        let relative_path = match object.name.strip_prefix(prefix) {
            Some(relative_path) => relative_path,
            None => {
                warn!(
                    "Skipping object {} listed outside of the prefix {}",
                    object.name, prefix
                );
                return Ok(None);
            }
        };

        // The prefix marker object itself
        if relative_path.is_empty() {
            return Ok(None);
        }

        let safe_relative_path = to_safe_relative_path(relative_path).ok_or_else(|| {
            DownloadDirectoryError::UnsafeObjectName {
                name: object.name.clone(),
            }
        })?;
        let local_path = local_dir.join(safe_relative_path);

        if relative_path.ends_with(PREFIX_SEPARATOR) {
            create_directory(&local_path).await?;
            return Ok(None);
        }

        if let Some(parent) = local_path.parent() {
            create_directory(parent).await?;
        }

        let written_bytes = self
            .copy_object(cancel_token, &object.name, &local_path)
            .await?;

        if written_bytes != object.size {
            warn!(
                listed_bytes = object.size,
                written_bytes,
                "The object {} changed since it was listed", object.name
            );
        }

        info!(
            "Downloaded: {} ({} bytes) -> {}",
            object.name,
            written_bytes,
            local_path.display()
        );

        Ok(Some(local_path))
    }

    /// Streams an object into a created (or truncated) local file
    ///
    /// The file is closed when this function returns, whether the copy succeeded or not.
    ///
    /// # Returns
    /// The number of bytes written to the file
    async fn copy_object(
        &self,
        cancel_token: &CancellationToken,
        name: &str,
        local_path: &Path,
    ) -> Result<u64, DownloadDirectoryError> {
        let mut file = tokio::fs::File::create(local_path).await.map_err(|source| {
            DownloadDirectoryError::CreateFile {
                path: local_path.to_path_buf(),
                source,
            }
        })?;

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return Err(DownloadDirectoryError::Cancelled),
            result = self.object_store.read_object_to(name, &mut file) => {
                result.map_err(|source| DownloadDirectoryError::ReadObject {
                    name: name.to_string(),
                    path: local_path.to_path_buf(),
                    source,
                })?;
            }
        }

        file.flush()
            .await
            .map_err(|source| DownloadDirectoryError::WriteFile {
                path: local_path.to_path_buf(),
                source,
            })?;

        let metadata = file
            .metadata()
            .await
            .map_err(|source| DownloadDirectoryError::WriteFile {
                path: local_path.to_path_buf(),
                source,
            })?;

        Ok(metadata.len())
    }
}

async fn create_directory(path: &Path) -> Result<(), DownloadDirectoryError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| DownloadDirectoryError::CreateDirectory {
            path: path.to_path_buf(),
            source,
        })
}

/// Appends the separator to a prefix if it is missing
///
/// `batch` would otherwise also match the objects of `batch_old/`.
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.ends_with(PREFIX_SEPARATOR) {
        prefix.to_string()
    } else {
        format!("{}{}", prefix, PREFIX_SEPARATOR)
    }
}

/// Converts the name of an object relative to its prefix into a relative local path
///
/// Leading and repeated separators are dropped: `/a.txt` (from `batch//a.txt`) becomes `a.txt`.
/// Returns `None` if the path could escape the directory it is joined to.
pub fn to_safe_relative_path(relative_name: &str) -> Option<PathBuf> {
    let mut path = PathBuf::new();

    for component in Path::new(relative_name).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir | Component::RootDir => continue,
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }

    if path.as_os_str().is_empty() {
        return None;
    }

    Some(path)
}
