use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use common::helper::error_chain_fmt;
use tracing::{info, warn};

pub const DESTINATION_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Name used when the job path has no last component, ex: `/`
pub const FALLBACK_BASE_NAME: &str = "job";

/// Number of suffixed names tried when destinations created in the same second collide
const MAX_COLLISION_SUFFIX: usize = 1000;

#[derive(thiserror::Error)]
pub enum LocalDestinationError {
    #[error("Failed to create the download root {path}")]
    CreateRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to create the destination directory {path}")]
    CreateDestination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Every destination name derived from {0} is already taken")]
    Exhausted(String),
}

impl std::fmt::Debug for LocalDestinationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Last component of the job path, ignoring trailing separators
pub fn destination_base_name(job_path: &str) -> String {
    Path::new(job_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| FALLBACK_BASE_NAME.to_string())
}

/// `<basename>_<YYYYmmdd_HHMMSS>`
pub fn destination_dir_name(job_path: &str, now: DateTime<Local>) -> String {
    format!(
        "{}_{}",
        destination_base_name(job_path),
        now.format(DESTINATION_TIMESTAMP_FORMAT)
    )
}

/// Creates the directory receiving the objects of a job
///
/// The destination is never shared with another job: if the directory already exists
/// (same path downloaded twice within a second), `_1`, `_2`, ... is appended to its name.
///
/// # Returns
/// The path of the newly created, empty, directory
#[tracing::instrument(name = "Creating local destination")]
pub async fn create_local_destination(
    download_root: &Path,
    job_path: &str,
    now: DateTime<Local>,
) -> Result<PathBuf, LocalDestinationError> {
    tokio::fs::create_dir_all(download_root)
        .await
        .map_err(|source| LocalDestinationError::CreateRoot {
            path: download_root.to_path_buf(),
            source,
        })?;

    let dir_name = destination_dir_name(job_path, now);

    for attempt in 0..MAX_COLLISION_SUFFIX {
        let candidate = match attempt {
            0 => download_root.join(&dir_name),
            n => download_root.join(format!("{}_{}", dir_name, n)),
        };

        match tokio::fs::create_dir(&candidate).await {
            Ok(()) => {
                info!("Created destination {}", candidate.display());
                return Ok(candidate);
            }
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
                warn!("Destination {} already exists", candidate.display());
                continue;
            }
            Err(source) => {
                return Err(LocalDestinationError::CreateDestination {
                    path: candidate,
                    source,
                })
            }
        }
    }

    Err(LocalDestinationError::Exhausted(dir_name))
}
