use serde::{Deserialize, Serialize};

use common::helper::error_chain_fmt;

/// Represents a request for a job to download a directory from the object storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadDirectoryJob {
    /// Prefix of the objects to download, acting as a remote directory.
    /// Ex: `batch/2024-01-01`
    pub path: String,
}

impl DownloadDirectoryJob {
    pub fn try_parsing(data: &[u8]) -> Result<Self, DownloadDirectoryJobParsingError> {
        let data = std::str::from_utf8(data)?;
        let job = serde_json::from_str(data).map_err(|e| {
            DownloadDirectoryJobParsingError::InvalidJsonData(e, data.to_string())
        })?;

        Ok(job)
    }
}

#[derive(thiserror::Error)]
pub enum DownloadDirectoryJobParsingError {
    #[error("Data could not be converted from utf8 u8 vector to string")]
    InvalidStringData(#[from] std::str::Utf8Error),

    #[error("Data did not represent a valid JSON object: {0}. Data: {1}")]
    InvalidJsonData(serde_json::Error, String),
}

impl std::fmt::Debug for DownloadDirectoryJobParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
