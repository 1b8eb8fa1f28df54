use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::entities::download_directory_job::DownloadDirectoryJob;

/// Processes the jobs received by a subscriber
///
/// Returning an error makes the subscriber negatively acknowledge the message.
#[async_trait]
pub trait JobHandler: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn handle(
        &self,
        cancel_token: &CancellationToken,
        job: &DownloadDirectoryJob,
    ) -> Result<(), Self::Error>;
}
