use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::Local;
use common::{helper::error_chain_fmt, telemetry::spawn_blocking_with_tracing};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    domain::{
        entities::{download_directory_job::DownloadDirectoryJob, inventory::Inventory},
        services::{
            directory_downloader::{DirectoryDownloader, DownloadDirectoryError},
            local_destination::{create_local_destination, LocalDestinationError},
        },
    },
    ports::job_handler::JobHandler,
};

/// Where the inventories printed after each job are written
pub type InventoryWriter = Arc<Mutex<dyn Write + Send>>;

/// Downloads the directory named by a job into its own local destination,
/// then prints what was retrieved
pub struct DownloadDirectoryJobHandler {
    downloader: Arc<DirectoryDownloader>,
    download_root: PathBuf,
    inventory_writer: InventoryWriter,
}

#[derive(thiserror::Error)]
pub enum ExecuteHandlerDownloadDirectoryJobError {
    #[error(transparent)]
    LocalDestinationError(#[from] LocalDestinationError),
    #[error(transparent)]
    DownloadDirectoryError(#[from] DownloadDirectoryError),
}

impl std::fmt::Debug for ExecuteHandlerDownloadDirectoryJobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl DownloadDirectoryJobHandler {
    pub fn new(
        downloader: Arc<DirectoryDownloader>,
        download_root: PathBuf,
        inventory_writer: InventoryWriter,
    ) -> Self {
        Self {
            downloader,
            download_root,
            inventory_writer,
        }
    }

    /// Prints the inventory of the job destination, then the top level of the download root
    ///
    /// Failing to list a directory is only logged: the objects are already downloaded.
    async fn print_inventories(&self, destination: &Path) {
        let destination = destination.to_path_buf();
        let download_root = self.download_root.clone();

        let inventories = spawn_blocking_with_tracing(move || {
            (
                Inventory::of_tree(&destination),
                Inventory::of_top_level(&download_root),
            )
        })
        .await;

        let (destination_inventory, root_inventory) = match inventories {
            Ok(inventories) => inventories,
            Err(error) => {
                warn!(?error, "Failed to list the downloaded files");
                return;
            }
        };

        match destination_inventory {
            Ok(inventory) => {
                info!(
                    file_count = inventory.file_count(),
                    total_bytes = inventory.total_bytes(),
                    "Listed the downloaded files"
                );
                self.write_inventory(&inventory);
            }
            Err(error) => warn!(?error, "Failed to list the downloaded files"),
        }

        match root_inventory {
            Ok(inventory) => self.write_inventory(&inventory),
            Err(error) => warn!(?error, "Failed to list all downloads"),
        }
    }

    fn write_inventory(&self, inventory: &Inventory) {
        let mut writer = match self.inventory_writer.lock() {
            Ok(writer) => writer,
            Err(_) => {
                warn!("The inventory writer is poisoned, skipping inventory");
                return;
            }
        };

        if let Err(error) = write!(writer, "\n{}", inventory).and_then(|_| writer.flush()) {
            warn!(?error, "Failed to write inventory");
        }
    }
}

#[async_trait]
impl JobHandler for DownloadDirectoryJobHandler {
    type Error = ExecuteHandlerDownloadDirectoryJobError;

    #[tracing::instrument(name = "Executing handler on download directory job", skip(self, cancel_token))]
    async fn handle(
        &self,
        cancel_token: &CancellationToken,
        job: &DownloadDirectoryJob,
    ) -> Result<(), Self::Error> {
        info!("Received job with path: {}", job.path);

        let destination =
            create_local_destination(&self.download_root, &job.path, Local::now()).await?;

        self.downloader
            .download_directory(cancel_token, &job.path, &destination)
            .await?;

        self.print_inventories(&destination).await;

        info!("Successfully processed job for path: {}", job.path);
        Ok(())
    }
}
