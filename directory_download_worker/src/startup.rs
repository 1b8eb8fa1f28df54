use std::sync::{Arc, Mutex};

use common::helper::error_chain_fmt;
use lapin::Connection as RabbitMQConnection;
use s3::{creds::Credentials, Bucket, Region};
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    configuration::{ObjectStorageSettings, RabbitMQSettings, Settings},
    domain::services::directory_downloader::DirectoryDownloader,
    handlers::handler_download_directory_job::{DownloadDirectoryJobHandler, InventoryWriter},
    ports::object_store::ObjectStore,
    repositories::{
        job_rabbitmq_subscriber::{JobRabbitMQSubscriber, SubscriberError},
        object_store_s3_repository::ObjectStoreS3Repository,
    },
};

/// Holds the clients of the worker, built once from the settings and released when it stops
pub struct Application {
    subscriber: JobRabbitMQSubscriber,
    job_handler: DownloadDirectoryJobHandler,
}

impl Application {
    /// Builds the worker, with its inventories printed to stdout
    #[tracing::instrument(name = "Building worker application", skip(settings))]
    pub async fn build(settings: Settings) -> Result<Self, ApplicationError> {
        Self::build_with_inventory_writer(settings, Arc::new(Mutex::new(std::io::stdout()))).await
    }

    /// Builds the worker, writing the inventories of each job to `inventory_writer`
    pub async fn build_with_inventory_writer(
        settings: Settings,
        inventory_writer: InventoryWriter,
    ) -> Result<Self, ApplicationError> {
        info!(
            project_id = %settings.application.project_id,
            subscription = %settings.rabbitmq.subscription,
            bucket_name = %settings.object_storage.bucket_name,
            download_dir = %settings.application.download_dir.display(),
            "Starting worker"
        );

        let bucket = set_up_s3(&settings.object_storage).await?;
        let object_store: Arc<dyn ObjectStore> = Arc::new(ObjectStoreS3Repository::new(
            bucket,
            settings.object_storage.page_size,
        ));
        let downloader = Arc::new(DirectoryDownloader::new(object_store));

        let job_handler = DownloadDirectoryJobHandler::new(
            downloader,
            settings.application.download_dir.clone(),
            inventory_writer,
        );

        let rabbitmq_connection = get_rabbitmq_connection(&settings.rabbitmq).await?;
        let subscriber = JobRabbitMQSubscriber::new(
            rabbitmq_connection,
            &settings.rabbitmq,
            &settings.application.project_id,
        );

        info!("🦄 Worker application built");

        Ok(Self {
            subscriber,
            job_handler,
        })
    }

    /// Runs the worker until `cancel_token` is cancelled or the subscription fails
    ///
    /// self is moved so that the clients are closed when the worker stops
    pub async fn run_until_stopped(
        self,
        cancel_token: CancellationToken,
    ) -> Result<(), ApplicationError> {
        info!("📡 running until stopped");

        let result = self
            .subscriber
            .receive(cancel_token, &self.job_handler)
            .await;

        if let Err(error) = &result {
            error!(?error, "Subscriber stopped");
        }

        if let Err(error) = self.subscriber.close().await {
            error!(?error, "Failed to close the RabbitMQ connection");
        }

        info!("👋 Bye!");
        result.map_err(ApplicationError::from)
    }
}

/// Create a connection to RabbitMQ
pub async fn get_rabbitmq_connection(
    config: &RabbitMQSettings,
) -> Result<RabbitMQConnection, lapin::Error> {
    RabbitMQConnection::connect(&config.get_uri(), config.get_connection_properties()).await
}

/// Sets up the S3 bucket holding the directories to download
///
/// The bucket is not created: one listing request checks that it exists and is readable.
#[tracing::instrument(name = "Setting up S3 object store")]
pub async fn set_up_s3(settings: &ObjectStorageSettings) -> Result<Bucket, ApplicationError> {
    let region = Region::Custom {
        region: settings.region.to_owned(),
        endpoint: settings.endpoint(),
    };

    let credentials = Credentials::new(
        Some(&settings.username),
        Some(settings.password.expose_secret()),
        None,
        None,
        None,
    )?;

    let bucket = Bucket::new(&settings.bucket_name, region, credentials)?.with_path_style();

    bucket
        .list_page(String::new(), None, None, None, Some(1))
        .await
        .map_err(|error| ApplicationError::BucketUnavailable(settings.bucket_name.clone(), error))?;

    info!(
        "🪣 Bucket {} has been correctly instantiated",
        settings.bucket_name
    );
    Ok(bucket)
}

#[derive(thiserror::Error)]
pub enum ApplicationError {
    #[error("S3 credentials error: {0}")]
    S3CredentialsError(#[from] s3::creds::error::CredentialsError),
    #[error(transparent)]
    S3Error(#[from] s3::error::S3Error),
    #[error("The bucket {0} cannot be listed")]
    BucketUnavailable(String, #[source] s3::error::S3Error),
    #[error(transparent)]
    RabbitMQError(#[from] lapin::Error),
    #[error(transparent)]
    SubscriberError(#[from] SubscriberError),
}

impl std::fmt::Debug for ApplicationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
