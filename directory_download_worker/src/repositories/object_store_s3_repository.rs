use async_trait::async_trait;
use s3::{error::S3Error, Bucket};
use tokio::io::AsyncWrite;
use tracing::info;

use crate::{
    domain::entities::remote_object::{ObjectListPage, RemoteObject},
    ports::object_store::{ObjectStore, ObjectStoreError},
};

/// Simple Storage Service (S3) client to read the directories to download
pub struct ObjectStoreS3Repository {
    bucket: Bucket,
    /// Maximum number of keys for each listing request, S3 default (1000) if `None`
    page_size: Option<usize>,
}

impl ObjectStoreS3Repository {
    pub fn new(bucket: Bucket, page_size: Option<usize>) -> Self {
        Self { bucket, page_size }
    }
}

#[async_trait]
impl ObjectStore for ObjectStoreS3Repository {
    #[tracing::instrument(name = "Listing a page of objects from bucket", skip(self))]
    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ObjectListPage, ObjectStoreError> {
        let (result, status_code) = self
            .bucket
            .list_page(
                prefix.to_string(),
                None,
                continuation_token,
                None,
                self.page_size,
            )
            .await
            .map_err(|error| map_s3_error(error, prefix))?;

        if status_code != 200 {
            return Err(ObjectStoreError::UnexpectedStatus(status_code));
        }

        info!(
            "Listed {} objects under {} (truncated: {})",
            result.contents.len(),
            prefix,
            result.is_truncated
        );

        let objects = result
            .contents
            .into_iter()
            .map(|object| RemoteObject {
                name: object.key,
                size: object.size,
            })
            .collect();

        Ok(ObjectListPage {
            objects,
            next_continuation_token: result.next_continuation_token,
        })
    }

    #[tracing::instrument(name = "Get object from bucket", skip(self, writer))]
    async fn read_object_to(
        &self,
        name: &str,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), ObjectStoreError> {
        let mut writer = writer;

        let status_code = self
            .bucket
            .get_object_to_writer(name, &mut writer)
            .await
            .map_err(|error| map_s3_error(error, name))?;

        match status_code {
            200 => Ok(()),
            404 => Err(ObjectStoreError::ObjectNotFound(name.to_string())),
            code => Err(ObjectStoreError::UnexpectedStatus(code)),
        }
    }
}

fn map_s3_error(error: S3Error, name: &str) -> ObjectStoreError {
    match error {
        S3Error::Http(404, _) => ObjectStoreError::ObjectNotFound(name.to_string()),
        error => ObjectStoreError::Other(Box::new(error)),
    }
}
