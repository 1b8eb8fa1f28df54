use async_trait::async_trait;
use common::helper::error_chain_fmt;
use tokio::io::AsyncWrite;

use crate::domain::entities::remote_object::ObjectListPage;

/// Read access to an object storage holding "directories" of objects
///
/// A directory is only a prefix shared by the names of its objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists one page of the objects whose name starts with `prefix`
    ///
    /// # Arguments
    /// * `prefix` - Prefix of the names of the objects to list
    /// * `continuation_token` - `None` for the first page, then the token returned by the previous page
    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ObjectListPage, ObjectStoreError>;

    /// Streams the content of an object into `writer`
    async fn read_object_to(
        &self,
        name: &str,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), ObjectStoreError>;
}

#[derive(thiserror::Error)]
pub enum ObjectStoreError {
    #[error("The object could not be found in the bucket: {0}")]
    ObjectNotFound(String),
    #[error("The object storage answered with the unexpected status code {0}")]
    UnexpectedStatus(u16),
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl std::fmt::Debug for ObjectStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
