//! Remote collaborators consumed by [`DataTransfer`](crate::DataTransfer).
//!
//! The REST metadata client and the blob-store transport live outside this
//! crate. Callers implement these traits on top of them; tests implement
//! them with in-memory mocks.

use std::sync::Arc;

use rdsync_transfer::{BlobContainer, BoxFuture};

use crate::error::ClientError;
use crate::types::{AccessMode, ContainerAccess, CreateRealityData, DatasetScope};

/// Dataset metadata service.
pub trait RealityDataService: Send + Sync {
    /// Creates a dataset entry and returns its cloud id.
    fn create_reality_data<'a>(
        &'a self,
        request: &'a CreateRealityData,
        scope: &'a DatasetScope,
    ) -> BoxFuture<'a, Result<String, ClientError>>;

    /// Issues credentials for the container holding dataset `id`.
    fn container_access<'a>(
        &'a self,
        id: &'a str,
        scope: &'a DatasetScope,
        mode: AccessMode,
    ) -> BoxFuture<'a, Result<ContainerAccess, ClientError>>;
}

/// Opens a blob container from issued credentials.
pub trait ContainerConnector: Send + Sync {
    fn connect(&self, access: &ContainerAccess) -> Result<Arc<dyn BlobContainer>, ClientError>;
}
