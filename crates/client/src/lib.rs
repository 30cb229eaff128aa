//! Dataset transfer facade.
//!
//! Ties the metadata service, the scene reference rewriter and the block
//! transfer engine together. The REST client and the blob transport are
//! supplied by the caller through [`RealityDataService`] and
//! [`ContainerConnector`].
//!
//! # Scene upload
//!
//! 1. **Locate** the scene document in the folder
//! 2. **Stage** a copy with references rewritten to cloud ids
//! 3. **Create** the dataset entry
//! 4. **Upload** the staged copy through the block engine
//!
//! Download runs the mirror pipeline and rewrites the downloaded scene in
//! place to local paths.

pub mod error;
pub mod facade;
pub mod service;
pub mod types;

pub use error::ClientError;
pub use facade::DataTransfer;
pub use service::{ContainerConnector, RealityDataService};
pub use types::{
    AccessMode, ContainerAccess, CreateRealityData, DatasetScope, Outcome, RealityDataType,
};
