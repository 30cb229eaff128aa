//! Dataset upload/download facade.
//!
//! Each operation resolves a container through the metadata service, opens
//! it through the connector, and drives one [`BlockTransferEngine`] job.
//! Scene uploads first stage a rewritten copy of the folder so the local
//! tree is never modified.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use rdsync_references::ReferenceTable;
use rdsync_scene::{Direction, RewriteReport, find_scene_document, rewrite_references};
use rdsync_transfer::{BlockTransferEngine, TransferConfig, TransferOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::service::{ContainerConnector, RealityDataService};
use crate::types::{AccessMode, CreateRealityData, DatasetScope, Outcome, RealityDataType};

/// Moves datasets between local disk and the remote store.
pub struct DataTransfer {
    service: Arc<dyn RealityDataService>,
    connector: Arc<dyn ContainerConnector>,
    config: TransferConfig,
}

impl DataTransfer {
    pub fn new(
        service: Arc<dyn RealityDataService>,
        connector: Arc<dyn ContainerConnector>,
        config: TransferConfig,
    ) -> Self {
        Self {
            service,
            connector,
            config,
        }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Creates a dataset and uploads `local_path` (a folder or one file) into it.
    ///
    /// Returns the new cloud id. `root_file_hint` names the dataset's root
    /// document relative to `local_path` and must exist. An interrupted
    /// upload leaves the created dataset partially filled.
    #[allow(clippy::too_many_arguments)]
    pub async fn upload_dataset<F>(
        &self,
        local_path: &Path,
        name: &str,
        data_type: RealityDataType,
        scope: &DatasetScope,
        root_file_hint: Option<&str>,
        on_progress: F,
        cancel: CancellationToken,
    ) -> Result<Outcome<String>, ClientError>
    where
        F: FnMut(u8) -> bool + Send,
    {
        if cancel.is_cancelled() {
            info!(name, "upload cancelled before start");
            return Ok(Outcome::Interrupted);
        }

        let metadata = tokio::fs::metadata(local_path).await?;
        if let Some(root) = root_file_hint
            && !root_document_exists(local_path, metadata.is_dir(), root)
        {
            return Err(ClientError::MissingRootDocument(root.to_string()));
        }

        let request = CreateRealityData {
            display_name: name.to_string(),
            data_type,
            root_document: root_file_hint.map(str::to_string),
        };
        let id = self.service.create_reality_data(&request, scope).await?;
        info!(id = %id, name, %data_type, "dataset created");

        let engine = self.open_engine(&id, scope, AccessMode::Write).await?;
        match engine.upload(local_path, on_progress, cancel).await? {
            TransferOutcome::Completed(summary) => {
                info!(
                    id = %id,
                    files = summary.files,
                    bytes = summary.transferred_bytes,
                    "dataset uploaded"
                );
                Ok(Outcome::Completed(id))
            }
            TransferOutcome::Interrupted(summary) => {
                warn!(
                    id = %id,
                    bytes = summary.transferred_bytes,
                    total_bytes = summary.total_bytes,
                    "dataset upload interrupted, remote dataset is incomplete"
                );
                Ok(Outcome::Interrupted)
            }
        }
    }

    /// Downloads every file of dataset `cloud_id` under `local_path`.
    pub async fn download_dataset<F>(
        &self,
        cloud_id: &str,
        local_path: &Path,
        scope: &DatasetScope,
        on_progress: F,
        cancel: CancellationToken,
    ) -> Result<Outcome<()>, ClientError>
    where
        F: FnMut(u8) -> bool + Send,
    {
        if cancel.is_cancelled() {
            info!(id = cloud_id, "download cancelled before start");
            return Ok(Outcome::Interrupted);
        }

        let engine = self.open_engine(cloud_id, scope, AccessMode::Read).await?;
        match engine.download(local_path, on_progress, cancel).await? {
            TransferOutcome::Completed(summary) => {
                info!(
                    id = cloud_id,
                    destination = %local_path.display(),
                    files = summary.files,
                    bytes = summary.transferred_bytes,
                    "dataset downloaded"
                );
                Ok(Outcome::Completed(()))
            }
            TransferOutcome::Interrupted(summary) => {
                warn!(
                    id = cloud_id,
                    bytes = summary.transferred_bytes,
                    "dataset download interrupted"
                );
                Ok(Outcome::Interrupted)
            }
        }
    }

    /// Uploads a scene folder with its references rewritten to cloud ids.
    ///
    /// Fails with [`rdsync_scene::SceneError::UnresolvedReference`] before
    /// anything is created remotely when a reference is not in `table`.
    /// `None` stands for an empty table.
    pub async fn upload_scene<F>(
        &self,
        folder: &Path,
        name: &str,
        scope: &DatasetScope,
        table: Option<&ReferenceTable>,
        on_progress: F,
        cancel: CancellationToken,
    ) -> Result<Outcome<String>, ClientError>
    where
        F: FnMut(u8) -> bool + Send,
    {
        self.upload_with_references(
            folder,
            name,
            RealityDataType::ContextScene,
            scope,
            table,
            on_progress,
            cancel,
        )
        .await
    }

    /// Uploads an orientations folder; same pipeline as [`Self::upload_scene`].
    pub async fn upload_orientations<F>(
        &self,
        folder: &Path,
        name: &str,
        scope: &DatasetScope,
        table: Option<&ReferenceTable>,
        on_progress: F,
        cancel: CancellationToken,
    ) -> Result<Outcome<String>, ClientError>
    where
        F: FnMut(u8) -> bool + Send,
    {
        self.upload_with_references(
            folder,
            name,
            RealityDataType::Orientations,
            scope,
            table,
            on_progress,
            cancel,
        )
        .await
    }

    /// Downloads a scene dataset and rewrites its references to local paths.
    /// `None` stands for an empty table.
    pub async fn download_scene<F>(
        &self,
        cloud_id: &str,
        local_path: &Path,
        scope: &DatasetScope,
        table: Option<&ReferenceTable>,
        on_progress: F,
        cancel: CancellationToken,
    ) -> Result<Outcome<()>, ClientError>
    where
        F: FnMut(u8) -> bool + Send,
    {
        if self
            .download_dataset(cloud_id, local_path, scope, on_progress, cancel)
            .await?
            .is_interrupted()
        {
            return Ok(Outcome::Interrupted);
        }

        let folder = local_path.to_path_buf();
        let table = table.cloned().unwrap_or_default();
        let report = blocking(move || {
            let scene = find_scene_document(&folder)?;
            Ok(rewrite_references(
                &scene,
                &scene,
                &table,
                Direction::CloudToLocal,
            )?)
        })
        .await?;
        debug!(
            id = cloud_id,
            references = report.references.len(),
            "downloaded scene rewritten to local paths"
        );
        Ok(Outcome::Completed(()))
    }

    #[allow(clippy::too_many_arguments)]
    async fn upload_with_references<F>(
        &self,
        folder: &Path,
        name: &str,
        data_type: RealityDataType,
        scope: &DatasetScope,
        table: Option<&ReferenceTable>,
        on_progress: F,
        cancel: CancellationToken,
    ) -> Result<Outcome<String>, ClientError>
    where
        F: FnMut(u8) -> bool + Send,
    {
        if cancel.is_cancelled() {
            return Ok(Outcome::Interrupted);
        }

        let staging = tempfile::tempdir()?;
        let (report, root_document) = {
            let folder = folder.to_path_buf();
            let staged = staging.path().to_path_buf();
            let table = table.cloned().unwrap_or_default();
            blocking(move || stage_folder(&folder, &staged, &table)).await?
        };
        debug!(
            folder = %folder.display(),
            staging = %staging.path().display(),
            references = report.references.len(),
            assets = report.assets.len(),
            "scene folder staged"
        );

        self.upload_dataset(
            staging.path(),
            name,
            data_type,
            scope,
            Some(&root_document),
            on_progress,
            cancel,
        )
        .await
    }

    async fn open_engine(
        &self,
        id: &str,
        scope: &DatasetScope,
        mode: AccessMode,
    ) -> Result<BlockTransferEngine, ClientError> {
        let access = self.service.container_access(id, scope, mode).await?;
        if access.is_expired_at(Utc::now()) {
            return Err(ClientError::AccessExpired {
                id: id.to_string(),
                expires_at: access.expires_at,
            });
        }
        debug!(id, ?mode, expires_at = %access.expires_at, "container access granted");

        let container = self.connector.connect(&access)?;
        Ok(BlockTransferEngine::new(container, self.config.clone()))
    }
}

fn root_document_exists(local_path: &Path, is_dir: bool, root: &str) -> bool {
    if is_dir {
        local_path.join(root).is_file()
    } else {
        local_path
            .file_name()
            .is_some_and(|name| name.to_string_lossy() == root)
    }
}

/// Writes the rewritten scene document and a copy of every other file of
/// `folder` into `staging`. Returns the rewrite report and the scene's
/// file name.
fn stage_folder(
    folder: &Path,
    staging: &Path,
    table: &ReferenceTable,
) -> Result<(RewriteReport, String), ClientError> {
    let scene = find_scene_document(folder)?;
    let file_name = scene
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ClientError::MissingRootDocument(scene.display().to_string()))?;

    let report = rewrite_references(
        &scene,
        &staging.join(&file_name),
        table,
        Direction::LocalToCloud,
    )?;
    copy_tree(folder, staging, &scene)?;
    Ok((report, file_name))
}

fn copy_tree(source: &Path, destination: &Path, skip: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let path = entry.path();
        if path == skip {
            continue;
        }
        let target: PathBuf = destination.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            std::fs::create_dir_all(&target)?;
            copy_tree(&path, &target, skip)?;
        } else {
            std::fs::copy(&path, &target)?;
        }
    }
    Ok(())
}

async fn blocking<T, F>(f: F) -> Result<T, ClientError>
where
    F: FnOnce() -> Result<T, ClientError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ClientError::Io(std::io::Error::other(e)))?
}
