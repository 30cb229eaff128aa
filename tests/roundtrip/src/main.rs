fn main() {
    println!("Run `cargo test -p rdsync-roundtrip` to execute the fixture round-trip tests.");
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use chrono::Utc;
    use rdsync_client::{
        AccessMode, ClientError, ContainerAccess, ContainerConnector, CreateRealityData,
        DataTransfer, DatasetScope, RealityDataService,
    };
    use rdsync_references::ReferenceTable;
    use rdsync_scene::{Direction, SceneError, list_references, rewrite_references};
    use rdsync_transfer::memory::MemoryContainer;
    use rdsync_transfer::{BlobContainer, BoxFuture, TransferConfig};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn fixture(name: &str) -> Vec<u8> {
        let path = fixtures_dir().join(name);
        fs::read(&path).unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn fixture_table() -> ReferenceTable {
        let mut table = ReferenceTable::new();
        let loaded = table.load(&fixtures_dir().join("references.txt")).unwrap();
        assert_eq!(loaded, 2);
        table
    }

    /// Rewrites a fixture to cloud form and back, returning both versions.
    fn rewrite_both_ways(name: &str) -> (Vec<u8>, Vec<u8>) {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join(name);
        let cloud = dir.path().join(format!("cloud-{name}"));
        fs::write(&local, fixture(name)).unwrap();
        let table = fixture_table();

        rewrite_references(&local, &cloud, &table, Direction::LocalToCloud).unwrap();
        let cloud_bytes = fs::read(&cloud).unwrap();
        rewrite_references(&cloud, &cloud, &table, Direction::CloudToLocal).unwrap();
        (cloud_bytes, fs::read(&cloud).unwrap())
    }

    // --- Scene rewrite tests ---

    #[test]
    fn xml_fixture_round_trips_byte_for_byte() {
        init_tracing();
        let (cloud, restored) = rewrite_both_ways("ContextScene.xml");

        let cloud = String::from_utf8(cloud).unwrap();
        assert!(cloud.contains("<Path>rds:id-1</Path>"));
        assert!(cloud.contains("<Path>rds:id-2</Path>"));
        assert!(cloud.contains("<!-- survey export -->"));
        assert!(cloud.contains(r#"label="north &amp; south""#));
        assert_eq!(restored, fixture("ContextScene.xml"));
    }

    #[test]
    fn json_fixture_round_trips_with_key_order() {
        init_tracing();
        let (cloud, restored) = rewrite_both_ways("ContextScene.json");

        let cloud: serde_json::Value = serde_json::from_slice(&cloud).unwrap();
        assert_eq!(cloud["References"]["0"]["Path"], "rds:id-1");
        assert_eq!(cloud["References"]["1"]["Path"], "rds:id-2");

        let original: serde_json::Value =
            serde_json::from_slice(&fixture("ContextScene.json")).unwrap();
        let restored: serde_json::Value = serde_json::from_slice(&restored).unwrap();
        assert_eq!(restored, original);

        let keys: Vec<&String> = restored.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["version", "PhotoCollection", "References"]);
    }

    #[test]
    fn missing_table_entry_leaves_destination_untouched() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("ContextScene.xml");
        let destination = dir.path().join("out.xml");
        fs::write(&source, fixture("ContextScene.xml")).unwrap();
        fs::write(&destination, b"previous").unwrap();

        let mut table = ReferenceTable::new();
        table.add_reference("C:/data/img", "id-1");

        let err = rewrite_references(&source, &destination, &table, Direction::LocalToCloud)
            .unwrap_err();
        assert!(matches!(
            err,
            SceneError::UnresolvedReference { ref id, ref path } if id == "1" && path == "C:/data/masks"
        ));
        assert_eq!(fs::read(&destination).unwrap(), b"previous");
    }

    #[test]
    fn fixture_references_are_listed_in_order() {
        let refs = list_references(&fixtures_dir().join("ContextScene.xml")).unwrap();
        let pairs: Vec<(&str, &str)> = refs.iter().map(|r| (r.id.as_str(), r.path.as_str())).collect();
        assert_eq!(pairs, [("0", "C:/data/img"), ("1", "C:/data/masks")]);
    }

    #[test]
    fn transfer_config_fixture_loads() {
        let config = TransferConfig::from_file(&fixtures_dir().join("transfer.json")).unwrap();
        assert_eq!(config.block_size, 256);
        assert_eq!(config.max_in_flight, 3);
        assert_eq!(
            config.whole_file_concurrency,
            TransferConfig::default().whole_file_concurrency
        );
    }

    // --- End-to-end facade tests ---

    struct FakeService {
        next_id: Mutex<u32>,
    }

    impl RealityDataService for FakeService {
        fn create_reality_data<'a>(
            &'a self,
            _request: &'a CreateRealityData,
            _scope: &'a DatasetScope,
        ) -> BoxFuture<'a, Result<String, ClientError>> {
            Box::pin(async move {
                let mut next = self.next_id.lock().unwrap();
                *next += 1;
                Ok(format!("dataset-{next}"))
            })
        }

        fn container_access<'a>(
            &'a self,
            id: &'a str,
            _scope: &'a DatasetScope,
            _mode: AccessMode,
        ) -> BoxFuture<'a, Result<ContainerAccess, ClientError>> {
            Box::pin(async move {
                Ok(ContainerAccess {
                    url: format!("memory://{id}"),
                    token: "sig".into(),
                    expires_at: Utc::now() + chrono::Duration::minutes(10),
                })
            })
        }
    }

    #[derive(Default)]
    struct FakeConnector {
        containers: Mutex<HashMap<String, Arc<MemoryContainer>>>,
    }

    impl ContainerConnector for FakeConnector {
        fn connect(&self, access: &ContainerAccess) -> Result<Arc<dyn BlobContainer>, ClientError> {
            let container: Arc<dyn BlobContainer> = self
                .containers
                .lock()
                .unwrap()
                .entry(access.url.clone())
                .or_default()
                .clone();
            Ok(container)
        }
    }

    fn facade() -> DataTransfer {
        let config = TransferConfig::from_file(&fixtures_dir().join("transfer.json")).unwrap();
        DataTransfer::new(
            Arc::new(FakeService {
                next_id: Mutex::new(0),
            }),
            Arc::new(FakeConnector::default()),
            config,
        )
    }

    fn write_scene_folder(root: &Path) {
        fs::write(root.join("ContextScene.xml"), fixture("ContextScene.xml")).unwrap();
        fs::create_dir_all(root.join("thumbs")).unwrap();
        let big: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        fs::write(root.join("thumbs/preview.bin"), big).unwrap();
        fs::write(root.join("thumbs/empty.bin"), b"").unwrap();
    }

    #[tokio::test]
    async fn scene_survives_upload_and_download() {
        init_tracing();
        let facade = facade();
        let scope = DatasetScope::new("project-1");
        let table = fixture_table();

        let source = TempDir::new().unwrap();
        write_scene_folder(source.path());

        let mut upload_progress = Vec::new();
        let id = facade
            .upload_scene(
                source.path(),
                "survey",
                &scope,
                Some(&table),
                |p| {
                    upload_progress.push(p);
                    true
                },
                CancellationToken::new(),
            )
            .await
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(id, "dataset-1");
        assert!(upload_progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(upload_progress.last(), Some(&100));

        let dest = TempDir::new().unwrap();
        let outcome = facade
            .download_scene(
                &id,
                dest.path(),
                &scope,
                Some(&table),
                |_| true,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(!outcome.is_interrupted());

        for name in ["ContextScene.xml", "thumbs/preview.bin", "thumbs/empty.bin"] {
            assert_eq!(
                fs::read(dest.path().join(name)).unwrap(),
                fs::read(source.path().join(name)).unwrap(),
                "{name} differs after round trip"
            );
        }
    }

    #[tokio::test]
    async fn cancelled_download_reports_interrupted() {
        let facade = facade();
        let scope = DatasetScope::new("project-1");
        let table = fixture_table();

        let source = TempDir::new().unwrap();
        write_scene_folder(source.path());
        let id = facade
            .upload_scene(
                source.path(),
                "survey",
                &scope,
                Some(&table),
                |_| true,
                CancellationToken::new(),
            )
            .await
            .unwrap()
            .completed()
            .unwrap();

        let dest = TempDir::new().unwrap();
        let outcome = facade
            .download_scene(
                &id,
                dest.path(),
                &scope,
                Some(&table),
                |_| false,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(outcome.is_interrupted());
    }
}
