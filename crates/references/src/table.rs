use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::ReferenceError;

/// Normalizes a local path to forward-slash separators.
pub fn normalize_local_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// In-memory bidirectional map between local paths and cloud ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceTable {
    local_to_cloud: HashMap<String, String>,
    cloud_to_local: HashMap<String, String>,
}

impl ReferenceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `(local_path, cloud_id)` pair.
    ///
    /// Returns `false` and leaves the table untouched when either key is
    /// already present, including when the pair is already mapped.
    pub fn add_reference(&mut self, local_path: &str, cloud_id: &str) -> bool {
        let local = normalize_local_path(local_path);
        if self.local_to_cloud.contains_key(&local) || self.cloud_to_local.contains_key(cloud_id)
        {
            debug!(local = %local, cloud_id, "reference collides with an existing entry");
            return false;
        }

        self.local_to_cloud.insert(local.clone(), cloud_id.to_string());
        self.cloud_to_local.insert(cloud_id.to_string(), local);
        true
    }

    /// Returns `true` if `path` is a known local path.
    pub fn has_local_path(&self, path: &str) -> bool {
        self.local_to_cloud
            .contains_key(&normalize_local_path(path))
    }

    /// Returns `true` if `id` is a known cloud id.
    pub fn has_cloud_id(&self, id: &str) -> bool {
        self.cloud_to_local.contains_key(id)
    }

    /// Looks up the cloud id mapped to a local path.
    pub fn cloud_id(&self, local_path: &str) -> Option<&str> {
        self.local_to_cloud
            .get(&normalize_local_path(local_path))
            .map(String::as_str)
    }

    /// Looks up the local path mapped to a cloud id.
    pub fn local_path(&self, cloud_id: &str) -> Option<&str> {
        self.cloud_to_local.get(cloud_id).map(String::as_str)
    }

    /// Removes the entry for a local path, returning its cloud id.
    pub fn remove_local_path(&mut self, local_path: &str) -> Option<String> {
        let cloud_id = self
            .local_to_cloud
            .remove(&normalize_local_path(local_path))?;
        self.cloud_to_local.remove(&cloud_id);
        Some(cloud_id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.local_to_cloud.len()
    }

    /// Returns `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.local_to_cloud.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.local_to_cloud.clear();
        self.cloud_to_local.clear();
    }

    /// Iterates `(local_path, cloud_id)` pairs sorted by local path.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .local_to_cloud
            .iter()
            .map(|(l, c)| (l.as_str(), c.as_str()))
            .collect();
        entries.sort_unstable();
        entries.into_iter()
    }

    /// Writes the whole table to `path`, one `localPath,cloudId` per line.
    ///
    /// Commas inside paths are not escaped.
    pub fn save(&self, path: &Path) -> Result<(), ReferenceError> {
        let mut content = String::new();
        for (local, cloud) in self.iter() {
            content.push_str(local);
            content.push(',');
            content.push_str(cloud);
            content.push('\n');
        }

        std::fs::write(path, content).map_err(|source| ReferenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), entries = self.len(), "reference table saved");
        Ok(())
    }

    /// Replaces the table with the contents of `path`.
    ///
    /// Lines that do not hold exactly two non-empty fields are skipped. On
    /// read failure the table is left unchanged. Returns the number of
    /// entries loaded.
    pub fn load(&mut self, path: &Path) -> Result<usize, ReferenceError> {
        let content = std::fs::read_to_string(path).map_err(|source| ReferenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut loaded = ReferenceTable::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split(',').collect();
            match fields.as_slice() {
                [local, cloud] if !local.is_empty() && !cloud.is_empty() => {
                    if !loaded.add_reference(local, cloud) {
                        warn!(line = line_no + 1, "duplicate reference entry skipped");
                    }
                }
                _ => {
                    warn!(
                        path = %path.display(),
                        line = line_no + 1,
                        "malformed reference entry skipped"
                    );
                }
            }
        }

        *self = loaded;
        debug!(path = %path.display(), entries = self.len(), "reference table loaded");
        Ok(self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn add_and_lookup_both_directions() {
        let mut table = ReferenceTable::new();
        assert!(table.add_reference("C:/data/img", "id-1"));

        assert!(table.has_local_path("C:/data/img"));
        assert!(table.has_cloud_id("id-1"));
        assert_eq!(table.cloud_id("C:/data/img"), Some("id-1"));
        assert_eq!(table.local_path("id-1"), Some("C:/data/img"));
    }

    #[test]
    fn backslash_paths_collapse_to_one_key() {
        let mut table = ReferenceTable::new();
        assert!(table.add_reference("C:\\data\\img", "id-1"));

        assert!(table.has_local_path("C:/data/img"));
        assert_eq!(table.cloud_id("C:\\data\\img"), Some("id-1"));
        assert_eq!(table.local_path("id-1"), Some("C:/data/img"));

        assert!(!table.add_reference("C:/data/img", "id-2"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn collisions_are_rejected_without_mutation() {
        let mut table = ReferenceTable::new();
        assert!(table.add_reference("a", "1"));

        // Same pair again.
        assert!(!table.add_reference("a", "1"));
        // Local path already mapped elsewhere.
        assert!(!table.add_reference("a", "2"));
        // Cloud id already mapped elsewhere.
        assert!(!table.add_reference("b", "1"));

        assert_eq!(table.len(), 1);
        assert!(!table.has_cloud_id("2"));
        assert!(!table.has_local_path("b"));
    }

    #[test]
    fn misses_return_none() {
        let table = ReferenceTable::new();
        assert_eq!(table.cloud_id("nope"), None);
        assert_eq!(table.local_path("nope"), None);
        assert!(table.is_empty());
    }

    #[test]
    fn bijection_holds_after_every_insert() {
        let mut table = ReferenceTable::new();
        let pairs = [
            ("a", "1"),
            ("b", "2"),
            ("a", "3"),
            ("c", "2"),
            ("d\\e", "4"),
            ("d/e", "5"),
            ("f", "6"),
        ];

        for (local, cloud) in pairs {
            table.add_reference(local, cloud);
            for (l, c) in table.iter() {
                assert_eq!(table.cloud_id(l), Some(c));
                assert_eq!(table.local_path(c), Some(l));
            }
            assert_eq!(table.local_to_cloud.len(), table.cloud_to_local.len());
        }
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn remove_clears_both_directions() {
        let mut table = ReferenceTable::new();
        table.add_reference("x/y", "id");
        assert_eq!(table.remove_local_path("x\\y").as_deref(), Some("id"));
        assert!(!table.has_cloud_id("id"));
        assert!(table.add_reference("z", "id"));
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("refs.txt");

        let mut table = ReferenceTable::new();
        table.add_reference("C:\\scans\\day1", "id-1");
        table.add_reference("/mnt/data/day2", "id-2");
        table.add_reference("relative/dir", "id-3");
        table.save(&file).unwrap();

        let mut loaded = ReferenceTable::new();
        assert_eq!(loaded.load(&file).unwrap(), 3);
        assert_eq!(loaded, table);
        assert_eq!(loaded.cloud_id("C:/scans/day1"), Some("id-1"));
    }

    #[test]
    fn save_load_empty_table() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("empty.txt");

        ReferenceTable::new().save(&file).unwrap();
        let mut loaded = ReferenceTable::new();
        loaded.add_reference("stale", "entry");
        assert_eq!(loaded.load(&file).unwrap(), 0);
        assert!(loaded.is_empty());
    }

    #[test]
    fn load_replaces_instead_of_merging() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("refs.txt");
        std::fs::write(&file, "a,1\n").unwrap();

        let mut table = ReferenceTable::new();
        table.add_reference("old", "0");
        table.load(&file).unwrap();

        assert!(!table.has_local_path("old"));
        assert!(table.has_local_path("a"));
    }

    #[test]
    fn load_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("refs.txt");
        std::fs::write(&file, "a,1\r\nmissing-id\n,2\nb,\nc,3\nd,e,4\n\n").unwrap();

        let mut table = ReferenceTable::new();
        assert_eq!(table.load(&file).unwrap(), 2);
        assert_eq!(table.cloud_id("a"), Some("1"));
        assert_eq!(table.cloud_id("c"), Some("3"));
        assert!(!table.has_local_path("d"));
    }

    #[test]
    fn load_failure_leaves_table_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut table = ReferenceTable::new();
        table.add_reference("keep", "me");

        let result = table.load(&dir.path().join("missing.txt"));
        assert!(matches!(result, Err(ReferenceError::Io { .. })));
        assert_eq!(table.cloud_id("keep"), Some("me"));
    }

    #[test]
    fn save_to_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let table = ReferenceTable::new();
        let result = table.save(&dir.path().join("no/such/dir/refs.txt"));
        assert!(result.is_err());
    }
}
