//! JSON snapshot of leader records.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rede_hierarchy::LeaderNode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_PATH: &str = "./rede-data/leaders.json";

#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Snapshot exists but could not be read.
    #[error("failed to read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },

    /// Snapshot directory, staging file or rename failed.
    #[error("failed to write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },

    /// Snapshot is not a valid leader list.
    #[error("invalid snapshot {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Records could not be encoded.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotFile {
    leaders: Vec<LeaderNode>,
}

/// Snapshot path from `REDE_SNAPSHOT`, or the default.
pub fn path_from_env() -> PathBuf {
    std::env::var("REDE_SNAPSHOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_PATH))
}

/// Read every record. A missing file is an empty hierarchy.
pub fn load(path: &Path) -> Result<Vec<LeaderNode>, SnapshotError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("No snapshot at {:?}, starting empty", path);
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(SnapshotError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let file: SnapshotFile = serde_json::from_slice(&data).map_err(|source| SnapshotError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Loaded {} leaders from {:?}", file.leaders.len(), path);
    Ok(file.leaders)
}

/// Write every record, replacing the file through a rename.
pub fn save(path: &Path, leaders: Vec<LeaderNode>) -> Result<(), SnapshotError> {
    let write_err = |source: io::Error| SnapshotError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(write_err)?;
    }

    let count = leaders.len();
    let json = serde_json::to_vec_pretty(&SnapshotFile { leaders })?;
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, json).map_err(write_err)?;
    fs::rename(&staging, path).map_err(write_err)?;

    debug!("Saved {} leaders to {:?}", count, path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempdir().unwrap();
        assert!(load(&dir.path().join("none.json")).unwrap().is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("leaders.json");

        let root = LeaderNode::coordinator("r", "Root").with_cadastros(2);
        let child = LeaderNode::new("a", "A").under(&root);
        save(&path, vec![root.clone(), child.clone()]).unwrap();

        assert_eq!(load(&path).unwrap(), vec![root, child]);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("leaders.json");
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(load(&path), Err(SnapshotError::Parse { .. })));
    }

    #[test]
    fn records_default_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("leaders.json");
        fs::write(&path, br#"{"leaders":[{"id":"x","name":"X"}]}"#).unwrap();

        let rows = load(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_active);
        assert_eq!(rows[0].parent_id, None);
    }
}
