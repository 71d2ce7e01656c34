use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::rating_store::{RatingSnapshot, SNAPSHOT_VERSION};

/// Where rating snapshots live between runs. `load` returns `None` when there
/// is nothing usable to resume from.
pub trait SnapshotStore {
    fn load(&self) -> Result<Option<RatingSnapshot>>;
    fn save(&self, snapshot: &RatingSnapshot) -> Result<()>;
}

pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn load(&self) -> Result<Option<RatingSnapshot>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("read snapshot {}", self.path.display()));
            }
        };
        let snapshot: RatingSnapshot = serde_json::from_str(&raw)
            .with_context(|| format!("parse snapshot {}", self.path.display()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            warn!(
                path = %self.path.display(),
                found = snapshot.version,
                expected = SNAPSHOT_VERSION,
                "ignoring snapshot with other version"
            );
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &RatingSnapshot) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
        }
        let json = serde_json::to_string(snapshot).context("serialize snapshot")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), self.path.display()))?;
        debug!(path = %self.path.display(), competitors = snapshot.ratings.len(), "snapshot saved");
        Ok(())
    }
}
