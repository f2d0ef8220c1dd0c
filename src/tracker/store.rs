use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::Signal;
use crate::tracker::TrackerError;

const SNAPSHOT_FILE: &str = "signals.json";
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    signals: Vec<Signal>,
}

/// Durable home of the signal table. The whole table is rewritten on every
/// mutation through a temp file and an atomic rename, so the file on disk
/// is always either the previous or the next complete snapshot. The temp
/// file is synced before the rename and the directory after it, so an
/// acknowledged write survives power loss. Closed rows are kept.
#[derive(Debug, Clone)]
pub struct SignalStore {
    path: Option<PathBuf>,
}

impl SignalStore {
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, TrackerError> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(SNAPSHOT_FILE);
        info!(path = %path.display(), "Signal store opened");
        Ok(Self { path: Some(path) })
    }

    /// Non-persistent store, for replays and tests.
    pub fn in_memory() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn load(&self) -> Result<HashMap<String, Signal>, TrackerError> {
        let path = match &self.path {
            Some(p) if p.exists() => p,
            _ => return Ok(HashMap::new()),
        };

        let content = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        debug!(
            version = snapshot.version,
            signals = snapshot.signals.len(),
            "Loaded signal snapshot"
        );
        Ok(snapshot
            .signals
            .into_iter()
            .map(|s| (s.signal_id.clone(), s))
            .collect())
    }

    pub fn save(&self, signals: &HashMap<String, Signal>) -> Result<(), TrackerError> {
        let path = match &self.path {
            Some(p) => p,
            None => return Ok(()),
        };

        let mut rows: Vec<Signal> = signals.values().cloned().collect();
        rows.sort_by(|a, b| {
            a.opened_at
                .cmp(&b.opened_at)
                .then_with(|| a.signal_id.cmp(&b.signal_id))
        });
        let json = serde_json::to_string_pretty(&Snapshot {
            version: SNAPSHOT_VERSION,
            signals: rows,
        })?;

        let tmp = path.with_extension("json.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path)?;
        sync_dir(path)?;
        Ok(())
    }
}

/// Makes the rename itself durable.
#[cfg(unix)]
fn sync_dir(path: &Path) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
