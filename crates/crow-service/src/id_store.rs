//! Persists a service's stable id across restarts (spec §4.4, §6.5): one
//! line containing the service-id, written atomically via temp-file +
//! rename so a crash mid-write never leaves a half-written file.

use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct IdStore {
    path: PathBuf,
}

impl IdStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads the persisted id. A missing file is not an error — the
    /// service joins without a prior id and the registrar mints one.
    pub fn load(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let id = contents.trim();
                if id.is_empty() {
                    None
                } else {
                    Some(id.to_string())
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read id store");
                None
            }
        }
    }

    /// Writes `id` atomically. Per spec §4.4's ordering contract, write
    /// failures do not un-join the service — callers log and continue.
    pub fn save(&self, id: &str) -> std::io::Result<()> {
        let tmp_path = tmp_path_for(&self.path);
        {
            let mut tmp = std::fs::File::create(&tmp_path)?;
            tmp.write_all(id.as_bytes())?;
            tmp.write_all(b"\n")?;
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdStore::new(dir.path().join("service-id"));
        assert_eq!(store.load(), None);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdStore::new(dir.path().join("service-id"));
        store.save("svc-42").unwrap();
        assert_eq!(store.load(), Some("svc-42".to_string()));
    }

    #[test]
    fn save_overwrites_previous_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdStore::new(dir.path().join("service-id"));
        store.save("first").unwrap();
        store.save("second").unwrap();
        assert_eq!(store.load(), Some("second".to_string()));
    }
}
