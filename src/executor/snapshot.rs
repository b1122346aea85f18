//! Pre-action snapshot and restore (spec §3 Snapshot, §4.2 step 2):
//! scoped to a single Executor step, sufficient to undo a `rollback`
//! action or an auto-rollback on patch syntax regression.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// `None` means the file didn't exist before the step (so restore
/// removes it); `Some(content)` captures what to write back.
#[derive(Debug, Default)]
pub struct Snapshot {
    files: HashMap<PathBuf, Option<String>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture `path`'s current content relative to `root`, if not
    /// already captured this step (first capture wins — later captures
    /// of the same path within a step must not overwrite the pre-step
    /// baseline).
    pub fn capture(&mut self, root: &Path, relative_path: &str) -> std::io::Result<()> {
        let full = root.join(relative_path);
        if self.files.contains_key(&full) {
            return Ok(());
        }
        let content = match std::fs::read_to_string(&full) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };
        self.files.insert(full, content);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Restore every captured path to its pre-step state: write back
    /// captured content, or remove the file if it didn't previously exist.
    pub fn restore(&self) -> std::io::Result<()> {
        for (path, content) in &self.files {
            match content {
                Some(content) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(path, content)?;
                }
                None => {
                    if path.exists() {
                        std::fs::remove_file(path)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn restore_reverts_a_modified_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "original").unwrap();

        let mut snapshot = Snapshot::new();
        snapshot.capture(dir.path(), "a.py").unwrap();
        std::fs::write(dir.path().join("a.py"), "modified").unwrap();

        snapshot.restore().unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("a.py")).unwrap(), "original");
    }

    #[test]
    fn restore_removes_a_newly_created_file() {
        let dir = tempdir().unwrap();

        let mut snapshot = Snapshot::new();
        snapshot.capture(dir.path(), "new.py").unwrap();
        std::fs::write(dir.path().join("new.py"), "brand new").unwrap();

        snapshot.restore().unwrap();
        assert!(!dir.path().join("new.py").exists());
    }

    #[test]
    fn first_capture_wins_within_a_step() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "v1").unwrap();

        let mut snapshot = Snapshot::new();
        snapshot.capture(dir.path(), "a.py").unwrap();
        std::fs::write(dir.path().join("a.py"), "v2").unwrap();
        snapshot.capture(dir.path(), "a.py").unwrap();

        snapshot.restore().unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("a.py")).unwrap(), "v1");
    }
}
