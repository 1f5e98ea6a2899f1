// This module manages the working output directory of one instrumentation run. The driver
// creates the directory exactly once at startup next to the source IR file and refuses to
// reuse an existing one, so a run never overwrites earlier results. Every artifact the
// pipeline produces (indexed IR, profiling IR, fault-injection IR, object files and
// executables) lives inside it, which makes it the only shared resource mutated during a
// run. The session also owns cleanup: discarding the whole directory when configuration or
// IR instrumentation fails, and removing intermediate object files after the build phase.

//! Working directory management for an instrumentation run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::error::{DriverError, DriverResult};

/// Default directory name created next to the source IR file.
pub const DEFAULT_OUTPUT_DIR: &str = "llfi";

/// The working output directory of a single run.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create `<parent>/<name>`, failing if it already exists.
    pub fn create(parent: &Path, name: &str) -> DriverResult<Self> {
        let name = name.trim_end_matches('/');
        if name.is_empty() || name == "." || name == ".." {
            return Err(DriverError::InvalidOutputDir {
                name: name.to_string(),
                reason: "not a directory name",
            });
        }
        if name.contains('/') {
            return Err(DriverError::InvalidOutputDir {
                name: name.to_string(),
                reason: "cannot specify embedded directories",
            });
        }

        let root = parent.join(name);
        match fs::create_dir(&root) {
            Ok(()) => {
                log::debug!("Created output directory {}", root.display());
                Ok(Self { root })
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(DriverError::OutputDirExists {
                    name: name.to_string(),
                    parent: parent.to_path_buf(),
                })
            }
            Err(err) => Err(DriverError::io(root, err)),
        }
    }

    /// Path of the working directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of an artifact inside the working directory.
    pub fn artifact(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Remove the working directory and everything in it.
    pub fn discard(&self) {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => log::debug!("Removed output directory {}", self.root.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => log::warn!(
                "Failed to remove output directory {}: {}",
                self.root.display(),
                err
            ),
        }
    }

    /// Remove intermediate files, ignoring ones that were never produced.
    pub fn remove_files(&self, files: &[PathBuf]) {
        for file in files {
            match fs::remove_file(file) {
                Ok(()) => log::debug!("Removed {}", file.display()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => log::warn!("Failed to remove {}: {}", file.display(), err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_refuses_existing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let first = Workspace::create(tmp.path(), "llfi").unwrap();
        assert!(first.root().is_dir());

        let err = Workspace::create(tmp.path(), "llfi").unwrap_err();
        assert!(matches!(err, DriverError::OutputDirExists { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_create_rejects_embedded_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Workspace::create(tmp.path(), "a/b").unwrap_err();
        assert!(matches!(err, DriverError::InvalidOutputDir { .. }));
        assert!(!tmp.path().join("a").exists());
    }

    #[test]
    fn test_trailing_slash_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::create(tmp.path(), "out/").unwrap();
        assert_eq!(ws.root(), tmp.path().join("out"));
    }

    #[test]
    fn test_discard_and_remove_files() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::create(tmp.path(), "llfi").unwrap();
        let keep = ws.artifact("prog-profiling.bc");
        let object = ws.artifact("prog-profiling.o");
        fs::write(&keep, b"ir").unwrap();
        fs::write(&object, b"obj").unwrap();

        ws.remove_files(&[object.clone(), ws.artifact("never-written.o")]);
        assert!(keep.exists());
        assert!(!object.exists());

        ws.discard();
        assert!(!ws.root().exists());
        // Discarding twice is harmless.
        ws.discard();
    }
}
