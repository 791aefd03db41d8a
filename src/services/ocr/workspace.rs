//! Scoped working directories for rendered page images.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

/// A uniquely named directory removed, with everything in it, on drop.
///
/// Removal runs on every exit path including errors and unwinding. Files that
/// cannot be deleted are logged and left behind; cleanup never fails the
/// surrounding operation.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

/// Create a fresh workspace under `parent`.
pub fn scoped_workspace(parent: &Path) -> io::Result<Workspace> {
    Workspace::create_in(parent)
}

impl Workspace {
    pub fn create_in(parent: &Path) -> io::Result<Self> {
        let created = fs::create_dir_all(parent).and_then(|()| {
            tempfile::Builder::new()
                .prefix("doctext-ocr-")
                .tempdir_in(parent)
        });
        let dir = created.map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("Failed to create workspace in '{}': {}", parent.display(), e),
            )
        })?;
        let path = dir.path().to_path_buf();
        debug!("Created OCR workspace {}", path.display());
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the rendered image for a page.
    pub fn page_path(&self, page_index: u32) -> PathBuf {
        self.path.join(format!("page_{}.png", page_index))
    }

    /// Delete entries one by one so each failure is reported with its path.
    fn remove_entries(&self) {
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!("Failed to list workspace {}: {}", self.path.display(), e);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            if let Err(e) = result {
                warn!("Failed to delete temporary file {}: {}", path.display(), e);
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        self.remove_entries();
        match dir.close() {
            Ok(()) => debug!("Removed OCR workspace {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to delete temporary directory {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}
