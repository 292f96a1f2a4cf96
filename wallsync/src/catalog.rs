use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{Result, WallError};

/// Source of playable media. The coordinator only ever goes through this seam.
pub trait MediaCatalog: Send + Sync {
    fn list_filenames(&self) -> Result<Vec<String>>;

    fn resolve(&self, filename: &str) -> Result<PathBuf>;

    /// Bring local media in line with `remote_paths`. Returns the number of files copied.
    fn sync(&self, remote_paths: &[PathBuf]) -> Result<usize>;
}

/// Catalog backed by a flat media directory.
pub struct DirCatalog {
    root: PathBuf,
}

impl DirCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn needs_copy(remote: &Path, local: &Path) -> std::io::Result<bool> {
        let local_meta = match fs::metadata(local) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e),
        };
        Ok(fs::metadata(remote)?.len() != local_meta.len())
    }
}

impl MediaCatalog for DirCatalog {
    fn list_filenames(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn resolve(&self, filename: &str) -> Result<PathBuf> {
        let plain = !filename.is_empty()
            && filename != "."
            && filename != ".."
            && !filename.contains(['/', '\\']);
        if !plain {
            return Err(WallError::NotFound(filename.to_string()));
        }

        let path = self.root.join(filename);
        if path.is_file() {
            Ok(path)
        } else {
            Err(WallError::NotFound(filename.to_string()))
        }
    }

    fn sync(&self, remote_paths: &[PathBuf]) -> Result<usize> {
        fs::create_dir_all(&self.root)
            .map_err(|e| WallError::SyncError(format!("{}: {e}", self.root.display())))?;

        let mut copied = 0;
        for remote in remote_paths {
            let name = remote.file_name().ok_or_else(|| {
                WallError::SyncError(format!("{}: not a file path", remote.display()))
            })?;
            let local = self.root.join(name);

            let copy = Self::needs_copy(remote, &local)
                .map_err(|e| WallError::SyncError(format!("{}: {e}", remote.display())))?;
            if !copy {
                debug!("{} already in sync", local.display());
                continue;
            }

            fs::copy(remote, &local)
                .map_err(|e| WallError::SyncError(format!("{}: {e}", remote.display())))?;
            info!("Copied {} -> {}", remote.display(), local.display());
            copied += 1;
        }
        Ok(copied)
    }
}
