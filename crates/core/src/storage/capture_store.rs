use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::storage::naming;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to list {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid folder name: {0:?}")]
    InvalidFolder(String),
}

/// On-disk layout of captured frames: one subdirectory per output folder
/// under a single root, each holding the frames captured while it was
/// current.
pub struct CaptureStore {
    root: PathBuf,
}

impl CaptureStore {
    /// Opens the store at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::CreateDir {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates (or reuses) the folder named after `now` and returns its id.
    pub fn create_folder(&self, now: &DateTime<Local>) -> Result<String, StorageError> {
        let folder = naming::folder_name(now);
        let path = self.root.join(&folder);
        fs::create_dir_all(&path).map_err(|source| StorageError::CreateDir {
            path: path.clone(),
            source,
        })?;
        log::info!("Created capture folder {}", path.display());
        Ok(folder)
    }

    pub fn folder_path(&self, folder: &str) -> Result<PathBuf, StorageError> {
        check_component(folder)?;
        Ok(self.root.join(folder))
    }

    pub fn frame_path(&self, folder: &str, filename: &str) -> Result<PathBuf, StorageError> {
        check_component(filename)?;
        Ok(self.folder_path(folder)?.join(filename))
    }

    /// All capture folders, newest first.
    pub fn list_folders(&self) -> Result<Vec<String>, StorageError> {
        let mut folders = self.list_entries(&self.root, |path| path.is_dir())?;
        folders.sort_unstable_by(|a, b| b.cmp(a));
        Ok(folders)
    }

    /// Image files in `folder`, oldest first. A missing folder yields an
    /// empty list.
    pub fn list_images(&self, folder: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.folder_path(folder)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut images = self.list_entries(&dir, |path| path.is_file() && is_image(path))?;
        images.sort_unstable();
        Ok(images)
    }

    fn list_entries(
        &self,
        dir: &Path,
        keep: impl Fn(&Path) -> bool,
    ) -> Result<Vec<String>, StorageError> {
        let list_error = |source| StorageError::List {
            path: dir.to_path_buf(),
            source,
        };
        let mut names = Vec::new();
        for entry in fs::read_dir(dir).map_err(list_error)? {
            let path = entry.map_err(list_error)?.path();
            if !keep(&path) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Folder ids and file names come from callers; keep them inside the root.
fn check_component(name: &str) -> Result<(), StorageError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if bad {
        return Err(StorageError::InvalidFolder(name.to_string()));
    }
    Ok(())
}
