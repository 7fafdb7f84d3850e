//! The server filesystem, as seen through the file-management capability.

use std::{
    fs, io,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{path} does not exist")]
    NotFound { path: String },
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{path} escapes the server root")]
    OutsideRoot { path: String },
}

impl StoreError {
    fn from_io(path: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            StoreError::NotFound {
                path: path.to_string(),
            }
        } else {
            StoreError::Io {
                path: path.to_string(),
                source,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_file: bool,
    pub size: u64,
}

/// Paths are relative to the server root and use `/` separators.
pub trait FileStore: Send + Sync {
    fn get_content(&self, path: &str) -> Result<Vec<u8>, StoreError>;
    fn put_content(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError>;
    fn get_directory(&self, path: &str) -> Result<Vec<DirEntry>, StoreError>;
    fn delete_files(&self, dir: &str, names: &[String]) -> Result<(), StoreError>;
    fn create_directory(&self, path: &str) -> Result<(), StoreError>;
}

/// A server directory on local disk.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(StoreError::OutsideRoot {
                        path: path.to_string(),
                    })
                }
            }
        }
        Ok(resolved)
    }
}

impl FileStore for LocalFileStore {
    fn get_content(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let full = self.resolve(path)?;
        fs::read(&full).map_err(|err| StoreError::from_io(path, err))
    }

    fn put_content(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|err| StoreError::from_io(path, err))?;
        }
        fs::write(&full, bytes).map_err(|err| StoreError::from_io(path, err))
    }

    fn get_directory(&self, path: &str) -> Result<Vec<DirEntry>, StoreError> {
        let full = self.resolve(path)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&full).map_err(|err| StoreError::from_io(path, err))? {
            let entry = entry.map_err(|err| StoreError::from_io(path, err))?;
            let metadata = entry
                .metadata()
                .map_err(|err| StoreError::from_io(path, err))?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_file: metadata.is_file(),
                size: metadata.len(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn delete_files(&self, dir: &str, names: &[String]) -> Result<(), StoreError> {
        for name in names {
            let relative = format!("{}/{}", dir.trim_end_matches('/'), name);
            let full = self.resolve(&relative)?;
            fs::remove_file(&full).map_err(|err| StoreError::from_io(&relative, err))?;
        }
        Ok(())
    }

    fn create_directory(&self, path: &str) -> Result<(), StoreError> {
        let full = self.resolve(path)?;
        fs::create_dir_all(&full).map_err(|err| StoreError::from_io(path, err))
    }
}
