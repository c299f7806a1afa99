//! File manager backend: blobs on disk, metadata in DuckDB.

use std::path::{Path, PathBuf};
use std::sync::{MutexGuard, PoisonError};

use duckdb::Connection;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::db::{service::DbService, DbPool, FileRecord};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database Error: {0}")]
    Db(#[from] duckdb::Error),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("Invalid file name: {0:?}")]
    InvalidName(String),
    #[error("Empty file")]
    Empty,
}

#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
    pool: DbPool,
    max_bytes: u64,
}

impl FileStore {
    pub fn open(config: &StorageConfig, pool: DbPool) -> Result<Self, StorageError> {
        let root = PathBuf::from(&config.upload_dir);
        std::fs::create_dir_all(&root)?;
        info!("File store rooted at {}", root.display());

        Ok(Self {
            root,
            pool,
            max_bytes: config.max_upload_bytes(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Stores `data` under a fresh key derived from `filename`.
    pub fn put(
        &self,
        filename: &str,
        content_type: Option<&str>,
        data: &[u8],
    ) -> Result<FileRecord, StorageError> {
        let size = data.len() as u64;
        if size == 0 {
            return Err(StorageError::Empty);
        }
        if size > self.max_bytes {
            return Err(StorageError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        let pathname = base_name(filename)?;
        let key = format!("{}-{}", Uuid::new_v4(), sanitize(&pathname));
        let blob_path = self.root.join(&key);
        std::fs::write(&blob_path, data)?;

        let content_type = content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        let inserted =
            DbService::insert_file(&self.conn(), &key, &pathname, content_type, size as i64);
        match inserted {
            Ok(record) => {
                info!("Stored {} ({} bytes) as {}", record.pathname, size, record.key);
                Ok(record)
            }
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_file(&blob_path) {
                    warn!("Failed to remove orphaned blob {}: {}", blob_path.display(), cleanup);
                }
                Err(e.into())
            }
        }
    }

    /// Newest uploads first.
    pub fn list(&self, limit: usize, offset: usize) -> Result<Vec<FileRecord>, StorageError> {
        let conn = self.conn();
        Ok(DbService::list_files(&conn, limit, offset)?)
    }

    pub fn get(&self, key: &str) -> Result<Option<FileRecord>, StorageError> {
        let conn = self.conn();
        Ok(DbService::get_file(&conn, key)?)
    }

    /// Removes the record and its blob. Returns `false` for an unknown key.
    pub fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let removed = {
            let conn = self.conn();
            DbService::delete_file(&conn, key)?
        };
        if !removed {
            return Ok(false);
        }

        // Keys are generated by `put`, but never trust one to stay in the root.
        if key.contains('/') || key.contains('\\') || key.starts_with('.') {
            warn!("Refusing to remove blob for suspicious key {:?}", key);
            return Ok(true);
        }

        match std::fs::remove_file(self.root.join(key)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Blob for {} was already gone", key);
            }
            Err(e) => return Err(e.into()),
        }
        info!("Deleted file {}", key);
        Ok(true)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Last path component of an uploaded name, as browsers may send full paths.
fn base_name(filename: &str) -> Result<String, StorageError> {
    let name = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(StorageError::InvalidName(filename.to_string()));
    }
    Ok(name.to_string())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
