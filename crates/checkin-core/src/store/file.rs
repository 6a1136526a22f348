// # File Record Store
//
// File-based implementation of RecordStore with crash recovery.
//
// ## Purpose
//
// Keeps every subscriber record in one human-readable JSON file so the data
// survives restarts and can be inspected or backed up by hand.
//
// ## Crash Recovery
//
// - Atomic writes: full mapping written to `<file>.tmp`, fsynced, then renamed
// - Automatic backup: previous committed file kept as `<file>.backup`
// - Corruption detection: JSON validated on every load
// - Recovery: falls back to the backup if the live file does not parse
//
// A crash before the rename leaves the old file untouched; the stray `.tmp`
// is simply overwritten by the next commit.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "subscribers": {
//     "1b4e28ba-2fa1-11d2-883f-0016d3cca427": {
//       "contact_ciphertext": "9f2c...:a81e...",
//       "display_name": "Ada",
//       "interval_days": 2,
//       "next_due_at": "2025-01-11T10:00:00Z",
//       "created_at": "2025-01-09T10:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::traits::record_store::{RecordStore, SubscriberMap};

/// Store file format version
/// Used for future migration if format changes
const STORE_FILE_VERSION: &str = "1.0";

/// File-based record store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use checkin_core::store::FileRecordStore;
/// use checkin_core::traits::RecordStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileRecordStore::open("/var/lib/checkin/users.json").await?;
///
///     let subscribers = store.load().await?;
///     store.save(&subscribers).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    /// Serializes access to the file, temp file and backup
    io_lock: Mutex<()>,
}

/// Serializable store file format (write side)
#[derive(Debug, serde::Serialize)]
struct StoreFileRef<'a> {
    version: &'a str,
    subscribers: &'a SubscriberMap,
}

/// Serializable store file format (read side)
#[derive(Debug, serde::Deserialize)]
struct StoreFile {
    version: String,
    #[serde(default)]
    subscribers: SubscriberMap,
}

/// Why a read of one file failed
enum ReadFailure {
    /// Could not read the bytes
    Io(Error),
    /// Bytes were read but are not a valid store file
    Corrupt(Error),
}

impl FileRecordStore {
    /// Open a file record store, creating it if needed
    ///
    /// This will:
    /// 1. Create parent directories if they do not exist
    /// 2. Initialize the file to an empty mapping if it does not exist
    ///
    /// An existing file is left untouched; it is validated on first `load`.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::store_io(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let store = Self {
            path,
            io_lock: Mutex::new(()),
        };

        if !store.path.exists() {
            tracing::info!(
                "Store file {} does not exist, initializing empty store",
                store.path.display()
            );
            let _guard = store.io_lock.lock().await;
            store.write_file(&SubscriberMap::new()).await?;
        }

        Ok(store)
    }

    /// Load the live file, falling back to the backup if it is corrupt
    ///
    /// Recovery strategy:
    /// 1. Try to load the live file (missing file loads as empty)
    /// 2. If it does not parse, load the backup and restore the live file from it
    /// 3. If the backup is missing or also corrupt, fail rather than start empty
    async fn load_with_recovery(&self) -> Result<SubscriberMap> {
        let corruption = match Self::read_file(&self.path).await {
            Ok(Some(subscribers)) => {
                tracing::debug!("Loaded store file: {} subscribers", subscribers.len());
                return Ok(subscribers);
            }
            Ok(None) => {
                tracing::debug!("Store file does not exist: {}", self.path.display());
                return Ok(SubscriberMap::new());
            }
            Err(ReadFailure::Io(e)) => return Err(e),
            Err(ReadFailure::Corrupt(e)) => e,
        };

        tracing::warn!(
            "Store file appears corrupted: {}. Attempting recovery from backup.",
            corruption
        );

        let backup_path = self.backup_path();
        match Self::read_file(&backup_path).await {
            Ok(Some(subscribers)) => {
                tracing::info!(
                    "Recovered store from backup: {} subscribers",
                    subscribers.len()
                );

                if let Err(restore_err) = fs::copy(&backup_path, &self.path).await {
                    tracing::error!("Failed to restore store file from backup: {}", restore_err);
                }

                Ok(subscribers)
            }
            Ok(None) => Err(Error::store_io(format!(
                "Store file {} is corrupted and no backup exists: {}",
                self.path.display(),
                corruption
            ))),
            Err(ReadFailure::Io(e)) | Err(ReadFailure::Corrupt(e)) => {
                Err(Error::store_io(format!(
                    "Store file {} is corrupted ({}) and backup is unusable ({})",
                    self.path.display(),
                    corruption,
                    e
                )))
            }
        }
    }

    /// Read and parse one store file
    ///
    /// `Ok(None)` means the file does not exist.
    async fn read_file(path: &Path) -> std::result::Result<Option<SubscriberMap>, ReadFailure> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ReadFailure::Io(Error::store_io(format!(
                    "Failed to read store file {}: {}",
                    path.display(),
                    e
                ))));
            }
        };

        let file: StoreFile = serde_json::from_str(&content).map_err(|e| {
            ReadFailure::Corrupt(Error::store_io(format!(
                "Failed to parse store file {}: {}",
                path.display(),
                e
            )))
        })?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(Some(file.subscribers))
    }

    /// Write the mapping atomically
    ///
    /// Caller must hold `io_lock`.
    async fn write_file(&self, subscribers: &SubscriberMap) -> Result<()> {
        let json = serde_json::to_string_pretty(&StoreFileRef {
            version: STORE_FILE_VERSION,
            subscribers,
        })
        .map_err(|e| Error::store_io(format!("Failed to serialize store: {}", e)))?;

        // Write to temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store_io(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store_io(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::store_io(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Keep the last committed file as backup
        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, self.backup_path()).await
        {
            tracing::warn!("Failed to create backup: {}", e);
        }

        // Atomic rename (temp -> live)
        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store_io(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!(
            "Committed {} subscribers to {}",
            subscribers.len(),
            self.path.display()
        );
        Ok(())
    }

    fn sibling_path(&self, suffix: &str) -> PathBuf {
        let mut name: OsString = self.path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        self.sibling_path(".tmp")
    }

    /// Get path to backup file
    fn backup_path(&self) -> PathBuf {
        self.sibling_path(".backup")
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn load(&self) -> Result<SubscriberMap> {
        let _guard = self.io_lock.lock().await;
        self.load_with_recovery().await
    }

    async fn save(&self, subscribers: &SubscriberMap) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        self.write_file(subscribers).await
    }

    fn store_name(&self) -> &'static str {
        "file"
    }
}
