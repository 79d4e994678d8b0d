//! JSON document store holding the settings, media and user collections.

use crate::catalog::{MediaCatalog, MediaFilter, MediaItem, filter_items};
use crate::settings::{Settings, SettingsPatch, current_user_name};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} is unavailable")]
    Unavailable(String),
}

pub trait SettingsStore: Send + Sync {
    fn get_settings(&self) -> Result<Option<Settings>, StoreError>;

    /// Merge `patch` onto the stored record (inserting one if absent) and
    /// flush before returning the merged record.
    fn update_settings(&self, patch: &SettingsPatch) -> Result<Settings, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserProfile {
    pub username: String,
    pub timezone: String,
    pub sessions: u32,
    #[serde(rename = "CDUs")]
    pub cdus: u32,
    #[serde(rename = "NEC")]
    pub nec: u32,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    fn first_run() -> Self {
        Self {
            username: current_user_name(),
            timezone: local_timezone(),
            sessions: 1,
            cdus: 0,
            nec: 0,
            created_at: Utc::now(),
        }
    }
}

const FALLBACK_TIMEZONE: &str = "EST";

/// IANA name of the local zone, e.g. `Europe/Berlin`.
fn local_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|err| {
        debug!(error = %err, "local timezone unknown");
        FALLBACK_TIMEZONE.to_string()
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Database {
    #[serde(default)]
    settings: Vec<Settings>,
    #[serde(default)]
    media: Vec<MediaItem>,
    #[serde(default)]
    users: Vec<UserProfile>,
}

#[derive(Debug)]
pub struct DocumentStore {
    path: Option<PathBuf>,
    db: Mutex<Database>,
}

impl DocumentStore {
    /// Open (or create) the database file and fill in first-run records.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let db = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Database::default(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let store = Self {
            path: Some(path),
            db: Mutex::new(db),
        };
        store.initialize()?;
        Ok(store)
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        let store = Self {
            path: None,
            db: Mutex::new(Database::default()),
        };
        // in-memory flushes cannot fail
        let _ = store.initialize();
        store
    }

    fn initialize(&self) -> Result<(), StoreError> {
        let mut db = self.lock();
        let mut changed = false;

        if db.users.is_empty() {
            db.users.push(UserProfile::first_run());
            info!("user collection initialized");
            changed = true;
        }
        if db.settings.is_empty() {
            db.settings.push(Settings::first_run(current_user_name()));
            info!("settings collection initialized");
            changed = true;
        }

        if changed {
            self.flush(&db)?;
        }
        Ok(())
    }

    /// Insert scanned media only when the catalog is still empty. Returns the
    /// number of inserted items.
    pub fn seed_media(&self, items: Vec<MediaItem>) -> Result<usize, StoreError> {
        let mut db = self.lock();
        if !db.media.is_empty() {
            debug!(existing = db.media.len(), "media catalog already seeded");
            return Ok(0);
        }
        let count = items.len();
        db.media = items;
        self.flush(&db)?;
        info!(count, "inserted media items");
        Ok(count)
    }

    /// Rebuild the catalog from `items`.
    pub fn replace_media(&self, items: Vec<MediaItem>) -> Result<usize, StoreError> {
        let mut db = self.lock();
        let count = items.len();
        db.media = items;
        self.flush(&db)?;
        info!(count, "replaced media catalog");
        Ok(count)
    }

    pub fn media_count(&self) -> usize {
        self.lock().media.len()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.lock().users.first().cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Database> {
        // The database is plain data; a panic mid-update cannot leave it torn.
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn flush(&self, db: &Database) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let bytes = serde_json::to_vec_pretty(db).map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }
}

impl SettingsStore for DocumentStore {
    fn get_settings(&self) -> Result<Option<Settings>, StoreError> {
        Ok(self.lock().settings.first().cloned())
    }

    fn update_settings(&self, patch: &SettingsPatch) -> Result<Settings, StoreError> {
        let mut db = self.lock();
        let merged = match db.settings.first_mut() {
            Some(current) => {
                current.apply(patch);
                current.clone()
            }
            None => {
                let mut fresh = Settings::first_run(current_user_name());
                fresh.apply(patch);
                db.settings.push(fresh.clone());
                fresh
            }
        };
        self.flush(&db)?;
        debug!(?merged, "settings updated");
        Ok(merged)
    }
}

impl MediaCatalog for DocumentStore {
    fn find(&self, filter: &MediaFilter) -> Result<Vec<MediaItem>, StoreError> {
        Ok(filter_items(&self.lock().media, filter))
    }
}
