//! Storage and timezone-registry ports.
//!
//! The engine never performs its own I/O: stored calendar objects and
//! timezone identifiers are resolved through these traits, which are the
//! only asynchronous seams of a query.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use almanac_rfc::rfc::ical::expand::{ConversionError, ZoneRef, resolve_iana};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

/// File extension of stored calendar objects.
const ICS_EXTENSION: &str = "ics";

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored object {name} is not valid UTF-8: {source}")]
    InvalidEncoding {
        name: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Read access to one calendar collection.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// Lists the names of every object in the collection.
    async fn list(&self) -> StoreResult<Vec<String>>;

    /// Fetches the raw iCalendar text of an object, `None` if absent.
    async fn get(&self, name: &str) -> StoreResult<Option<String>>;
}

/// Resolves `CALDAV:timezone-id` references.
#[async_trait]
pub trait TimezoneRegistry: Send + Sync {
    /// ## Summary
    /// Resolves a timezone identifier.
    ///
    /// ## Errors
    /// Returns `ConversionError::UnknownTimezone` if the identifier is not
    /// known to the registry.
    async fn resolve(&self, tzid: &str) -> Result<ZoneRef, ConversionError>;
}

/// Registry backed by the compiled-in IANA database.
///
/// Windows zone names and IANA aliases are normalized before lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChronoTzRegistry;

#[async_trait]
impl TimezoneRegistry for ChronoTzRegistry {
    async fn resolve(&self, tzid: &str) -> Result<ZoneRef, ConversionError> {
        resolve_iana(tzid)
    }
}

/// In-memory collection for tests and one-off evaluation.
///
/// Objects are kept in name order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    objects: Arc<RwLock<BTreeMap<String, String>>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` under `name`, replacing any previous object.
    pub async fn insert(&self, name: impl Into<String>, data: impl Into<String>) {
        let mut objects = self.objects.write().await;
        objects.insert(name.into(), data.into());
    }

    /// Removes an object. Returns whether it existed.
    pub async fn remove(&self, name: &str) -> bool {
        let mut objects = self.objects.write().await;
        objects.remove(name).is_some()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl CalendarStore for InMemoryStore {
    async fn list(&self) -> StoreResult<Vec<String>> {
        let objects = self.objects.read().await;
        Ok(objects.keys().cloned().collect())
    }

    async fn get(&self, name: &str) -> StoreResult<Option<String>> {
        let objects = self.objects.read().await;
        Ok(objects.get(name).cloned())
    }
}

/// A collection backed by a directory of `*.ics` files.
///
/// Object names are file names; subdirectories are ignored.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn io_error(&self, path: &std::path::Path, source: std::io::Error) -> StoreError {
        tracing::debug!(root = %self.root.display(), path = %path.display(), "Directory store I/O failure");
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl CalendarStore for DirectoryStore {
    async fn list(&self) -> StoreResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| self.io_error(&self.root, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| self.io_error(&self.root, e))?
        {
            let path = entry.path();
            let is_ics = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(ICS_EXTENSION));
            if !is_ics {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => {
                    tracing::warn!(name = ?raw, "Skipping object with non UTF-8 file name");
                }
            }
        }
        names.sort_unstable();
        Ok(names)
    }

    async fn get(&self, name: &str) -> StoreResult<Option<String>> {
        // Names are plain file names; anything that could escape the root is absent.
        if name.contains(['/', '\\']) || name == ".." {
            return Ok(None);
        }

        let path = self.root.join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|source| StoreError::InvalidEncoding {
                    name: name.to_string(),
                    source,
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(&path, e)),
        }
    }
}
