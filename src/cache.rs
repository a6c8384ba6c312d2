//! Content cache: generated documents keyed by opaque handles
//!
//! The server stores each generated document here and hands the handle to
//! the client; a later download or preview resolves the handle back to the
//! exact markup that was generated.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, GeneratedDocument, Result};

/// Opaque identifier for a cached document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHandle(Uuid);

impl ContentHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContentHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ContentHandle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(ContentHandle)
            .map_err(|_| Error::MissingInput(format!("Unknown content id: {}", s)))
    }
}

/// Key-value store for generated documents.
///
/// Implementations must be safe to share between request handlers.
pub trait ContentStore: Send + Sync {
    /// Store a document under a fresh handle
    fn put(&self, document: GeneratedDocument) -> ContentHandle;

    fn get(&self, handle: &ContentHandle) -> Option<GeneratedDocument>;

    /// Remove one entry; returns whether it existed
    fn delete(&self, handle: &ContentHandle) -> bool;

    /// Remove every entry and return how many were removed
    fn clear(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process store. Unbounded; entries live until deleted or cleared.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    entries: Mutex<HashMap<ContentHandle, GeneratedDocument>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ContentHandle, GeneratedDocument>> {
        // A panic while holding the lock cannot leave the map half-updated
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ContentStore for MemoryContentStore {
    fn put(&self, document: GeneratedDocument) -> ContentHandle {
        let handle = ContentHandle::new();
        self.entries().insert(handle, document);
        debug!("Stored content {}", handle);
        handle
    }

    fn get(&self, handle: &ContentHandle) -> Option<GeneratedDocument> {
        self.entries().get(handle).cloned()
    }

    fn delete(&self, handle: &ContentHandle) -> bool {
        self.entries().remove(handle).is_some()
    }

    fn clear(&self) -> usize {
        let mut entries = self.entries();
        let count = entries.len();
        entries.clear();
        count
    }

    fn len(&self) -> usize {
        self.entries().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn put_get_delete() {
        let store = MemoryContentStore::new();
        let doc = GeneratedDocument::new("<html>one</html>");
        let handle = store.put(doc.clone());

        assert_eq!(store.get(&handle), Some(doc));
        assert!(store.delete(&handle));
        assert!(!store.delete(&handle));
        assert_eq!(store.get(&handle), None);
    }

    #[test]
    fn clear_reports_count() {
        let store = MemoryContentStore::new();
        for i in 0..3 {
            store.put(GeneratedDocument::new(format!("<p>{}</p>", i)));
        }
        assert_eq!(store.clear(), 3);
        assert!(store.is_empty());
        assert_eq!(store.clear(), 0);
    }

    #[test]
    fn handles_round_trip_through_text() {
        let handle = ContentHandle::new();
        let parsed: ContentHandle = handle.to_string().parse().unwrap();
        assert_eq!(parsed, handle);
        assert!("not-a-handle".parse::<ContentHandle>().is_err());
    }

    #[test]
    fn concurrent_puts_get_distinct_handles() {
        let store = Arc::new(MemoryContentStore::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.put(GeneratedDocument::new(format!("<p>{}</p>", i))))
            })
            .collect();
        let handles: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();

        assert_eq!(store.len(), 8);
        for (i, handle) in handles.iter().enumerate() {
            assert_eq!(store.get(handle).unwrap().as_str(), format!("<p>{}</p>", i));
        }
    }
}
