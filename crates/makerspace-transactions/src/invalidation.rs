//! Tag-based invalidation.
//!
//! Opt-in. Reads declare tags and register themselves; a write that names
//! the same tags refreshes every live registered read after it succeeds.
//! Without a registry, related reads must be refreshed by hand.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::debug;

/// Label shared by reads and the writes that invalidate them
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Tag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Something that can be re-fetched on demand
pub trait Refresh: Send + Sync {
    /// Re-issue the call. Returns whether a new call actually started.
    fn refresh(&self) -> bool;
}

/// Registry of live reads by tag. Holds weak references only, so a dropped
/// read handle unregisters itself.
#[derive(Clone, Default)]
pub struct InvalidationRegistry {
    entries: Arc<Mutex<HashMap<Tag, Vec<Weak<dyn Refresh>>>>>,
}

impl fmt::Debug for InvalidationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationRegistry")
            .field("tags", &self.lock().len())
            .finish()
    }
}

impl InvalidationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Tag, Vec<Weak<dyn Refresh>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, tags: &[Tag], refresher: &Arc<dyn Refresh>) {
        let mut entries = self.lock();
        for tag in tags {
            entries
                .entry(tag.clone())
                .or_default()
                .push(Arc::downgrade(refresher));
        }
    }

    /// Refresh every live read registered under any of `tags`. A read
    /// registered under several of them is refreshed once. Returns the
    /// number of calls actually started.
    pub fn invalidate(&self, tags: &[Tag]) -> usize {
        let targets: Vec<Arc<dyn Refresh>> = {
            let mut entries = self.lock();
            let mut seen = HashSet::new();
            let mut targets = Vec::new();
            for tag in tags {
                let Some(registered) = entries.get_mut(tag) else {
                    continue;
                };
                registered.retain(|weak| weak.strong_count() > 0);
                for weak in registered.iter() {
                    if let Some(target) = weak.upgrade() {
                        if seen.insert(Arc::as_ptr(&target) as *const ()) {
                            targets.push(target);
                        }
                    }
                }
            }
            entries.retain(|_, registered| !registered.is_empty());
            targets
        };

        // refresh outside the lock, refreshers touch the store
        let started = targets.iter().filter(|target| target.refresh()).count();
        debug!(
            tags = ?tags,
            matched = targets.len(),
            started,
            "invalidated tagged reads"
        );
        started
    }

    /// Number of live registrations across all tags
    pub fn live_registrations(&self) -> usize {
        self.lock()
            .values()
            .flat_map(|registered| registered.iter())
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
