//! Keyed Transaction Store
//!
//! Single source of truth for read transaction state. Each cache key maps to
//! a [`TransactionEntry`]. State only changes through three transitions
//! ([`TransactionEvent::Start`], [`TransactionEvent::Success`],
//! [`TransactionEvent::Failure`]) applied by the pure [`reduce`] function
//! under one lock acquisition, so every transition is atomic.
//!
//! Entries are created lazily and never evicted; the store lives as long as
//! the client session.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::key::CacheKey;

/// Type-erased payload held by the store
pub type SharedData = Arc<dyn Any + Send + Sync>;

//-----------------------------------------------------------------------------
// Entries
//-----------------------------------------------------------------------------

/// `{ is_requesting, data, error }` for one cache key.
///
/// While a call is in flight, `data` and `error` from the previous call stay
/// visible (stale-while-revalidate).
#[derive(Clone)]
pub struct TransactionEntry<T = SharedData> {
    pub is_requesting: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> Default for TransactionEntry<T> {
    fn default() -> Self {
        Self {
            is_requesting: false,
            data: None,
            error: None,
        }
    }
}

impl<T> fmt::Debug for TransactionEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionEntry")
            .field("is_requesting", &self.is_requesting)
            .field("has_data", &self.data.is_some())
            .field("error", &self.error)
            .finish()
    }
}

impl TransactionEntry<SharedData> {
    /// View the payload as `T`. A payload of another type reads as absent.
    pub fn downcast<T: Any + Send + Sync>(&self) -> TransactionEntry<Arc<T>> {
        TransactionEntry {
            is_requesting: self.is_requesting,
            data: self
                .data
                .clone()
                .and_then(|data| data.downcast::<T>().ok()),
            error: self.error.clone(),
        }
    }
}

//-----------------------------------------------------------------------------
// Transitions
//-----------------------------------------------------------------------------

#[derive(Clone)]
pub enum TransactionEvent {
    Start { key: CacheKey },
    Success { key: CacheKey, data: SharedData },
    Failure { key: CacheKey, error: String },
}

impl TransactionEvent {
    pub fn key(&self) -> &CacheKey {
        match self {
            TransactionEvent::Start { key }
            | TransactionEvent::Success { key, .. }
            | TransactionEvent::Failure { key, .. } => key,
        }
    }

    pub fn kind(&self) -> TransitionKind {
        match self {
            TransactionEvent::Start { .. } => TransitionKind::Start,
            TransactionEvent::Success { .. } => TransitionKind::Success,
            TransactionEvent::Failure { .. } => TransitionKind::Failure,
        }
    }
}

impl fmt::Debug for TransactionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionEvent::Start { key } => f.debug_struct("Start").field("key", key).finish(),
            TransactionEvent::Success { key, .. } => {
                f.debug_struct("Success").field("key", key).finish_non_exhaustive()
            }
            TransactionEvent::Failure { key, error } => f
                .debug_struct("Failure")
                .field("key", key)
                .field("error", error)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    Start,
    Success,
    Failure,
}

/// Notification published after every applied transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreUpdate {
    pub key: CacheKey,
    pub kind: TransitionKind,
    pub revision: u64,
}

//-----------------------------------------------------------------------------
// State and Reducer
//-----------------------------------------------------------------------------

#[derive(Default)]
pub struct StoreState {
    entries: HashMap<CacheKey, TransactionEntry>,
    revision: u64,
}

impl StoreState {
    /// Entry for `key`, or the idle default when the key is unknown
    pub fn get(&self, key: &CacheKey) -> TransactionEntry {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Apply one transition
pub fn reduce(state: &mut StoreState, event: TransactionEvent) {
    let entry = state.entries.entry(event.key().clone()).or_default();
    match event {
        TransactionEvent::Start { .. } => {
            entry.is_requesting = true;
        }
        TransactionEvent::Success { data, .. } => {
            entry.data = Some(data);
            entry.error = None;
            entry.is_requesting = false;
        }
        TransactionEvent::Failure { error, .. } => {
            // data is kept so callers can show stale data next to the error
            entry.error = Some(error);
            entry.is_requesting = false;
        }
    }
    state.revision += 1;
}

//-----------------------------------------------------------------------------
// Store Handle
//-----------------------------------------------------------------------------

struct StoreInner {
    state: Mutex<StoreState>,
    updates: broadcast::Sender<StoreUpdate>,
}

/// Cloneable handle to a shared transaction store. Clones observe and mutate
/// the same state.
#[derive(Clone)]
pub struct TransactionStore {
    inner: Arc<StoreInner>,
}

impl Default for TransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransactionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("TransactionStore")
            .field("entries", &state.len())
            .field("revision", &state.revision)
            .finish()
    }
}

impl TransactionStore {
    pub fn new() -> Self {
        Self::with_config(&StoreConfig::default())
    }

    pub fn with_config(config: &StoreConfig) -> Self {
        let (updates, _) = broadcast::channel(config.notify_capacity.max(1));
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(StoreState::default()),
                updates,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // the reducer cannot leave state half-applied, so a poisoned lock is
        // still consistent
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, update: StoreUpdate) {
        debug!(
            key = %update.key,
            kind = ?update.kind,
            revision = update.revision,
            "transaction store transition"
        );
        // no subscribers is not an error
        let _ = self.inner.updates.send(update);
    }

    /// Apply a transition and notify subscribers
    pub fn dispatch(&self, event: TransactionEvent) {
        let update = {
            let mut state = self.lock();
            let key = event.key().clone();
            let kind = event.kind();
            reduce(&mut state, event);
            StoreUpdate {
                key,
                kind,
                revision: state.revision,
            }
        };
        self.publish(update);
    }

    /// Mark `key` in flight, creating the entry if absent
    pub fn start(&self, key: &CacheKey) {
        self.dispatch(TransactionEvent::Start { key: key.clone() });
    }

    /// Record a successful result. `data` is stored as-is; passing an `Arc`
    /// stores the `Arc` itself.
    pub fn succeed<T: Any + Send + Sync>(&self, key: &CacheKey, data: T) {
        self.dispatch(TransactionEvent::Success {
            key: key.clone(),
            data: Arc::new(data),
        });
    }

    /// Record a failure, keeping any previous data
    pub fn fail(&self, key: &CacheKey, error: impl Into<String>) {
        self.dispatch(TransactionEvent::Failure {
            key: key.clone(),
            error: error.into(),
        });
    }

    /// Start `key` unless it is already in flight. Returns whether the caller
    /// now owns the in-flight call. Check and transition share one lock.
    pub fn begin(&self, key: &CacheKey) -> bool {
        let update = {
            let mut state = self.lock();
            if state.entries.get(key).is_some_and(|entry| entry.is_requesting) {
                return false;
            }
            reduce(&mut state, TransactionEvent::Start { key: key.clone() });
            StoreUpdate {
                key: key.clone(),
                kind: TransitionKind::Start,
                revision: state.revision,
            }
        };
        self.publish(update);
        true
    }

    pub fn get(&self, key: &CacheKey) -> TransactionEntry {
        self.lock().get(key)
    }

    /// Typed view of an entry
    pub fn get_as<T: Any + Send + Sync>(&self, key: &CacheKey) -> TransactionEntry<Arc<T>> {
        let entry = self.get(key);
        let typed = entry.downcast::<T>();
        if entry.data.is_some() && typed.data.is_none() {
            warn!(
                key = %key,
                expected = std::any::type_name::<T>(),
                "cached payload has a different type"
            );
        }
        typed
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.lock()
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_requesting)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreUpdate> {
        self.inner.updates.subscribe()
    }

    /// Number of transitions applied so far
    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    /// Known keys, sorted
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Wait until `key` is not in flight and return its entry
    pub async fn settled(&self, key: &CacheKey) -> TransactionEntry {
        // subscribe before checking so a resolution between the two is seen
        let mut updates = self.subscribe();
        loop {
            let entry = self.get(key);
            if !entry.is_requesting {
                return entry;
            }
            match updates.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return self.get(key),
            }
        }
    }
}

//-----------------------------------------------------------------------------
// Tests
//-----------------------------------------------------------------------------
