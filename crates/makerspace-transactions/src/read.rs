//! Read Transaction Controller
//!
//! A [`ReadTransaction`] is the per-component handle for an idempotent fetch.
//! It derives a cache key from the operation name and its arguments and keeps
//! at most one call in flight per key across every handle sharing the store.
//!
//! A call is triggered by:
//! * [`ReadTransaction::mount`], the first render,
//! * [`ReadTransaction::set_args`] when the derived key changes,
//! * [`ReadTransaction::set_skip`] turning `skip` off,
//! * [`ReadTransaction::refresh`].
//!
//! A triggered call spawns on the tokio runtime and resolves into the key it
//! was started for, even if the handle has moved on to other arguments.
//! Remote failures become entry state and are never retried automatically.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use makerspace_error::TransactionResult;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::invalidation::{InvalidationRegistry, Refresh, Tag};
use crate::key::{derive_key, CacheKey};
use crate::operation::Operation;
use crate::result::ApiResult;
use crate::store::{TransactionEntry, TransactionStore};

/// Error recorded when a call is dropped before it resolves
pub const ABORTED_MESSAGE: &str = "request aborted before completion";

//-----------------------------------------------------------------------------
// Options
//-----------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Suppress every trigger while set
    pub skip: bool,

    /// Caller-supplied key used instead of the derived one
    pub cache_key: Option<CacheKey>,

    /// Tags to register under with an [`InvalidationRegistry`]
    pub tags: Vec<Tag>,
}

impl ReadOptions {
    pub fn skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_cache_key(mut self, key: CacheKey) -> Self {
        self.cache_key = Some(key);
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.tags.extend(tags);
        self
    }
}

//-----------------------------------------------------------------------------
// In-flight Call
//-----------------------------------------------------------------------------

/// Owns the in-flight slot of one key until the call resolves. If the task is
/// dropped first (panic, runtime shutdown) the key is failed instead of being
/// left in flight forever.
struct InFlight {
    store: TransactionStore,
    key: CacheKey,
    resolved: bool,
}

impl InFlight {
    fn resolve<T: Send + Sync + 'static>(mut self, result: ApiResult<T>) {
        self.resolved = true;
        match result {
            ApiResult::Data(data) => self.store.succeed(&self.key, data.data),
            ApiResult::Error(failure) => {
                warn!(
                    key = %self.key,
                    status = ?failure.response.as_ref().map(|r| r.status),
                    error = %failure.error.message,
                    "read transaction failed"
                );
                self.store.fail(&self.key, failure.error.message);
            }
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.resolved {
            warn!(key = %self.key, "read transaction dropped before resolving");
            self.store.fail(&self.key, ABORTED_MESSAGE);
        }
    }
}

/// Start a call for `key` unless one is already in flight
fn issue<O: Operation>(
    store: &TransactionStore,
    operation: &Arc<O>,
    key: CacheKey,
    args: O::Args,
) -> Option<JoinHandle<()>> {
    if !store.begin(&key) {
        debug!(key = %key, "read already in flight, joining it");
        return None;
    }

    let in_flight = InFlight {
        store: store.clone(),
        key,
        resolved: false,
    };
    let operation = Arc::clone(operation);
    Some(tokio::spawn(async move {
        let result = operation.invoke(args).await;
        in_flight.resolve(result);
    }))
}

//-----------------------------------------------------------------------------
// Shared Target
//-----------------------------------------------------------------------------

struct ReadTarget<A> {
    args: A,
    key: CacheKey,
    skip: bool,
    mounted: bool,
}

/// State shared between the handle and its invalidation registration
struct ReadShared<O: Operation> {
    store: TransactionStore,
    operation: Arc<O>,
    target: Mutex<ReadTarget<O::Args>>,
}

impl<O: Operation> ReadShared<O> {
    fn target(&self) -> MutexGuard<'_, ReadTarget<O::Args>> {
        self.target.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_key(&self) -> CacheKey {
        self.target().key.clone()
    }

    fn fire(&self) -> Option<JoinHandle<()>> {
        let (key, args) = {
            let target = self.target();
            if target.skip {
                trace!(key = %target.key, "read skipped");
                return None;
            }
            (target.key.clone(), target.args.clone())
        };
        issue(&self.store, &self.operation, key, args)
    }
}

impl<O: Operation> Refresh for ReadShared<O> {
    // invalidation never fetches ahead of the first render
    fn refresh(&self) -> bool {
        if !self.target().mounted {
            return false;
        }
        self.fire().is_some()
    }
}

//-----------------------------------------------------------------------------
// Read Handle
//-----------------------------------------------------------------------------

/// Per-component read handle. Triggers must run inside a tokio runtime.
pub struct ReadTransaction<O: Operation> {
    shared: Arc<ReadShared<O>>,
    cache_key: Option<CacheKey>,
    tags: Vec<Tag>,
}

impl<O: Operation> ReadTransaction<O> {
    /// Bind `operation` and `args` to `store`. Nothing is called until
    /// [`mount`](Self::mount).
    pub fn new(
        store: TransactionStore,
        operation: Arc<O>,
        args: O::Args,
        options: ReadOptions,
    ) -> TransactionResult<Self> {
        let key = match &options.cache_key {
            Some(key) => key.clone(),
            None => derive_key(operation.name(), &args)?,
        };
        Ok(Self {
            shared: Arc::new(ReadShared {
                store,
                operation,
                target: Mutex::new(ReadTarget {
                    args,
                    key,
                    skip: options.skip,
                    mounted: false,
                }),
            }),
            cache_key: options.cache_key,
            tags: options.tags,
        })
    }

    /// First trigger. Later calls are no-ops.
    pub fn mount(&mut self) -> Option<JoinHandle<()>> {
        {
            let mut target = self.shared.target();
            if target.mounted {
                return None;
            }
            target.mounted = true;
        }
        self.shared.fire()
    }

    /// Replace the arguments. Triggers a call when mounted and the derived
    /// key changed; equal arguments are not a trigger. With an explicit cache
    /// key the key never changes, so only `refresh` re-fetches.
    pub fn set_args(&mut self, args: O::Args) -> TransactionResult<Option<JoinHandle<()>>> {
        let key = match &self.cache_key {
            Some(key) => key.clone(),
            None => derive_key(self.shared.operation.name(), &args)?,
        };
        let trigger = {
            let mut target = self.shared.target();
            let changed = target.key != key;
            target.args = args;
            target.key = key;
            changed && target.mounted
        };
        if trigger {
            Ok(self.shared.fire())
        } else {
            Ok(None)
        }
    }

    /// Toggle `skip`. Turning it off after mount is a trigger.
    pub fn set_skip(&mut self, skip: bool) -> Option<JoinHandle<()>> {
        let trigger = {
            let mut target = self.shared.target();
            let released = target.skip && !skip;
            target.skip = skip;
            released && target.mounted
        };
        if trigger {
            self.shared.fire()
        } else {
            None
        }
    }

    /// Re-fetch with unchanged arguments. Still joins an in-flight call.
    pub fn refresh(&self) -> Option<JoinHandle<()>> {
        self.shared.fire()
    }

    /// Register under this handle's tags. The registration ends when the
    /// handle is dropped.
    pub fn register(&self, registry: &InvalidationRegistry) {
        if self.tags.is_empty() {
            return;
        }
        let refresher: Arc<dyn Refresh> = self.shared.clone();
        registry.register(&self.tags, &refresher);
    }

    /// Snapshot of the entry for the current arguments
    pub fn state(&self) -> TransactionEntry<Arc<O::Data>> {
        self.shared.store.get_as::<O::Data>(&self.key())
    }

    pub fn is_requesting(&self) -> bool {
        self.shared.store.is_in_flight(&self.key())
    }

    pub fn data(&self) -> Option<Arc<O::Data>> {
        self.state().data
    }

    pub fn error(&self) -> Option<String> {
        self.state().error
    }

    pub fn key(&self) -> CacheKey {
        self.shared.current_key()
    }

    pub fn args(&self) -> O::Args {
        self.shared.target().args.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.shared.target().mounted
    }

    pub fn store(&self) -> &TransactionStore {
        &self.shared.store
    }

    /// Wait until the current key is not in flight
    pub async fn settled(&self) -> TransactionEntry<Arc<O::Data>> {
        let key = self.key();
        self.shared.store.settled(&key).await;
        self.shared.store.get_as::<O::Data>(&key)
    }
}
