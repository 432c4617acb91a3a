//! Write Transaction Controller
//!
//! A [`WriteTransaction`] runs a mutating operation when the caller asks
//! and keeps the outcome in state local to the handle. Writes are never
//! cached or coalesced: two handles over the same operation, called with the
//! same arguments, issue two calls and keep separate state.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::invalidation::{InvalidationRegistry, Tag};
use crate::operation::Operation;
use crate::result::ApiResult;

//-----------------------------------------------------------------------------
// Write State
//-----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct WriteState<T> {
    pub is_requesting: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    /// Whether `call` ran since creation or the last `reset`
    pub called: bool,
}

impl<T> Default for WriteState<T> {
    fn default() -> Self {
        Self {
            is_requesting: false,
            data: None,
            error: None,
            called: false,
        }
    }
}

/// Callback run with the raw result once a call settles
pub type SettledCallback<T> = Arc<dyn Fn(&ApiResult<T>) + Send + Sync>;

fn lock_state<T>(state: &Mutex<WriteState<T>>) -> MutexGuard<'_, WriteState<T>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

//-----------------------------------------------------------------------------
// Settlement
//-----------------------------------------------------------------------------

/// Everything a call needs to settle, detached from the handle's lifetime.
/// Dropped unsettled (the `call` future was cancelled), it takes the handle
/// out of flight without recording an outcome.
struct Settle<T> {
    state: Weak<Mutex<WriteState<T>>>,
    on_settled: Option<SettledCallback<T>>,
    invalidation: Option<(InvalidationRegistry, Vec<Tag>)>,
    operation: String,
    settled: bool,
}

impl<T: Clone> Settle<T> {
    fn apply(mut self, result: &ApiResult<T>) {
        self.settled = true;
        if !result.is_error() {
            if let Some((registry, tags)) = &self.invalidation {
                registry.invalidate(tags);
            }
        }

        // the handle is gone, its state must not be touched
        let Some(state) = self.state.upgrade() else {
            debug!(
                operation = %self.operation,
                "write handle dropped before the call settled, discarding result"
            );
            return;
        };

        {
            let mut state = lock_state(&state);
            state.is_requesting = false;
            match result {
                ApiResult::Data(data) => {
                    state.data = Some(data.data.clone());
                    state.error = None;
                }
                ApiResult::Error(failure) => {
                    warn!(
                        operation = %self.operation,
                        error = %failure.error.message,
                        "write transaction failed"
                    );
                    state.error = Some(failure.error.message.clone());
                }
            }
        }

        if let Some(on_settled) = &self.on_settled {
            on_settled(result);
        }
    }
}

impl<T> Drop for Settle<T> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(state) = self.state.upgrade() {
            debug!(operation = %self.operation, "write call cancelled before it settled");
            lock_state(&state).is_requesting = false;
        }
    }
}

//-----------------------------------------------------------------------------
// Write Handle
//-----------------------------------------------------------------------------

/// Per-component handle for a mutating operation
pub struct WriteTransaction<O: Operation> {
    operation: Arc<O>,
    state: Arc<Mutex<WriteState<O::Data>>>,
    on_settled: Option<SettledCallback<O::Data>>,
    invalidation: Option<(InvalidationRegistry, Vec<Tag>)>,
}

impl<O: Operation> fmt::Debug for WriteTransaction<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock_state(&self.state);
        f.debug_struct("WriteTransaction")
            .field("operation", &self.operation.name())
            .field("is_requesting", &state.is_requesting)
            .field("called", &state.called)
            .field("error", &state.error)
            .finish()
    }
}

impl<O: Operation> WriteTransaction<O> {
    pub fn new(operation: Arc<O>) -> Self {
        Self {
            operation,
            state: Arc::new(Mutex::new(WriteState::default())),
            on_settled: None,
            invalidation: None,
        }
    }

    /// Run `callback` after every call settles, success or failure. It is
    /// skipped when the handle was dropped first.
    pub fn with_on_settled(
        mut self,
        callback: impl Fn(&ApiResult<O::Data>) + Send + Sync + 'static,
    ) -> Self {
        self.on_settled = Some(Arc::new(callback));
        self
    }

    /// Refresh reads registered under `tags` after each successful call
    pub fn with_invalidation(mut self, registry: InvalidationRegistry, tags: Vec<Tag>) -> Self {
        self.invalidation = Some((registry, tags));
        self
    }

    fn begin(&self) -> Settle<O::Data> {
        {
            let mut state = lock_state(&self.state);
            if state.is_requesting {
                debug!(
                    operation = %self.operation.name(),
                    "write called while a call is in flight"
                );
            }
            state.is_requesting = true;
            state.called = true;
        }
        Settle {
            state: Arc::downgrade(&self.state),
            on_settled: self.on_settled.clone(),
            invalidation: self.invalidation.clone(),
            operation: self.operation.name().to_string(),
            settled: false,
        }
    }

    /// Invoke the operation and return its raw result for follow-up logic
    pub async fn call(&self, args: O::Args) -> ApiResult<O::Data> {
        let settle = self.begin();
        let result = self.operation.invoke(args).await;
        settle.apply(&result);
        result
    }

    /// Invoke on the tokio runtime. The call completes even if this handle
    /// is dropped, but then leaves no trace in its state.
    pub fn spawn_call(&self, args: O::Args) -> JoinHandle<ApiResult<O::Data>> {
        let settle = self.begin();
        let operation = Arc::clone(&self.operation);
        tokio::spawn(async move {
            let result = operation.invoke(args).await;
            settle.apply(&result);
            result
        })
    }

    /// Back to the initial state, without a call
    pub fn reset(&self) {
        *lock_state(&self.state) = WriteState::default();
    }

    pub fn state(&self) -> WriteState<O::Data> {
        lock_state(&self.state).clone()
    }

    pub fn is_requesting(&self) -> bool {
        lock_state(&self.state).is_requesting
    }

    pub fn data(&self) -> Option<O::Data> {
        lock_state(&self.state).data.clone()
    }

    pub fn error(&self) -> Option<String> {
        lock_state(&self.state).error.clone()
    }

    pub fn called(&self) -> bool {
        lock_state(&self.state).called
    }
}
