//! Mock operations for testing
//!
//! [`MockOperation`] stands in for a generated API client call. Responses
//! come from a scripted queue, then from a handler function, then from a
//! default. A gated mock holds every call in flight until
//! [`MockOperation::release`] hands out permits, which makes de-duplication
//! and stale-while-revalidate states observable.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::operation::Operation;
use crate::result::ApiResult;

/// Message returned when a mock has nothing scripted
pub const UNSCRIPTED_MESSAGE: &str = "mock operation has no scripted response";

type Handler<A, T> = Box<dyn Fn(&A) -> ApiResult<T> + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

//-----------------------------------------------------------------------------
// Mock Operation
//-----------------------------------------------------------------------------

pub struct MockOperation<A, T>
where
    A: Serialize + Clone + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    name: String,
    responses: Mutex<VecDeque<ApiResult<T>>>,
    handler: Option<Handler<A, T>>,
    default: Option<ApiResult<T>>,
    gate: Option<Semaphore>,
    calls: AtomicUsize,
    received: Mutex<Vec<A>>,
}

impl<A, T> MockOperation<A, T>
where
    A: Serialize + Clone + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(VecDeque::new()),
            handler: None,
            default: None,
            gate: None,
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Hold every call until a permit is released
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Response used once the scripted queue is empty and no handler is set
    pub fn with_default(mut self, response: ApiResult<T>) -> Self {
        self.default = Some(response);
        self
    }

    /// Compute responses from the arguments once the queue is empty
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&A) -> ApiResult<T> + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Queue a response for the next unanswered call
    pub fn respond(&self, response: ApiResult<T>) -> &Self {
        lock(&self.responses).push_back(response);
        self
    }

    /// Let `n` held calls resolve. No-op for ungated mocks.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Number of invocations started so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Arguments of every invocation, in call order
    pub fn received(&self) -> Vec<A> {
        lock(&self.received).clone()
    }

    fn next_response(&self, args: &A) -> ApiResult<T> {
        if let Some(response) = lock(&self.responses).pop_front() {
            return response;
        }
        if let Some(handler) = &self.handler {
            return handler(args);
        }
        self.default
            .clone()
            .unwrap_or_else(|| ApiResult::err(UNSCRIPTED_MESSAGE))
    }
}

#[async_trait]
impl<A, T> Operation for MockOperation<A, T>
where
    A: Serialize + Clone + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    type Args = A;
    type Data = T;

    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, args: A) -> ApiResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.received).push(args.clone());

        if let Some(gate) = &self.gate {
            // a closed gate only happens on teardown, resolve anyway
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.next_response(&args)
    }
}

/// Shorthand for an `Arc`-wrapped mock, the form the controllers take
pub fn shared<A, T>(mock: MockOperation<A, T>) -> Arc<MockOperation<A, T>>
where
    A: Serialize + Clone + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    Arc::new(mock)
}
