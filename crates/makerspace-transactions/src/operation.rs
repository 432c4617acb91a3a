//! Remote Operations
//!
//! The cache treats remote API calls as opaque async functions returning an
//! [`ApiResult`]. HTTP transport, auth headers and endpoint paths belong to
//! the API client behind the operation.

use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::marker::PhantomData;

use crate::result::ApiResult;

//-----------------------------------------------------------------------------
// Operation Trait
//-----------------------------------------------------------------------------

/// A named remote operation that can be driven by the read and write
/// transaction controllers.
#[async_trait]
pub trait Operation: Send + Sync + 'static {
    /// Arguments; serialized to derive the cache key for reads
    type Args: Serialize + Clone + Send + Sync + 'static;

    /// Payload of a successful response
    type Data: Clone + Send + Sync + 'static;

    /// Stable identifier, the first half of every cache key.
    /// Must not depend on closure identity.
    fn name(&self) -> &str;

    /// Perform the call
    async fn invoke(&self, args: Self::Args) -> ApiResult<Self::Data>;
}

//-----------------------------------------------------------------------------
// Closure Adapter
//-----------------------------------------------------------------------------

/// Operation backed by an async closure, for wrapping generated client calls
pub struct FnOperation<A, T, F> {
    name: String,
    f: F,
    _marker: PhantomData<fn(A) -> T>,
}

/// Wrap an async closure as a named operation
pub fn from_fn<A, T, F, Fut>(name: impl Into<String>, f: F) -> FnOperation<A, T, F>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
{
    FnOperation {
        name: name.into(),
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<A, T, F, Fut> Operation for FnOperation<A, T, F>
where
    A: Serialize + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
{
    type Args = A;
    type Data = T;

    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, args: A) -> ApiResult<T> {
        (self.f)(args).await
    }
}
