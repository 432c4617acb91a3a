//! Makerspace Transactions: client-side request cache for the makerspace
//! admin and member application.
//!
//! Every data-fetching and data-mutating view goes through one of two
//! controllers, both wrapping opaque remote operations that resolve to an
//! [`ApiResult`]:
//!
//! * **Reads** ([`ReadTransaction`]) are cached in a shared
//!   [`TransactionStore`] under a key derived from the operation name and its
//!   arguments, with concurrent identical calls de-duplicated.
//! * **Writes** ([`WriteTransaction`]) are invoked explicitly and keep their
//!   outcome local to the handle.
//!
//! ## Module Organization
//!
//! * **Results**: discriminated remote results (`result`)
//! * **Operations**: the remote operation seam (`operation`)
//! * **Keys**: canonical cache key derivation (`key`)
//! * **Store**: keyed transaction state and its reducer (`store`)
//! * **Controllers**: read and write handles (`read`, `write`)
//! * **Invalidation**: opt-in tag-based refresh of reads (`invalidation`)
//! * **Ambient**: configuration, tracing, test mocks (`config`, `telemetry`, `mock`)

//-----------------------------------------------------------------------------
// Core Types
//-----------------------------------------------------------------------------

pub mod key;
pub mod operation;
pub mod result;

pub use key::{canonicalize, derive_key, stable_serialize, CacheKey};
pub use operation::{from_fn, FnOperation, Operation};
pub use result::{ApiError, ApiResult, DataResult, ErrorResult, ResponseMeta};

//-----------------------------------------------------------------------------
// Store and Controllers
//-----------------------------------------------------------------------------

pub mod invalidation;
pub mod read;
pub mod store;
pub mod write;

pub use invalidation::{InvalidationRegistry, Refresh, Tag};
pub use read::{ReadOptions, ReadTransaction};
pub use store::{
    reduce, SharedData, StoreState, StoreUpdate, TransactionEntry, TransactionEvent,
    TransactionStore, TransitionKind,
};
pub use write::{SettledCallback, WriteState, WriteTransaction};

//-----------------------------------------------------------------------------
// Configuration, Tracing and Testing
//-----------------------------------------------------------------------------

pub mod config;
pub mod mock;
pub mod telemetry;

pub use config::{CacheConfig, StoreConfig, TracingConfig};

// Re-export error handling
pub use makerspace_error::{ErrorDomain, TransactionError, TransactionResult};
