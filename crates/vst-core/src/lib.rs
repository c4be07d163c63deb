//! # vst-core
//!
//! The two primitives every vstore request path is built from:
//!
//! - [`ClientCache`] — per-target lazily constructed client handles. The
//!   first caller for a target constructs the handle; every later caller gets
//!   the same `Arc` back under a shared lock only.
//! - [`Retry`] — bounded retry with quadratic backoff and linear jitter. The
//!   operation decides each attempt whether a failure is retriable via
//!   [`RetryDecision`]; the executor never inspects error types.
//!
//! The two never call each other. Callers typically obtain a client from the
//! cache and wrap individual remote calls (or the whole acquisition) in a
//! [`Retry`].

pub mod cache;
pub mod error;
pub mod retry;

pub use cache::{ClientCache, ClientHandle};
pub use error::{ConstructionError, RetryError};
pub use retry::{Retry, RetryDecision, RetryPolicy};
