//! core::ops
//!
//! Repository-level operation guards.
//!
//! - [`lock`] - Exclusive repository lock

pub mod lock;

pub use lock::{LockError, RepoLock};
