//! In-memory task state for the lifetime of the process.
//!
//! State is rebuilt from disk after a restart by the reconciliation scan in
//! [`crate::storage::reconcile`].

mod store;

pub use store::TaskStore;
