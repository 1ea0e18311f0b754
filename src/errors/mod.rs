//! # Error Handling
//!
//! Error types for the Conjur credential engine, built on `thiserror`.
//!
//! Only the credential directory cache recovers from errors locally (it keeps
//! serving the last good directory). Everything else is surfaced to the caller.

pub mod types;

pub use types::{ConjurError, Result};
