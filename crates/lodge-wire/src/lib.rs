//! Tagged message registry for the `"<tag> <payload>"` wire convention.
//!
//! Transport adapters around a lodge hub often speak a simple line
//! format: a string tag identifying the message type, a space, then a
//! JSON payload. This crate provides the decoding table for that
//! convention as an explicitly constructed registry — built once at
//! startup, owned by the caller, no process-wide state.
//!
//! This layer is glue around the concurrency core, not part of it: the
//! core never sees tags or bytes.

mod error;
mod registry;

pub use error::WireError;
pub use registry::{MessageRegistry, Tagged, encode};
