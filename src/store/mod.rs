//! store
//!
//! Abstraction over the remote object graph (blobs, trees, commits, refs).
//!
//! # Architecture
//!
//! The `ObjectStore` trait is the only surface the publisher talks to.
//! Commands construct a concrete store and hand it over as
//! `&dyn ObjectStore`; nothing in [`crate::publish`] names an
//! implementation.
//!
//! # Modules
//!
//! - `traits`: Core `ObjectStore` trait and request/response types
//! - [`github`]: GitHub implementation using the REST git-data API
//! - [`mock`]: In-memory implementation for deterministic testing

pub mod github;
pub mod mock;
mod traits;

pub use traits::*;
