//! gitpress - publish multi-file change sets as one atomic commit
//!
//! gitpress takes a batch of file writes and publishes them to a branch of a
//! remote Git repository as a single new commit. It talks to the remote's
//! object graph directly (blobs, trees, commits, refs) instead of issuing
//! one commit per file, so the branch moves exactly once and readers never
//! observe a half-applied batch.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to publish)
//! - [`publish`] - The publish protocol: validate, prepare objects, swap the ref
//! - [`core`] - Domain types, path policy, change sets, configuration
//! - [`store`] - Object store abstraction (GitHub, in-memory mock)
//! - [`secrets`] - Token storage and resolution
//! - [`ui`] - User-facing output
//!
//! # Guarantees
//!
//! 1. A change set with any rejected path makes no store calls at all
//! 2. Nothing is visible on the branch until the final ref update
//! 3. The ref update is compare-and-swap; a concurrent writer is reported,
//!    never overwritten
//! 4. Files not named in the change set are carried over unchanged

pub mod cli;
pub mod core;
pub mod publish;
pub mod secrets;
pub mod store;
pub mod ui;
