//! core
//!
//! Core domain types, validation, and configuration.
//!
//! # Modules
//!
//! - [`types`] - Strong types: BranchName, Oid
//! - [`path_policy`] - The path gate applied before anything is published
//! - [`change_set`] - The batch of file writes to publish
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - Everything here is pure except config file I/O

pub mod change_set;
pub mod config;
pub mod path_policy;
pub mod types;
