//! core
//!
//! Core domain types, configuration and repository-level guards.
//!
//! # Modules
//!
//! - [`types`] - Strong types: Oid, RefName, Signature, ObjectKind
//! - [`sort`] - Commit walk orderings
//! - [`config`] - Configuration schema and loading
//! - [`paths`] - Storage locations inside a repository
//! - [`ops`] - Exclusive repository lock
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing

pub mod config;
pub mod ops;
pub mod paths;
pub mod sort;
pub mod types;
