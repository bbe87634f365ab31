//! ui
//!
//! User-facing output.
//!
//! # Modules
//!
//! - [`output`] - Output formatting and display
//!
//! All command output goes through this module so quiet, debug and JSON
//! modes behave the same everywhere.

pub mod output;
