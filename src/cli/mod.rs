//! cli
//!
//! Command-line interface layer for reweave.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Load configuration and take the repository lock
//! - Translate flags into [`crate::engine::RewriteOptions`] and report results
//!
//! The CLI layer is thin. Every history change flows through
//! [`crate::engine::HistoryRewriter`].

pub mod args;
pub mod commands;

pub use args::{Cli, Command, RewriteArgs};

use std::path::PathBuf;

use anyhow::{Context as _, Result};

use crate::ui::output::Verbosity;

/// Settings shared by every command, taken from global flags.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Directory to run in, `None` for the process working directory
    pub cwd: Option<PathBuf>,
    pub debug: bool,
    pub quiet: bool,
    pub json: bool,
}

impl Context {
    /// The directory commands operate in.
    pub fn cwd(&self) -> Result<PathBuf> {
        match &self.cwd {
            Some(cwd) => Ok(cwd.clone()),
            None => std::env::current_dir().context("Failed to read current directory"),
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.debug)
    }
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run(cli: Cli) -> Result<()> {
    let ctx = Context {
        cwd: cli.cwd.clone(),
        debug: cli.debug,
        quiet: cli.quiet,
        json: cli.json,
    };

    commands::dispatch(cli.command, &ctx)
}
