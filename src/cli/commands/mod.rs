//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! Each command handler:
//! 1. Opens the repository and loads configuration
//! 2. Validates command-specific arguments
//! 3. Runs the work under the repository lock when it mutates references
//! 4. Formats and displays output

mod backups;
mod rewrite;

pub use backups::backups;
pub use rewrite::rewrite;

use anyhow::Result;

use crate::cli::args::Command;
use crate::cli::Context;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Rewrite(args) => rewrite(ctx, &args),
        Command::Backups { namespace, drop } => backups(ctx, namespace.as_deref(), drop),
    }
}
