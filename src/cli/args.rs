//! cli::args
//!
//! clap definitions for `reweave`. `--cwd`, `--debug`, `-q` and `--json`
//! are accepted before or after the subcommand.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// reweave - rewrite git history with backups and rollback
#[derive(Parser, Debug)]
#[command(name = "reweave")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run as if reweave was started in this directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Log engine events and print debug lines
    #[arg(long, global = true)]
    pub debug: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rewrite commits and move every reference onto the new history
    #[command(
        long_about = "Rewrite commits and move every reference onto the new history.\n\n\
            The commits reachable from REVS are rebuilt with the requested changes. \
            Descendants are rebuilt onto the new parents, and every branch and tag \
            pointing into the rewritten history is first backed up under the backup \
            namespace and then moved. If anything fails, every reference is restored.",
        after_help = "\
EXAMPLES:
    # Fix the author of the last three commits
    reweave rewrite --author 'Jane Doe <jane@example.com>' HEAD~3..HEAD

    # Drop a file from all history and prune commits that become empty
    reweave rewrite --remove-path secrets.env --prune-empty --all

    # Rename every tag
    reweave rewrite --tag-suffix -old HEAD"
    )]
    Rewrite(RewriteArgs),

    /// List or delete backup references
    Backups {
        /// Backup namespace (default from config, else refs/original/)
        #[arg(long)]
        namespace: Option<String>,

        /// Delete the listed backups
        #[arg(long)]
        drop: bool,
    },
}

/// Arguments of `reweave rewrite`.
#[derive(Args, Debug, Clone, Default)]
pub struct RewriteArgs {
    /// Revisions selecting the commits to rewrite (`rev`, `^rev`, `a..b`)
    #[arg(value_name = "REVS")]
    pub revs: Vec<String>,

    /// Rewrite every commit reachable from a branch or tag
    #[arg(long, conflicts_with = "revs")]
    pub all: bool,

    /// Replace the author identity ("Name <email>"); times are kept
    #[arg(long, value_name = "IDENTITY")]
    pub author: Option<String>,

    /// Replace the committer identity ("Name <email>"); times are kept
    #[arg(long, value_name = "IDENTITY")]
    pub committer: Option<String>,

    /// Replace text in commit messages (OLD=NEW, repeatable)
    #[arg(long, value_name = "OLD=NEW")]
    pub message_replace: Vec<String>,

    /// Remove a path from each tree (repeatable)
    #[arg(long, value_name = "PATH")]
    pub remove_path: Vec<String>,

    /// Append a suffix to every tag name
    #[arg(long, value_name = "SUFFIX")]
    pub tag_suffix: Option<String>,

    /// Drop commits that end up identical to their parent
    #[arg(long)]
    pub prune_empty: bool,

    /// Namespace for backups of rewritten references
    #[arg(long, value_name = "NS")]
    pub backup_namespace: Option<String>,

    /// Prefix for reflog messages
    #[arg(long, value_name = "PREFIX")]
    pub reflog_prefix: Option<String>,
}
