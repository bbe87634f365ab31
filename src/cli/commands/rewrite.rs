//! rewrite command - Rewrite history selected by revisions
//!
//! Builds [`RewriteOptions`] from flags and runs the history rewriter against
//! the repository while holding the repository lock.
//!
//! - `--author` / `--committer` replace identities but keep timestamps
//! - `--message-replace OLD=NEW` edits messages
//! - `--remove-path` drops paths from every tree
//! - `--tag-suffix` renames every tag
//!
//! Options left unset fall back to configuration, then to the defaults.

use anyhow::{bail, Context as _, Result};
use chrono::Utc;
use tracing::debug;

use crate::cli::args::RewriteArgs;
use crate::cli::Context;
use crate::core::config::Config;
use crate::core::ops::lock::RepoLock;
use crate::core::paths::ReweavePaths;
use crate::core::sort::CommitSort;
use crate::core::types::{Oid, Signature};
use crate::engine::{rewrite_history, CommitHeader, RewriteOptions};
use crate::git::Git;
use crate::store::{ObjectStore, RefStore, Repository, TreeDefinition};
use crate::ui::output;

/// `Name <email>` given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Identity {
    name: String,
    email: String,
}

impl Identity {
    fn parse(identity: &str) -> Result<Self> {
        let parsed = Signature::parse_identity(identity, Utc::now().fixed_offset())?;
        Ok(Self {
            name: parsed.name,
            email: parsed.email,
        })
    }

    /// This identity at the time of `original`.
    fn stamp(&self, original: &Signature) -> Signature {
        Signature::new(self.name.clone(), self.email.clone(), original.when)
    }
}

/// Parse `OLD=NEW` pairs.
fn parse_replacements(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((old, _)) if old.is_empty() => bail!("empty pattern in '{}'", pair),
            Some((old, new)) => Ok((old.to_string(), new.to_string())),
            None => bail!("expected OLD=NEW, got '{}'", pair),
        })
        .collect()
}

/// Commits reachable from any reference.
fn all_commits(git: &Git) -> Result<Vec<Oid>> {
    let mut tips = Vec::new();
    for reference in git.references()? {
        if let Some(commit) = git.reference_commit(&reference)? {
            tips.push(commit);
        }
    }
    Ok(git.walk(&tips, CommitSort::rewrite_order())?)
}

/// Rewrite history.
pub fn rewrite(ctx: &Context, args: &RewriteArgs) -> Result<()> {
    let verbosity = ctx.verbosity();
    let git = Git::open(&ctx.cwd()?).context("Failed to open repository")?;
    let paths = ReweavePaths::from_repo_info(&git.info());
    let config = Config::load(Some(&paths)).context("Failed to load configuration")?;
    debug!(
        global = ?config.global_config_loaded_from(),
        repo = ?config.repo_config_loaded_from(),
        "configuration loaded"
    );

    let author = args.author.as_deref().map(Identity::parse).transpose()?;
    let committer = args.committer.as_deref().map(Identity::parse).transpose()?;
    let replacements = parse_replacements(&args.message_replace)?;

    let _lock = RepoLock::acquire(&paths).context("Failed to lock repository")?;

    let targets = if args.all {
        all_commits(&git)?
    } else if args.revs.is_empty() {
        git.revision_commits(&["HEAD".to_string()])?
    } else {
        git.revision_commits(&args.revs)?
    };
    debug!(targets = targets.len(), "selected commits");
    output::debug(
        format!(
            "{} commits selected, backups under {}",
            targets.len(),
            args.backup_namespace
                .clone()
                .unwrap_or_else(|| config.backup_namespace())
        ),
        verbosity,
    );
    if targets.is_empty() {
        output::print("Nothing to rewrite", verbosity);
        return Ok(());
    }

    let mut options = RewriteOptions::new()
        .with_backup_namespace(
            args.backup_namespace
                .clone()
                .unwrap_or_else(|| config.backup_namespace()),
        )
        .with_reflog_prefix(
            args.reflog_prefix
                .clone()
                .unwrap_or_else(|| config.reflog_prefix()),
        )
        .with_prune_empty_commits(args.prune_empty || config.prune_empty())
        .on_error(move |err| {
            output::warn(format!("rewrite failed, restoring references: {err}"), verbosity);
            Ok(())
        });

    if author.is_some() || committer.is_some() || !replacements.is_empty() {
        options = options.with_header_rewriter(move |commit| {
            let mut header = CommitHeader::from_commit(commit);
            if let Some(author) = &author {
                header.author = author.stamp(&commit.author);
            }
            if let Some(committer) = &committer {
                header.committer = committer.stamp(&commit.committer);
            }
            for (old, new) in &replacements {
                header.message = header.message.replace(old, new);
            }
            Ok(header)
        });
    }

    if !args.remove_path.is_empty() {
        let removed = args.remove_path.clone();
        let store = &git;
        options = options.with_tree_rewriter(move |commit| {
            let mut definition = TreeDefinition::from_tree(store, &commit.tree)?;
            for path in &removed {
                definition.remove(path);
            }
            Ok(definition)
        });
    }

    if let Some(suffix) = args.tag_suffix.clone() {
        options = options.with_tag_name_rewriter(move |name, _, _| Ok(format!("{name}{suffix}")));
    }

    let summary = rewrite_history(&git, targets, options).context("Rewrite failed")?;

    if ctx.json || config.json() {
        output::json(&summary)?;
    } else {
        output::success(output::format_summary(&summary), verbosity);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_keeps_original_time() {
        let identity = Identity::parse("New Name <new@example.com>").unwrap();
        let original = Signature::from_raw("Old", "old@example.com", 1_000, 120).unwrap();
        let stamped = identity.stamp(&original);

        assert_eq!(stamped.name, "New Name");
        assert_eq!(stamped.email, "new@example.com");
        assert_eq!(stamped.when, original.when);
    }

    #[test]
    fn identity_rejects_garbage() {
        assert!(Identity::parse("no email here").is_err());
    }

    #[test]
    fn replacements_parse() {
        let parsed = parse_replacements(&["foo=bar".to_string(), "a=b=c".to_string()]).unwrap();
        assert_eq!(
            parsed,
            vec![
                ("foo".to_string(), "bar".to_string()),
                ("a".to_string(), "b=c".to_string())
            ]
        );
        assert!(parse_replacements(&["nothing".to_string()]).is_err());
        assert!(parse_replacements(&["=x".to_string()]).is_err());
    }
}
