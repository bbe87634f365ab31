//! backups command - List or delete backup references
//!
//! A rewrite copies every reference it changes into the backup namespace.
//! Backups block the next rewrite of the same reference, so once a rewrite
//! has been checked they are usually dropped with `--drop`.

use anyhow::{bail, Context as _, Result};
use serde::Serialize;

use crate::cli::Context;
use crate::core::config::Config;
use crate::core::ops::lock::RepoLock;
use crate::core::paths::ReweavePaths;
use crate::git::Git;
use crate::store::RefStore;
use crate::ui::output;

#[derive(Debug, Serialize)]
struct BackupEntry {
    name: String,
    target: String,
}

/// The namespace with exactly one trailing slash.
fn normalize_namespace(namespace: &str) -> Result<String> {
    let trimmed = namespace.trim_end_matches('/');
    if !trimmed.starts_with("refs/") {
        bail!("backup namespace '{}' must be below refs/", namespace);
    }
    Ok(format!("{trimmed}/"))
}

/// List backups, deleting them when `drop` is set.
pub fn backups(ctx: &Context, namespace: Option<&str>, drop: bool) -> Result<()> {
    let verbosity = ctx.verbosity();
    let git = Git::open(&ctx.cwd()?).context("Failed to open repository")?;
    let paths = ReweavePaths::from_repo_info(&git.info());
    let config = Config::load(Some(&paths)).context("Failed to load configuration")?;

    let namespace = match namespace {
        Some(ns) => normalize_namespace(ns)?,
        None => normalize_namespace(&config.backup_namespace())?,
    };

    let _lock = if drop {
        Some(RepoLock::acquire(&paths).context("Failed to lock repository")?)
    } else {
        None
    };

    let refs = git.references_with_prefix(&namespace)?;
    let entries: Vec<BackupEntry> = refs
        .iter()
        .map(|r| BackupEntry {
            name: r.name.to_string(),
            target: r.target.to_string(),
        })
        .collect();

    if drop {
        for reference in &refs {
            git.delete_reference(&reference.name)
                .with_context(|| format!("Failed to delete {}", reference.name))?;
        }
    }

    if ctx.json || config.json() {
        return output::json(&entries);
    }

    if entries.is_empty() {
        output::print(format!("No backups under {}", namespace), verbosity);
        return Ok(());
    }
    let lines: Vec<String> = entries
        .iter()
        .map(|e| format!("{} {}", e.target, e.name))
        .collect();
    output::print(output::format_list(&lines, ""), verbosity);
    if drop {
        output::success(format!("Deleted {} backups", entries.len()), verbosity);
    }
    Ok(())
}
