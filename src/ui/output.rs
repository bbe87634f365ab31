//! ui::output
//!
//! Terminal output for the `reweave` commands.
//!
//! Results go to stdout, diagnostics to stderr. `-q` silences everything
//! except errors; `--json` replaces the text with one JSON document.

use std::fmt::Display;

use anyhow::Result;
use serde::Serialize;

use crate::engine::{RefUpdate, RewriteSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    /// `--debug`: also print `[debug]` lines on stderr
    Debug,
}

impl Verbosity {
    /// `--quiet` wins over `--debug`.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }
}

pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        println!("{}", message);
    }
}

pub fn debug(message: impl Display, verbosity: Verbosity) {
    if verbosity == Verbosity::Debug {
        eprintln!("[debug] {}", message);
    }
}

/// Shown even under `-q`.
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

pub fn warn(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        eprintln!("warning: {}", message);
    }
}

pub fn success(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        println!("{}", message);
    }
}

/// Print a value as pretty JSON on stdout. Ignores verbosity.
pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One line describing what happened to a reference.
pub fn format_ref_update(update: &RefUpdate) -> String {
    let old = update.old_target.to_string();
    match (&update.new_name, &update.new_target) {
        (Some(new_name), Some(new)) if *new_name != update.name => {
            format!("{} -> {} ({} -> {})", update.name, new_name, old, new)
        }
        (_, Some(new)) => format!("{}: {} -> {}", update.name, old, new),
        (_, None) => format!("{} deleted (was {})", update.name, old),
    }
}

/// Human-readable rewrite summary.
pub fn format_summary(summary: &RewriteSummary) -> String {
    let mut lines = vec![format!(
        "Rewrote {} of {} commits ({} pruned), {} tags, {} references",
        summary.commits_rewritten,
        summary.commits_visited,
        summary.commits_pruned,
        summary.tags_rewritten,
        summary.references.len()
    )];
    if !summary.references.is_empty() {
        let updates: Vec<String> = summary.references.iter().map(format_ref_update).collect();
        lines.push(format_list(&updates, "  "));
    }
    lines.join("\n")
}

/// One item per line, each behind `prefix`.
pub fn format_list<T: Display>(items: &[T], prefix: &str) -> String {
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(prefix);
        out.push_str(&item.to_string());
    }
    out
}
