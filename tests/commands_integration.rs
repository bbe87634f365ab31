//! Integration tests for the `reweave` binary.
//!
//! Each test builds a throwaway repository with the git CLI and drives the
//! binary through `--cwd`.

use std::path::Path;
use std::process::Command as StdCommand;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use reweave::core::ops::lock::RepoLock;
use reweave::core::paths::ReweavePaths;

// =============================================================================
// Test Fixtures
// =============================================================================

struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Test User"]);
        run_git(dir.path(), &["config", "commit.gpgsign", "false"]);
        run_git(dir.path(), &["config", "tag.gpgsign", "false"]);

        let repo = Self { dir };
        repo.commit("README.md", "one\n", "First draft");
        repo.commit("README.md", "two\n", "Second draft");
        repo
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn commit(&self, file: &str, content: &str, message: &str) {
        std::fs::write(self.path().join(file), content).unwrap();
        run_git(self.path(), &["add", file]);
        run_git(self.path(), &["commit", "-m", message]);
    }

    fn git_output(&self, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .expect("git command failed");
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    /// `reweave --cwd <repo> ...`
    fn reweave(&self) -> Command {
        let mut cmd = Command::cargo_bin("reweave").expect("binary built");
        cmd.arg("--cwd").arg(self.path());
        cmd.env("REWEAVE_CONFIG", self.path().join("no-global-config.toml"));
        cmd
    }

    fn paths(&self) -> ReweavePaths {
        let git_dir = self.path().join(".git");
        ReweavePaths::new(git_dir.clone(), git_dir)
    }
}

fn run_git(dir: &Path, args: &[&str]) {
    let output = StdCommand::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git command failed");

    if !output.status.success() {
        panic!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

// =============================================================================
// rewrite
// =============================================================================

#[test]
fn rewrite_author_and_message() {
    let repo = TestRepo::new();
    let old_head = repo.git_output(&["rev-parse", "main"]);

    repo.reweave()
        .args([
            "rewrite",
            "--author",
            "Jane Doe <jane@example.com>",
            "--message-replace",
            "draft=version",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rewrote 2 of 2 commits"));

    assert_eq!(
        repo.git_output(&["log", "--format=%an|%ae|%s", "main"]),
        "Jane Doe|jane@example.com|Second version\nJane Doe|jane@example.com|First version"
    );
    assert_eq!(
        repo.git_output(&["rev-parse", "refs/original/heads/main"]),
        old_head
    );
}

#[test]
fn rewrite_keeps_author_dates() {
    let repo = TestRepo::new();
    let before = repo.git_output(&["log", "--format=%ad", "main"]);

    repo.reweave()
        .args(["-q", "rewrite", "--author", "Other <other@example.com>"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    assert_eq!(repo.git_output(&["log", "--format=%ad", "main"]), before);
}

#[test]
fn rewrite_remove_path_with_prune_empty() {
    let repo = TestRepo::new();
    repo.commit("secret.env", "TOKEN=1\n", "Add secret");

    repo.reweave()
        .args([
            "--json",
            "rewrite",
            "--remove-path",
            "secret.env",
            "--prune-empty",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"commits_pruned\": 1"));

    assert_eq!(
        repo.git_output(&["log", "--format=%s", "main"]),
        "Second draft\nFirst draft"
    );
}

#[test]
fn rewrite_tag_suffix_with_range() {
    let repo = TestRepo::new();
    run_git(repo.path(), &["tag", "-a", "v1", "-m", "Release"]);

    repo.reweave()
        .args([
            "rewrite",
            "--tag-suffix",
            "-fixed",
            "--committer",
            "Bot <bot@example.com>",
            "HEAD~1..HEAD",
        ])
        .assert()
        .success();

    assert_eq!(repo.git_output(&["tag", "--list"]), "v1-fixed");
    assert_eq!(
        repo.git_output(&["log", "--format=%cn", "main"]),
        "Bot\nTest User"
    );
    assert_eq!(
        repo.git_output(&["rev-parse", "v1-fixed^{commit}"]),
        repo.git_output(&["rev-parse", "main"])
    );
}

#[test]
fn rewrite_uses_repo_config() {
    let repo = TestRepo::new();
    let paths = repo.paths();
    std::fs::create_dir_all(paths.repo_reweave_dir()).unwrap();
    std::fs::write(
        paths.repo_config_path(),
        "[rewrite]\nbackup_namespace = \"refs/saved/\"\nreflog_prefix = \"reweave\"\n",
    )
    .unwrap();

    repo.reweave()
        .args(["rewrite", "--author", "Cfg <cfg@example.com>"])
        .assert()
        .success();

    assert!(!repo.git_output(&["rev-parse", "refs/saved/heads/main"]).is_empty());
    assert!(repo
        .git_output(&["reflog", "show", "--format=%gs", "refs/heads/main"])
        .lines()
        .next()
        .is_some_and(|line| line == "reweave: rewrite"));
}

#[test]
fn rewrite_rejects_bad_identity() {
    let repo = TestRepo::new();
    repo.reweave()
        .args(["rewrite", "--author", "nobody"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected 'Name <email>'"));
}

#[test]
fn rewrite_rejects_namespace_outside_refs() {
    let repo = TestRepo::new();
    let before = repo.git_output(&["for-each-ref", "--format=%(refname) %(objectname)"]);

    for namespace in ["refs", "backup"] {
        repo.reweave()
            .args(["rewrite", "--author", "A <a@example.com>", "--backup-namespace", namespace])
            .assert()
            .failure()
            .stderr(predicate::str::contains("must be below refs/"));
    }
    assert_eq!(
        repo.git_output(&["for-each-ref", "--format=%(refname) %(objectname)"]),
        before
    );
}

#[test]
fn rewrite_fails_while_locked() {
    let repo = TestRepo::new();
    let _held = RepoLock::acquire(&repo.paths()).unwrap();

    repo.reweave()
        .args(["rewrite", "--author", "A <a@example.com>"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("locked"));
}

#[test]
fn second_rewrite_reports_existing_backup() {
    let repo = TestRepo::new();
    repo.reweave()
        .args(["rewrite", "--author", "A <a@example.com>"])
        .assert()
        .success();
    let after_first = repo.git_output(&["rev-parse", "main"]);

    repo.reweave()
        .args(["rewrite", "--author", "B <b@example.com>"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    assert_eq!(repo.git_output(&["rev-parse", "main"]), after_first);
}

#[test]
fn outside_repository_fails() {
    let dir = TempDir::new().unwrap();
    let discovered = StdCommand::new("git")
        .args(["rev-parse", "--git-dir"])
        .current_dir(dir.path())
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if discovered {
        return;
    }

    Command::cargo_bin("reweave")
        .unwrap()
        .arg("--cwd")
        .arg(dir.path())
        .arg("backups")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open repository"));
}

// =============================================================================
// backups
// =============================================================================

#[test]
fn backups_list_and_drop() {
    let repo = TestRepo::new();
    repo.reweave()
        .args(["rewrite", "--author", "A <a@example.com>"])
        .assert()
        .success();

    repo.reweave()
        .args(["backups"])
        .assert()
        .success()
        .stdout(predicate::str::contains("refs/original/heads/main"));

    repo.reweave()
        .args(["--json", "backups"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"refs/original/heads/main\""));

    repo.reweave()
        .args(["backups", "--drop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 1 backups"));

    assert_eq!(repo.git_output(&["for-each-ref", "refs/original"]), "");

    // With the backup gone the next rewrite goes through.
    repo.reweave()
        .args(["rewrite", "--author", "B <b@example.com>"])
        .assert()
        .success();
}

#[test]
fn backups_empty_namespace() {
    let repo = TestRepo::new();
    repo.reweave()
        .args(["backups", "--namespace", "refs/elsewhere"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No backups under refs/elsewhere/"));
}
