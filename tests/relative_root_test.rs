//! Lives in its own test binary: it changes the process working directory.

#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::process::Command;

use kilo_worktrees::commands;
use kilo_worktrees::{CreateWorktreeParams, WorktreeManager};
use tempfile::TempDir;

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[tokio::test]
async fn relative_repo_root_creates_worktree_in_place() {
    let dir = TempDir::new().unwrap();
    let repo = dir.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    git(&repo, &["init"]);
    git(&repo, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(&repo, &["config", "user.email", "test@test.com"]);
    git(&repo, &["config", "user.name", "Test"]);
    git(&repo, &["config", "commit.gpgsign", "false"]);
    git(&repo, &["commit", "--allow-empty", "-m", "init"]);

    std::env::set_current_dir(dir.path()).unwrap();

    let root = commands::resolve_repo(Some(Path::new("repo"))).unwrap();
    assert!(root.is_absolute());

    let manager = WorktreeManager::new("repo");
    let created = manager
        .create_worktree(&CreateWorktreeParams {
            branch_name: Some("x".into()),
            ..CreateWorktreeParams::default()
        })
        .await
        .unwrap();

    assert!(created.path.is_absolute());
    assert!(created.path.join(".git").is_file());
    assert!(created.path.ends_with("repo/.kilocode/worktrees/x"));
    assert!(!dir.path().join("repo/repo").exists());

    let found = manager.discover_worktrees().await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].path, created.path);
}
