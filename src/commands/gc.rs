use std::collections::HashSet;
use std::io::Write;

use anyhow::{Context, Result};

use crate::session;
use crate::worktree::WorktreeManager;

/// Remove worktrees that were provisioned but never bound to a session.
///
/// Without `force`, only lists what would be removed. Stale git
/// registrations for deleted directories are pruned either way.
pub async fn gc(manager: &WorktreeManager, force: bool, writer: &mut impl Write) -> Result<()> {
    let pruned = manager
        .prune_stale()
        .await
        .context("failed to prune stale worktree registrations")?;
    for path in &pruned {
        writeln!(writer, "Pruned stale registration {}", path.display())?;
    }

    let orphaned = session::recover(manager).await.orphaned;
    if orphaned.is_empty() {
        writeln!(writer, "No orphaned worktrees.")?;
        return Ok(());
    }

    if !force {
        writeln!(writer, "{} orphaned worktree(s):\n", orphaned.len())?;
        for wt in &orphaned {
            writeln!(writer, "  {} ({})", wt.info.branch, wt.info.path.display())?;
        }
        writeln!(writer, "\nRun with --force to remove them.")?;
        return Ok(());
    }

    let removed = session::sweep_orphans(manager, &HashSet::new()).await;
    writeln!(writer, "Removing {} orphaned worktree(s):\n", orphaned.len())?;
    for wt in &orphaned {
        let outcome = if removed.contains(&wt.info.path) {
            "removed"
        } else {
            "failed (see log)"
        };
        writeln!(writer, "  {} ({}): {outcome}", wt.info.branch, wt.info.path.display())?;
    }

    if !removed.is_empty() {
        writeln!(writer, "\nRemoved {} worktree(s).", removed.len())?;
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::Path;
    use std::process::Command;

    use super::*;
    use crate::session::bind_session;
    use crate::worktree::CreateWorktreeParams;
    use tempfile::TempDir;

    fn init_repo(dir: &Path) {
        for args in [
            &["init"][..],
            &["config", "user.email", "test@test.com"],
            &["config", "user.name", "Test"],
            &["config", "commit.gpgsign", "false"],
            &["commit", "--allow-empty", "-m", "init"],
        ] {
            let out = Command::new("git").arg("-C").arg(dir).args(args).output().unwrap();
            assert!(out.status.success(), "git {args:?} failed");
        }
    }

    fn named(branch: &str) -> CreateWorktreeParams {
        CreateWorktreeParams {
            branch_name: Some(branch.into()),
            ..CreateWorktreeParams::default()
        }
    }

    #[tokio::test]
    async fn dry_run_lists_orphans() {
        let repo = TempDir::new().unwrap();
        init_repo(repo.path());
        let mgr = WorktreeManager::new(repo.path());
        let orphan = mgr.create_worktree(&named("lonely")).await.unwrap();

        let mut out = Vec::new();
        gc(&mgr, false, &mut out).await.unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.contains("1 orphaned worktree(s)"));
        assert!(out.contains("lonely"));
        assert!(orphan.path.exists());
    }

    #[tokio::test]
    async fn force_removes_orphans_and_keeps_bound() {
        let repo = TempDir::new().unwrap();
        init_repo(repo.path());
        let mgr = WorktreeManager::new(repo.path());
        let orphan = mgr.create_worktree(&named("lonely")).await.unwrap();
        let bound = mgr.create_worktree(&named("busy")).await.unwrap();
        bind_session(&mgr, &bound, "ses_1").await.unwrap();

        let mut out = Vec::new();
        gc(&mgr, true, &mut out).await.unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.contains("lonely"));
        assert!(out.contains("Removed 1 worktree(s)."));
        assert!(!orphan.path.exists());
        assert!(bound.path.exists());
    }

    #[tokio::test]
    async fn nothing_to_collect() {
        let repo = TempDir::new().unwrap();
        init_repo(repo.path());
        let mgr = WorktreeManager::new(repo.path());

        let mut out = Vec::new();
        gc(&mgr, true, &mut out).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No orphaned worktrees.\n");
    }
}
