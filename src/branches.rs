//! Branch discovery for listing and validation.
//!
//! Everything here treats git failures as "no information": a missing remote
//! or a repository without commits should degrade a listing, not fail it.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::git::{Git, GitError};

const REMOTE: &str = "origin";

/// A branch as shown in branch pickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchInfo {
    pub name: String,
    pub is_local: bool,
    pub is_remote: bool,
    /// Newest commit time, seconds since the epoch.
    pub last_commit_date: i64,
    pub is_default: bool,
}

pub async fn current_branch(git: &Git) -> Result<String, GitError> {
    git.revparse_head().await
}

pub async fn exists_locally(git: &Git, name: &str) -> bool {
    git.local_branches()
        .await
        .is_ok_and(|branches| branches.iter().any(|b| b == name))
}

pub async fn exists_on_remote(git: &Git, name: &str) -> bool {
    let remote_name = format!("{REMOTE}/{name}");
    let qualified = format!("remotes/{remote_name}");
    git.all_branches()
        .await
        .is_ok_and(|branches| branches.iter().any(|b| *b == remote_name || *b == qualified))
}

/// True if `name` exists locally or as `origin/<name>`.
pub async fn branch_exists(git: &Git, name: &str) -> bool {
    exists_locally(git, name).await || exists_on_remote(git, name).await
}

/// The repository's default branch.
///
/// `origin/HEAD` wins when set; otherwise `main` if it exists, then
/// `master`, then the literal `main`.
pub async fn default_branch(git: &Git) -> String {
    if let Ok(out) = git
        .raw(&["symbolic-ref", "refs/remotes/origin/HEAD"])
        .await
        && let Some(name) = out.trim().strip_prefix("refs/remotes/origin/")
        && !name.is_empty()
    {
        return name.to_string();
    }

    let local = git.local_branches().await.unwrap_or_default();
    for candidate in ["main", "master"] {
        if local.iter().any(|b| b == candidate) {
            return candidate.to_string();
        }
    }
    "main".to_string()
}

/// Parse `<name>\t<unix seconds>` lines from `for-each-ref`.
fn parse_refs(out: &str) -> Vec<(String, i64)> {
    out.lines()
        .filter_map(|line| {
            let (name, date) = line.split_once('\t')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), date.trim().parse().unwrap_or(0)))
        })
        .collect()
}

async fn for_each_ref(git: &Git, format: &str, namespace: &str) -> Vec<(String, i64)> {
    let format_arg = format!("--format={format}%09%(committerdate:unix)");
    match git
        .raw(&[
            "for-each-ref",
            "--sort=-committerdate",
            &format_arg,
            namespace,
        ])
        .await
    {
        Ok(out) => parse_refs(&out),
        Err(e) => {
            debug!(namespace, error = %e, "for-each-ref failed, treating as empty");
            Vec::new()
        }
    }
}

/// Local and `origin` branches merged by name, default branch first, then
/// most recently committed.
pub async fn list_branches(git: &Git) -> Vec<BranchInfo> {
    let local = for_each_ref(git, "%(refname:short)", "refs/heads/").await;
    let remote = for_each_ref(git, "%(refname:lstrip=3)", "refs/remotes/origin/").await;
    let default = default_branch(git).await;
    merge_branches(local, remote, &default)
}

fn merge_branches(
    local: Vec<(String, i64)>,
    remote: Vec<(String, i64)>,
    default: &str,
) -> Vec<BranchInfo> {
    let mut by_name: HashMap<String, BranchInfo> = HashMap::new();

    for (name, date) in local {
        let entry = by_name.entry(name.clone()).or_insert_with(|| BranchInfo {
            is_default: name == default,
            name,
            is_local: false,
            is_remote: false,
            last_commit_date: date,
        });
        entry.is_local = true;
        entry.last_commit_date = entry.last_commit_date.max(date);
    }

    for (name, date) in remote {
        if name == "HEAD" {
            continue;
        }
        let entry = by_name.entry(name.clone()).or_insert_with(|| BranchInfo {
            is_default: name == default,
            name,
            is_local: false,
            is_remote: false,
            last_commit_date: date,
        });
        entry.is_remote = true;
        entry.last_commit_date = entry.last_commit_date.max(date);
    }

    let mut branches: Vec<BranchInfo> = by_name.into_values().collect();
    branches.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then(b.last_commit_date.cmp(&a.last_commit_date))
            .then_with(|| a.name.cmp(&b.name))
    });
    branches
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::git::fake::{FakeGit, failed};

    fn fake(responder: impl Fn(&[&str]) -> Result<String, GitError> + Send + Sync + 'static) -> Git {
        Git::new(Arc::new(FakeGit::new(responder)), "/repo")
    }

    #[test]
    fn merge_tracks_local_and_remote_independently() {
        let local = vec![("main".into(), 100), ("feature".into(), 300)];
        let remote = vec![
            ("HEAD".into(), 100),
            ("main".into(), 150),
            ("remote-only".into(), 200),
        ];
        let branches = merge_branches(local, remote, "main");

        let names: Vec<&str> = branches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["main", "feature", "remote-only"]);

        let main = &branches[0];
        assert!(main.is_default && main.is_local && main.is_remote);
        assert_eq!(main.last_commit_date, 150);

        assert!(branches[1].is_local && !branches[1].is_remote);
        assert!(!branches[2].is_local && branches[2].is_remote);
    }

    #[test]
    fn parse_refs_skips_garbage() {
        let parsed = parse_refs("main\t1700000000\n\nbroken line\nfeat/x\tnot-a-number\n");
        assert_eq!(
            parsed,
            vec![("main".to_string(), 1_700_000_000), ("feat/x".to_string(), 0)]
        );
    }

    #[tokio::test]
    async fn default_branch_prefers_origin_head() {
        let git = fake(|args| match args {
            ["symbolic-ref", ..] => Ok("refs/remotes/origin/develop\n".into()),
            _ => Ok("main\n".into()),
        });
        assert_eq!(default_branch(&git).await, "develop");
    }

    #[tokio::test]
    async fn default_branch_falls_back_to_master_then_main() {
        let git = fake(|args| match args {
            ["symbolic-ref", ..] => Err(failed("fatal: ref refs/remotes/origin/HEAD is not a symbolic ref")),
            _ => Ok("master\nfeature\n".into()),
        });
        assert_eq!(default_branch(&git).await, "master");

        let git = fake(|_| Err(failed("fatal: not a git repository")));
        assert_eq!(default_branch(&git).await, "main");
    }

    #[tokio::test]
    async fn branch_exists_checks_remote_names() {
        let git = fake(|args| match args {
            ["branch", "--list", ..] => Ok("main\n".into()),
            ["branch", "-a", ..] => Ok("main\norigin\norigin/release\n".into()),
            _ => Ok(String::new()),
        });
        assert!(branch_exists(&git, "main").await);
        assert!(branch_exists(&git, "release").await);
        assert!(!exists_locally(&git, "release").await);
        assert!(!branch_exists(&git, "nope").await);
    }

    #[tokio::test]
    async fn branch_exists_swallows_errors() {
        let git = fake(|_| Err(failed("fatal: boom")));
        assert!(!branch_exists(&git, "main").await);
    }

    #[tokio::test]
    async fn list_branches_degrades_per_namespace() {
        let git = fake(|args| match args {
            ["for-each-ref", .., "refs/heads/"] => Ok("main\t10\nwip\t20\n".into()),
            ["for-each-ref", .., "refs/remotes/origin/"] => Err(failed("fatal: bad ref")),
            ["branch", ..] => Ok("main\nwip\n".into()),
            _ => Err(failed("fatal: no origin")),
        });
        let branches = list_branches(&git).await;
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].name, "main");
        assert!(branches.iter().all(|b| b.is_local && !b.is_remote));
    }
}
