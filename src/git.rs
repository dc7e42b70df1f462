//! Thin async wrapper over the `git` command line.
//!
//! Every git interaction in the crate goes through a [`GitRunner`], so tests
//! can swap the real subprocess for a scripted fake. A [`Git`] handle pairs a
//! runner with the directory commands run in; a worktree is itself a valid
//! repository view, so handles for worktree paths are created with [`Git::at`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("failed to run git: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("git {args} failed: {stderr}")]
    Failed { args: String, stderr: String },
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),
}

impl GitError {
    /// The text git printed on stderr, or the error message when git never ran.
    pub fn stderr(&self) -> String {
        match self {
            GitError::Failed { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        }
    }
}

/// Executes git commands. Implementations must be shareable across tasks.
#[async_trait]
pub trait GitRunner: Send + Sync {
    /// Run `git <args>` in `dir` and return stdout.
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<String, GitError>;
}

/// Runs the system `git` binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemGit;

#[async_trait]
impl GitRunner for SystemGit {
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<String, GitError> {
        debug!(dir = %dir.display(), ?args, "running git");
        let output = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
            .await
            .map_err(GitError::Spawn)?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(GitError::Failed {
                args: args.join(" "),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

pub(crate) fn path_str(path: &Path) -> Result<&str, GitError> {
    path.to_str()
        .ok_or_else(|| GitError::NonUtf8Path(path.to_path_buf()))
}

/// A git command interface bound to one directory.
#[derive(Clone)]
pub struct Git {
    runner: Arc<dyn GitRunner>,
    dir: PathBuf,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git").field("dir", &self.dir).finish_non_exhaustive()
    }
}

impl Git {
    pub fn new(runner: Arc<dyn GitRunner>, dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            dir: dir.into(),
        }
    }

    /// A handle sharing this runner, scoped to another directory.
    #[must_use]
    pub fn at(&self, dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::clone(&self.runner), dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn raw(&self, args: &[&str]) -> Result<String, GitError> {
        self.runner.run(&self.dir, args).await
    }

    /// Whether the directory is inside a git working copy.
    pub async fn check_is_repo(&self) -> bool {
        self.raw(&["rev-parse", "--is-inside-work-tree"])
            .await
            .is_ok_and(|out| out.trim() == "true")
    }

    /// `git rev-parse --abbrev-ref HEAD`, trimmed. Returns `"HEAD"` when detached.
    pub async fn revparse_head(&self) -> Result<String, GitError> {
        Ok(self
            .raw(&["rev-parse", "--abbrev-ref", "HEAD"])
            .await?
            .trim()
            .to_string())
    }

    /// Short names of local branches.
    pub async fn local_branches(&self) -> Result<Vec<String>, GitError> {
        let out = self
            .raw(&["branch", "--list", "--format=%(refname:short)"])
            .await?;
        Ok(non_empty_lines(&out))
    }

    /// Short names of local and remote-tracking branches (`origin/<name>` for remotes).
    pub async fn all_branches(&self) -> Result<Vec<String>, GitError> {
        let out = self
            .raw(&["branch", "-a", "--format=%(refname:short)"])
            .await?;
        Ok(non_empty_lines(&out))
    }

    /// Resolve the git common directory (the main repository's `.git`).
    ///
    /// `--git-common-dir` may print a path relative to the working directory,
    /// so relative results are joined onto it.
    pub async fn common_dir(&self) -> Result<PathBuf, GitError> {
        let raw = self.raw(&["rev-parse", "--git-common-dir"]).await?;
        let trimmed = raw.trim();
        Ok(if Path::new(trimmed).is_absolute() {
            PathBuf::from(trimmed)
        } else {
            self.dir.join(trimmed)
        })
    }

    /// All worktrees registered with the repository.
    pub async fn worktree_list(&self) -> Result<Vec<WorktreeEntry>, GitError> {
        let out = self.raw(&["worktree", "list", "--porcelain"]).await?;
        Ok(parse_worktree_list(&out))
    }

    /// Drop registrations whose directories no longer exist.
    pub async fn worktree_prune(&self) -> Result<(), GitError> {
        self.raw(&["worktree", "prune"]).await.map(|_| ())
    }
}

fn non_empty_lines(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// A git worktree entry from `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    /// Branch name without `refs/heads/`. None for detached HEAD.
    pub branch: Option<String>,
    /// Whether this is the main worktree (first entry in the list).
    pub is_main: bool,
    /// Git reports the worktree directory as missing.
    pub prunable: bool,
}

fn parse_worktree_list(output: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut current: Option<WorktreeEntry> = None;

    for line in output.lines() {
        if let Some(p) = line.strip_prefix("worktree ") {
            current = Some(WorktreeEntry {
                path: PathBuf::from(p),
                branch: None,
                is_main: entries.is_empty(),
                prunable: false,
            });
        } else if let Some(entry) = current.as_mut() {
            if let Some(b) = line.strip_prefix("branch refs/heads/") {
                entry.branch = Some(b.to_string());
            } else if line.starts_with("prunable") {
                entry.prunable = true;
            } else if line.is_empty()
                && let Some(done) = current.take()
            {
                entries.push(done);
            }
        }
    }
    // Porcelain output may not end with a blank line
    if let Some(done) = current {
        entries.push(done);
    }

    entries
}

// ── Failure classification ──────────────────────────────────────────────
//
// git reports worktree-add conflicts only through its human-readable stderr.
// The matching lives here so the wording dependency has exactly one home;
// the tests below pin the messages of the git versions we have seen.

/// Why `git worktree add` failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddFailure {
    /// The branch is checked out in another worktree (path if git named one).
    AlreadyCheckedOut { path: Option<String> },
    /// The branch name (or target path) is already taken.
    AlreadyExists,
    Other,
}

impl AddFailure {
    pub fn classify(stderr: &str) -> Self {
        if stderr.contains("already checked out") || stderr.contains("already used by worktree")
        {
            AddFailure::AlreadyCheckedOut {
                path: conflicting_path(stderr),
            }
        } else if stderr.contains("already exists") {
            AddFailure::AlreadyExists
        } else {
            AddFailure::Other
        }
    }
}

/// Extract `<path>` from `... at '<path>'`.
fn conflicting_path(stderr: &str) -> Option<String> {
    let (_, rest) = stderr.rsplit_once(" at '")?;
    let path = rest.split('\'').next()?;
    (!path.is_empty()).then(|| path.to_string())
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted runner for tests that must not touch a real repository.

    use std::sync::Mutex;

    use super::{GitError, GitRunner, Path, async_trait};

    type Responder = Box<dyn Fn(&[&str]) -> Result<String, GitError> + Send + Sync>;

    pub(crate) struct FakeGit {
        responder: Responder,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl FakeGit {
        pub(crate) fn new(
            responder: impl Fn(&[&str]) -> Result<String, GitError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                responder: Box::new(responder),
                calls: Mutex::new(Vec::new()),
            }
        }

        #[allow(clippy::unwrap_used)]
        pub(crate) fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        /// Calls whose arguments start with `prefix`.
        pub(crate) fn calls_starting_with(&self, prefix: &[&str]) -> Vec<Vec<String>> {
            self.calls()
                .into_iter()
                .filter(|c| c.len() >= prefix.len() && c.iter().zip(prefix).all(|(a, b)| a == b))
                .collect()
        }
    }

    pub(crate) fn failed(stderr: &str) -> GitError {
        GitError::Failed {
            args: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[async_trait]
    impl GitRunner for FakeGit {
        #[allow(clippy::unwrap_used)]
        async fn run(&self, _dir: &Path, args: &[&str]) -> Result<String, GitError> {
            self.calls
                .lock()
                .unwrap()
                .push(args.iter().map(ToString::to_string).collect());
            (self.responder)(args)
        }
    }
}
