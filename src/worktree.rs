//! Worktree lifecycle: creation, discovery, session metadata and teardown.
//!
//! Worktrees live under `<root>/.kilocode/worktrees/<branch-with-dashes>/`.
//! The filesystem and git are the only durable store: discovery rebuilds
//! the session bindings from the metadata files each worktree carries.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::branch_name::{self, NamingOptions};
use crate::branches::{self, BranchInfo};
use crate::exclude;
use crate::git::{self, AddFailure, Git, GitError, GitRunner, SystemGit};
use crate::metadata::{self, SessionMetadata};

/// Worktree storage, relative to the repository root.
pub const WORKTREES_DIR: &str = ".kilocode/worktrees";

/// Entries kept out of `git status` in the main repository.
const MAIN_EXCLUDES: [(&str, &str); 3] = [
    (".kilocode/worktrees/", "Kilo agent worktrees"),
    (".kilocode/agent-manager.json", "Kilo agent manager state"),
    (".kilocode/setup-script", "Kilo worktree setup script"),
];

const WORKTREE_STATE_EXCLUDE: (&str, &str) = (".kilocode/", "Kilo agent session state");

#[derive(Debug, thiserror::Error)]
pub enum WorktreeError {
    #[error("{} is not a git repository; run `git init` to create one", .0.display())]
    NotAGitRepository(PathBuf),
    #[error("base branch '{0}' does not exist locally or on origin")]
    BaseBranchNotFound(String),
    #[error("branch '{0}' does not exist")]
    BranchNotFound(String),
    #[error("branch '{branch}' is already checked out at {path}")]
    BranchAlreadyCheckedOut { branch: String, path: String },
    #[error("failed to create worktree: {0}")]
    WorktreeCreationFailed(String),
    #[error("{} is not a worktree checkout", .0.display())]
    NotAWorktree(PathBuf),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// What to create. All fields are optional; the default creates a new
/// branch named after an empty prompt from the current `HEAD`.
#[derive(Debug, Clone, Default)]
pub struct CreateWorktreeParams {
    /// Free text used to derive a branch name.
    pub prompt: Option<String>,
    /// Check out this existing branch instead of creating one.
    pub existing_branch: Option<String>,
    /// Branch to fork from. Defaults to the current branch.
    pub base_branch: Option<String>,
    /// Explicit name for the new branch.
    pub branch_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorktreeResult {
    pub branch: String,
    pub path: PathBuf,
    pub parent_branch: String,
}

/// A worktree found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeInfo {
    pub branch: String,
    pub path: PathBuf,
    pub parent_branch: String,
    #[serde(serialize_with = "serialize_epoch_millis")]
    pub created_at: SystemTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

fn serialize_epoch_millis<S: Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
    let millis = t.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis());
    s.serialize_u128(millis)
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Owns the worktrees of one repository.
#[derive(Debug, Clone)]
pub struct WorktreeManager {
    root: PathBuf,
    worktree_dir: PathBuf,
    git: Git,
    naming: NamingOptions,
}

impl WorktreeManager {
    /// A manager running the system `git`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_runner(root, Arc::new(SystemGit))
    }

    /// A manager running git through `runner`.
    ///
    /// A relative `root` is resolved against the current directory here, so
    /// every worktree path handed out is absolute.
    pub fn with_runner(root: impl Into<PathBuf>, runner: Arc<dyn GitRunner>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).map_or(root, |abs| normalize(&abs));
        Self {
            worktree_dir: root.join(WORKTREES_DIR),
            git: Git::new(runner, root.clone()),
            root,
            naming: NamingOptions::default(),
        }
    }

    #[must_use]
    pub fn with_naming(mut self, naming: NamingOptions) -> Self {
        self.naming = naming;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn worktree_dir(&self) -> &Path {
        &self.worktree_dir
    }

    pub fn naming(&self) -> &NamingOptions {
        &self.naming
    }

    /// Whether `path` lies strictly inside the worktree storage directory.
    ///
    /// The check is lexical: symlinks are not followed, so a link placed
    /// under the storage directory counts as inside even when its target
    /// is not.
    pub fn contains(&self, path: &Path) -> bool {
        let path = normalize(path);
        let base = normalize(&self.worktree_dir);
        path != base && path.starts_with(&base)
    }

    // ── Creation ────────────────────────────────────────────────────────

    /// Provision a worktree for a new session.
    ///
    /// A stale directory at the target path is torn down first. If git
    /// reports that the new branch already exists, the name gets a
    /// millisecond suffix and creation is retried exactly once.
    pub async fn create_worktree(
        &self,
        params: &CreateWorktreeParams,
    ) -> Result<CreateWorktreeResult, WorktreeError> {
        if !self.git.check_is_repo().await {
            return Err(WorktreeError::NotAGitRepository(self.root.clone()));
        }

        fs::create_dir_all(&self.worktree_dir).await?;
        self.ensure_git_exclude().await;

        let parent = match &params.base_branch {
            Some(base) => base.clone(),
            None => self.head_parent().await?,
        };

        let start_point = match &params.base_branch {
            Some(base) => Some(self.resolve_base(base).await?),
            None => None,
        };

        let mut branch = match (&params.existing_branch, &params.branch_name) {
            (Some(existing), _) => {
                if !self.branch_exists(existing).await {
                    return Err(WorktreeError::BranchNotFound(existing.clone()));
                }
                existing.clone()
            }
            (None, Some(name)) => name.clone(),
            (None, None) => branch_name::generate_branch_name_at(
                params.prompt.as_deref().unwrap_or_default(),
                &self.naming,
                branch_name::epoch_millis(),
            ),
        };
        let mut path = self.path_for(&branch);

        if fs::try_exists(&path).await.unwrap_or(false) {
            info!(path = %path.display(), "removing stale worktree directory before create");
            self.remove_worktree(&path).await;
        }

        let checkout_existing = params.existing_branch.is_some();
        if let Err(e) = self
            .add_worktree(&branch, &path, checkout_existing, start_point.as_deref())
            .await
        {
            let stderr = e.stderr();
            match AddFailure::classify(&stderr) {
                AddFailure::AlreadyCheckedOut { path: other } => {
                    return Err(WorktreeError::BranchAlreadyCheckedOut {
                        branch,
                        path: other.unwrap_or_else(|| "another worktree".to_string()),
                    });
                }
                AddFailure::AlreadyExists if !checkout_existing => {
                    let retry = branch_name::collision_suffixed(&branch, branch_name::epoch_millis());
                    warn!(branch = %branch, retry = %retry, "branch name collision, retrying once");
                    let retry_path = self.path_for(&retry);
                    self.add_worktree(&retry, &retry_path, false, start_point.as_deref())
                        .await
                        .map_err(|e| WorktreeError::WorktreeCreationFailed(e.stderr()))?;
                    branch = retry;
                    path = retry_path;
                }
                _ => return Err(WorktreeError::WorktreeCreationFailed(stderr)),
            }
        }

        info!(branch = %branch, path = %path.display(), parent_branch = %parent, "created worktree");
        Ok(CreateWorktreeResult {
            branch,
            path,
            parent_branch: parent,
        })
    }

    fn path_for(&self, branch: &str) -> PathBuf {
        self.worktree_dir
            .join(branch_name::worktree_dir_name(branch))
    }

    /// The current branch, or the default branch when `HEAD` is detached.
    async fn head_parent(&self) -> Result<String, WorktreeError> {
        let head = self.current_branch().await?;
        if head == "HEAD" {
            let fallback = self.default_branch().await;
            debug!(fallback = %fallback, "detached HEAD, using default branch as parent");
            return Ok(fallback);
        }
        Ok(head)
    }

    /// Verify an explicit base branch and return the ref to fork from.
    ///
    /// A base that only exists on `origin` is fetched and forked from
    /// `origin/<base>`.
    async fn resolve_base(&self, base: &str) -> Result<String, WorktreeError> {
        if branches::exists_locally(&self.git, base).await {
            return Ok(base.to_string());
        }
        if !branches::exists_on_remote(&self.git, base).await {
            return Err(WorktreeError::BaseBranchNotFound(base.to_string()));
        }

        info!(base, "base branch only exists on origin, fetching");
        if let Err(e) = self.git.raw(&["fetch", "origin", base]).await {
            warn!(base, error = %e, "fetch failed, using the existing remote-tracking ref");
        }
        Ok(format!("origin/{base}"))
    }

    async fn add_worktree(
        &self,
        branch: &str,
        path: &Path,
        checkout_existing: bool,
        start_point: Option<&str>,
    ) -> Result<(), GitError> {
        let path = git::path_str(path)?;
        let mut args = vec!["worktree", "add"];
        if checkout_existing {
            args.extend([path, branch]);
        } else {
            args.extend(["-b", branch, path]);
            args.extend(start_point);
        }
        self.git.raw(&args).await.map(|_| ())
    }

    // ── Removal ─────────────────────────────────────────────────────────

    /// Tear a worktree down, escalating until something works.
    ///
    /// Tries `git worktree remove`, then `--force`, then deletes the
    /// directory outright. The direct delete only happens inside the
    /// worktree storage directory. Failures are logged, never returned.
    pub async fn remove_worktree(&self, path: &Path) {
        let Ok(path_arg) = git::path_str(path) else {
            warn!(path = %path.display(), "cannot remove worktree with a non UTF-8 path");
            return;
        };

        match self.git.raw(&["worktree", "remove", path_arg]).await {
            Ok(_) => {
                info!(path = %path.display(), "removed worktree");
                return;
            }
            Err(e) => debug!(path = %path.display(), error = %e, "git worktree remove failed"),
        }

        match self.git.raw(&["worktree", "remove", "--force", path_arg]).await {
            Ok(_) => {
                info!(path = %path.display(), "force-removed worktree");
                return;
            }
            Err(e) => debug!(path = %path.display(), error = %e, "git worktree remove --force failed"),
        }

        if !self.contains(path) {
            warn!(
                path = %path.display(),
                worktree_dir = %self.worktree_dir.display(),
                "refusing to delete a path outside the worktree directory"
            );
            return;
        }

        match fs::remove_dir_all(path).await {
            Ok(()) => {
                info!(path = %path.display(), "deleted untracked worktree directory");
                if let Err(e) = self.git.worktree_prune().await {
                    debug!(error = %e, "git worktree prune failed");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "worktree directory already gone");
            }
            Err(e) => error!(path = %path.display(), error = %e, "failed to remove worktree"),
        }
    }

    /// Registered worktrees under the storage directory whose directories
    /// are gone, pruned from git's bookkeeping. Returns the pruned paths.
    pub async fn prune_stale(&self) -> Result<Vec<PathBuf>, GitError> {
        let stale: Vec<PathBuf> = self
            .git
            .worktree_list()
            .await?
            .into_iter()
            .filter(|wt| !wt.is_main && self.contains(&wt.path))
            .filter(|wt| wt.prunable || !wt.path.exists())
            .map(|wt| wt.path)
            .collect();

        if !stale.is_empty() {
            self.git.worktree_prune().await?;
            info!(count = stale.len(), "pruned stale worktree registrations");
        }
        Ok(stale)
    }

    // ── Discovery & metadata ────────────────────────────────────────────

    /// Every worktree under the storage directory, oldest first.
    ///
    /// Directories that are not worktree checkouts, or whose branch cannot be
    /// read, are skipped.
    pub async fn discover_worktrees(&self) -> Vec<WorktreeInfo> {
        let mut entries = match fs::read_dir(&self.worktree_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(dir = %self.worktree_dir.display(), error = %e, "failed to list worktree directory");
                return Vec::new();
            }
        };

        let mut default_branch: Option<String> = None;
        let mut found = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "failed to read worktree directory entry");
                    break;
                }
            };
            let path = entry.path();
            if !entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }

            match self.inspect(&path).await {
                Ok((branch, created_at, meta)) => {
                    let parent_branch = match meta.as_ref().and_then(|m| m.parent_branch.clone()) {
                        Some(parent) => parent,
                        None => match &default_branch {
                            Some(d) => d.clone(),
                            None => {
                                let d = self.default_branch().await;
                                default_branch = Some(d.clone());
                                d
                            }
                        },
                    };
                    found.push(WorktreeInfo {
                        branch,
                        path,
                        parent_branch,
                        created_at,
                        session_id: meta.map(|m| m.session_id),
                    });
                }
                Err(e) => debug!(path = %path.display(), error = %e, "skipping directory"),
            }
        }

        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.path.cmp(&b.path)));
        found
    }

    async fn inspect(
        &self,
        path: &Path,
    ) -> Result<(String, SystemTime, Option<SessionMetadata>), WorktreeError> {
        // A linked worktree has a `.git` file; a directory means some other checkout
        let dot_git = fs::metadata(path.join(".git"))
            .await
            .map_err(|_| WorktreeError::NotAWorktree(path.to_path_buf()))?;
        if !dot_git.is_file() {
            return Err(WorktreeError::NotAWorktree(path.to_path_buf()));
        }

        let branch = self.git.at(path).revparse_head().await?;
        let stat = fs::metadata(path).await?;
        let created_at = stat.created().or_else(|_| stat.modified())?;
        let meta = metadata::read_metadata(path).await;
        Ok((branch, created_at, meta))
    }

    pub async fn read_metadata(&self, path: &Path) -> Option<SessionMetadata> {
        metadata::read_metadata(path).await
    }

    /// Bind a session to a worktree. Writes both metadata formats, then keeps
    /// the worktree's state directory out of `git status`.
    pub async fn write_metadata(
        &self,
        path: &Path,
        session_id: &str,
        parent_branch: &str,
    ) -> Result<(), WorktreeError> {
        metadata::write_metadata(path, session_id, parent_branch).await?;
        info!(path = %path.display(), session_id, "bound session to worktree");
        self.ensure_worktree_exclude(path).await;
        Ok(())
    }

    // ── Exclude bookkeeping ─────────────────────────────────────────────

    /// Keep worktree storage and agent state files out of the main
    /// repository's `git status`.
    pub async fn ensure_git_exclude(&self) {
        let git_dir = match self.git.common_dir().await {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "cannot locate git directory for exclude entries");
                return;
            }
        };
        let file = exclude::exclude_file(&git_dir);
        for (entry, comment) in MAIN_EXCLUDES {
            if let Err(e) = exclude::ensure_entry(&file, entry, comment).await {
                warn!(file = %file.display(), entry, error = %e, "failed to update git exclude");
            }
        }
    }

    async fn ensure_worktree_exclude(&self, worktree: &Path) {
        let git_dir = match exclude::main_git_dir(worktree).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!(path = %worktree.display(), error = %e, "cannot resolve worktree git directory");
                return;
            }
        };
        let file = exclude::exclude_file(&git_dir);
        let (entry, comment) = WORKTREE_STATE_EXCLUDE;
        if let Err(e) = exclude::ensure_entry(&file, entry, comment).await {
            warn!(file = %file.display(), error = %e, "failed to update git exclude");
        }
    }

    // ── Branches ────────────────────────────────────────────────────────

    pub async fn current_branch(&self) -> Result<String, GitError> {
        branches::current_branch(&self.git).await
    }

    pub async fn branch_exists(&self, name: &str) -> bool {
        branches::branch_exists(&self.git, name).await
    }

    pub async fn default_branch(&self) -> String {
        branches::default_branch(&self.git).await
    }

    pub async fn list_branches(&self) -> Vec<BranchInfo> {
        branches::list_branches(&self.git).await
    }
}
