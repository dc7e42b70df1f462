//! Session binding on top of the worktree manager.
//!
//! A worktree is provisioned before its session exists (the session is
//! created by a remote service), so every worktree is in one of two states:
//! provisioned without a session, or bound to one. A crash between the two
//! leaves a provisioned worktree behind; [`recover`] reports it as orphaned
//! and [`sweep_orphans`] can clean it up.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::branch_name::{self, versioned_name};
use crate::worktree::{
    CreateWorktreeParams, CreateWorktreeResult, WorktreeError, WorktreeInfo, WorktreeManager,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum Binding {
    /// The worktree exists but no session has been bound yet.
    Provisioned,
    #[serde(rename_all = "camelCase")]
    Bound { session_id: String },
}

impl Binding {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Binding::Provisioned => None,
            Binding::Bound { session_id } => Some(session_id),
        }
    }
}

/// A worktree together with its binding state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionWorktree {
    #[serde(flatten)]
    pub info: WorktreeInfo,
    pub binding: Binding,
}

impl From<WorktreeInfo> for SessionWorktree {
    fn from(info: WorktreeInfo) -> Self {
        let binding = match &info.session_id {
            Some(id) => Binding::Bound {
                session_id: id.clone(),
            },
            None => Binding::Provisioned,
        };
        Self { info, binding }
    }
}

/// Bind a freshly obtained session id to a created worktree.
///
/// Call once, after both the worktree and the remote session exist.
pub async fn bind_session(
    manager: &WorktreeManager,
    created: &CreateWorktreeResult,
    session_id: &str,
) -> Result<Binding, WorktreeError> {
    manager
        .write_metadata(&created.path, session_id, &created.parent_branch)
        .await?;
    Ok(Binding::Bound {
        session_id: session_id.to_string(),
    })
}

/// Worktrees found at startup, split by binding state.
#[derive(Debug, Default, Serialize)]
pub struct Recovery {
    pub bound: Vec<SessionWorktree>,
    pub orphaned: Vec<SessionWorktree>,
}

/// Rebuild the session ↔ worktree bindings from disk.
pub async fn recover(manager: &WorktreeManager) -> Recovery {
    let mut recovery = Recovery::default();
    for wt in manager.discover_worktrees().await {
        let wt = SessionWorktree::from(wt);
        match wt.binding {
            Binding::Bound { .. } => recovery.bound.push(wt),
            Binding::Provisioned => recovery.orphaned.push(wt),
        }
    }
    info!(
        bound = recovery.bound.len(),
        orphaned = recovery.orphaned.len(),
        "recovered worktrees"
    );
    recovery
}

/// Remove provisioned worktrees that never got a session, except those in
/// `keep` (e.g. creations still waiting on their session). Returns the
/// removed paths.
pub async fn sweep_orphans(manager: &WorktreeManager, keep: &HashSet<PathBuf>) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    for wt in recover(manager).await.orphaned {
        let path = wt.info.path;
        if keep.contains(&path) {
            continue;
        }
        manager.remove_worktree(&path).await;
        if path.exists() {
            warn!(path = %path.display(), "orphaned worktree survived removal");
        } else {
            removed.push(path);
        }
    }
    removed
}

/// One member of a multi-version run.
#[derive(Debug, Clone, Serialize)]
pub struct VersionedWorktree {
    pub label: String,
    #[serde(flatten)]
    pub worktree: CreateWorktreeResult,
}

/// Create `count` sibling worktrees from one request, for comparing several
/// agents on the same task.
///
/// The base name is `params.branch_name`, or one generated from the prompt;
/// members after the first get `_v2`, `_v3`, ... Creation is sequential and
/// stops at the first failure; worktrees created before it are left in place
/// for the caller to bind or remove.
pub async fn create_versions(
    manager: &WorktreeManager,
    params: &CreateWorktreeParams,
    count: usize,
) -> Result<Vec<VersionedWorktree>, WorktreeError> {
    let count = count.max(1);
    let base = match &params.branch_name {
        Some(name) => name.clone(),
        None => branch_name::generate_branch_name_at(
            params.prompt.as_deref().unwrap_or_default(),
            manager.naming(),
            branch_name::epoch_millis(),
        ),
    };

    let mut created = Vec::with_capacity(count);
    for index in 0..count {
        let name = versioned_name(Some(&base), index, count);
        let member = CreateWorktreeParams {
            branch_name: name.branch.clone(),
            existing_branch: None,
            ..params.clone()
        };
        match manager.create_worktree(&member).await {
            Ok(worktree) => created.push(VersionedWorktree {
                label: name.label.unwrap_or_else(|| worktree.branch.clone()),
                worktree,
            }),
            Err(e) => {
                warn!(
                    index,
                    created = created.len(),
                    error = %e,
                    "multi-version creation stopped"
                );
                return Err(e);
            }
        }
    }
    Ok(created)
}
