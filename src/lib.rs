//! Git worktree lifecycle for isolated agent sessions.
//!
//! Each agent session runs in its own worktree under
//! `<repo>/.kilocode/worktrees/`, on a branch derived from its prompt.
//! Session bindings live inside the worktree, so they can be rebuilt from
//! disk after a restart.

pub mod branch_name;
pub mod branches;
pub mod commands;
pub mod config;
pub mod exclude;
pub mod git;
pub mod logging;
pub mod metadata;
pub mod session;
pub mod worktree;

pub use branches::BranchInfo;
pub use git::{GitError, GitRunner, SystemGit};
pub use metadata::SessionMetadata;
pub use session::{Binding, SessionWorktree};
pub use worktree::{
    CreateWorktreeParams, CreateWorktreeResult, WorktreeError, WorktreeInfo, WorktreeManager,
};
