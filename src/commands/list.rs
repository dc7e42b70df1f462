use std::io::Write;

use anyhow::Result;

use crate::session::SessionWorktree;
use crate::worktree::WorktreeManager;

use super::write_json;

/// Print every discovered worktree with its binding state.
pub async fn list(manager: &WorktreeManager, writer: &mut impl Write) -> Result<()> {
    let worktrees: Vec<SessionWorktree> = manager
        .discover_worktrees()
        .await
        .into_iter()
        .map(SessionWorktree::from)
        .collect();
    write_json(writer, &worktrees)
}
