use std::io::Write;

use anyhow::Result;

use crate::worktree::WorktreeManager;

use super::write_json;

pub async fn branches(manager: &WorktreeManager, writer: &mut impl Write) -> Result<()> {
    write_json(writer, &manager.list_branches().await)
}
