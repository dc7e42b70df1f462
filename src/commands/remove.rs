use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::worktree::WorktreeManager;

/// Remove a worktree. Reports whether the directory is gone afterwards.
pub async fn remove(manager: &WorktreeManager, path: &Path, writer: &mut impl Write) -> Result<()> {
    let path = std::path::absolute(path)
        .with_context(|| format!("failed to resolve {}", path.display()))?;
    manager.remove_worktree(&path).await;

    if path.exists() {
        writeln!(writer, "{} could not be removed (see log)", path.display())?;
    } else {
        writeln!(writer, "Removed {}", path.display())?;
    }
    Ok(())
}
