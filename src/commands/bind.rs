use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::worktree::WorktreeManager;

/// Bind a session id to an existing worktree.
///
/// Without an explicit parent branch, the one already recorded for the
/// worktree is kept, falling back to the repository's default branch.
pub async fn bind(
    manager: &WorktreeManager,
    path: &Path,
    session_id: &str,
    parent: Option<String>,
    writer: &mut impl Write,
) -> Result<()> {
    let path = std::path::absolute(path)
        .with_context(|| format!("failed to resolve {}", path.display()))?;
    if !manager.contains(&path) || !path.join(".git").is_file() {
        bail!(
            "{} is not a worktree under {}",
            path.display(),
            manager.worktree_dir().display()
        );
    }
    if session_id.trim().is_empty() {
        bail!("session id must not be empty");
    }

    let parent = match parent {
        Some(p) => p,
        None => match manager.read_metadata(&path).await.and_then(|m| m.parent_branch) {
            Some(p) => p,
            None => manager.default_branch().await,
        },
    };

    manager.write_metadata(&path, session_id, &parent).await?;
    writeln!(writer, "Bound {session_id} to {} (parent {parent})", path.display())?;
    Ok(())
}
