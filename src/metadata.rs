//! Per-worktree session metadata.
//!
//! Two files live under `<worktree>/.kilocode/`:
//! - `metadata.json`: `{"sessionId", "parentBranch"}`, the canonical format
//! - `session-id`: the bare session id, kept for older readers
//!
//! Reads prefer the JSON file and fall back to the legacy one; both are
//! always written.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

pub const STATE_DIR: &str = ".kilocode";
pub const METADATA_FILE: &str = "metadata.json";
pub const LEGACY_SESSION_FILE: &str = "session-id";

/// The session bound to a worktree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub session_id: String,
    /// Absent when only the legacy file was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_branch: Option<String>,
}

pub fn state_dir(worktree: &Path) -> PathBuf {
    worktree.join(STATE_DIR)
}

/// Read the session binding, or `None` when neither file is usable.
pub async fn read_metadata(worktree: &Path) -> Option<SessionMetadata> {
    let dir = state_dir(worktree);

    match fs::read_to_string(dir.join(METADATA_FILE)).await {
        Ok(json) => match serde_json::from_str::<SessionMetadata>(&json) {
            Ok(meta) if !meta.session_id.is_empty() => return Some(meta),
            Ok(_) => debug!(path = %worktree.display(), "metadata.json has an empty sessionId"),
            Err(e) => debug!(path = %worktree.display(), error = %e, "malformed metadata.json"),
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => debug!(path = %worktree.display(), error = %e, "failed to read metadata.json"),
    }

    let legacy = fs::read_to_string(dir.join(LEGACY_SESSION_FILE)).await.ok()?;
    let session_id = legacy.trim();
    (!session_id.is_empty()).then(|| SessionMetadata {
        session_id: session_id.to_string(),
        parent_branch: None,
    })
}

/// Write both metadata formats.
pub async fn write_metadata(
    worktree: &Path,
    session_id: &str,
    parent_branch: &str,
) -> io::Result<()> {
    let dir = state_dir(worktree);
    fs::create_dir_all(&dir).await?;

    let meta = SessionMetadata {
        session_id: session_id.to_string(),
        parent_branch: Some(parent_branch.to_string()),
    };
    let json = serde_json::to_string_pretty(&meta).map_err(io::Error::other)?;

    tokio::try_join!(
        fs::write(dir.join(METADATA_FILE), json),
        fs::write(dir.join(LEGACY_SESSION_FILE), session_id),
    )?;
    Ok(())
}
