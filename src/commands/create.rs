use std::io::Write;

use anyhow::Result;

use crate::session;
use crate::worktree::{CreateWorktreeParams, WorktreeManager};

use super::write_json;

pub struct CreateOptions {
    pub prompt: Option<String>,
    pub branch: Option<String>,
    pub base: Option<String>,
    pub existing: Option<String>,
    /// Number of sibling worktrees; values above 1 fan out with `_vN` names.
    pub versions: usize,
}

/// Create one worktree (or a versioned group) and print it as JSON.
pub async fn create(
    manager: &WorktreeManager,
    options: CreateOptions,
    writer: &mut impl Write,
) -> Result<()> {
    if options.versions > 1 && options.existing.is_some() {
        anyhow::bail!("--versions cannot be combined with --existing");
    }

    let params = CreateWorktreeParams {
        prompt: options.prompt,
        existing_branch: options.existing,
        base_branch: options.base,
        branch_name: options.branch,
    };

    if options.versions > 1 {
        let versions = session::create_versions(manager, &params, options.versions).await?;
        write_json(writer, &versions)
    } else {
        let created = manager.create_worktree(&params).await?;
        write_json(writer, &created)
    }
}
