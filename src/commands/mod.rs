use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

pub mod bind;
pub mod branches;
pub mod create;
pub mod gc;
pub mod list;
pub mod remove;

/// Resolve the repository root: the explicit path, or the current directory.
/// Always absolute.
pub fn resolve_repo(repo: Option<&Path>) -> Result<PathBuf> {
    match repo {
        Some(path) => std::path::absolute(path)
            .with_context(|| format!("failed to resolve {}", path.display())),
        None => std::env::current_dir().context("failed to read current directory"),
    }
}

/// Pretty-print `value` as JSON followed by a newline.
pub(crate) fn write_json(writer: &mut impl Write, value: &impl Serialize) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, value).context("failed to serialize output")?;
    writeln!(writer)?;
    Ok(())
}
