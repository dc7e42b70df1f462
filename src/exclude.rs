//! Git exclude file bookkeeping.
//!
//! Entries are appended to `info/exclude`, never rewritten, and an entry that
//! already has a line of its own is left alone.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

/// Append `# <comment>` and `entry` to `file` unless a line already equals
/// `entry`. Longer patterns that merely contain it do not count:
/// `.kilocode/worktrees/` does not cover `.kilocode/`.
///
/// Returns whether the file was written.
pub async fn ensure_entry(file: &Path, entry: &str, comment: &str) -> io::Result<bool> {
    let existing = match fs::read_to_string(file).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };

    if existing.lines().any(|line| line.trim() == entry) {
        return Ok(false);
    }

    let mut next = existing;
    if !next.is_empty() {
        if !next.ends_with('\n') {
            next.push('\n');
        }
        next.push('\n');
    }
    next.push_str("# ");
    next.push_str(comment);
    next.push('\n');
    next.push_str(entry);
    next.push('\n');

    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(file, next).await?;
    Ok(true)
}

/// The exclude file inside a git directory.
pub fn exclude_file(git_dir: &Path) -> PathBuf {
    git_dir.join("info").join("exclude")
}

/// Find the main repository's git directory from a linked worktree.
///
/// A worktree's `.git` is a file containing `gitdir: <path>` pointing at
/// `<main>/.git/worktrees/<name>`. That directory names the shared git dir in
/// its `commondir` file; older layouts are resolved by walking up past
/// `worktrees/`.
pub async fn main_git_dir(worktree: &Path) -> io::Result<PathBuf> {
    let dot_git = fs::read_to_string(worktree.join(".git")).await?;
    let gitdir = dot_git
        .lines()
        .find_map(|l| l.strip_prefix("gitdir:"))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} has no gitdir line", worktree.join(".git").display()),
            )
        })?;

    let gitdir = resolve(worktree, Path::new(gitdir));

    if let Ok(common) = fs::read_to_string(gitdir.join("commondir")).await {
        let common = common.trim();
        if !common.is_empty() {
            return Ok(resolve(&gitdir, Path::new(common)));
        }
    }

    match gitdir.parent() {
        Some(parent) if parent.file_name().is_some_and(|n| n == "worktrees") => Ok(parent
            .parent()
            .map_or_else(|| gitdir.clone(), Path::to_path_buf)),
        _ => Ok(gitdir),
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    crate::worktree::normalize(&joined)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn ensure_entry_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("info").join("exclude");

        assert!(ensure_entry(&file, ".kilocode/worktrees/", "worktrees").await.unwrap());
        assert!(!ensure_entry(&file, ".kilocode/worktrees/", "worktrees").await.unwrap());

        let content = std::fs::read_to_string(&file).unwrap();
        assert_eq!(content.matches(".kilocode/worktrees/").count(), 1);
        assert_eq!(content, "# worktrees\n.kilocode/worktrees/\n");
    }

    #[tokio::test]
    async fn ensure_entry_separates_from_existing_content() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("exclude");
        std::fs::write(&file, "# git ls-files --others --exclude-from=.git/info/exclude\n*.swp").unwrap();

        ensure_entry(&file, ".kilocode/setup-script", "setup script").await.unwrap();

        let content = std::fs::read_to_string(&file).unwrap();
        assert!(content.ends_with("*.swp\n\n# setup script\n.kilocode/setup-script\n"));
    }

    #[tokio::test]
    async fn ensure_entry_ignores_surrounding_whitespace() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("exclude");
        std::fs::write(&file, "  .kilocode/worktrees/  \n").unwrap();

        assert!(!ensure_entry(&file, ".kilocode/worktrees/", "worktrees").await.unwrap());
    }

    #[tokio::test]
    async fn ensure_entry_not_covered_by_longer_pattern() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("exclude");
        std::fs::write(&file, "# worktrees\n.kilocode/worktrees/\n").unwrap();

        assert!(ensure_entry(&file, ".kilocode/", "state").await.unwrap());
        assert!(!ensure_entry(&file, ".kilocode/", "state").await.unwrap());

        let content = std::fs::read_to_string(&file).unwrap();
        assert_eq!(content.lines().filter(|l| *l == ".kilocode/").count(), 1);
        assert!(content.ends_with("\n\n# state\n.kilocode/\n"));
    }

    #[tokio::test]
    async fn main_git_dir_walks_up_from_worktrees() {
        let dir = TempDir::new().unwrap();
        let main_git = dir.path().join("repo").join(".git");
        let wt_git = main_git.join("worktrees").join("feat");
        std::fs::create_dir_all(&wt_git).unwrap();
        let wt = dir.path().join("wt");
        std::fs::create_dir_all(&wt).unwrap();
        std::fs::write(wt.join(".git"), format!("gitdir: {}\n", wt_git.display())).unwrap();

        assert_eq!(main_git_dir(&wt).await.unwrap(), main_git);
    }

    #[tokio::test]
    async fn main_git_dir_prefers_commondir() {
        let dir = TempDir::new().unwrap();
        let wt_git = dir.path().join("elsewhere").join("feat");
        std::fs::create_dir_all(&wt_git).unwrap();
        std::fs::write(wt_git.join("commondir"), "../../repo/.git\n").unwrap();
        let wt = dir.path().join("wt");
        std::fs::create_dir_all(&wt).unwrap();
        std::fs::write(wt.join(".git"), "gitdir: ../elsewhere/feat\n").unwrap();

        assert_eq!(
            main_git_dir(&wt).await.unwrap(),
            dir.path().join("repo").join(".git")
        );
    }

    #[tokio::test]
    async fn main_git_dir_rejects_directory_checkout() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        assert!(main_git_dir(dir.path()).await.is_err());
    }
}
