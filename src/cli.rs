use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "kilo-worktrees",
    about = "Provision and track git worktrees for isolated agent sessions",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Repository root. Default: the current directory.
    #[arg(long, global = true, value_name = "PATH")]
    pub repo: Option<PathBuf>,

    /// Emit logs on stderr as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a worktree on a new or existing branch.
    Create {
        /// Task description used to derive the branch name.
        #[arg(value_name = "PROMPT")]
        prompt: Option<String>,

        /// Exact name for the new branch.
        #[arg(long)]
        branch: Option<String>,

        /// Branch to fork from. Default: the current branch.
        #[arg(long)]
        base: Option<String>,

        /// Check out an existing branch instead of creating one.
        #[arg(long, conflicts_with = "branch")]
        existing: Option<String>,

        /// Create this many sibling worktrees for side-by-side comparison.
        #[arg(long, default_value = "1")]
        versions: usize,
    },

    /// Record a session id in a worktree's metadata.
    Bind {
        /// Worktree directory.
        path: PathBuf,

        /// Session to bind.
        session_id: String,

        /// Parent branch to record. Default: keep the existing one.
        #[arg(long)]
        parent: Option<String>,
    },

    /// List managed worktrees and their binding state.
    List,

    /// Remove a worktree, falling back to force and direct deletion.
    Remove {
        /// Worktree directory.
        path: PathBuf,
    },

    /// List local and remote branches, default branch first.
    Branches,

    /// Remove worktrees that were never bound to a session.
    Gc {
        /// Actually remove them instead of listing.
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn create_defaults() {
        let cli = Cli::try_parse_from(["kilo-worktrees", "create", "fix login bug"]).unwrap();
        match cli.command {
            Command::Create {
                prompt, versions, ..
            } => {
                assert_eq!(prompt.as_deref(), Some("fix login bug"));
                assert_eq!(versions, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(cli.repo.is_none());
        assert!(!cli.json_logs);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["kilo-worktrees", "list", "--repo", "/tmp/r", "--json-logs"])
                .unwrap();
        assert_eq!(cli.repo, Some(PathBuf::from("/tmp/r")));
        assert!(cli.json_logs);
    }

    #[test]
    fn existing_conflicts_with_branch() {
        let err = Cli::try_parse_from([
            "kilo-worktrees",
            "create",
            "--existing",
            "a",
            "--branch",
            "b",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
