mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use kilo_worktrees::commands;
use kilo_worktrees::config;
use kilo_worktrees::logging::{self, LogFormat};
use kilo_worktrees::worktree::WorktreeManager;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = commands::resolve_repo(cli.repo.as_deref())?;
    let config = config::load(&root).context("failed to load configuration")?;

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    logging::init(&config.log.filter, format);

    let manager = WorktreeManager::new(root).with_naming(config.naming);
    let mut stdout = std::io::stdout();

    match cli.command {
        Command::Create {
            prompt,
            branch,
            base,
            existing,
            versions,
        } => {
            commands::create::create(
                &manager,
                commands::create::CreateOptions {
                    prompt,
                    branch,
                    base,
                    existing,
                    versions,
                },
                &mut stdout,
            )
            .await?;
        }
        Command::Bind {
            path,
            session_id,
            parent,
        } => {
            commands::bind::bind(&manager, &path, &session_id, parent, &mut stdout).await?;
        }
        Command::List => commands::list::list(&manager, &mut stdout).await?,
        Command::Remove { path } => commands::remove::remove(&manager, &path, &mut stdout).await?,
        Command::Branches => commands::branches::branches(&manager, &mut stdout).await?,
        Command::Gc { force } => commands::gc::gc(&manager, force, &mut stdout).await?,
    }
    Ok(())
}
