use anyhow::Context;
use clap::{Parser, Subcommand};
use preview_sync::{detect, sync};

#[derive(Parser)]
#[command(
    name = "preview-sync",
    version,
    about = "Keep preview deployments in sync with pull request state"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Converge preview labels, mirror refs, and deployments for recently
    /// updated pull requests
    Synchronize {
        /// Location of the GitHub API server
        #[arg(long)]
        host: String,
        /// GitHub organization and project name, separated by a forward
        /// slash (e.g. "web-platform-tests/wpt")
        #[arg(long)]
        github_project: String,
        /// Name or URL of the preview git remote
        #[arg(long)]
        remote: String,
        /// Trailing window in seconds; pull requests updated within it are
        /// inspected
        #[arg(long)]
        window: u64,
    },
    /// Wait for a triggered deployment to come online and report its status
    Detect {
        /// Location of the GitHub API server
        #[arg(long)]
        host: String,
        /// GitHub organization and project name, separated by a forward
        /// slash
        #[arg(long)]
        github_project: String,
        /// Base URL of the preview host to poll
        #[arg(long)]
        target: String,
        /// Seconds to wait before reporting the deployment as failed
        #[arg(long)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("preview_sync=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let token = std::env::var("GITHUB_TOKEN").context("GITHUB_TOKEN is not set")?;

    match cli.command {
        Commands::Synchronize {
            host,
            github_project,
            remote,
            window,
        } => {
            sync::synchronize(&host, &github_project, &token, &remote, window).await?;
        }
        Commands::Detect {
            host,
            github_project,
            target,
            timeout,
        } => {
            detect::detect(&host, &github_project, &token, &target, timeout).await?;
        }
    }

    Ok(())
}
