use std::io::{self, IsTerminal};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use preview_core::slugify;
use preview_store::GithubContentsStore;
use preview_sync::Coordinator;
use tracing::debug;

mod config;
mod diff;
mod logging;
mod render;
mod report;

use config::{load_file_config, resolve_settings, FileConfig};
use logging::LogFormat;
use render::{resolve_output_style, OutputStyle, WorkflowCommands};
use report::{print_deploy_narrative, summary_markdown, write_step_summary};

#[derive(Parser, Debug)]
#[command(name = "deploy-preview")]
#[command(about = "Pin a service version in its branch preview record", long_about = None)]
struct Cli {
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge a service version into the preview record for a branch.
    Deploy(DeployArgs),
    /// Print the preview slug for a branch name.
    Slug { branch: String },
    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Default, Clone)]
struct DeployArgs {
    /// TOML file with repository and layout settings.
    #[arg(long)]
    config: Option<std::path::PathBuf>,
    /// Configuration repository as `owner/repo`.
    #[arg(long, env = "GITOPS_REPO")]
    repo: Option<String>,
    #[arg(long, env = "GITOPS_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[arg(long, env = "SERVICE_NAME")]
    service: Option<String>,
    /// Source branch the preview is named after.
    #[arg(long, env = "HEAD_REF")]
    branch: Option<String>,
    #[arg(long, env = "COMMIT_SHA")]
    commit_sha: Option<String>,
    #[arg(long, env = "PR_AUTHOR")]
    pr_author: Option<String>,
    #[arg(long, env = "PR_URL")]
    pr_url: Option<String>,
    #[arg(long, env = "PR_NUMBER")]
    pr_number: Option<String>,
    /// RFC 3339 deploy time; defaults to now.
    #[arg(long, env = "DEPLOY_TIMESTAMP")]
    timestamp: Option<String>,
    #[arg(long, env = "WORKFLOW_RUN_URL")]
    workflow_run_url: Option<String>,
    #[arg(long, env = "GITHUB_API_URL")]
    api_url: Option<String>,
    /// Branch of the configuration repository to read and commit to.
    #[arg(long, env = "GITOPS_REF")]
    git_ref: Option<String>,
    #[arg(long)]
    max_attempts: Option<u32>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    let style = resolve_output_style(io::stdout().is_terminal());
    let workflow = WorkflowCommands::from_env();

    match run_cli(cli, style, workflow) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report::print_failure(&err, style, workflow);
            ExitCode::FAILURE
        }
    }
}

fn run_cli(cli: Cli, style: OutputStyle, workflow: WorkflowCommands) -> Result<()> {
    match cli.command {
        Commands::Deploy(args) => run_deploy(&args, style, workflow),
        Commands::Slug { branch } => {
            let slug = slugify(&branch);
            if slug.is_empty() {
                anyhow::bail!("branch '{branch}' has no letters or digits to build a slug from");
            }
            println!("{slug}");
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "deploy-preview", &mut io::stdout());
            Ok(())
        }
    }
}

fn run_deploy(args: &DeployArgs, style: OutputStyle, workflow: WorkflowCommands) -> Result<()> {
    let file = match &args.config {
        Some(path) => load_file_config(path)?,
        None => FileConfig::default(),
    };
    let settings = resolve_settings(args, file)?;
    debug!(?settings, "resolved deploy settings");

    let store = GithubContentsStore::new(settings.location.clone(), settings.token.clone())
        .context("failed to set up the configuration repository client")?
        .with_api_url(settings.api_url.clone())
        .with_git_ref(settings.git_ref.clone());
    let coordinator = Coordinator::new(store, settings.deploy.clone());

    let outcome = coordinator.deploy(&settings.request).with_context(|| {
        format!(
            "failed to deploy {} to preview of '{}' in {}",
            settings.request.service, settings.request.branch, settings.location
        )
    })?;

    print_deploy_narrative(&outcome, &settings, style, workflow);
    write_step_summary(&summary_markdown(&outcome, &settings))
}
