use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use gem_enforcer::config::{self, PolicyDocument};
use gem_enforcer::logging::{LogOptions, TracingSink, init_logging};
use gem_enforcer::parser::GemfileLock;
use gem_enforcer::policy::runner::Enforcer;
use gem_enforcer::version::source::HttpProviderFactory;

#[derive(Parser)]
#[command(name = "gem-enforcer")]
#[command(version, about = "Enforce version compliance policies for locked gems")]
struct Cli {
    /// Policy file (defaults to $GEM_ENFORCER_CONFIG or config/gem_enforcer.yml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Lockfile to read installed versions from
    #[arg(long, global = true)]
    lockfile: Option<PathBuf>,

    /// Log filter used when GEM_ENFORCER_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Emit logs and the run report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Evaluate every policy against the lockfile (default)
    Check,
    /// Only parse the policy file and report configuration errors
    Validate,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let guard = init_logging(&LogOptions {
        filter: cli.log_level.clone(),
        file: cli.log_file.clone(),
        json: cli.json,
    })?;

    let code = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(&cli))?;

    drop(guard);
    std::process::exit(code);
}

async fn run(cli: &Cli) -> anyhow::Result<i32> {
    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    tracing::info!("Loading policies from {}", config_path.display());
    let document = PolicyDocument::from_path(&config_path)?;

    match cli.command.unwrap_or(Command::Check) {
        Command::Validate => validate(&document),
        Command::Check => check(cli, document).await,
    }
}

fn validate(document: &PolicyDocument) -> anyhow::Result<i32> {
    let errors = document.errors();
    for error in &errors {
        tracing::error!("{}", error);
    }
    tracing::info!(
        "{} dependencies configured, {} configuration errors",
        document.policies().len(),
        errors.len()
    );
    Ok(if errors.is_empty() { 0 } else { 1 })
}

async fn check(cli: &Cli, document: PolicyDocument) -> anyhow::Result<i32> {
    let settings = document.settings.clone().with_env_token();
    document.require_token(settings.github_token.as_deref())?;

    let lockfile = cli.lockfile.clone().unwrap_or(settings.lockfile);
    let lookup = GemfileLock::from_path(&lockfile)?;
    tracing::debug!("Read {} locked gems from {}", lookup.len(), lockfile.display());

    let factory = HttpProviderFactory::new(&settings.github_api_url, settings.github_token);
    let enforcer = Enforcer::new(Arc::new(factory), Arc::new(lookup), Arc::new(TracingSink))
        .with_invalid_config(document.invalid_config);

    let report = enforcer.run(document.policies()).await?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(report.exit_code())
}
