mod commands;
mod host;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use autorepo_gateway::{
    CallGateway, EnvironmentName, GatewayConfig, JsonFileStorage, probe_connectivity,
};
use autorepo_sdk::AutoRepoClient;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use commands::{CommitCommand, IssueCommand, RepoCommand};
use host::{LandingHint, OneShotCodeIssuer, TerminalDialog, default_credentials_path};

#[derive(Parser, Debug)]
#[command(name = "autorepo")]
#[command(about = "AutoRepo - vehicle maintenance tracker")]
#[command(version, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    host: HostOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct HostOptions {
    /// Path to configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Environment override (overrides config)
    #[arg(long, value_enum, global = true)]
    env: Option<EnvArg>,

    /// Base address override, e.g. `http://localhost:8000/api`
    #[arg(long, global = true)]
    base_address: Option<String>,

    /// Credential file (default: `<config dir>/autorepo/credentials.json`)
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    /// One-time login code
    #[arg(long, env = "AUTOREPO_LOGIN_CODE", global = true, hide_env_values = true)]
    code: Option<String>,

    /// Confirm the re-login prompt without asking
    #[arg(short, long, global = true)]
    yes: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Exchange a login code for a session
    Login,
    /// Forget the stored session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Check that the backend answers
    Ping,
    /// Vehicles
    #[command(subcommand)]
    Repos(RepoCommand),
    /// Maintenance records
    #[command(subcommand)]
    Commits(CommitCommand),
    /// Reminders
    #[command(subcommand)]
    Issues(IssueCommand),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum EnvArg {
    Dev,
    Device,
    Prod,
}

impl From<EnvArg> for EnvironmentName {
    fn from(value: EnvArg) -> Self {
        match value {
            EnvArg::Dev => EnvironmentName::Dev,
            EnvArg::Device => EnvironmentName::Device,
            EnvArg::Prod => EnvironmentName::Prod,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { host, command } = Cli::parse();
    init_logging(host.verbose, host.json_logs);

    let config = load_config(&host)?;
    tracing::debug!(
        environment = %config.environment,
        base_address = %config.descriptor().base_address,
        "configuration loaded"
    );

    match command {
        Commands::Ping => ping(&config).await,
        Commands::Login => {
            let gateway = build_gateway(&host, config)?;
            let credential = gateway.login().await?;
            println!("logged in as {}", credential.user_id);
            Ok(())
        }
        Commands::Logout => {
            build_gateway(&host, config)?.logout();
            println!("logged out");
            Ok(())
        }
        Commands::Whoami => {
            match build_gateway(&host, config)?.credentials().current() {
                Some(credential) => println!("{}", credential.user_id),
                None => println!("not logged in"),
            }
            Ok(())
        }
        Commands::Repos(command) => commands::run_repos(&client(&host, config)?, command).await,
        Commands::Commits(command) => {
            commands::run_commits(&client(&host, config)?, command).await
        }
        Commands::Issues(command) => commands::run_issues(&client(&host, config)?, command).await,
    }
}

/// Layered config: defaults, YAML file, `AUTOREPO__*` env, then CLI flags.
fn load_config(host: &HostOptions) -> Result<GatewayConfig> {
    if let Some(path) = &host.config
        && !Path::new(path).is_file()
    {
        anyhow::bail!("config file does not exist: {}", path.display());
    }

    let mut config = GatewayConfig::load(host.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(env) = host.env {
        config.environment = env.into();
    }
    if let Some(base) = &host.base_address {
        config.base_address = Some(base.clone());
    }
    Ok(config)
}

fn build_gateway(host: &HostOptions, config: GatewayConfig) -> Result<CallGateway> {
    let path = match &host.credentials {
        Some(path) => path.clone(),
        None => default_credentials_path()
            .context("no user config directory; pass --credentials <PATH>")?,
    };
    tracing::debug!(path = %path.display(), "using credential file");

    CallGateway::builder(config)
        .storage(Arc::new(JsonFileStorage::new(path)))
        .dialog(Arc::new(TerminalDialog::new(host.yes)))
        .code_issuer(Arc::new(OneShotCodeIssuer::new(host.code.clone())))
        .navigation(Arc::new(LandingHint))
        .build()
        .context("failed to set up the call gateway")
}

fn client(host: &HostOptions, config: GatewayConfig) -> Result<AutoRepoClient> {
    Ok(AutoRepoClient::new(Arc::new(build_gateway(host, config)?)))
}

async fn ping(config: &GatewayConfig) -> Result<()> {
    let report = probe_connectivity(&config.descriptor(), &config.user_agent).await?;
    println!("{}: {}", report.url, report.message);
    if !report.detail.is_empty() {
        println!("{}", report.detail);
    }
    if !report.success {
        anyhow::bail!("backend check failed");
    }
    Ok(())
}

/// `RUST_LOG` wins; otherwise `-v` picks the level. Logs go to stderr so
/// stdout stays parseable.
fn init_logging(verbose: u8, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}
