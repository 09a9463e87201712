use std::path::PathBuf;

use anyhow::{Context, Result};
use apm::config::CORE_BRANCH;
use apm::lock::ProcessLock;
use apm::state::StateFile;
use apm::{ApmConfig, Outcome, PluginManager};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "apm=info";

#[derive(Parser, Debug)]
#[command(name = "apm", about = "Plugin manager for Avalanche VMs", version)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    /// Directory holding apm state (default: ~/.apm)
    #[arg(long, global = true)]
    apm_path: Option<PathBuf>,

    /// Directory installed VM binaries are written to
    #[arg(long, global = true)]
    plugin_path: Option<PathBuf>,

    /// Node admin API endpoint
    #[arg(long, global = true)]
    admin_api_endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install a VM by alias or qualified name
    InstallVm {
        #[arg(long)]
        vm_alias: String,
    },

    /// Remove an installed VM
    UninstallVm {
        #[arg(long)]
        vm_alias: String,
    },

    /// Sync all tracked repositories
    Update,

    /// Upgrade one installed VM, or all of them
    Upgrade {
        #[arg(long)]
        vm_alias: Option<String>,
    },

    /// Install a subnet's VMs and whitelist it on the node
    JoinSubnet {
        #[arg(long)]
        subnet_alias: String,
    },

    /// Track a plugin repository
    AddRepository {
        /// organization/repository
        #[arg(long)]
        alias: String,
        #[arg(long)]
        url: String,
        #[arg(long, default_value = CORE_BRANCH)]
        branch: String,
    },

    /// Stop tracking a plugin repository
    RemoveRepository {
        #[arg(long)]
        alias: String,
    },

    /// Show tracked repositories
    ListRepositories,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = ApmConfig::load(cli.config_file.as_deref())?;
    config.apply(cli.apm_path, cli.plugin_path, cli.admin_api_endpoint);

    if let Command::ListRepositories = cli.command {
        let state = StateFile::load(&config.apm_dir)?;
        for source in state.repositories()? {
            println!(
                "{}\t{}\t{}\t{}",
                source.alias, source.url, source.branch, source.commit
            );
        }
        return Ok(());
    }

    let _lock = ProcessLock::acquire(&config.apm_dir)?;
    let apm = PluginManager::open(config)?;
    apm.bootstrap().context("Failed to bootstrap the core repository")?;

    let outcome = match cli.command {
        Command::InstallVm { vm_alias } => apm.install(&vm_alias)?,
        Command::UninstallVm { vm_alias } => apm.uninstall(&vm_alias)?,
        Command::Update => apm.update()?,
        Command::Upgrade { vm_alias } => apm.upgrade(vm_alias.as_deref())?,
        Command::JoinSubnet { subnet_alias } => apm.join_subnet(&subnet_alias)?,
        Command::AddRepository { alias, url, branch } => {
            apm.add_repository(&alias, &url, &branch)?
        }
        Command::RemoveRepository { alias } => apm.remove_repository(&alias)?,
        Command::ListRepositories => Outcome::Skipped,
    };
    tracing::debug!(%outcome, "command finished");
    Ok(())
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
