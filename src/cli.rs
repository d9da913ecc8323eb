// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Args, Parser, Subcommand};
use clusteradm::output::OutputMode;
use clusteradm::types::Role;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clusteradm")]
#[command(about = "Idempotent deployment and reconciliation of storage cluster services")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputMode::Normal)]
    pub output: OutputMode,

    /// Path to clusteradm.yml (discovered from the working directory by default)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Maximum number of tasks in flight
    #[arg(short, long, global = true)]
    pub parallelism: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new clusteradm.yml configuration file
    Init {
        /// Cluster name
        #[arg(long)]
        cluster: Option<String>,

        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Create every configured service that has no container yet
    Deploy {
        /// Only services of this role
        #[arg(short, long)]
        role: Option<Role>,
    },

    /// Start provisioned services
    Start {
        #[arg(short, long)]
        role: Option<Role>,
    },

    /// Stop provisioned services
    Stop {
        #[arg(short, long)]
        role: Option<Role>,
    },

    /// Restart provisioned services
    Restart {
        #[arg(short, long)]
        role: Option<Role>,
    },

    /// Show each service's container status
    Status {
        #[arg(short, long)]
        role: Option<Role>,
    },

    /// Remove service containers and directories
    Clean {
        #[arg(short, long)]
        role: Option<Role>,

        /// Comma list of items to remove: log, data, container
        #[arg(long, default_value = "log,data,container")]
        only: String,
    },

    /// Run preflight checks on every host
    Check,

    /// Move members whose host changed since the last deploy
    Migrate,

    /// Show recent commands from the audit log
    Audit {
        /// Number of entries
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: u32,
    },
}

impl Commands {
    /// Name recorded in the audit log.
    pub fn audit_name(&self) -> String {
        let role = |r: &Option<Role>| r.map(|r| format!(" --role {r}")).unwrap_or_default();
        match self {
            Commands::Init { .. } => "init".to_string(),
            Commands::Deploy { role: r } => format!("deploy{}", role(r)),
            Commands::Start { role: r } => format!("start{}", role(r)),
            Commands::Stop { role: r } => format!("stop{}", role(r)),
            Commands::Restart { role: r } => format!("restart{}", role(r)),
            Commands::Status { role: r } => format!("status{}", role(r)),
            Commands::Clean { role: r, only } => format!("clean{} --only {only}", role(r)),
            Commands::Check => "check".to_string(),
            Commands::Migrate => "migrate".to_string(),
            Commands::Audit { .. } => "audit".to_string(),
        }
    }
}
