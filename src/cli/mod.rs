use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

/// Name of the config file searched next to the executable.
pub const CONFIG_FILE: &str = "config.ini";

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Verbosity of the command output.
    #[arg(long)]
    pub verbose: Option<LevelFilter>,

    /// Config file. Defaults to `config.ini` next to the executable.
    #[arg(long, short = 'c', env = "MSSQL_BACKUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path of the `sqlcmd` executable. Searched in `PATH` if not set.
    #[arg(long, env = "SQLCMD")]
    pub sqlcmd: Option<PathBuf>,

    /// Log the statements instead of sending them to the server.
    #[arg(long)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub action: Option<Action>,
}

impl Cli {
    /// The config file to use.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(|dir| dir.join(CONFIG_FILE)))
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
        })
    }
}

#[derive(Subcommand, Debug)]
pub enum Action {
    /// Backup the databases periodically. (Default)
    Run(RunArgs),
    /// Print the resolved configuration.
    ShowConfig,
}

impl Default for Action {
    fn default() -> Self {
        Self::Run(RunArgs::default())
    }
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Stop after this many backup cycles instead of running forever.
    #[arg(long)]
    pub cycles: Option<NonZeroUsize>,
}
