//! The backup agent.
//!
//! - [connection]: the single [Connection] to the server.
//! - [executor]: runs one statement and classifies the outcome.
//! - [command]: the `BACKUP DATABASE` statement of one database.
//! - [scheduler]: the endless backup cycle.
//!
//! [start] wires them up: it validates the backup directory, connects and
//! returns the [Scheduler] ready to run.

pub mod command;
pub mod connection;
pub mod executor;
pub mod scheduler;

use std::path::Path;

use derive_more::{Display, Error, From};

pub use command::BackupCommand;
pub use connection::{connect, Connection};
pub use executor::{execute, CommandError, ExecutionResult, Outcome};
pub use scheduler::{BackupPlan, CycleReport, Scheduler, StopToken};

use crate::config::{BackupConfig, ConfigError};
use crate::driver::{ConnectError, Driver};
use crate::util::{ensure_directory, FileSystemError};

/// Fatal errors that abort the agent before the first backup.
#[derive(Debug, Display, Error, From)]
pub enum StartupError {
    /// The configuration is malformed.
    #[display("Invalid configuration: {_0}")]
    #[from]
    Config(ConfigError),
    /// The backup directory isn't usable.
    #[display("Cannot proceed without valid backup directory: {_0}")]
    #[from]
    FileSystem(FileSystemError),
    /// No connection to the server.
    #[display("{_0}")]
    #[from]
    Connection(ConnectError),
}

/// Prepares the backup cycle described by `config`.
///
/// Validates (or creates) the backup directory first and only then connects
/// to the server using `driver`.
pub fn start<D: Driver>(
    config: &BackupConfig,
    driver: &D,
) -> Result<Scheduler<D::Session>, StartupError> {
    let directory = Path::new(&config.backup_directory);
    if directory.is_relative() && !directory.as_os_str().is_empty() {
        log::warn!(target: "backup", "Backup directory is relative: {}", directory.display());
    }
    ensure_directory(directory)?;

    let connection = connect(driver, config)?;

    Ok(Scheduler::new(connection, BackupPlan::from(config)))
}
