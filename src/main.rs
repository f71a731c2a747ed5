use std::num::NonZeroUsize;
use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use mssql_backup_lib::backup::{self, StartupError, StopToken};
use mssql_backup_lib::cli::{Action, Cli, RunArgs};
use mssql_backup_lib::config::BackupConfig;
use mssql_backup_lib::driver::{Driver, DryRun, SqlCmd};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // init logger
    let mut env_logger = env_logger::Builder::new();
    env_logger.filter_level(LevelFilter::Info).parse_default_env();
    if let Some(level) = cli.verbose {
        env_logger.filter_level(level);
    }
    env_logger.try_init().expect("env_logger should not fail");

    log::info!(
        "MSSQL Database Backup Tool {}: periodic full backups of the account and game databases",
        env!("CARGO_PKG_VERSION")
    );

    let config_path = cli.config_path();
    log::info!("Loading config file: {}", config_path.display());
    let config = match BackupConfig::resolve(&config_path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", StartupError::from(e));
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.action.unwrap_or_default() {
        Action::ShowConfig => match config.to_toml() {
            Ok(rendered) => {
                print!("{rendered}");
                Ok(())
            }
            Err(e) => {
                log::error!("Rendering the config failed: {e}");
                return ExitCode::FAILURE;
            }
        },
        Action::Run(RunArgs { cycles }) => {
            if cli.dry_run {
                log::warn!("Running in dry-run mode");
                run(&config, &DryRun, cycles)
            } else {
                run(&config, &SqlCmd::new(cli.sqlcmd), cycles)
            }
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run<D: Driver>(
    config: &BackupConfig,
    driver: &D,
    cycles: Option<NonZeroUsize>,
) -> Result<(), StartupError> {
    let mut scheduler = backup::start(config, driver)?;

    // TODO: trigger the token on SIGINT/SIGTERM so a running backup can finish
    let stop = StopToken::new();
    scheduler.run(&stop, cycles);

    Ok(())
}
