//! Configuration of the backup agent.
//!
//! All settings live in the `[BackupSettings]` section of an ini-like file.
//! Every key has a default which is used if the key or the whole file is missing.

pub mod ini;

use std::fmt;
use std::num::{NonZeroU32, ParseIntError};
use std::path::Path;
use std::time::Duration;

use derive_more::{Display, Error};
use serde::{Serialize, Serializer};

/// Section holding every setting of the agent.
pub const SECTION: &str = "BackupSettings";

pub const DEFAULT_BACKUP_DIRECTORY: &str = "C:\\SQLBackups\\";
pub const DEFAULT_INTERVAL_MINUTES: &str = "15";
pub const DEFAULT_ACCOUNT_DATABASE: &str = "AccountServer";
pub const DEFAULT_GAME_DATABASE: &str = "GameDB";
pub const DEFAULT_SERVER_INSTANCE: &str = "localhost\\SQLEXPRESS";
pub const DEFAULT_USER: &str = "sa";
pub const DEFAULT_PASSWORD: &str = "";

/// Resolved configuration of the agent.
///
/// Resolved once at startup and never changed afterwards.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct BackupConfig {
    /// Directory the server writes the `.bak` files to.
    #[serde(rename = "BackupDirectory")]
    pub backup_directory: String,

    /// Minutes to wait between two backup cycles.
    #[serde(rename = "IntervalMinutes")]
    pub interval_minutes: NonZeroU32,

    /// Account database, backed up first.
    #[serde(rename = "AccountServer")]
    pub account_database: String,

    /// Game database, backed up second.
    #[serde(rename = "GameDB")]
    pub game_database: String,

    /// Address of the SQL Server instance, e.g. `localhost\SQLEXPRESS`.
    #[serde(rename = "SQLServerInstance")]
    pub server_instance: String,

    #[serde(rename = "SQLUser")]
    pub user: String,

    #[serde(rename = "SQLPassword", serialize_with = "mask_password")]
    pub password: String,
}

/// Errors on resolving the [BackupConfig].
#[derive(Debug, Display, Error)]
pub enum ConfigError {
    /// `IntervalMinutes` isn't a number.
    #[display("IntervalMinutes must be a positive number of minutes, got {value:?}: {source}")]
    InvalidInterval {
        value: String,
        source: ParseIntError,
    },
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_directory: DEFAULT_BACKUP_DIRECTORY.to_string(),
            interval_minutes: NonZeroU32::new(15).expect("15 is non-zero"),
            account_database: DEFAULT_ACCOUNT_DATABASE.to_string(),
            game_database: DEFAULT_GAME_DATABASE.to_string(),
            server_instance: DEFAULT_SERVER_INSTANCE.to_string(),
            user: DEFAULT_USER.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
        }
    }
}

impl BackupConfig {
    /// Resolves every setting from the config file at `source`.
    ///
    /// Missing keys fall back to their defaults. A malformed interval is an error.
    pub fn resolve(source: &Path) -> Result<Self, ConfigError> {
        let get = |key: &str, default: &str| ini::lookup(SECTION, key, source, default);

        let interval = get("IntervalMinutes", DEFAULT_INTERVAL_MINUTES);
        let interval_minutes = interval
            .parse::<NonZeroU32>()
            .map_err(|source| ConfigError::InvalidInterval {
                value: interval.clone(),
                source,
            })?;

        let config = Self {
            backup_directory: get("BackupDirectory", DEFAULT_BACKUP_DIRECTORY),
            interval_minutes,
            account_database: get("AccountServer", DEFAULT_ACCOUNT_DATABASE),
            game_database: get("GameDB", DEFAULT_GAME_DATABASE),
            server_instance: get("SQLServerInstance", DEFAULT_SERVER_INSTANCE),
            user: get("SQLUser", DEFAULT_USER),
            password: get("SQLPassword", DEFAULT_PASSWORD),
        };
        log::debug!(target: "config", "Resolved config: {config:?}");

        Ok(config)
    }

    /// Pause between two backup cycles.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes.get()) * 60)
    }

    /// Target databases in the order they are backed up.
    pub fn databases(&self) -> [&str; 2] {
        [&self.account_database, &self.game_database]
    }

    /// Renders the configuration as TOML with the password masked.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        #[derive(Serialize)]
        struct Rendered<'a> {
            #[serde(rename = "BackupSettings")]
            settings: &'a BackupConfig,
        }

        toml::to_string_pretty(&Rendered { settings: self })
    }
}

impl fmt::Debug for BackupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupConfig")
            .field("backup_directory", &self.backup_directory)
            .field("interval_minutes", &self.interval_minutes)
            .field("account_database", &self.account_database)
            .field("game_database", &self.game_database)
            .field("server_instance", &self.server_instance)
            .field("user", &self.user)
            .field("password", &masked(&self.password))
            .finish()
    }
}

fn masked(password: &str) -> &'static str {
    if password.is_empty() {
        ""
    } else {
        "********"
    }
}

fn mask_password<S: Serializer>(password: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(masked(password))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn source(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_source_yields_defaults() {
        let file = source("");
        assert_eq!(BackupConfig::resolve(file.path()).unwrap(), BackupConfig::default());
    }

    #[test]
    fn defaults_match_documented_values() {
        let dir = tempfile::tempdir().unwrap();
        let config = BackupConfig::resolve(&dir.path().join("missing.ini")).unwrap();

        assert_eq!(config.backup_directory, "C:\\SQLBackups\\");
        assert_eq!(config.interval_minutes.get(), 15);
        assert_eq!(config.account_database, "AccountServer");
        assert_eq!(config.game_database, "GameDB");
        assert_eq!(config.server_instance, "localhost\\SQLEXPRESS");
        assert_eq!(config.user, "sa");
        assert_eq!(config.password, "");
    }

    #[test]
    fn resolves_all_keys() {
        let file = source(
            "; agent settings\n\
             [BackupSettings]\n\
             BackupDirectory=/tmp/backups\n\
             IntervalMinutes=1\n\
             AccountServer=Acct\n\
             GameDB=Game\n\
             SQLServerInstance=db.local,1433\n\
             SQLUser=backup\n\
             SQLPassword=secret\n",
        );
        let config = BackupConfig::resolve(file.path()).unwrap();

        assert_eq!(config.backup_directory, "/tmp/backups");
        assert_eq!(config.interval(), Duration::from_secs(60));
        assert_eq!(config.databases(), ["Acct", "Game"]);
        assert_eq!(config.server_instance, "db.local,1433");
        assert_eq!(config.user, "backup");
        assert_eq!(config.password, "secret");
    }

    #[test]
    fn malformed_interval_is_an_error() {
        for interval in ["abc", "0", "-5", "", " 5", "99999999999"] {
            let file = source(&format!("[BackupSettings]\nIntervalMinutes={interval}\n"));
            let err = BackupConfig::resolve(file.path()).unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidInterval { value, .. } if value == interval),
                "{interval:?} should be rejected, got {err}"
            );
        }
    }

    #[test]
    fn debug_masks_password() {
        let file = source("[BackupSettings]\nSQLUser=backup\nSQLPassword=hunter2\n");
        let config = BackupConfig::resolve(file.path()).unwrap();

        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("password: \"********\""));
        assert!(debug.contains("user: \"backup\""));
        assert!(format!("{:?}", BackupConfig::default()).contains("password: \"\""));
    }

    #[test]
    fn toml_masks_password() {
        let config = BackupConfig {
            password: "secret".to_string(),
            ..Default::default()
        };
        let rendered = config.to_toml().unwrap();

        assert!(rendered.contains("[BackupSettings]"));
        assert!(rendered.contains("GameDB = "));
        assert!(rendered.contains("IntervalMinutes = 15"));
        assert!(!rendered.contains("secret"));
    }
}
