use std::borrow::Cow;

use chrono::{Local, NaiveDateTime};

/// Format of the timestamp in backup file names, e.g. `20240131_1745`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M";

/// Timestamp token for backups started at `at`. Has a resolution of one minute.
pub fn timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Timestamp token for backups started now, in local time.
pub fn timestamp_now() -> String {
    timestamp(Local::now().naive_local())
}

/// Full backup of one database into a new file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupCommand {
    database: String,
    /// Path of the `.bak` file as seen by the server.
    destination: String,
}

impl BackupCommand {
    pub fn new(directory: &str, database: &str, timestamp: &str) -> Self {
        let destination = format!(
            "{}{database}_backup_{timestamp}.bak",
            with_trailing_separator(directory)
        );

        Self {
            database: database.to_string(),
            destination,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// The `BACKUP DATABASE` statement sent to the server.
    pub fn statement(&self) -> String {
        format!(
            "BACKUP DATABASE {} TO DISK = {} WITH FORMAT, NAME = {}",
            quote_identifier(&self.database),
            quote_literal(&self.destination),
            quote_literal(&format!("Full Backup of {}", self.database)),
        )
    }
}

fn with_trailing_separator(directory: &str) -> Cow<'_, str> {
    if directory.is_empty() || directory.ends_with(['/', '\\']) {
        Cow::Borrowed(directory)
    } else if directory.contains('\\') && !directory.contains('/') {
        Cow::Owned(format!("{directory}\\"))
    } else {
        Cow::Owned(format!("{directory}/"))
    }
}

fn quote_identifier(identifier: &str) -> String {
    format!("[{}]", identifier.replace(']', "]]"))
}

fn quote_literal(literal: &str) -> String {
    format!("'{}'", literal.replace('\'', "''"))
}
