//! Library to periodically backup SQL Server databases.
//!
//! An agent resolves its [`BackupConfig`](config::BackupConfig) once, validates the
//! backup destination, holds a single connection to the server and then issues
//! `BACKUP DATABASE` statements for every target database on a fixed interval.
//!
//! The moving parts live in the [`backup`] module, the database client
//! abstraction in [`driver`].

#![forbid(unsafe_code)]

pub mod backup;
pub mod cli;
pub mod config;
pub mod driver;
pub mod util;
