//! [Driver] which never reaches a server.

use super::{ConnectError, ConnectionString, DiagnosticRecord, Driver, HandleKind, Session, SqlReturn};

/// Logs connections and statements instead of executing them.
///
/// Every call succeeds, which allows checking the generated statements and the
/// schedule without touching the databases.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRun;

impl Driver for DryRun {
    type Session = DryRunSession;

    fn connect(&self, connection: &ConnectionString) -> Result<DryRunSession, ConnectError> {
        log::info!(target: "driver::dry_run", "Would connect using: {connection}");
        Ok(DryRunSession { statements: 0 })
    }
}

#[derive(Debug)]
pub struct DryRunSession {
    statements: u64,
}

impl Session for DryRunSession {
    fn alloc_statement(&mut self) -> SqlReturn {
        SqlReturn::Success
    }

    fn exec_direct(&mut self, statement: &str) -> SqlReturn {
        self.statements += 1;
        log::info!(target: "driver::dry_run", "Would execute: {statement}");
        SqlReturn::Success
    }

    fn free_statement(&mut self) {}

    fn diagnostic_record(&self, _handle: HandleKind, _number: u16) -> Option<DiagnosticRecord> {
        None
    }

    fn disconnect(&mut self) {
        log::info!(target: "driver::dry_run", "Would disconnect after {} statement(s)", self.statements);
    }
}
