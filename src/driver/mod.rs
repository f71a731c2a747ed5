//! Call-level interface to the database server.
//!
//! The agent only needs a handful of operations: connect, run a statement and
//! read the diagnostic records the server produced. They are modeled after the
//! handle based ODBC API so that every [Driver] reports outcomes the same way:
//!
//! - [Driver::connect] allocates the environment, the connection and logs in.
//! - [Session] owns the live connection and at most one statement at a time.
//! - [Diagnostics] walks the records of a handle until the driver has no more.
//!
//! Two drivers are provided:
//!
//! - [SqlCmd]: keeps a `sqlcmd` session to the server open.
//! - [DryRun]: only logs what would be executed.

pub mod dry_run;
pub mod sqlcmd;

use std::fmt;

use derive_more::{Display, Error};

pub use dry_run::DryRun;
pub use sqlcmd::SqlCmd;

/// Return code of a driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlReturn {
    Success,
    /// The call succeeded but the driver has diagnostic records with additional information.
    SuccessWithInfo,
    Error,
}

impl SqlReturn {
    pub fn succeeded(self) -> bool {
        matches!(self, Self::Success | Self::SuccessWithInfo)
    }
}

/// Handle whose diagnostic records are requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Connection,
    Statement,
}

/// A single diagnostic record of a driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    /// Five character SQLSTATE, e.g. `01000` for informational messages.
    pub state: String,
    /// Error number reported by the server.
    pub native_error: i32,
    pub message: String,
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SQLState={}, NativeError={}, Message={}",
            self.state, self.native_error, self.message
        )
    }
}

/// Diagnostic records collected for a single outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticReport {
    Records(Vec<DiagnosticRecord>),
    /// The driver didn't provide a single record.
    Unavailable,
}

impl DiagnosticReport {
    pub fn records(&self) -> &[DiagnosticRecord] {
        match self {
            Self::Records(records) => records,
            Self::Unavailable => &[],
        }
    }
}

impl FromIterator<DiagnosticRecord> for DiagnosticReport {
    fn from_iter<T: IntoIterator<Item = DiagnosticRecord>>(iter: T) -> Self {
        let records: Vec<_> = iter.into_iter().collect();
        if records.is_empty() {
            Self::Unavailable
        } else {
            Self::Records(records)
        }
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "No diagnostics available"),
            Self::Records(records) => {
                for (i, record) in records.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{record}")?;
                }
                Ok(())
            }
        }
    }
}

/// Lazy sequence of the diagnostic records of one handle.
///
/// Records are numbered from 1. The sequence ends at the first number the driver
/// has no record for.
pub struct Diagnostics<'a, S: ?Sized> {
    session: &'a S,
    handle: HandleKind,
    next: Option<u16>,
}

impl<S: Session + ?Sized> Iterator for Diagnostics<'_, S> {
    type Item = DiagnosticRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let number = self.next?;
        match self.session.diagnostic_record(self.handle, number) {
            Some(record) => {
                self.next = number.checked_add(1);
                Some(record)
            }
            None => {
                self.next = None;
                None
            }
        }
    }
}

impl<S: Session + ?Sized> std::iter::FusedIterator for Diagnostics<'_, S> {}

/// Workload the connection declares to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ApplicationIntent {
    #[display("ReadWrite")]
    ReadWrite,
    #[display("ReadOnly")]
    ReadOnly,
}

/// Parameters to open a connection to a SQL Server instance.
///
/// [Display] and [Debug] render it as an ODBC connection string with the password
/// masked.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub server: String,
    pub user: String,
    pub password: String,
    pub application_intent: ApplicationIntent,
    /// Accept the certificate of the server without validating it.
    ///
    /// <div class="warning">
    /// This is the default since most instances run with a self signed certificate.
    /// Turn it off once the instance presents a certificate of a trusted CA.
    /// </div>
    pub trust_server_certificate: bool,
}

impl ConnectionString {
    const DRIVER: &'static str = "ODBC Driver 17 for SQL Server";

    pub fn new(server: &str, user: &str, password: &str) -> Self {
        Self {
            server: server.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            application_intent: ApplicationIntent::ReadWrite,
            trust_server_certificate: true,
        }
    }

    fn render(&self, password: &str) -> String {
        let trust = if self.trust_server_certificate {
            "yes"
        } else {
            "no"
        };

        format!(
            "Driver={{{}}};Server={};UID={};PWD={};ApplicationIntent={};TrustServerCertificate={trust};",
            Self::DRIVER,
            self.server,
            self.user,
            password,
            self.application_intent,
        )
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render("********"))
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionString({self})")
    }
}

/// Errors on establishing the connection. All of them are fatal.
#[derive(Debug, Display, Error)]
pub enum ConnectError {
    /// The driver environment couldn't be allocated.
    #[display("Failed to allocate driver environment: {_0}")]
    Environment(#[error(ignore)] String),
    /// The connection resource couldn't be allocated.
    #[display("Failed to allocate connection: {_0}")]
    Allocation(#[error(ignore)] String),
    /// The server rejected or didn't answer the login.
    #[display("Failed to connect to SQL Server: {_0}")]
    Login(#[error(ignore)] DiagnosticReport),
}

/// Database client able to open a [Session].
pub trait Driver {
    type Session: Session;

    /// Allocates the driver environment and a connection, then logs in.
    fn connect(&self, connection: &ConnectionString) -> Result<Self::Session, ConnectError>;
}

/// A live connection to the server.
///
/// Statements are executed one at a time: [alloc_statement](Self::alloc_statement),
/// [exec_direct](Self::exec_direct), [free_statement](Self::free_statement).
pub trait Session {
    /// Allocates a statement handle. Diagnostics of a failure are on the connection handle.
    fn alloc_statement(&mut self) -> SqlReturn;

    /// Executes `statement` on the allocated statement handle and blocks until the
    /// server is done with it.
    fn exec_direct(&mut self, statement: &str) -> SqlReturn;

    /// Releases the statement handle and its diagnostic records.
    fn free_statement(&mut self);

    /// Returns diagnostic record `number` of `handle` or [None] if there is no such record.
    fn diagnostic_record(&self, handle: HandleKind, number: u16) -> Option<DiagnosticRecord>;

    /// Closes the connection. Later calls fail.
    fn disconnect(&mut self);

    fn diagnostics(&self, handle: HandleKind) -> Diagnostics<'_, Self> {
        Diagnostics {
            session: self,
            handle,
            next: Some(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Records(Vec<DiagnosticRecord>);

    impl Session for Records {
        fn alloc_statement(&mut self) -> SqlReturn {
            SqlReturn::Success
        }
        fn exec_direct(&mut self, _: &str) -> SqlReturn {
            SqlReturn::Success
        }
        fn free_statement(&mut self) {}
        fn diagnostic_record(&self, handle: HandleKind, number: u16) -> Option<DiagnosticRecord> {
            if handle == HandleKind::Connection {
                return None;
            }
            self.0.get(usize::from(number).checked_sub(1)?).cloned()
        }
        fn disconnect(&mut self) {}
    }

    fn record(native_error: i32) -> DiagnosticRecord {
        DiagnosticRecord {
            state: "01000".to_string(),
            native_error,
            message: format!("message {native_error}"),
        }
    }

    #[test]
    fn diagnostics_walk_all_records_in_order() {
        let session = Records(vec![record(1), record(2), record(3)]);
        let natives: Vec<_> = session
            .diagnostics(HandleKind::Statement)
            .map(|r| r.native_error)
            .collect();
        assert_eq!(natives, [1, 2, 3]);
        assert_eq!(session.diagnostics(HandleKind::Connection).count(), 0);
    }

    #[test]
    fn diagnostics_stay_exhausted() {
        let session = Records(vec![record(1)]);
        let mut diagnostics = session.diagnostics(HandleKind::Statement);
        assert!(diagnostics.next().is_some());
        assert!(diagnostics.next().is_none());
        assert!(diagnostics.next().is_none());
    }

    #[test]
    fn empty_report_is_unavailable() {
        let report: DiagnosticReport = std::iter::empty().collect();
        assert_eq!(report, DiagnosticReport::Unavailable);
        assert_eq!(report.to_string(), "No diagnostics available");
    }

    #[test]
    fn connection_string_masks_password() {
        let connection = ConnectionString::new("localhost\\SQLEXPRESS", "sa", "secret");
        assert_eq!(
            connection.render(&connection.password),
            "Driver={ODBC Driver 17 for SQL Server};Server=localhost\\SQLEXPRESS;UID=sa;PWD=secret;ApplicationIntent=ReadWrite;TrustServerCertificate=yes;"
        );
        assert!(!connection.to_string().contains("secret"));
        assert!(!format!("{connection:?}").contains("secret"));
    }
}
