//! The single connection held by the agent.

use crate::config::BackupConfig;
use crate::driver::{ConnectError, ConnectionString, Driver, Session};

/// Live connection to the SQL Server instance.
///
/// The connection is opened once on startup and closed when dropped.
/// It isn't reopened if the server goes away.
pub struct Connection<S: Session> {
    session: S,
    server: String,
}

/// Connects to the server configured in `config`.
///
/// Failures aren't retried.
pub fn connect<D: Driver>(
    driver: &D,
    config: &BackupConfig,
) -> Result<Connection<D::Session>, ConnectError> {
    let connection_string =
        ConnectionString::new(&config.server_instance, &config.user, &config.password);
    log::debug!(target: "backup::connection", "Connecting using: {connection_string}");
    if connection_string.trust_server_certificate {
        log::debug!(target: "backup::connection", "Server certificate is trusted without validation");
    }

    match driver.connect(&connection_string) {
        Ok(session) => {
            log::info!(target: "backup::connection", "Connected to SQL Server {} successfully.", config.server_instance);
            Ok(Connection {
                session,
                server: config.server_instance.clone(),
            })
        }
        Err(e) => {
            if let ConnectError::Login(report) = &e {
                for line in report.to_string().lines() {
                    log::error!(target: "backup::connection", "{line}");
                }
            }
            Err(e)
        }
    }
}

impl<S: Session> Connection<S> {
    /// Address of the connected server.
    pub fn server(&self) -> &str {
        &self.server
    }

    pub(crate) fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: Session> Drop for Connection<S> {
    fn drop(&mut self) {
        self.session.disconnect();
        log::info!(target: "backup::connection", "Disconnected from SQL Server {}", self.server);
    }
}
