//! Execution of a single statement and classification of its outcome.

use derive_more::{Display, Error};
use log::Level;

use super::Connection;
use crate::driver::{DiagnosticReport, HandleKind, Session, SqlReturn};

/// Kind of the outcome of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Outcome {
    #[display("success")]
    Success,
    #[display("success with warnings")]
    SuccessWithWarnings,
    #[display("failure")]
    Failure,
}

/// Step a statement failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FailedStage {
    #[display("allocating the statement")]
    Allocation,
    #[display("executing the statement")]
    Execution,
}

/// Outcome of [execute] together with the diagnostics the server reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    Success,
    /// The statement succeeded, the server reported additional information.
    SuccessWithWarnings(DiagnosticReport),
    Failure {
        stage: FailedStage,
        diagnostics: DiagnosticReport,
    },
}

impl ExecutionResult {
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Success => Outcome::Success,
            Self::SuccessWithWarnings(_) => Outcome::SuccessWithWarnings,
            Self::Failure { .. } => Outcome::Failure,
        }
    }

    pub fn diagnostics(&self) -> Option<&DiagnosticReport> {
        match self {
            Self::Success => None,
            Self::SuccessWithWarnings(diagnostics) | Self::Failure { diagnostics, .. } => {
                Some(diagnostics)
            }
        }
    }

    /// Turns a failure into a [CommandError] for `database`.
    pub fn into_result(self, database: &str) -> Result<Outcome, CommandError> {
        match self {
            Self::Failure { stage, diagnostics } => Err(CommandError {
                database: database.to_string(),
                stage,
                diagnostics,
            }),
            other => Ok(other.outcome()),
        }
    }
}

/// Backup statement of a single database failed.
///
/// Isn't fatal: the other databases and later cycles are still attempted.
#[derive(Debug, Clone, Display, Error)]
#[display("Backup failed for {database} while {stage}")]
pub struct CommandError {
    pub database: String,
    pub stage: FailedStage,
    pub diagnostics: DiagnosticReport,
}

/// Releases the statement handle however [execute] is left.
struct StatementHandle<'a, S: Session> {
    session: &'a mut S,
}

impl<S: Session> Drop for StatementHandle<'_, S> {
    fn drop(&mut self) {
        self.session.free_statement();
    }
}

/// Executes `statement` over `connection`.
///
/// Blocks until the server finished the statement, which takes minutes for
/// the backup of a big database.
pub fn execute<S: Session>(connection: &mut Connection<S>, statement: &str) -> ExecutionResult {
    execute_on(connection.session_mut(), statement)
}

fn execute_on<S: Session>(session: &mut S, statement: &str) -> ExecutionResult {
    if !session.alloc_statement().succeeded() {
        log::error!(target: "backup::executor", "Failed to allocate statement handle");
        let diagnostics = collect(&*session, HandleKind::Connection, Level::Error);
        return ExecutionResult::Failure {
            stage: FailedStage::Allocation,
            diagnostics,
        };
    }

    let handle = StatementHandle { session };
    match handle.session.exec_direct(statement) {
        SqlReturn::Error => {
            log::error!(target: "backup::executor", "Failed to execute SQL: {statement}");
            let diagnostics = collect(&*handle.session, HandleKind::Statement, Level::Error);
            ExecutionResult::Failure {
                stage: FailedStage::Execution,
                diagnostics,
            }
        }
        SqlReturn::SuccessWithInfo => {
            log::info!(target: "backup::executor", "SQL executed successfully.");
            log::warn!(target: "backup::executor", "SQL executed with warnings: {statement}");
            let diagnostics = collect(&*handle.session, HandleKind::Statement, Level::Warn);
            ExecutionResult::SuccessWithWarnings(diagnostics)
        }
        SqlReturn::Success => {
            log::info!(target: "backup::executor", "SQL executed successfully.");
            ExecutionResult::Success
        }
    }
}

/// Logs every diagnostic record of `handle` at `level` and collects them.
fn collect<S: Session>(session: &S, handle: HandleKind, level: Level) -> DiagnosticReport {
    let report: DiagnosticReport = session
        .diagnostics(handle)
        .inspect(|record| log::log!(target: "backup::executor", level, "Diagnostic: {record}"))
        .collect();

    if report == DiagnosticReport::Unavailable {
        log::log!(target: "backup::executor", level, "No diagnostics available.");
    }

    report
}
