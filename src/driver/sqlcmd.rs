//! [Driver] talking to SQL Server through Microsoft's [`sqlcmd`] client.
//!
//! One `sqlcmd` process is started per connection and kept alive for the whole
//! [SqlCmdSession]. Statements are written to its stdin as batches. After every
//! batch a `PRINT` of a unique marker is sent, so the output belonging to a
//! statement is everything printed before the marker shows up.
//!
//! `sqlcmd` runs with `-m -1` which prints a `Msg <n>, Level <l>, State <s>` header
//! for every server message. Messages up to level 10 are informational, anything
//! above is an error.
//!
//! [`sqlcmd`]: https://learn.microsoft.com/en-us/sql/tools/sqlcmd/sqlcmd-utility

use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::LazyLock;

use regex::Regex;

use super::{
    ApplicationIntent, ConnectError, ConnectionString, DiagnosticRecord, Driver, HandleKind,
    Session, SqlReturn,
};

const PROGRAM: &str = "sqlcmd";

/// Highest severity level of informational messages.
const MAX_INFO_LEVEL: u8 = 10;

const STATE_INFO: &str = "01000";
const STATE_ERROR: &str = "42000";
const STATE_CONNECT: &str = "08001";
const STATE_LINK_FAILURE: &str = "08S01";

static MESSAGE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Msg (\d+), Level (\d+), State (\d+)").expect("message header regex is valid")
});

// interactive prompts like `1> 2> ` prefixing the output
static PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+> ?)+").expect("prompt regex is valid"));

/// Opens [SqlCmdSession]s.
#[derive(Debug, Clone, Default)]
pub struct SqlCmd {
    /// Explicit `sqlcmd` executable, otherwise it's searched in `PATH`.
    program: Option<PathBuf>,
}

impl SqlCmd {
    pub fn new(program: Option<PathBuf>) -> Self {
        Self { program }
    }

    fn locate(&self) -> Result<PathBuf, ConnectError> {
        match &self.program {
            Some(program) if program.is_file() => Ok(program.clone()),
            Some(program) => Err(ConnectError::Environment(format!(
                "{} is not a file",
                program.display()
            ))),
            None => which::which(PROGRAM).map_err(|e| {
                ConnectError::Environment(format!("{PROGRAM} executable not found in PATH: {e}"))
            }),
        }
    }
}

impl Driver for SqlCmd {
    type Session = SqlCmdSession;

    fn connect(&self, connection: &ConnectionString) -> Result<SqlCmdSession, ConnectError> {
        let program = self.locate()?;
        log::debug!(target: "driver::sqlcmd", "Using {}", program.display());

        let mut command = Command::new(&program);
        command
            .arg("-S")
            .arg(&connection.server)
            .arg("-U")
            .arg(&connection.user)
            .arg("-m")
            .arg("-1") // print every message including informational ones
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        // keep the password out of the process list
        if connection.password.is_empty() {
            command.arg("-P").arg("");
        } else {
            command.env("SQLCMDPASSWORD", &connection.password);
        }
        if connection.trust_server_certificate {
            command.arg("-C");
        }
        // ReadWrite is the implicit intent of sqlcmd
        if connection.application_intent == ApplicationIntent::ReadOnly {
            command.arg("-K").arg("ReadOnly");
        }

        let mut child = command.spawn().map_err(|e| {
            ConnectError::Allocation(format!("Unable to start {}: {e}", program.display()))
        })?;
        log::trace!(target: "driver::sqlcmd", "Started sqlcmd process {}", child.id());

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ConnectError::Allocation(
                "stdio of sqlcmd is not captured".to_string(),
            ));
        };

        let mut session = SqlCmdSession {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            batches: 0,
            link_lost: None,
            closed: false,
            connection_diagnostics: Vec::new(),
            statement: None,
        };

        // the login happens on startup of sqlcmd, an empty batch tells if it worked
        let messages = session.run_batch(None);
        if messages.iter().any(Message::is_error) {
            let report = messages.into_iter().map(|m| m.record).collect();
            return Err(ConnectError::Login(report));
        }
        for message in messages {
            log::debug!(target: "driver::sqlcmd", "{}", message.record);
        }

        Ok(session)
    }
}

/// A running `sqlcmd` process logged into the server.
pub struct SqlCmdSession {
    child: Child,
    /// [None] once disconnected.
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    batches: u64,
    /// Why the process can't be talked to anymore.
    link_lost: Option<String>,
    /// The process has been waited for.
    closed: bool,
    connection_diagnostics: Vec<DiagnosticRecord>,
    /// Records of the allocated statement.
    statement: Option<Vec<DiagnosticRecord>>,
}

impl SqlCmdSession {
    fn run_batch(&mut self, statement: Option<&str>) -> Vec<Message> {
        self.batches += 1;
        let marker = format!("mssql_backup batch {} done", self.batches);
        let mut parser = BatchParser::new(&marker);

        if let Err(e) = self.send(statement, &marker) {
            let reason = format!("Failed to send batch to sqlcmd: {e}");
            parser.link_failure(reason.clone());
            self.link_lost = Some(reason);
            return parser.finish();
        }

        let mut line = Vec::new();
        loop {
            line.clear();
            match self.stdout.read_until(b'\n', &mut line) {
                Ok(0) => {
                    let reason = "sqlcmd closed the connection".to_string();
                    parser.link_failure(reason.clone());
                    self.link_lost = Some(reason);
                    break;
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&line);
                    log::trace!(target: "driver::sqlcmd", "{}", line.trim_end());
                    if parser.feed(line.trim_end_matches(['\r', '\n'])) {
                        break;
                    }
                }
                Err(e) => {
                    let reason = format!("Failed to read from sqlcmd: {e}");
                    parser.link_failure(reason.clone());
                    self.link_lost = Some(reason);
                    break;
                }
            }
        }

        parser.finish()
    }

    fn send(&mut self, statement: Option<&str>, marker: &str) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "session is closed"))?;

        if let Some(statement) = statement {
            writeln!(stdin, "{statement}")?;
            writeln!(stdin, "GO")?;
        }
        writeln!(stdin, "PRINT '{marker}'")?;
        writeln!(stdin, "GO")?;
        stdin.flush()
    }

    fn connection_failure(&mut self, message: String) -> SqlReturn {
        self.connection_diagnostics
            .push(Message::new(0, u8::MAX, STATE_LINK_FAILURE, message).record);
        SqlReturn::Error
    }
}

impl Session for SqlCmdSession {
    fn alloc_statement(&mut self) -> SqlReturn {
        self.connection_diagnostics.clear();

        if self.stdin.is_none() {
            return self.connection_failure("Session is disconnected".to_string());
        }
        if let Some(reason) = self.link_lost.clone() {
            return self.connection_failure(reason);
        }
        match self.child.try_wait() {
            Ok(None) => {
                self.statement = Some(Vec::new());
                SqlReturn::Success
            }
            Ok(Some(status)) => self.connection_failure(format!("sqlcmd exited: {status}")),
            Err(e) => self.connection_failure(format!("Unable to query sqlcmd: {e}")),
        }
    }

    fn exec_direct(&mut self, statement: &str) -> SqlReturn {
        if self.statement.is_none() {
            log::error!(target: "driver::sqlcmd", "No statement allocated");
            return SqlReturn::Error;
        }

        let messages = self.run_batch(Some(statement));
        let ret = classify(&messages);
        self.statement = Some(messages.into_iter().map(|m| m.record).collect());

        ret
    }

    fn free_statement(&mut self) {
        self.statement = None;
    }

    fn diagnostic_record(&self, handle: HandleKind, number: u16) -> Option<DiagnosticRecord> {
        let records = match handle {
            HandleKind::Connection => self.connection_diagnostics.as_slice(),
            HandleKind::Statement => self.statement.as_deref()?,
        };

        records.get(usize::from(number).checked_sub(1)?).cloned()
    }

    fn disconnect(&mut self) {
        let Some(mut stdin) = self.stdin.take() else {
            return;
        };

        if self.link_lost.is_none() {
            if let Err(e) = writeln!(stdin, "EXIT").and_then(|()| stdin.flush()) {
                log::warn!(target: "driver::sqlcmd", "Failed to send EXIT to sqlcmd: {e}");
            }
        }
        drop(stdin);

        self.closed = true;
        match self.child.wait() {
            Ok(status) if !status.success() => {
                log::warn!(target: "driver::sqlcmd", "sqlcmd exited with {status}")
            }
            Ok(_) => log::trace!(target: "driver::sqlcmd", "sqlcmd exited"),
            Err(e) => log::warn!(target: "driver::sqlcmd", "Waiting for sqlcmd failed: {e}"),
        }
    }
}

impl Drop for SqlCmdSession {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn classify(messages: &[Message]) -> SqlReturn {
    if messages.iter().any(Message::is_error) {
        SqlReturn::Error
    } else if messages.is_empty() {
        SqlReturn::Success
    } else {
        SqlReturn::SuccessWithInfo
    }
}

#[derive(Debug)]
struct Message {
    level: u8,
    record: DiagnosticRecord,
}

impl Message {
    fn new(native_error: i32, level: u8, state: &str, message: String) -> Self {
        Self {
            level,
            record: DiagnosticRecord {
                state: state.to_string(),
                native_error,
                message,
            },
        }
    }

    fn server(native_error: i32, level: u8) -> Self {
        let state = if level > MAX_INFO_LEVEL {
            STATE_ERROR
        } else {
            STATE_INFO
        };
        Self::new(native_error, level, state, String::new())
    }

    fn is_error(&self) -> bool {
        self.level > MAX_INFO_LEVEL
    }
}

/// Collects the messages of one batch from the output lines of `sqlcmd`.
struct BatchParser<'a> {
    marker: &'a str,
    messages: Vec<Message>,
    /// Message whose text is still being read.
    pending: Option<Message>,
}

impl<'a> BatchParser<'a> {
    fn new(marker: &'a str) -> Self {
        Self {
            marker,
            messages: Vec::new(),
            pending: None,
        }
    }

    /// Feeds a line of output. Returns `true` once the end of the batch is reached.
    fn feed(&mut self, line: &str) -> bool {
        let line = PROMPT.replace(line, "");
        let line = line.trim();

        if line.contains(self.marker) {
            self.flush();
            return true;
        }

        if let Some(captures) = MESSAGE_HEADER.captures(line) {
            self.flush();
            let native_error = captures[1].parse().unwrap_or_default();
            let level = captures[2].parse().unwrap_or(u8::MAX);
            self.pending = Some(Message::server(native_error, level));
            return false;
        }

        if let Some(text) = line.strip_prefix("Sqlcmd: Error:") {
            self.flush();
            self.messages.push(Message::new(
                0,
                u8::MAX,
                STATE_CONNECT,
                text.trim().to_string(),
            ));
            return false;
        }

        if line.is_empty() {
            return false;
        }

        match &mut self.pending {
            Some(pending) if pending.record.message.is_empty() => {
                pending.record.message = line.to_string();
            }
            Some(pending) => {
                pending.record.message.push(' ');
                pending.record.message.push_str(line);
            }
            // plain lines like `Processed 344 pages for database ...`
            None => self
                .messages
                .push(Message::new(0, 0, STATE_INFO, line.to_string())),
        }

        false
    }

    fn link_failure(&mut self, message: String) {
        self.flush();
        self.messages
            .push(Message::new(0, u8::MAX, STATE_LINK_FAILURE, message));
    }

    fn flush(&mut self) {
        if let Some(pending) = self.pending.take() {
            // header of the marker PRINT
            if pending.record.native_error == 0 && pending.record.message.is_empty() {
                return;
            }
            self.messages.push(pending);
        }
    }

    fn finish(mut self) -> Vec<Message> {
        self.flush();
        self.messages
    }
}
