//! Talks to a shell script standing in for `sqlcmd`.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use mssql_backup_lib::backup::executor::FailedStage;
use mssql_backup_lib::backup::{self, ExecutionResult, Outcome};
use mssql_backup_lib::config::BackupConfig;
use mssql_backup_lib::driver::{ConnectError, SqlCmd};

/// Answers batches like `sqlcmd -m -1` does, depending on the database named in them.
/// The arguments and the password it was started with are written next to the script.
const SERVER: &str = r#"#!/bin/sh
printf '%s\n' "$@" > "$0.args"
printf '%s' "$SQLCMDPASSWORD" > "$0.password"
batch=""
while IFS= read -r line; do
    case "$line" in
        GO)
            case "$batch" in
                *"[Quiet]"*) ;;
                *"[Verbose]"*)
                    echo "1> 2> Msg 3014, Level 0, State 1, Server fake, Line 1"
                    echo "BACKUP DATABASE successfully processed 344 pages in 0.042 seconds."
                    ;;
                *"[Broken]"*)
                    echo "Msg 3201, Level 16, State 1, Server fake, Line 1"
                    echo "Cannot open backup device '/nowhere/Broken.bak'."
                    echo "Msg 3013, Level 16, State 1, Server fake, Line 1"
                    echo "BACKUP DATABASE is terminating abnormally."
                    ;;
                *"[Crash]"*) exit 1 ;;
                *"PRINT '"*)
                    marker=$(printf '%s' "$batch" | sed -n "s/^PRINT '\(.*\)'\$/\1/p")
                    echo "Msg 0, Level 0, State 1, Server fake, Line 1"
                    echo "$marker"
                    ;;
            esac
            batch=""
            ;;
        EXIT) exit 0 ;;
        *) batch="$batch$line
" ;;
    esac
done
"#;

/// Rejects the login once the first batch arrives.
const LOGIN_FAILURE: &str = r#"#!/bin/sh
while IFS= read -r line; do
    if [ "$line" = "GO" ]; then
        echo "Sqlcmd: Error: Microsoft ODBC Driver 17 for SQL Server : Login failed for user 'sa'."
        exit 1
    fi
done
"#;

fn script(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("sqlcmd");
    fs::write(&path, content).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn config() -> BackupConfig {
    BackupConfig {
        user: "backup".to_string(),
        password: "secret".to_string(),
        ..Default::default()
    }
}

#[test]
fn classifies_batches() {
    let dir = tempfile::tempdir().unwrap();
    let driver = SqlCmd::new(Some(script(dir.path(), SERVER)));
    let mut connection = backup::connect(&driver, &config()).unwrap();

    let result = backup::execute(
        &mut connection,
        "BACKUP DATABASE [Quiet] TO DISK = N'/tmp/q.bak'",
    );
    assert_eq!(result, ExecutionResult::Success);

    let result = backup::execute(
        &mut connection,
        "BACKUP DATABASE [Verbose] TO DISK = N'/tmp/v.bak'",
    );
    assert_eq!(result.outcome(), Outcome::SuccessWithWarnings);
    let records = result.diagnostics().unwrap().records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, "01000");
    assert_eq!(records[0].native_error, 3014);
    assert!(records[0].message.starts_with("BACKUP DATABASE successfully processed"));

    let result = backup::execute(
        &mut connection,
        "BACKUP DATABASE [Broken] TO DISK = N'/nowhere/Broken.bak'",
    );
    let ExecutionResult::Failure { stage, diagnostics } = result else {
        panic!("expected failure");
    };
    assert_eq!(stage, FailedStage::Execution);
    let errors: Vec<_> = diagnostics
        .records()
        .iter()
        .map(|record| (record.state.as_str(), record.native_error))
        .collect();
    assert_eq!(errors, [("42000", 3201), ("42000", 3013)]);

    // the session survives a failed statement
    let result = backup::execute(
        &mut connection,
        "BACKUP DATABASE [Quiet] TO DISK = N'/tmp/q.bak'",
    );
    assert_eq!(result, ExecutionResult::Success);
    drop(connection);

    let args = fs::read_to_string(dir.path().join("sqlcmd.args")).unwrap();
    let args: Vec<_> = args.lines().collect();
    assert_eq!(args, ["-S", "localhost\\SQLEXPRESS", "-U", "backup", "-m", "-1", "-C"]);
    let password = fs::read_to_string(dir.path().join("sqlcmd.password")).unwrap();
    assert_eq!(password, "secret");
}

#[test]
fn lost_process_fails_later_allocations() {
    let dir = tempfile::tempdir().unwrap();
    let driver = SqlCmd::new(Some(script(dir.path(), SERVER)));
    let mut connection = backup::connect(&driver, &config()).unwrap();

    let result = backup::execute(
        &mut connection,
        "BACKUP DATABASE [Crash] TO DISK = N'/tmp/c.bak'",
    );
    let ExecutionResult::Failure { stage, diagnostics } = result else {
        panic!("expected failure");
    };
    assert_eq!(stage, FailedStage::Execution);
    assert_eq!(diagnostics.records().last().unwrap().state, "08S01");

    for database in ["Quiet", "Verbose"] {
        let statement = format!("BACKUP DATABASE [{database}] TO DISK = N'/tmp/x.bak'");
        let result = backup::execute(&mut connection, &statement);
        let ExecutionResult::Failure { stage, diagnostics } = result else {
            panic!("expected failure for {database}");
        };
        assert_eq!(stage, FailedStage::Allocation);
        let records = diagnostics.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, "08S01");
    }
}

#[test]
fn rejected_login_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let driver = SqlCmd::new(Some(script(dir.path(), LOGIN_FAILURE)));

    let Err(ConnectError::Login(report)) = backup::connect(&driver, &config()) else {
        panic!("expected login failure");
    };
    let first = &report.records()[0];
    assert_eq!(first.state, "08001");
    assert!(first.message.ends_with("Login failed for user 'sa'."));
}
