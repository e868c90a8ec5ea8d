use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

use super::watchdog::Watchdog;
use super::{Report, ScriptObserver, ScriptOptions, Splitter, StatementOutcome};
use crate::cursor::{ResultCursor, RowCap};
use crate::dialect::leading_keyword;
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::session::Session;

/// Statements that change the list of databases.
static DATABASE_DDL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(CREATE|DROP)\s+(DATABASE|SCHEMA)\b").expect("valid database DDL pattern")
});

/// Statement verbs that produce a result set even when it has no rows.
const ROW_VERBS: &[&str] = &["SELECT", "WITH", "SHOW", "PRAGMA", "EXPLAIN", "DESCRIBE", "DESC", "VALUES"];

fn returns_rows(sql: &str) -> bool {
    ROW_VERBS.contains(&leading_keyword(sql).as_str())
}

/// Run every statement of `text` in source order.
///
/// Failures go to the observer with the statement's index and native
/// message; the run halts on one only with `stop_on_error`.
pub(crate) fn execute(
    session: &mut Session,
    text: &str,
    options: &ScriptOptions,
    observer: &mut dyn ScriptObserver,
) -> Result<Report> {
    let started = Instant::now();
    let rules = session
        .codec()
        .dialect()
        .scan_rules(session.codec().backslash_escapes());
    let mut report = Report::default();

    for (index, statement) in Splitter::new(text, rules).enumerate() {
        report.statements += 1;
        observer.on_statement(index, statement.sql);
        match run_statement(session, index, statement.sql, options, observer) {
            Ok(()) => report.succeeded += 1,
            Err(err) => {
                let err = err.at_statement(index);
                tracing::debug!(index, error = %err, "statement failed");
                observer.on_error(index, &err);
                report.failed += 1;
                report.errors.push((index, err.to_string()));
                if options.stop_on_error {
                    report.halted = true;
                    break;
                }
            }
        }
    }

    report.elapsed = started.elapsed();
    tracing::debug!(
        statements = report.statements,
        failed = report.failed,
        elapsed = ?report.elapsed,
        "script finished"
    );
    Ok(report)
}

fn run_statement(
    session: &mut Session,
    index: usize,
    sql: &str,
    options: &ScriptOptions,
    observer: &mut dyn ScriptObserver,
) -> Result<()> {
    let dialect = session.codec().dialect();
    if let Some(reason) = dialect.rejects_in_script(sql) {
        return Err(Error::statement(reason));
    }

    let wrapped = options
        .timeout
        .and_then(|timeout| dialect.timeout_form(session.server_info(), sql, timeout));
    let watchdog = match (options.timeout, &wrapped) {
        (Some(timeout), None) => Watchdog::arm(session, timeout),
        _ => None,
    };

    let started = Instant::now();
    let result = stream_results(
        session.driver_mut(),
        index,
        wrapped.as_deref().unwrap_or(sql),
        returns_rows(sql),
        options.row_cap,
        started,
        observer,
    );
    drop(watchdog);

    if DATABASE_DDL.is_match(sql) {
        session.database_cache().invalidate();
    }
    result
}

/// Hand every result set of one statement to the observer.
fn stream_results(
    driver: &mut dyn Driver,
    index: usize,
    sql: &str,
    rows_expected: bool,
    row_cap: usize,
    started: Instant,
    observer: &mut dyn ScriptObserver,
) -> Result<()> {
    let mut cursor = driver.execute(sql)?;
    loop {
        report_result(cursor.as_mut(), index, rows_expected, row_cap, started.elapsed(), observer)?;
        if !cursor.next_result()? {
            return Ok(());
        }
    }
}

fn report_result(
    cursor: &mut dyn ResultCursor,
    index: usize,
    rows_expected: bool,
    row_cap: usize,
    elapsed: Duration,
    observer: &mut dyn ScriptObserver,
) -> Result<()> {
    // An empty result set has no shape on the wire; the verb decides.
    if cursor.column_count()? == 0 && !rows_expected {
        while cursor.fetch_row()?.is_some() {}
        let affected = cursor.affected_rows().unwrap_or(0);
        observer.on_result(index, StatementOutcome::Affected(affected), elapsed);
        return Ok(());
    }
    let mut capped = RowCap::new(cursor, row_cap);
    observer.on_result(index, StatementOutcome::Rows(&mut capped), elapsed);
    if capped.capped() {
        tracing::debug!(index, cap = row_cap, "row cap reached");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_ddl_pattern() {
        assert!(DATABASE_DDL.is_match("create database shop"));
        assert!(DATABASE_DDL.is_match("  DROP SCHEMA audit CASCADE"));
        assert!(!DATABASE_DDL.is_match("CREATE TABLE databases (id int)"));
        assert!(!DATABASE_DDL.is_match("SELECT 'DROP DATABASE x'"));
    }

    #[test]
    fn test_row_returning_verbs() {
        assert!(returns_rows("select 1"));
        assert!(returns_rows("/* report */ WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(returns_rows("PRAGMA table_info(t)"));
        assert!(!returns_rows("DELETE FROM t"));
        assert!(!returns_rows("CREATE TABLE t (id int)"));
    }
}
