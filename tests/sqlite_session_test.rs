//! End-to-end tests against an in-memory SQLite database.

use std::time::Duration;

use dbdeck::dialect::Operator;
use dbdeck::prelude::*;
use pretty_assertions::assert_eq;

fn session() -> Session {
    let mut session = Session::connect(&ConnectOptions::sqlite_memory()).unwrap();
    let report = session
        .run_script(
            "CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, name varchar(50));\n\
             CREATE TABLE blobs (k TEXT PRIMARY KEY, data BLOB);",
            &ScriptOptions::default(),
            &mut (),
        )
        .unwrap();
    assert!(report.is_success(), "{:?}", report.errors);
    session
}

fn names(session: &mut Session) -> Vec<String> {
    let mut cursor = session
        .select(&SelectQuery::new("t").columns(["name"]).order_by("id", false))
        .unwrap();
    let mut names = Vec::new();
    while let Some(row) = cursor.fetch_assoc().unwrap() {
        names.push(row.text("name").unwrap_or_default());
    }
    names
}

#[derive(Default)]
struct Recorder {
    statements: Vec<String>,
    outcomes: Vec<String>,
    errors: Vec<(usize, String)>,
}

impl ScriptObserver for Recorder {
    fn on_statement(&mut self, _index: usize, sql: &str) {
        self.statements.push(sql.to_string());
    }

    fn on_result(&mut self, index: usize, outcome: StatementOutcome<'_>, _elapsed: Duration) {
        let text = match outcome {
            StatementOutcome::Affected(n) => format!("{}: affected {}", index, n),
            StatementOutcome::Rows(cursor) => {
                let mut count = 0;
                while cursor.fetch_row().unwrap().is_some() {
                    count += 1;
                }
                format!("{}: {} row(s)", index, count)
            }
        };
        self.outcomes.push(text);
    }

    fn on_error(&mut self, index: usize, error: &Error) {
        self.errors.push((index, error.to_string()));
    }
}

// ============= Catalog =============

#[test]
fn test_columns_are_stable() {
    let mut session = session();
    let first = session.columns("t");
    let second = session.columns("t");
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert!(first[0].primary);
    assert!(first[0].auto_increment);
}

#[test]
fn test_missing_table_degrades_to_empty() {
    let mut session = session();
    assert!(session.columns("missing").is_empty());
    assert!(session.indexes("missing").is_empty());
    assert!(session.table_info("missing").is_none());
}

#[test]
fn test_row_identity_uses_primary_key() {
    let mut session = session();
    let identity = session.row_identity("t").unwrap();
    assert_eq!(identity.columns, vec!["id".to_string()]);
    assert!(!identity.synthetic);
}

// ============= Rows =============

#[test]
fn test_empty_select_describes_catalog_columns() {
    let mut session = session();
    let mut cursor = session.select(&SelectQuery::new("t").limit(10).page(0)).unwrap();
    let id = cursor.describe_column(0).unwrap().unwrap();
    assert_eq!(id.name, "id");
    assert!(!id.is_binary);
    assert_eq!(cursor.fetch_row().unwrap(), None);
}

#[test]
fn test_insert_then_last_insert_id() {
    let mut session = session();
    let affected = session.insert("t", &[("name".into(), "a".into())]).unwrap();
    assert_eq!(affected, 1);
    let id = session.last_insert_id().unwrap().and_then(|v| v.as_i64()).unwrap();
    assert!(id > 0);
}

#[test]
fn test_binary_column_metadata() {
    let mut session = session();
    session
        .insert("blobs", &[("k".into(), "x".into()), ("data".into(), Value::Bytes(vec![0, 159, 146]))])
        .unwrap();
    let mut cursor = session.select(&SelectQuery::new("blobs")).unwrap();
    let row = cursor.fetch_row().unwrap().unwrap();
    assert_eq!(row[1], Value::Bytes(vec![0, 159, 146]));
    assert!(cursor.describe_column(1).unwrap().unwrap().is_binary);
    assert!(!cursor.describe_column(0).unwrap().unwrap().is_binary);
}

#[test]
fn test_update_and_delete_one_row() {
    let mut session = session();
    for name in ["a", "a", "b"] {
        session.insert("t", &[("name".into(), name.into())]).unwrap();
    }
    let updated = session
        .update("t", &[("name".into(), "c".into())], &[Predicate::eq("name", "a")], true)
        .unwrap();
    assert_eq!(updated, 1);
    assert_eq!(names(&mut session), vec!["c", "a", "b"]);

    let deleted = session.delete("t", &[Predicate::eq("name", "a")], false).unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(names(&mut session), vec!["c", "b"]);
}

#[test]
fn test_insert_or_update() {
    let mut session = session();
    session.insert("t", &[("name".into(), "a".into())]).unwrap();
    let rows = vec![
        vec![("id".to_string(), Value::Int(1)), ("name".to_string(), Value::from("z"))],
        vec![("id".to_string(), Value::Int(5)), ("name".to_string(), Value::from("y"))],
    ];
    session.insert_or_update("t", &rows, &["id".to_string()]).unwrap();
    assert_eq!(names(&mut session), vec!["z", "y"]);
}

#[test]
fn test_paging_and_search() {
    let mut session = session();
    for i in 0..25 {
        session.insert("t", &[("name".into(), format!("n{}", i).into())]).unwrap();
    }
    let mut cursor = session
        .select(&SelectQuery::new("t").order_by("id", false).limit(10).page(2))
        .unwrap();
    let mut ids = Vec::new();
    while let Some(row) = cursor.fetch_assoc().unwrap() {
        ids.push(row.int("id").unwrap());
    }
    assert_eq!(ids, (21..=25).collect::<Vec<_>>());
    drop(cursor);

    let count = session
        .approximate_row_count("t", &[Predicate::new("name", Operator::Like, "n1%")])
        .unwrap();
    assert_eq!(count, Some(11));
}

#[test]
fn test_explain_returns_plan() {
    let mut session = session();
    let plan = session.explain("SELECT * FROM t WHERE id = 1").unwrap();
    assert!(!plan.is_empty());
}

// ============= Scripts =============

#[test]
fn test_script_continues_after_error() {
    let mut session = session();
    let mut recorder = Recorder::default();
    let report = session
        .run_script(
            "INSERT INTO t (name) VALUES ('a');\nSELECT * FROM nope;\nSELECT name FROM t;",
            &ScriptOptions::default(),
            &mut recorder,
        )
        .unwrap();
    assert_eq!(report.statements, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors[0].0, 1);
    assert!(report.errors[0].1.contains("nope"), "{}", report.errors[0].1);
    assert_eq!(recorder.outcomes, vec!["0: affected 1", "2: 1 row(s)"]);
    assert!(!report.halted);
}

#[test]
fn test_script_stops_on_error() {
    let mut session = session();
    let options = ScriptOptions {
        stop_on_error: true,
        ..ScriptOptions::default()
    };
    let mut recorder = Recorder::default();
    let report = session
        .run_script("SELECT * FROM nope; SELECT 1;", &options, &mut recorder)
        .unwrap();
    assert!(report.halted);
    assert_eq!(report.statements, 1);
    assert_eq!(recorder.statements, vec!["SELECT * FROM nope"]);
    assert_eq!(recorder.errors.len(), 1);
}

#[test]
fn test_attach_is_rejected() {
    let mut session = session();
    let mut recorder = Recorder::default();
    let report = session
        .run_script("ATTACH DATABASE 'other.db' AS other; SELECT 1", &ScriptOptions::default(), &mut recorder)
        .unwrap();
    assert_eq!(recorder.errors, vec![(0, "ATTACH queries are not supported.".to_string())]);
    assert_eq!(report.succeeded, 1);
}

#[test]
fn test_row_cap() {
    let mut session = session();
    let options = ScriptOptions {
        row_cap: 3,
        ..ScriptOptions::default()
    };
    let mut recorder = Recorder::default();
    session
        .run_script(
            "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 10) SELECT x FROM n",
            &options,
            &mut recorder,
        )
        .unwrap();
    assert_eq!(recorder.outcomes, vec!["0: 3 row(s)"]);
}

#[test]
fn test_empty_select_in_script_reports_rows() {
    let mut session = session();
    let mut recorder = Recorder::default();
    session
        .run_script(
            "SELECT id, name FROM t; DELETE FROM t WHERE id = 7; PRAGMA index_list(t)",
            &ScriptOptions::default(),
            &mut recorder,
        )
        .unwrap();
    assert_eq!(recorder.outcomes, vec!["0: 0 row(s)", "1: affected 0", "2: 0 row(s)"]);
}

#[test]
fn test_zero_row_cap_hands_over_every_row() {
    let mut session = session();
    let options = ScriptOptions {
        row_cap: 0,
        ..ScriptOptions::default()
    };
    let mut recorder = Recorder::default();
    session
        .run_script(
            "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 10) SELECT x FROM n",
            &options,
            &mut recorder,
        )
        .unwrap();
    assert_eq!(recorder.outcomes, vec!["0: 10 row(s)"]);
}

#[test]
fn test_truncate_and_drop() {
    let mut session = session();
    session.insert("t", &[("name".into(), "a".into())]).unwrap();
    session.truncate_tables(&["t".to_string()]).unwrap();
    assert!(names(&mut session).is_empty());

    session
        .run_script("CREATE VIEW v AS SELECT name FROM t", &ScriptOptions::default(), &mut ())
        .unwrap();
    session.drop_tables(&["v".to_string(), "blobs".to_string()]).unwrap();
    let left: Vec<String> = session.list_tables().into_iter().map(|t| t.name).collect();
    assert!(!left.contains(&"v".to_string()));
    assert!(!left.contains(&"blobs".to_string()));
}

#[test]
fn test_close_sets_state() {
    let mut session = session();
    assert_eq!(session.state(), &ConnectionState::Connected);
    session.close().unwrap();
    assert_eq!(session.state(), &ConnectionState::Closed);
}
