use dbdeck::dialect::Backend;
use dbdeck::script::{Splitter, Statement};
use pretty_assertions::assert_eq;

fn split(backend: Backend, text: &str) -> Vec<Statement<'_>> {
    Splitter::new(text, backend.dialect().scan_rules(backend == Backend::MySql)).collect()
}

#[test]
fn test_comment_with_terminator() {
    for backend in [Backend::MySql, Backend::Postgres, Backend::Sqlite, Backend::MsSql, Backend::Oracle] {
        let statements = split(backend, "SELECT 1; -- comment with ; inside\nSELECT 2;");
        let sql: Vec<&str> = statements.iter().map(|s| s.sql).collect();
        assert_eq!(sql, vec!["SELECT 1", "SELECT 2"], "{}", backend);
    }
}

#[test]
fn test_delimiter_switch() {
    let statements = split(Backend::MySql, "DELIMITER $$\nSELECT 1$$\nDELIMITER ;\nSELECT 2;");
    assert_eq!(statements.len(), 2);
    assert_eq!((statements[0].sql, statements[0].terminator.as_str()), ("SELECT 1", "$$"));
    assert_eq!((statements[1].sql, statements[1].terminator.as_str()), ("SELECT 2", ";"));
}

#[test]
fn test_procedure_body_with_delimiter() {
    let script = "DELIMITER //
CREATE PROCEDURE p()
BEGIN
  SELECT 'a;b';
  SELECT 2;
END//
DELIMITER ;
CALL p();";
    let sql: Vec<&str> = split(Backend::MySql, script).iter().map(|s| s.sql).collect();
    assert_eq!(sql.len(), 2);
    assert!(sql[0].starts_with("CREATE PROCEDURE p()"));
    assert!(sql[0].ends_with("END"));
    assert_eq!(sql[1], "CALL p()");
}

#[test]
fn test_hash_comment_is_mysql_only() {
    let mysql: Vec<&str> = split(Backend::MySql, "SELECT 1 # a;b\n;").iter().map(|s| s.sql).collect();
    assert_eq!(mysql, vec!["SELECT 1 # a;b"]);
    let postgres: Vec<&str> = split(Backend::Postgres, "SELECT 1 # 2;").iter().map(|s| s.sql).collect();
    assert_eq!(postgres, vec!["SELECT 1 # 2"]);
}

#[test]
fn test_only_comments_yield_nothing() {
    assert!(split(Backend::Postgres, "-- nothing here\n/* still; nothing */\n").is_empty());
}
