use super::*;
use pretty_assertions::assert_eq;
use std::time::Duration;

#[test]
fn test_identifier_quoting_per_dialect() {
    assert_eq!(MySqlDialect.quote_identifier("we`ird"), "`we``ird`");
    assert_eq!(PostgresDialect.quote_identifier("say \"hi\""), "\"say \"\"hi\"\"\"");
    assert_eq!(SqliteDialect.quote_identifier("t"), "\"t\"");
    assert_eq!(OracleDialect.quote_identifier("a\"b"), "\"a\"\"b\"");
    assert_eq!(MsSqlDialect.quote_identifier("a]b[c"), "[a]]b[c]");
}

#[test]
fn test_unquote_inverts_quote() {
    let names = ["plain", "we`ird", "a\"b", "a]]b", "[x]", "", "`", "\"\""];
    for backend in [
        Backend::MySql,
        Backend::Postgres,
        Backend::Sqlite,
        Backend::MsSql,
        Backend::Oracle,
    ] {
        let dialect = backend.dialect();
        for name in names {
            let quoted = dialect.quote_identifier(name);
            assert_eq!(dialect.unquote_identifier(&quoted), name, "{} {}", backend, quoted);
        }
    }
}

#[test]
fn test_literals() {
    assert_eq!(MySqlDialect.quote_literal("it's \\n", true), "'it''s \\\\n'");
    assert_eq!(MySqlDialect.quote_literal("it's \\n", false), "'it''s \\n'");
    assert_eq!(MsSqlDialect.quote_literal("žluť'", true), "N'žluť'''");
    assert_eq!(PostgresDialect.quote_literal("a\\b", false), "'a\\b'");
}

#[test]
fn test_binary_literals() {
    let bytes = [0xde, 0xad, 0x01];
    assert_eq!(MySqlDialect.quote_binary(&bytes), "X'dead01'");
    assert_eq!(SqliteDialect.quote_binary(&bytes), "X'dead01'");
    assert_eq!(PostgresDialect.quote_binary(&bytes), "'\\xdead01'::bytea");
    assert_eq!(MsSqlDialect.quote_binary(&bytes), "0xdead01");
    assert_eq!(OracleDialect.quote_binary(&bytes), "HEXTORAW('dead01')");
}

#[test]
fn test_version_parse() {
    assert_eq!(Version::parse("10.5.8-MariaDB-log"), Version::new(10, 5, 8));
    assert_eq!(
        Version::parse("PostgreSQL 15.2 on x86_64-pc-linux-gnu"),
        Version::new(15, 2, 0)
    );
    assert_eq!(Version::parse("8.0.32"), Version::new(8, 0, 32));
    assert_eq!(Version::parse("unknown"), Version::default());

    let info = ServerInfo::from_banner("10.11.2-MariaDB");
    assert!(info.mariadb);
    assert!(info.version.at_least(10, 1, 2));
}

#[test]
fn test_mysql_timeout_forms() {
    let mysql = ServerInfo::from_banner("8.0.32");
    assert_eq!(
        MySqlDialect
            .timeout_form(&mysql, "select * from t", Duration::from_secs(2))
            .as_deref(),
        Some("select /*+ MAX_EXECUTION_TIME(2000) */ * from t")
    );
    assert_eq!(
        MySqlDialect.timeout_form(&mysql, "UPDATE t SET a = 1", Duration::from_secs(2)),
        None
    );

    let old = ServerInfo::from_banner("5.6.40");
    assert_eq!(
        MySqlDialect.timeout_form(&old, "SELECT 1", Duration::from_secs(2)),
        None
    );

    let maria = ServerInfo::from_banner("10.4.1-MariaDB");
    assert_eq!(
        MySqlDialect
            .timeout_form(&maria, "UPDATE t SET a = 1", Duration::from_millis(1500))
            .as_deref(),
        Some("SET STATEMENT max_statement_time=1.5 FOR UPDATE t SET a = 1")
    );
}

#[test]
fn test_kill_statements() {
    assert_eq!(MySqlDialect.kill_sql("42").as_deref(), Some("KILL QUERY 42"));
    assert_eq!(
        PostgresDialect.kill_sql("1234").as_deref(),
        Some("SELECT pg_cancel_backend(1234)")
    );
    assert_eq!(MsSqlDialect.kill_sql("57").as_deref(), Some("KILL 57"));
    assert_eq!(
        OracleDialect.kill_sql("12,345").as_deref(),
        Some("ALTER SYSTEM KILL SESSION '12,345' IMMEDIATE")
    );
    assert_eq!(MySqlDialect.kill_sql("1; DROP TABLE x"), None);
    assert_eq!(SqliteDialect.kill_sql("1"), None);
}

#[test]
fn test_sqlite_rejects_attach() {
    assert!(SqliteDialect.rejects_in_script("  attach database 'x' as y").is_some());
    assert!(SqliteDialect.rejects_in_script("/* c */ ATTACH 'x' AS y").is_some());
    assert!(SqliteDialect.rejects_in_script("SELECT 'ATTACH'").is_none());
    assert!(MySqlDialect.rejects_in_script("ATTACH").is_none());
}

#[test]
fn test_operator_sets() {
    assert!(PostgresDialect.operators().contains(&Operator::ILike));
    assert!(!MySqlDialect.operators().contains(&Operator::ILike));
    assert!(MySqlDialect.operators().contains(&Operator::FindInSet));
    assert_eq!(Operator::parse("like  %%"), Some(Operator::LikeContains));
    assert_eq!(Operator::parse("<>"), Some(Operator::Ne));
    assert_eq!(Operator::parse("between"), None);
}

#[test]
fn test_backend_from_scheme() {
    assert_eq!(Backend::from_scheme("postgresql"), Some(Backend::Postgres));
    assert_eq!(Backend::from_scheme("MariaDB"), Some(Backend::MySql));
    assert_eq!(Backend::from_scheme("ftp"), None);
}
