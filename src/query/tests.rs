use super::*;
use crate::codec::Codec;
use crate::dialect::{Backend, Operator, ServerInfo};
use crate::error::Error;
use crate::model::Column;
use crate::value::Value;
use pretty_assertions::assert_eq;

fn fields() -> Vec<Column> {
    vec![
        Column::new("id", "int"),
        Column::new("name", "varchar(50)"),
        Column::new("born", "date"),
    ]
}

fn sql(backend: Backend, query: &SelectQuery) -> BuiltSelect {
    build_select(&Codec::new(backend), &fields(), query).unwrap()
}

fn row(id: i64, name: &str) -> Vec<Assignment> {
    vec![("id".to_string(), Value::Int(id)), ("name".to_string(), Value::from(name))]
}

// ============= SELECT =============

#[test]
fn test_no_predicates_no_where() {
    let built = sql(Backend::MySql, &SelectQuery::new("t"));
    assert_eq!(built.sql, "SELECT * FROM `t`");
    assert!(!built.sql.contains("WHERE"));
}

#[test]
fn test_zero_limit_is_unlimited() {
    for backend in [Backend::MySql, Backend::MsSql, Backend::Oracle] {
        let built = sql(backend, &SelectQuery::new("t").limit(0).page(3));
        assert!(!built.sql.contains("LIMIT"), "{}", built.sql);
        assert!(!built.sql.contains("TOP"), "{}", built.sql);
        assert!(!built.sql.contains("rownum"), "{}", built.sql);
        assert_eq!(built.skip, 0);
    }
}

#[test]
fn test_limit_offset() {
    let built = sql(Backend::Postgres, &SelectQuery::new("t").limit(10).page(2));
    assert_eq!(built.sql, "SELECT * FROM \"t\" LIMIT 10 OFFSET 20");
    let first = sql(Backend::Sqlite, &SelectQuery::new("t").limit(10));
    assert_eq!(first.sql, "SELECT * FROM \"t\" LIMIT 10");
}

#[test]
fn test_mssql_top_with_skip() {
    let built = sql(Backend::MsSql, &SelectQuery::new("t").limit(10).page(2));
    assert_eq!(built.sql, "SELECT TOP (30) * FROM [t]");
    assert_eq!(built.skip, 20);
}

#[test]
fn test_oracle_rownum_window() {
    let first = sql(Backend::Oracle, &SelectQuery::new("t").limit(10));
    assert_eq!(first.sql, "SELECT * FROM (SELECT * FROM \"t\") WHERE rownum <= 10");
    let second = sql(Backend::Oracle, &SelectQuery::new("t").limit(10).page(1));
    assert_eq!(
        second.sql,
        "SELECT * FROM (SELECT t.*, rownum AS rnum FROM (SELECT * FROM \"t\") t WHERE rownum <= 20) WHERE rnum > 10"
    );
}

#[test]
fn test_aggregate_projection_groups() {
    let query = SelectQuery::new("t")
        .columns(["a"])
        .select(SelectItem::aggregate("count", None))
        .group_by("b")
        .group_by("a")
        .order_by("a", true);
    let built = sql(Backend::MySql, &query);
    assert_eq!(
        built.sql,
        "SELECT `a`, COUNT(*) FROM `t` GROUP BY `a`, `b` ORDER BY `a` DESC"
    );

    let distinct = SelectQuery::new("t").select(SelectItem::aggregate("count distinct", Some("a")));
    assert_eq!(sql(Backend::MySql, &distinct).sql, "SELECT COUNT(DISTINCT `a`) FROM `t`");
}

#[test]
fn test_unknown_aggregate_rejected() {
    let query = SelectQuery::new("t").select(SelectItem::aggregate("drop", Some("a")));
    assert!(matches!(
        build_select(&Codec::new(Backend::MySql), &[], &query),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn test_convert_on_read_expands_star() {
    let fields = vec![Column::new("id", "int"), Column::new("location", "point")];
    let built = build_select(&Codec::new(Backend::MySql), &fields, &SelectQuery::new("t")).unwrap();
    assert_eq!(built.sql, "SELECT `id`, ST_AsText(`location`) AS `location` FROM `t`");
}

// ============= SEARCH =============

#[test]
fn test_any_column_text_term() {
    let query = SelectQuery::new("t").filter(Predicate::any(Operator::Eq, "abc"));
    assert_eq!(
        sql(Backend::Postgres, &query).sql,
        "SELECT * FROM \"t\" WHERE \"name\" = 'abc'"
    );
}

#[test]
fn test_any_column_numeric_term() {
    let query = SelectQuery::new("t").filter(Predicate::any(Operator::Eq, "42"));
    assert_eq!(
        sql(Backend::Postgres, &query).sql,
        "SELECT * FROM \"t\" WHERE \"id\" = '42'"
    );
}

#[test]
fn test_any_column_date_term() {
    let query = SelectQuery::new("t").filter(Predicate::any(Operator::Eq, "2024-01-02"));
    assert_eq!(
        sql(Backend::Postgres, &query).sql,
        "SELECT * FROM \"t\" WHERE \"born\" = '2024-01-02'"
    );
}

#[test]
fn test_any_column_without_candidates() {
    let numbers = vec![Column::new("id", "int")];
    let codec = Codec::new(Backend::MySql);
    for op in [Operator::Eq, Operator::NotLike, Operator::NotIn] {
        let query = SelectQuery::new("t").filter(Predicate::any(op, "žluť"));
        let built = build_select(&codec, &numbers, &query).unwrap();
        assert_eq!(built.sql, "SELECT * FROM `t` WHERE 1 = 0");
    }
}

#[test]
fn test_named_column_operators() {
    let codec = Codec::new(Backend::MySql);
    let cases = [
        (Predicate::new("name", Operator::LikeContains, "ab"), "`name` LIKE '%ab%'"),
        (Predicate::new("name", Operator::In, "1, 2,"), "`name` IN ('1', '2')"),
        (Predicate::new("name", Operator::IsNull, ""), "`name` IS NULL"),
        (Predicate::new("name", Operator::Regexp, "^a"), "`name` REGEXP '^a'"),
        (Predicate::new("name", Operator::FindInSet, "x"), "FIND_IN_SET('x', `name`)"),
        (Predicate::new("id", Operator::Sql, "BETWEEN 1 AND 2"), "`id` BETWEEN 1 AND 2"),
    ];
    for (predicate, expected) in cases {
        assert_eq!(
            where_clause(&codec, &fields(), &[predicate]).unwrap().as_deref(),
            Some(expected)
        );
    }
}

#[test]
fn test_postgres_pattern_on_number_casts() {
    let codec = Codec::new(Backend::Postgres);
    let clause = where_clause(&codec, &fields(), &[Predicate::new("id", Operator::ILikeContains, "4")]).unwrap();
    assert_eq!(clause.as_deref(), Some("\"id\"::text ILIKE '%4%'"));
}

#[test]
fn test_unsupported_operator() {
    let codec = Codec::new(Backend::MySql);
    let result = where_clause(&codec, &fields(), &[Predicate::new("name", Operator::ILike, "a")]);
    assert!(matches!(result, Err(Error::Unsupported { .. })));
}

#[test]
fn test_empty_in_list() {
    let codec = Codec::new(Backend::Postgres);
    let result = where_clause(&codec, &fields(), &[Predicate::new("name", Operator::In, " , ")]);
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[test]
fn test_count_grouped() {
    let codec = Codec::new(Backend::Postgres);
    let plain = build_count(&codec, &fields(), &SelectQuery::new("t").filter(Predicate::eq("id", "1"))).unwrap();
    assert_eq!(plain, "SELECT COUNT(*) FROM \"t\" WHERE \"id\" = '1'");
    let grouped = build_count(&codec, &fields(), &SelectQuery::new("t").group_by("name")).unwrap();
    assert_eq!(grouped, "SELECT COUNT(*) FROM (SELECT 1 AS one FROM \"t\" GROUP BY \"name\") x");
}

// ============= MUTATIONS =============

#[test]
fn test_update_limit_mysql() {
    let sql = build_update(
        &Codec::new(Backend::MySql),
        &fields(),
        "t",
        &[("name".to_string(), Value::from("x"))],
        &[Predicate::eq("id", "1")],
        true,
    )
    .unwrap();
    assert_eq!(sql, "UPDATE `t` SET `name` = 'x' WHERE `id` = '1' LIMIT 1");
}

#[test]
fn test_update_row_identity_rewrite() {
    let sql = build_update(
        &Codec::new(Backend::Postgres),
        &fields(),
        "t",
        &[("name".to_string(), Value::from("x"))],
        &[Predicate::eq("id", "1")],
        true,
    )
    .unwrap();
    assert_eq!(
        sql,
        "UPDATE \"t\" SET \"name\" = 'x' WHERE (\"id\" = '1') AND ctid IN (SELECT ctid FROM \"t\" WHERE \"id\" = '1' LIMIT 1)"
    );
}

#[test]
fn test_oracle_row_identity_rewrite() {
    let sql = build_delete(&Codec::new(Backend::Oracle), &fields(), "t", &[Predicate::eq("id", "1")], true).unwrap();
    assert_eq!(
        sql,
        "DELETE FROM \"t\" WHERE (\"id\" = '1') AND ROWID IN (SELECT ROWID FROM \"t\" WHERE \"id\" = '1' AND ROWNUM = 1)"
    );
}

#[test]
fn test_delete_without_predicates() {
    let sqlite = build_delete(&Codec::new(Backend::Sqlite), &fields(), "t", &[], true).unwrap();
    assert_eq!(sqlite, "DELETE FROM \"t\" WHERE rowid IN (SELECT rowid FROM \"t\" LIMIT 1)");
    let all = build_delete(&Codec::new(Backend::Sqlite), &fields(), "t", &[], false).unwrap();
    assert_eq!(all, "DELETE FROM \"t\"");
}

#[test]
fn test_mssql_top_mutations() {
    let codec = Codec::new(Backend::MsSql);
    let delete = build_delete(&codec, &fields(), "t", &[Predicate::eq("id", "1")], true).unwrap();
    assert_eq!(delete, "DELETE TOP (1) FROM [t] WHERE [id] = N'1'");
    let update = build_update(&codec, &fields(), "t", &[("name".to_string(), Value::from("x"))], &[], true).unwrap();
    assert_eq!(update, "UPDATE TOP (1) [t] SET [name] = N'x'");
}

#[test]
fn test_insert_defaults() {
    assert_eq!(
        build_insert(&Codec::new(Backend::MySql), &[], "t", &[]).unwrap(),
        "INSERT INTO `t` () VALUES ()"
    );
    assert_eq!(
        build_insert(&Codec::new(Backend::Postgres), &[], "t", &[]).unwrap(),
        "INSERT INTO \"t\" DEFAULT VALUES"
    );
    assert!(matches!(
        build_insert(&Codec::new(Backend::Oracle), &[], "t", &[]),
        Err(Error::Unsupported { .. })
    ));
}

#[test]
fn test_update_needs_assignments() {
    let result = build_update(&Codec::new(Backend::MySql), &[], "t", &[], &[], false);
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[test]
fn test_upsert_per_backend() {
    let rows = vec![row(1, "a"), row(2, "b")];
    let key = vec!["id".to_string()];

    assert_eq!(
        build_upsert(&Codec::new(Backend::MySql), &fields(), "t", &rows, &key).unwrap(),
        UpsertPlan::Single(
            "INSERT INTO `t` (`id`, `name`) VALUES (1, 'a'), (2, 'b') \
             ON DUPLICATE KEY UPDATE `id` = VALUES(`id`), `name` = VALUES(`name`)"
                .to_string()
        )
    );

    let modern = Codec::new(Backend::Postgres).with_server(ServerInfo::from_banner("15.2"));
    assert_eq!(
        build_upsert(&modern, &fields(), "t", &rows[..1], &key).unwrap(),
        UpsertPlan::Single(
            "INSERT INTO \"t\" (\"id\", \"name\") VALUES (1, 'a') \
             ON CONFLICT (\"id\") DO UPDATE SET \"name\" = EXCLUDED.\"name\""
                .to_string()
        )
    );

    let legacy = Codec::new(Backend::Postgres).with_server(ServerInfo::from_banner("9.4.26"));
    assert_eq!(
        build_upsert(&legacy, &fields(), "t", &rows[..1], &key).unwrap(),
        UpsertPlan::PerRow(vec![(
            "UPDATE \"t\" SET \"name\" = 'a' WHERE \"id\" = 1".to_string(),
            "INSERT INTO \"t\" (\"id\", \"name\") VALUES (1, 'a')".to_string()
        )])
    );

    assert_eq!(
        build_upsert(&Codec::new(Backend::Sqlite), &fields(), "t", &rows[..1], &key).unwrap(),
        UpsertPlan::Single("REPLACE INTO \"t\" (\"id\", \"name\") VALUES (1, 'a')".to_string())
    );
}

#[test]
fn test_upsert_merge() {
    let rows = vec![row(1, "a")];
    let key = vec!["id".to_string()];
    assert_eq!(
        build_upsert(&Codec::new(Backend::MsSql), &fields(), "t", &rows, &key).unwrap(),
        UpsertPlan::Single(
            "MERGE INTO [t] USING (VALUES (1, N'a')) AS source ([id], [name]) ON [t].[id] = source.[id] \
             WHEN MATCHED THEN UPDATE SET [t].[name] = source.[name] \
             WHEN NOT MATCHED THEN INSERT ([id], [name]) VALUES (source.[id], source.[name]);"
                .to_string()
        )
    );
    assert_eq!(
        build_upsert(&Codec::new(Backend::Oracle), &fields(), "t", &rows, &key).unwrap(),
        UpsertPlan::Single(
            "MERGE INTO \"t\" USING (SELECT 1 AS \"id\", 'a' AS \"name\" FROM dual) source \
             ON (\"t\".\"id\" = source.\"id\") WHEN MATCHED THEN UPDATE SET \"t\".\"name\" = source.\"name\" \
             WHEN NOT MATCHED THEN INSERT (\"id\", \"name\") VALUES (source.\"id\", source.\"name\")"
                .to_string()
        )
    );
}

#[test]
fn test_upsert_rejects_ragged_rows() {
    let rows = vec![row(1, "a"), vec![("id".to_string(), Value::Int(2))]];
    let result = build_upsert(&Codec::new(Backend::MySql), &[], "t", &rows, &["id".to_string()]);
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}
