use dbdeck::catalog::ddl;
use dbdeck::model::FkAction;
use pretty_assertions::assert_eq;

#[test]
fn test_doubled_quote_in_constraint_name() {
    let text = r#"CREATE TABLE "orders" (
        "id" INTEGER PRIMARY KEY,
        "user id" INTEGER,
        CONSTRAINT "fk ""user""" FOREIGN KEY ("user id") REFERENCES "users" ("id") ON DELETE CASCADE
    )"#;

    let keys = ddl::foreign_keys(text, FkAction::NoAction);
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].name, r#"fk "user""#);
    assert_eq!(keys[0].source, vec!["user id".to_string()]);
    assert_eq!(keys[0].target_table, "users");
    assert_eq!(keys[0].on_delete, FkAction::Cascade);
    assert_eq!(keys[0].on_update, FkAction::NoAction);
}

#[test]
fn test_backtick_and_bracket_names() {
    let mysql = "CONSTRAINT `a``b` FOREIGN KEY (`x`) REFERENCES `shop`.`t` (`id`)";
    let keys = ddl::foreign_keys(mysql, FkAction::Restrict);
    assert_eq!(keys[0].name, "a`b");
    assert_eq!(keys[0].target_schema.as_deref(), Some("shop"));
    assert_eq!(keys[0].on_delete, FkAction::Restrict);

    let bracketed = "CONSTRAINT [x]]y] FOREIGN KEY ([c]) REFERENCES [p] ([id])";
    assert_eq!(ddl::foreign_keys(bracketed, FkAction::NoAction)[0].name, "x]y");
}

#[test]
fn test_several_unnamed_keys() {
    let text = "CREATE TABLE t (a INT REFERENCES x(id), b INT, c INT,
        FOREIGN KEY (b) REFERENCES y (id),
        FOREIGN KEY (c) REFERENCES z (id) ON UPDATE SET NULL)";
    let keys = ddl::foreign_keys(text, FkAction::NoAction);
    let targets: Vec<&str> = keys.iter().map(|k| k.target_table.as_str()).collect();
    assert_eq!(targets, vec!["y", "z"]);
    assert_eq!(keys[1].on_update, FkAction::SetNull);
}
