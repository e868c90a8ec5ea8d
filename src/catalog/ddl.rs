//! Constraint extraction from stored DDL text.
//!
//! Used where the catalog has no structured view: SQLite, MySQL servers
//! without `REFERENTIAL_CONSTRAINTS`, and PostgreSQL `pg_get_constraintdef`
//! output. Identifiers may be quoted with backticks, double quotes or
//! brackets, with the closing quote doubled inside.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{FkAction, ForeignKey, Trigger, TriggerEvent, TriggerTiming};

const IDENT: &str = r#"(?:`(?:[^`]|``)+`|"(?:[^"]|"")+"|\[(?:[^\]]|\]\])+\]|[\w$]+)"#;

static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(IDENT).expect("identifier pattern"));

static FOREIGN_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    let list = format!(r"{id}(?:\s*,\s*{id})*", id = IDENT);
    let pattern = format!(
        r"(?i)(?:CONSTRAINT\s+(?P<name>{id})\s+)?FOREIGN\s+KEY\s*(?:{id}\s*)?\((?P<source>{list})\)\s*REFERENCES\s+(?P<target>{id}(?:\s*\.\s*{id})?)\s*\((?P<target_columns>{list})\)(?P<actions>(?:\s+(?:ON\s+(?:DELETE|UPDATE)\s+(?:RESTRICT|CASCADE|SET\s+NULL|SET\s+DEFAULT|NO\s+ACTION)|MATCH\s+\w+|NOT\s+DEFERRABLE|DEFERRABLE|INITIALLY\s+\w+))*)",
        id = IDENT,
        list = list,
    );
    Regex::new(&pattern).expect("foreign key pattern")
});

static ACTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)ON\s+(DELETE|UPDATE)\s+(RESTRICT|CASCADE|SET\s+NULL|SET\s+DEFAULT|NO\s+ACTION)")
        .expect("action pattern")
});

static TRIGGER_RE: Lazy<Regex> = Lazy::new(|| {
    let list = format!(r"{id}(?:\s*,\s*{id})*", id = IDENT);
    let pattern = format!(
        r"(?is)^\s*CREATE\s+(?:TEMP(?:ORARY)?\s+)?TRIGGER\s+(?:IF\s+NOT\s+EXISTS\s+)?(?P<name>{id}(?:\s*\.\s*{id})?)\s+(?:(?P<timing>BEFORE|AFTER|INSTEAD\s+OF)\s+)?(?P<event>DELETE|INSERT|UPDATE(?:\s+OF\s+{list})?)\s+ON\s+(?P<table>{id})\s*(?P<statement>.*?)\s*;?\s*$",
        id = IDENT,
        list = list,
    );
    Regex::new(&pattern).expect("trigger pattern")
});

/// Strip one level of identifier quoting.
pub fn unquote(ident: &str) -> String {
    let ident = ident.trim();
    let mut chars = ident.chars();
    let (open, close) = match chars.next() {
        Some('`') => ('`', '`'),
        Some('"') => ('"', '"'),
        Some('[') => ('[', ']'),
        _ => return ident.to_string(),
    };
    match ident
        .strip_prefix(open)
        .and_then(|rest| rest.strip_suffix(close))
    {
        Some(inner) => inner.replace(&format!("{}{}", close, close), &close.to_string()),
        None => ident.to_string(),
    }
}

/// Split a quoted identifier list (`a, "b c", [d]`) into names.
pub fn identifiers(list: &str) -> Vec<String> {
    IDENT_RE.find_iter(list).map(|m| unquote(m.as_str())).collect()
}

/// Extract every foreign key in `ddl`. Unspecified actions get `default_action`.
pub fn foreign_keys(ddl: &str, default_action: FkAction) -> Vec<ForeignKey> {
    let mut keys = Vec::new();
    for caps in FOREIGN_KEY_RE.captures_iter(ddl) {
        let source = identifiers(&caps["source"]);
        let target = identifiers(&caps["target_columns"]);
        if source.is_empty() || source.len() != target.len() {
            continue;
        }

        let mut path = identifiers(&caps["target"]);
        let Some(target_table) = path.pop() else {
            continue;
        };
        let qualifier = path.pop();

        let mut on_delete = default_action;
        let mut on_update = default_action;
        for action in ACTION_RE.captures_iter(&caps["actions"]) {
            let Some(parsed) = FkAction::parse(&action[2]) else {
                continue;
            };
            if action[1].eq_ignore_ascii_case("DELETE") {
                on_delete = parsed;
            } else {
                on_update = parsed;
            }
        }

        keys.push(ForeignKey {
            name: caps.name("name").map(|m| unquote(m.as_str())).unwrap_or_default(),
            source,
            target_database: None,
            target_schema: qualifier,
            target_table,
            target,
            on_delete,
            on_update,
        });
    }
    keys
}

/// Parse a `CREATE TRIGGER` statement. Timing defaults to BEFORE.
pub fn trigger(ddl: &str) -> Option<Trigger> {
    let caps = TRIGGER_RE.captures(ddl)?;
    let name = identifiers(&caps["name"]).pop()?;
    let timing = caps
        .name("timing")
        .and_then(|m| TriggerTiming::parse(m.as_str()))
        .unwrap_or(TriggerTiming::Before);
    let event = &caps["event"];
    let events = TriggerEvent::parse_list(event.split_whitespace().next().unwrap_or(event));
    let statement = caps["statement"].trim();
    Some(Trigger {
        name,
        timing,
        events,
        statement: (!statement.is_empty()).then(|| statement.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("`a``b`"), "a`b");
        assert_eq!(unquote("\"a\"\"b\""), "a\"b");
        assert_eq!(unquote("[a]]b]"), "a]b");
        assert_eq!(unquote("plain"), "plain");
    }

    #[test]
    fn test_mysql_create_table() {
        let ddl = "CREATE TABLE `orders` (\n  `id` int NOT NULL,\n  `user_id` int,\n  \
                   CONSTRAINT `orders_ibfk_1` FOREIGN KEY (`user_id`) REFERENCES `users` (`id`) ON DELETE CASCADE\n\
                   ) ENGINE=InnoDB";
        let keys = foreign_keys(ddl, FkAction::Restrict);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].name, "orders_ibfk_1");
        assert_eq!(keys[0].source, vec!["user_id"]);
        assert_eq!(keys[0].target_table, "users");
        assert_eq!(keys[0].target, vec!["id"]);
        assert_eq!(keys[0].on_delete, FkAction::Cascade);
        assert_eq!(keys[0].on_update, FkAction::Restrict);
    }

    #[test]
    fn test_postgres_constraint_definition() {
        let def = "FOREIGN KEY (tenant, \"owner id\") REFERENCES audit.owners(tenant, id) \
                   ON UPDATE SET NULL ON DELETE NO ACTION DEFERRABLE";
        let keys = foreign_keys(def, FkAction::NoAction);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].name, "");
        assert_eq!(keys[0].source, vec!["tenant", "owner id"]);
        assert_eq!(keys[0].target_schema.as_deref(), Some("audit"));
        assert_eq!(keys[0].target_table, "owners");
        assert_eq!(keys[0].on_update, FkAction::SetNull);
        assert_eq!(keys[0].on_delete, FkAction::NoAction);
    }

    #[test]
    fn test_mismatched_column_counts_dropped() {
        let ddl = "FOREIGN KEY (a, b) REFERENCES t (x)";
        assert!(foreign_keys(ddl, FkAction::NoAction).is_empty());
    }

    #[test]
    fn test_sqlite_trigger() {
        let ddl = "CREATE TRIGGER \"log \"\"ins\"\"\" AFTER INSERT ON [items]\n\
                   FOR EACH ROW BEGIN INSERT INTO log VALUES (new.id); END";
        let parsed = trigger(ddl).unwrap();
        assert_eq!(parsed.name, "log \"ins\"");
        assert_eq!(parsed.timing, TriggerTiming::After);
        assert_eq!(parsed.events, vec![TriggerEvent::Insert]);
        assert_eq!(
            parsed.statement.as_deref(),
            Some("FOR EACH ROW BEGIN INSERT INTO log VALUES (new.id); END")
        );
    }

    #[test]
    fn test_trigger_default_timing() {
        let parsed = trigger("CREATE TRIGGER t1 UPDATE OF a, b ON x BEGIN SELECT 1; END;").unwrap();
        assert_eq!(parsed.timing, TriggerTiming::Before);
        assert_eq!(parsed.events, vec![TriggerEvent::Update]);
    }
}
