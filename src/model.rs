//! Normalized catalog entities.
//!
//! Every driver maps its own catalog onto these types, so callers can render
//! a MySQL table and an Oracle table with the same code.

use serde::Serialize;
use std::fmt;

/// Normalized type family of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TypeCategory {
    Integer,
    Decimal,
    Float,
    Bit,
    Boolean,
    Text,
    Binary,
    Date,
    Time,
    DateTime,
    Json,
    Enum,
    Set,
    Spatial,
    Uuid,
    Other,
}

impl TypeCategory {
    /// Numeric families, including bit fields.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            TypeCategory::Integer | TypeCategory::Decimal | TypeCategory::Float | TypeCategory::Bit
        )
    }

    /// Families that can hold arbitrary (including non-ASCII) text.
    pub fn is_textual(self) -> bool {
        matches!(
            self,
            TypeCategory::Text | TypeCategory::Enum | TypeCategory::Set | TypeCategory::Json
        )
    }

    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            TypeCategory::Date | TypeCategory::Time | TypeCategory::DateTime
        )
    }
}

/// Column privileges reported by the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Privileges {
    pub select: bool,
    pub insert: bool,
    pub update: bool,
    pub references: bool,
}

impl Privileges {
    pub fn all() -> Self {
        Self {
            select: true,
            insert: true,
            update: true,
            references: true,
        }
    }

    /// Parse a MySQL-style comma list such as `select,insert,update,references`.
    pub fn from_list(list: &str) -> Self {
        let mut privileges = Self::default();
        for item in list.split(',') {
            match item.trim().to_ascii_lowercase().as_str() {
                "select" => privileges.select = true,
                "insert" => privileges.insert = true,
                "update" => privileges.update = true,
                "references" => privileges.references = true,
                _ => {}
            }
        }
        privileges
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    /// Full type as the backend reports it, e.g. `int(10) unsigned`.
    pub raw_type: String,
    /// Base type without length or modifiers, lowercase.
    pub base_type: String,
    pub category: TypeCategory,
    /// Parenthesized length/precision, e.g. `10,2` or `'a','b'` for enums.
    pub length: Option<String>,
    pub unsigned: bool,
    pub zerofill: bool,
    pub nullable: bool,
    pub default: Option<String>,
    pub auto_increment: bool,
    pub collation: Option<String>,
    pub privileges: Privileges,
    pub comment: Option<String>,
    pub generated: bool,
    pub primary: bool,
}

impl Column {
    /// Build a column from a raw type string, classifying it.
    pub fn new(name: impl Into<String>, raw_type: impl Into<String>) -> Self {
        let raw_type = raw_type.into();
        let spec = crate::catalog::types::parse_type(&raw_type);
        Self {
            name: name.into(),
            category: crate::catalog::types::categorize(&spec.base),
            base_type: spec.base,
            length: spec.length,
            unsigned: spec.unsigned,
            zerofill: spec.zerofill,
            raw_type,
            nullable: true,
            default: None,
            auto_increment: false,
            collation: None,
            privileges: Privileges::all(),
            comment: None,
            generated: false,
            primary: false,
        }
    }

    /// Whether the collation compares bytes rather than characters.
    pub fn has_binary_collation(&self) -> bool {
        self.collation
            .as_deref()
            .map(|c| c == "binary" || c.ends_with("_bin"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndexKind {
    Primary,
    Unique,
    Index,
    Fulltext,
    Spatial,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexKind::Primary => "PRIMARY",
            IndexKind::Unique => "UNIQUE",
            IndexKind::Index => "INDEX",
            IndexKind::Fulltext => "FULLTEXT",
            IndexKind::Spatial => "SPATIAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexColumn {
    pub name: String,
    /// Indexed prefix length (MySQL `col(10)`).
    pub prefix: Option<u32>,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Index {
    pub name: String,
    pub kind: IndexKind,
    pub columns: Vec<IndexColumn>,
}

impl Index {
    pub fn new(name: impl Into<String>, kind: IndexKind) -> Self {
        Self {
            name: name.into(),
            kind,
            columns: Vec::new(),
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FkAction {
    Restrict,
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
}

impl FkAction {
    /// Parse an action keyword, tolerating `_` separators (`SET_NULL`).
    pub fn parse(s: &str) -> Option<Self> {
        let norm = s.trim().replace('_', " ").to_ascii_uppercase();
        match norm.split_whitespace().collect::<Vec<_>>().join(" ").as_str() {
            "RESTRICT" => Some(FkAction::Restrict),
            "NO ACTION" => Some(FkAction::NoAction),
            "CASCADE" => Some(FkAction::Cascade),
            "SET NULL" => Some(FkAction::SetNull),
            "SET DEFAULT" => Some(FkAction::SetDefault),
            _ => None,
        }
    }
}

impl fmt::Display for FkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FkAction::Restrict => "RESTRICT",
            FkAction::NoAction => "NO ACTION",
            FkAction::Cascade => "CASCADE",
            FkAction::SetNull => "SET NULL",
            FkAction::SetDefault => "SET DEFAULT",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub name: String,
    pub source: Vec<String>,
    /// Target database (MySQL) or catalog.
    pub target_database: Option<String>,
    /// Target schema (PostgreSQL, MS SQL, Oracle).
    pub target_schema: Option<String>,
    pub target_table: String,
    pub target: Vec<String>,
    pub on_delete: FkAction,
    pub on_update: FkAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TableKind {
    Table,
    View,
    MaterializedView,
    Foreign,
    System,
}

impl TableKind {
    pub fn is_view(self) -> bool {
        matches!(self, TableKind::View | TableKind::MaterializedView)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    pub kind: TableKind,
    pub engine: Option<String>,
    pub comment: Option<String>,
    /// Approximate; exact only where the backend keeps exact counts.
    pub rows: Option<u64>,
    pub data_length: Option<u64>,
    pub index_length: Option<u64>,
    pub collation: Option<String>,
}

impl Table {
    pub fn new(name: impl Into<String>, kind: TableKind) -> Self {
        Self {
            name: name.into(),
            kind,
            engine: None,
            comment: None,
            rows: None,
            data_length: None,
            index_length: None,
            collation: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParamDirection {
    In,
    Out,
    InOut,
}

impl ParamDirection {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().replace(['/', ' '], "").as_str() {
            "OUT" => ParamDirection::Out,
            "INOUT" => ParamDirection::InOut,
            _ => ParamDirection::In,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutineParam {
    pub name: String,
    pub direction: ParamDirection,
    pub data_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoutineKind {
    Procedure,
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Routine {
    pub name: String,
    pub kind: RoutineKind,
    pub params: Vec<RoutineParam>,
    pub returns: Option<String>,
    pub body: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TriggerTiming {
    Before,
    After,
    InsteadOf,
}

impl TriggerTiming {
    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.trim().to_ascii_uppercase();
        if upper.starts_with("BEFORE") {
            Some(TriggerTiming::Before)
        } else if upper.starts_with("AFTER") {
            Some(TriggerTiming::After)
        } else if upper.starts_with("INSTEAD") {
            Some(TriggerTiming::InsteadOf)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
}

impl TriggerEvent {
    /// Parse one or more events (`INSERT OR UPDATE`, `INSERT, DELETE`).
    pub fn parse_list(s: &str) -> Vec<Self> {
        let upper = s.to_ascii_uppercase();
        let mut events = Vec::new();
        for word in upper.split(|c: char| !c.is_ascii_alphabetic()) {
            let event = match word {
                "INSERT" => TriggerEvent::Insert,
                "UPDATE" => TriggerEvent::Update,
                "DELETE" => TriggerEvent::Delete,
                _ => continue,
            };
            if !events.contains(&event) {
                events.push(event);
            }
        }
        events
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trigger {
    pub name: String,
    pub timing: TriggerTiming,
    pub events: Vec<TriggerEvent>,
    pub statement: Option<String>,
}

/// Columns that address exactly one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowIdentity {
    pub columns: Vec<String>,
    /// True when the identity is a backend pseudo-column (`rowid`, `ctid`, `ROWID`).
    pub synthetic: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fk_action_parse() {
        assert_eq!(FkAction::parse("set null"), Some(FkAction::SetNull));
        assert_eq!(FkAction::parse("NO_ACTION"), Some(FkAction::NoAction));
        assert_eq!(FkAction::parse("NO  ACTION"), Some(FkAction::NoAction));
        assert_eq!(FkAction::parse("explode"), None);
    }

    #[test]
    fn test_trigger_events() {
        assert_eq!(
            TriggerEvent::parse_list("INSERT OR UPDATE OR INSERT"),
            vec![TriggerEvent::Insert, TriggerEvent::Update]
        );
    }

    #[test]
    fn test_column_classification() {
        let col = Column::new("price", "decimal(10,2) unsigned");
        assert_eq!(col.base_type, "decimal");
        assert_eq!(col.length.as_deref(), Some("10,2"));
        assert!(col.unsigned);
        assert_eq!(col.category, TypeCategory::Decimal);
    }
}
