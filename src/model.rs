//! The Schema Model — a dialect-neutral, immutable aggregate describing one
//! database schema.
//!
//! Produced once by a [`crate::loader`], normalized, diffed, and discarded.
//! Every type here is a plain value type; nothing here talks to a database.

use serde::{Deserialize, Serialize};

/// One database engine kind, used both as a connection-descriptor tag and as
/// a dispatch key for the loader/generator pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Postgres,
    MariaDb,
}

impl Engine {
    pub const fn default_port(self) -> u16 {
        match self {
            Engine::Postgres => 5432,
            Engine::MariaDb => 3306,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Engine::Postgres => "postgres",
            Engine::MariaDb => "mariadb",
        }
    }
}

/// How a column's value is produced by the database rather than supplied by
/// the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    /// PostgreSQL `GENERATED { ALWAYS | BY DEFAULT } AS IDENTITY`.
    Identity,
    /// A column whose default is `nextval('some_seq')` but is not a
    /// PostgreSQL identity column.
    Sequence { owning_sequence: Option<String> },
    /// MariaDB `AUTO_INCREMENT`.
    AutoIncrement,
    None,
}

impl Default for GenerationKind {
    fn default() -> Self {
        GenerationKind::None
    }
}

/// Equality ignores `Sequence`'s `owning_sequence` — it is carried only for
/// TODO-marker text in the generator, never validated, per the generated-
/// column open question.
impl PartialEq for GenerationKind {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (GenerationKind::Identity, GenerationKind::Identity)
                | (GenerationKind::Sequence { .. }, GenerationKind::Sequence { .. })
                | (GenerationKind::AutoIncrement, GenerationKind::AutoIncrement)
                | (GenerationKind::None, GenerationKind::None)
        )
    }
}

impl Eq for GenerationKind {}

/// A table column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub length: Option<u32>,
    pub precision_scale: Option<(u32, u32)>,
    pub nullable: bool,
    pub default: Option<String>,
    pub generated: GenerationKind,
    pub collation: Option<String>,
    /// 1-based catalog ordinal position; preserved for ordered rendering,
    /// not consulted by equality.
    pub ordinal_position: i32,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            length: None,
            precision_scale: None,
            nullable: true,
            default: None,
            generated: GenerationKind::None,
            collation: None,
            ordinal_position: 0,
        }
    }
}

/// A default expression of `NULL` (any case) is equivalent to no default at
/// all.
fn is_null_ish_default(default: &Option<String>) -> bool {
    match default {
        None => true,
        Some(d) => d.trim().eq_ignore_ascii_case("null"),
    }
}

/// Exposed for the generator, which needs the same "missing ≡ SQL NULL"
/// rule to decide whether a column's default actually changed.
pub(crate) fn default_eq(a: &Option<String>, b: &Option<String>) -> bool {
    if is_null_ish_default(a) && is_null_ish_default(b) {
        return true;
    }
    a == b
}

/// Two columns with the same name are equal iff `dataType`, `length`,
/// `precisionScale`, `nullable`, `default` (missing ≡ SQL `NULL`),
/// `generated`, and `collation` all match. `ordinalPosition` is catalog
/// bookkeeping for ordered rendering and never participates in equality.
impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.data_type == other.data_type
            && self.length == other.length
            && self.precision_scale == other.precision_scale
            && self.nullable == other.nullable
            && default_eq(&self.default, &other.default)
            && self.generated == other.generated
            && self.collation == other.collation
    }
}

/// A table's primary key, if it has one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKey {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

/// An index (never the primary key's backing index — those are modeled via
/// [`PrimaryKey`] only).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
    pub using: Option<String>,
}

/// Two name lists are equal as sets of lowercased names — column order is
/// intentionally not significant (see the index-column-ordering open
/// question).
fn same_name_set(a: &[String], b: &[String]) -> bool {
    let mut a: Vec<String> = a.iter().map(|s| s.to_ascii_lowercase()).collect();
    let mut b: Vec<String> = b.iter().map(|s| s.to_ascii_lowercase()).collect();
    a.sort();
    b.sort();
    a == b
}

fn case_insensitive_opt_eq(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
        _ => false,
    }
}

/// Unique flag equal, access method equal case-insensitively (absent ≡
/// absent), column lists equal as sorted sets of lowercased names.
impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.unique == other.unique
            && case_insensitive_opt_eq(&self.using, &other.using)
            && same_name_set(&self.columns, &other.columns)
    }
}

/// A `CHECK` constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    pub name: String,
    pub expression: String,
}

/// A referential action, e.g. `CASCADE`, `SET NULL`.
pub type RefAction = String;

/// A foreign key constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_update: Option<RefAction>,
    pub on_delete: Option<RefAction>,
}

/// Local and referenced columns compared as sorted sets of lowercased
/// names, referenced table and referential actions compared
/// case-insensitively, absent action ≡ absent.
impl PartialEq for ForeignKey {
    fn eq(&self, other: &Self) -> bool {
        same_name_set(&self.columns, &other.columns)
            && self
                .referenced_table
                .eq_ignore_ascii_case(&other.referenced_table)
            && same_name_set(&self.referenced_columns, &other.referenced_columns)
            && case_insensitive_opt_eq(&self.on_update, &other.on_update)
            && case_insensitive_opt_eq(&self.on_delete, &other.on_delete)
    }
}

/// A base table and everything that hangs off it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: Option<PrimaryKey>,
    pub indexes: Vec<Index>,
    pub checks: Vec<Check>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
            indexes: Vec::new(),
            checks: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A view (or materialized view — the engine does not distinguish the two;
/// loaders fold materialized views into the same bucket per spec scope).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineKind {
    Function,
    Procedure,
}

/// A stored function or procedure. Keyed by `(kind, name)` — a function and
/// a procedure sharing a name are distinct entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routine {
    pub kind: RoutineKind,
    pub name: String,
    pub language: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerTiming {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
}

/// A trigger, keyed by `(table, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub table: String,
    pub name: String,
    pub timing: TriggerTiming,
    pub events: Vec<TriggerEvent>,
    pub body: String,
}

/// The complete, dialect-neutral description of one schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaModel {
    pub tables: Vec<Table>,
    pub views: Vec<View>,
    pub routines: Vec<Routine>,
    pub triggers: Vec<Trigger>,
}

impl SchemaModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }
}
