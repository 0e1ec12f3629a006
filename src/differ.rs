//! The Differ — compares two normalized [`SchemaModel`]s and produces a
//! [`DiffResult`].
//!
//! One generic `diff_keyed` function, built on a small `Keyed` trait, does
//! the work for every entity level — tables, columns, indexes, checks,
//! foreign keys, views, routines, triggers — rather than hand-duplicating
//! an added/removed/changed loop per entity type.

use serde::{Deserialize, Serialize};

use crate::model::{Check, Column, ForeignKey, Index, PrimaryKey, Routine, SchemaModel, Table};

/// A type with a stable identity key used to match entities across two
/// schema snapshots, independent of their position in the source `Vec`.
pub trait Keyed {
    type Key: Ord + Clone;
    fn key(&self) -> Self::Key;
}

impl Keyed for Column {
    type Key = String;
    fn key(&self) -> String {
        self.name.clone()
    }
}

impl Keyed for Index {
    type Key = String;
    fn key(&self) -> String {
        self.name.to_ascii_lowercase()
    }
}

impl Keyed for Check {
    type Key = String;
    fn key(&self) -> String {
        self.name.to_ascii_lowercase()
    }
}

impl Keyed for ForeignKey {
    type Key = String;
    fn key(&self) -> String {
        self.name.to_ascii_lowercase()
    }
}

impl Keyed for Table {
    type Key = String;
    fn key(&self) -> String {
        self.name.to_ascii_lowercase()
    }
}

impl Keyed for crate::model::View {
    type Key = String;
    fn key(&self) -> String {
        self.name.to_ascii_lowercase()
    }
}

impl Keyed for Routine {
    type Key = (String, crate::model::RoutineKind);
    fn key(&self) -> Self::Key {
        (self.name.to_ascii_lowercase(), self.kind)
    }
}

impl Keyed for crate::model::Trigger {
    type Key = (String, String);
    fn key(&self) -> Self::Key {
        (self.table.to_ascii_lowercase(), self.name.to_ascii_lowercase())
    }
}

/// Result of matching two slices of [`Keyed`] entities by key: items only in
/// `a`, items only in `b`, and keyed pairs present on both sides (which may
/// or may not be equal — the caller decides what "changed" means).
struct Partition<T> {
    added: Vec<T>,
    removed: Vec<T>,
    common: Vec<(T, T)>,
}

fn partition<T: Keyed + Clone>(a: &[T], b: &[T]) -> Partition<T> {
    let mut removed = Vec::new();
    let mut common = Vec::new();
    for item in a {
        match b.iter().find(|other| other.key() == item.key()) {
            Some(other) => common.push((item.clone(), other.clone())),
            None => removed.push(item.clone()),
        }
    }
    let added = b
        .iter()
        .filter(|item| !a.iter().any(|other| other.key() == item.key()))
        .cloned()
        .collect();
    Partition {
        added,
        removed,
        common,
    }
}

/// One entity present on both sides of a comparison under the same key, but
/// with at least one observable attribute differing. Keeping both sides
/// (rather than just the B-side value) is what lets the generator render
/// either direction from the same `DiffResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change<T> {
    /// The A-side value.
    pub from: T,
    /// The B-side value.
    pub to: T,
}

/// Added/removed/changed buckets for one entity level, sorted deterministically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDiff<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
    pub changed: Vec<Change<T>>,
}

impl<T> EntityDiff<T> {
    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDiff {
    pub table: String,
    pub primary_key_changed: bool,
    pub columns: EntityDiff<Column>,
    pub indexes: EntityDiff<Index>,
    pub checks: EntityDiff<Check>,
    pub foreign_keys: EntityDiff<ForeignKey>,
}

impl TableDiff {
    /// True when nothing about this table actually differs — used to avoid
    /// reporting a table as `changed` when the only structural difference
    /// between the two sides was incidental (e.g. catalog ordering).
    fn is_empty(&self) -> bool {
        !self.primary_key_changed
            && self.columns.is_empty()
            && self.indexes.is_empty()
            && self.checks.is_empty()
            && self.foreign_keys.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub tables_added: Vec<Table>,
    pub tables_removed: Vec<Table>,
    pub tables_changed: Vec<TableDiff>,
    pub views: EntityDiff<crate::model::View>,
    pub routines: EntityDiff<Routine>,
    pub triggers: EntityDiff<crate::model::Trigger>,
}

impl DiffResult {
    /// True when no entity at any level differs between the two schemas.
    pub fn is_empty(&self) -> bool {
        self.tables_added.is_empty()
            && self.tables_removed.is_empty()
            && self.tables_changed.is_empty()
            && self.views.added.is_empty()
            && self.views.removed.is_empty()
            && self.views.changed.is_empty()
            && self.routines.added.is_empty()
            && self.routines.removed.is_empty()
            && self.routines.changed.is_empty()
            && self.triggers.added.is_empty()
            && self.triggers.removed.is_empty()
            && self.triggers.changed.is_empty()
    }
}

fn entity_diff<T: Keyed + Clone + PartialEq>(a: &[T], b: &[T]) -> EntityDiff<T> {
    let Partition {
        added,
        removed,
        common,
    } = partition(a, b);
    let mut added = added;
    let mut removed = removed;
    added.sort_by_key(|t| t.key());
    removed.sort_by_key(|t| t.key());

    let mut changed: Vec<Change<T>> = common
        .into_iter()
        .filter_map(|(left, right)| {
            if left == right {
                None
            } else {
                Some(Change { from: left, to: right })
            }
        })
        .collect();
    changed.sort_by_key(|c| c.to.key());

    EntityDiff {
        added,
        removed,
        changed,
    }
}

fn primary_key_changed(a: &Option<PrimaryKey>, b: &Option<PrimaryKey>) -> bool {
    match (a, b) {
        (None, None) => false,
        (Some(x), Some(y)) => {
            let mut xc = x.columns.clone();
            let mut yc = y.columns.clone();
            xc.sort();
            yc.sort();
            xc != yc
        }
        _ => true,
    }
}

fn diff_table(a: &Table, b: &Table) -> TableDiff {
    TableDiff {
        table: b.name.clone(),
        primary_key_changed: primary_key_changed(&a.primary_key, &b.primary_key),
        columns: entity_diff(&a.columns, &b.columns),
        indexes: entity_diff(&a.indexes, &b.indexes),
        checks: entity_diff(&a.checks, &b.checks),
        foreign_keys: entity_diff(&a.foreign_keys, &b.foreign_keys),
    }
}

/// Compute the full diff of `a -> b`. Direction matters only for how the
/// caller later renders DDL (A-to-B vs. B-to-A); the result itself always
/// describes "what changes to turn a into b".
pub fn compute_diff(a: &SchemaModel, b: &SchemaModel) -> DiffResult {
    let Partition {
        added: tables_added,
        removed: tables_removed,
        common: tables_common,
    } = partition(&a.tables, &b.tables);

    let mut tables_changed: Vec<TableDiff> = tables_common
        .into_iter()
        .filter_map(|(left, right)| {
            let table_diff = diff_table(&left, &right);
            if table_diff.is_empty() {
                None
            } else {
                Some(table_diff)
            }
        })
        .collect();
    tables_changed.sort_by(|x, y| x.table.to_ascii_lowercase().cmp(&y.table.to_ascii_lowercase()));

    let mut tables_added = tables_added;
    let mut tables_removed = tables_removed;
    tables_added.sort_by_key(|t| t.name.to_ascii_lowercase());
    tables_removed.sort_by_key(|t| t.name.to_ascii_lowercase());

    DiffResult {
        tables_added,
        tables_removed,
        tables_changed,
        views: entity_diff(&a.views, &b.views),
        routines: entity_diff(&a.routines, &b.routines),
        triggers: entity_diff(&a.triggers, &b.triggers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Column;

    #[test]
    fn identical_schemas_produce_empty_diff() {
        let mut table = Table::new("accounts");
        table.columns.push(Column::new("id", "int"));
        let model = SchemaModel {
            tables: vec![table],
            ..SchemaModel::default()
        };
        let diff = compute_diff(&model, &model);
        assert!(diff.is_empty());
    }

    #[test]
    fn added_column_is_reported_once() {
        let mut before = Table::new("accounts");
        before.columns.push(Column::new("id", "int"));
        let mut after = before.clone();
        after.columns.push(Column::new("email", "text"));

        let a = SchemaModel {
            tables: vec![before],
            ..SchemaModel::default()
        };
        let b = SchemaModel {
            tables: vec![after],
            ..SchemaModel::default()
        };
        let diff = compute_diff(&a, &b);
        assert_eq!(diff.tables_changed.len(), 1);
        assert_eq!(diff.tables_changed[0].columns.added.len(), 1);
        assert_eq!(diff.tables_changed[0].columns.added[0].name, "email");
    }

    #[test]
    fn new_table_is_reported_as_added_not_changed() {
        let existing = Table::new("accounts");
        let new_table = Table::new("orders");
        let a = SchemaModel {
            tables: vec![existing.clone()],
            ..SchemaModel::default()
        };
        let b = SchemaModel {
            tables: vec![existing, new_table],
            ..SchemaModel::default()
        };
        let diff = compute_diff(&a, &b);
        assert_eq!(diff.tables_added.len(), 1);
        assert_eq!(diff.tables_added[0].name, "orders");
        assert!(diff.tables_changed.is_empty());
    }

    #[test]
    fn index_equality_is_order_insensitive_on_columns() {
        let before = Index {
            name: "idx_a".to_string(),
            unique: false,
            columns: vec!["a".to_string(), "b".to_string()],
            using: Some("btree".to_string()),
        };
        let mut after = before.clone();
        after.columns = vec!["B".to_string(), "A".to_string()];
        after.using = Some("BTREE".to_string());

        assert_eq!(before, after);

        let mut before_table = Table::new("orders");
        before_table.indexes.push(before);
        let mut after_table = before_table.clone();
        after_table.indexes[0].columns.reverse();
        let diff = diff_table(&before_table, &after_table);
        assert!(diff.indexes.is_empty());
    }

    #[test]
    fn primary_key_change_is_flagged_independent_of_column_order() {
        let mut before = Table::new("accounts");
        before.primary_key = Some(PrimaryKey {
            name: Some("pk_accounts".to_string()),
            columns: vec!["id".to_string(), "tenant".to_string()],
        });
        let mut after = before.clone();
        after.primary_key.as_mut().unwrap().columns =
            vec!["tenant".to_string(), "id".to_string()];
        assert!(!primary_key_changed(&before.primary_key, &after.primary_key));

        after.primary_key.as_mut().unwrap().columns = vec!["id".to_string()];
        assert!(primary_key_changed(&before.primary_key, &after.primary_key));
    }

    #[test]
    fn removed_table_appears_only_in_tables_removed() {
        let gone = Table::new("legacy");
        let a = SchemaModel {
            tables: vec![gone.clone()],
            ..SchemaModel::default()
        };
        let b = SchemaModel::default();
        let diff = compute_diff(&a, &b);
        assert_eq!(diff.tables_removed.len(), 1);
        assert_eq!(diff.tables_removed[0].name, "legacy");
    }

    #[test]
    fn column_equality_ignores_ordinal_position() {
        let mut a = Column::new("id", "int");
        a.ordinal_position = 1;
        let mut b = Column::new("id", "int");
        b.ordinal_position = 7;
        assert_eq!(a, b);
    }

    #[test]
    fn column_equality_treats_missing_default_as_sql_null() {
        let mut a = Column::new("note", "text");
        a.default = None;
        let mut b = Column::new("note", "text");
        b.default = Some("NULL".to_string());
        assert_eq!(a, b);

        b.default = Some("'pending'".to_string());
        assert_ne!(a, b);
    }

    #[test]
    fn foreign_key_equality_ignores_column_order_and_action_case() {
        let a = ForeignKey {
            name: "fk_owner".to_string(),
            columns: vec!["owner_id".to_string()],
            referenced_table: "Accounts".to_string(),
            referenced_columns: vec!["id".to_string()],
            on_update: Some("cascade".to_string()),
            on_delete: None,
        };
        let mut b = a.clone();
        b.referenced_table = "accounts".to_string();
        b.on_update = Some("CASCADE".to_string());
        assert_eq!(a, b);

        b.on_delete = Some("set null".to_string());
        assert_ne!(a, b);
    }

    #[test]
    fn length_change_surfaces_as_a_column_change() {
        let mut before = Table::new("users");
        let mut email = Column::new("email", "varchar");
        email.length = Some(255);
        before.columns.push(email);
        let mut after = before.clone();
        after.columns[0].length = Some(128);

        let diff = diff_table(&before, &after);
        assert_eq!(diff.columns.changed.len(), 1);
        assert_eq!(diff.columns.changed[0].from.length, Some(255));
        assert_eq!(diff.columns.changed[0].to.length, Some(128));
    }
}
