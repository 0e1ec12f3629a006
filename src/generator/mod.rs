//! The DDL Generator — renders a [`crate::differ::DiffResult`] as a
//! dialect-specific SQL script.
//!
//! Rather than duplicating the emission skeleton once per dialect, the
//! fixed emission order and safe-mode/transaction wrapping live here,
//! parameterized over a small [`DialectSql`] trait implemented once per
//! dialect.

pub mod mariadb;
pub mod postgres;

use tracing::warn;

use crate::differ::{Change, DiffResult, EntityDiff};
use crate::model::{default_eq, Check, Column, ForeignKey, GenerationKind, Index, Table};

pub use mariadb::{to_mariadb, MariaDbSql};
pub use postgres::{to_postgres, PostgresSql};

/// Which side of a two-schema comparison is the rendering target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Render statements that turn schema A into schema B.
    AtoB,
    /// Render statements that turn schema B into schema A.
    BtoA,
}

/// Rendering options controlling transaction bracketing, safe-mode
/// comment-wrapping of destructive statements, cascade, and if-exists.
#[derive(Debug, Clone, Copy)]
pub struct GenOptions {
    pub direction: Direction,
    pub with_transaction: bool,
    pub safe_mode: bool,
    pub cascade: bool,
    pub if_exists: bool,
}

impl Default for GenOptions {
    fn default() -> Self {
        Self {
            direction: Direction::AtoB,
            with_transaction: true,
            safe_mode: true,
            cascade: false,
            if_exists: true,
        }
    }
}

/// Per-dialect rendering hooks. Everything dialect-common (emission order,
/// safe-mode wrapping, blank-line separation) lives in [`render`]; only the
/// syntax differences implement this trait.
pub trait DialectSql {
    fn quote_ident(&self, name: &str) -> String;
    fn create_table_suffix(&self) -> &'static str;
    fn column_extra(&self, column: &Column) -> Option<&'static str>;
    fn begin_stmt(&self) -> &'static str;
    fn commit_stmt(&self) -> &'static str;
    fn column_type_sql(&self, column: &Column) -> String;
    fn identity_todo(&self, table: &str, column: &Column) -> Option<String>;
}

/// `compute_diff(a, b)` always reports `removed` as "present in A only" and
/// `added` as "present in B only", independent of which side the caller
/// ultimately wants to render towards. `AtoB` treats A as the desired end
/// state, so a B-only object must be dropped and an A-only object must be
/// created — the mirror image of the raw diff labels. Returns
/// `(creates, drops)`.
fn split_added_removed<'a, T>(
    removed: &'a [T],
    added: &'a [T],
    direction: Direction,
) -> (&'a [T], &'a [T]) {
    match direction {
        Direction::AtoB => (removed, added),
        Direction::BtoA => (added, removed),
    }
}

fn entity_creates_drops<'a, T>(diff: &'a EntityDiff<T>, direction: Direction) -> (&'a [T], &'a [T]) {
    split_added_removed(&diff.removed, &diff.added, direction)
}

/// For a `changed` entry, `target` is the value being migrated *to* and
/// `current` is the value that exists right now and needs altering.
fn change_target_current<T>(change: &Change<T>, direction: Direction) -> (&T, &T) {
    match direction {
        Direction::AtoB => (&change.from, &change.to),
        Direction::BtoA => (&change.to, &change.from),
    }
}

fn wrap_destructive(stmt: String, safe_mode: bool) -> String {
    if safe_mode {
        stmt.lines()
            .map(|line| format!("-- {line}"))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        stmt
    }
}

fn drop_prefix(if_exists: bool) -> &'static str {
    if if_exists {
        "IF EXISTS "
    } else {
        ""
    }
}

fn cascade_suffix(cascade: bool) -> &'static str {
    if cascade {
        " CASCADE"
    } else {
        ""
    }
}

fn column_def(dialect: &dyn DialectSql, column: &Column) -> String {
    let mut def = format!(
        "{} {}",
        dialect.quote_ident(&column.name),
        dialect.column_type_sql(column)
    );
    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        def.push_str(&format!(" DEFAULT {default}"));
    }
    if let Some(extra) = dialect.column_extra(column) {
        def.push(' ');
        def.push_str(extra);
    }
    def
}

fn create_table_stmt(dialect: &dyn DialectSql, table: &Table) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| column_def(dialect, c))
        .collect();
    let mut lines = columns;
    if let Some(pk) = &table.primary_key {
        let cols = pk
            .columns
            .iter()
            .map(|c| dialect.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("PRIMARY KEY ({cols})"));
    }
    for fk in &table.foreign_keys {
        lines.push(foreign_key_clause(dialect, fk));
    }
    for check in &table.checks {
        lines.push(format!("CONSTRAINT {} CHECK ({})", dialect.quote_ident(&check.name), check.expression));
    }
    format!(
        "CREATE TABLE {} (\n  {}\n){};",
        dialect.quote_ident(&table.name),
        lines.join(",\n  "),
        dialect.create_table_suffix(),
    )
}

fn foreign_key_clause(dialect: &dyn DialectSql, fk: &ForeignKey) -> String {
    let cols = fk
        .columns
        .iter()
        .map(|c| dialect.quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let ref_cols = fk
        .referenced_columns
        .iter()
        .map(|c| dialect.quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let mut clause = format!(
        "CONSTRAINT {} FOREIGN KEY ({cols}) REFERENCES {} ({ref_cols})",
        dialect.quote_ident(&fk.name),
        dialect.quote_ident(&fk.referenced_table),
    );
    if let Some(action) = &fk.on_update {
        clause.push_str(&format!(" ON UPDATE {action}"));
    }
    if let Some(action) = &fk.on_delete {
        clause.push_str(&format!(" ON DELETE {action}"));
    }
    clause
}

fn index_stmt(dialect: &dyn DialectSql, table: &str, index: &Index) -> String {
    let unique = if index.unique { "UNIQUE " } else { "" };
    let cols = index
        .columns
        .iter()
        .map(|c| dialect.quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let using = match &index.using {
        Some(method) => format!(" USING {method}"),
        None => String::new(),
    };
    format!(
        "CREATE {unique}INDEX {} ON {}{using} ({cols});",
        dialect.quote_ident(&index.name),
        dialect.quote_ident(table),
    )
}

fn check_stmt(dialect: &dyn DialectSql, table: &str, check: &Check, add: bool) -> String {
    if add {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({});",
            dialect.quote_ident(table),
            dialect.quote_ident(&check.name),
            check.expression,
        )
    } else {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {};",
            dialect.quote_ident(table),
            dialect.quote_ident(&check.name),
        )
    }
}

/// Render `diff` as a complete SQL script for `dialect`, honoring `opts`.
///
/// Fixed emission order: transaction opener, table drops,
/// table creates, per-table column/index/check/FK deltas, view/routine/
/// trigger changes, commit. Destructive statements (drops, and anything
/// inside a `changed` bucket that cannot be expressed as a pure `ALTER`) are
/// comment-wrapped when `safe_mode` is set rather than omitted, so the
/// operator always sees what would have run.
pub fn render(dialect: &dyn DialectSql, diff: &DiffResult, opts: &GenOptions) -> String {
    let mut statements: Vec<String> = Vec::new();

    if opts.with_transaction {
        statements.push(dialect.begin_stmt().to_string());
    }

    let (table_creates, table_drops) =
        split_added_removed(&diff.tables_removed, &diff.tables_added, opts.direction);

    if opts.safe_mode && !table_drops.is_empty() {
        statements.push(
            "-- SAFE MODE: destructive statements below are commented out; review before executing"
                .to_string(),
        );
    }

    for table in table_drops {
        let stmt = format!(
            "DROP TABLE {}{}{};",
            drop_prefix(opts.if_exists),
            dialect.quote_ident(&table.name),
            cascade_suffix(opts.cascade),
        );
        statements.push(wrap_destructive(stmt, opts.safe_mode));
    }

    for table in table_creates {
        statements.push(create_table_stmt(dialect, table));
        for column in &table.columns {
            if let GenerationKind::Identity | GenerationKind::Sequence { .. } = column.generated {
                if let Some(todo) = dialect.identity_todo(&table.name, column) {
                    statements.push(todo);
                }
            }
        }
    }

    for table_diff in &diff.tables_changed {
        render_table_diff(dialect, table_diff, opts, &mut statements);
    }

    let (view_creates, view_drops) = entity_creates_drops(&diff.views, opts.direction);
    for view in view_drops {
        let stmt = format!(
            "DROP VIEW {}{}{};",
            drop_prefix(opts.if_exists),
            dialect.quote_ident(&view.name),
            cascade_suffix(opts.cascade),
        );
        statements.push(wrap_destructive(stmt, opts.safe_mode));
    }
    for view in view_creates {
        statements.push(format!(
            "CREATE VIEW {} AS {};",
            dialect.quote_ident(&view.name),
            view.definition
        ));
    }
    for change in &diff.views.changed {
        let (target, _current) = change_target_current(change, opts.direction);
        let drop = wrap_destructive(
            format!(
                "DROP VIEW {}{}{};",
                drop_prefix(opts.if_exists),
                dialect.quote_ident(&target.name),
                cascade_suffix(opts.cascade),
            ),
            opts.safe_mode,
        );
        statements.push(drop);
        statements.push(format!(
            "-- TODO: verify recreated view matches intended definition\nCREATE VIEW {} AS {};",
            dialect.quote_ident(&target.name),
            target.definition
        ));
    }

    let (routine_creates, routine_drops) = entity_creates_drops(&diff.routines, opts.direction);
    for routine in routine_drops {
        statements.push(wrap_destructive(
            format!(
                "DROP {} {};",
                routine_kind_sql(routine.kind),
                dialect.quote_ident(&routine.name)
            ),
            opts.safe_mode,
        ));
    }
    for routine in routine_creates {
        statements.push(format!(
            "CREATE {} {} AS $$\n{}\n$$;",
            routine_kind_sql(routine.kind),
            dialect.quote_ident(&routine.name),
            routine.body
        ));
    }
    for change in &diff.routines.changed {
        let (target, _current) = change_target_current(change, opts.direction);
        warn!(routine = %target.name, "routine body changed, emitting TODO rather than synthesizing CREATE OR REPLACE");
        statements.push(format!(
            "-- TODO: routine '{}' definition changed; drop and recreate manually\n-- {}",
            target.name,
            target.body.replace('\n', "\n-- ")
        ));
    }

    let (trigger_creates, trigger_drops) = entity_creates_drops(&diff.triggers, opts.direction);
    for trigger in trigger_drops {
        statements.push(wrap_destructive(
            format!(
                "DROP TRIGGER {} ON {};",
                dialect.quote_ident(&trigger.name),
                dialect.quote_ident(&trigger.table)
            ),
            opts.safe_mode,
        ));
    }
    for trigger in trigger_creates {
        statements.push(create_trigger_stmt(dialect, trigger));
    }
    for change in &diff.triggers.changed {
        let (target, _current) = change_target_current(change, opts.direction);
        statements.push(format!(
            "-- TODO: trigger '{}' on '{}' changed; review and apply manually",
            target.name, target.table
        ));
    }

    if opts.with_transaction {
        statements.push(dialect.commit_stmt().to_string());
    }

    statements.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differ::compute_diff;
    use crate::generator::postgres::PostgresSql;
    use crate::model::{Index, SchemaModel, Table};

    #[test]
    fn index_stmt_emits_using_clause_when_present() {
        let index = Index {
            name: "idx_email".to_string(),
            unique: true,
            columns: vec!["email".to_string()],
            using: Some("btree".to_string()),
        };
        let stmt = index_stmt(&PostgresSql, "accounts", &index);
        assert_eq!(
            stmt,
            "CREATE UNIQUE INDEX \"idx_email\" ON \"accounts\" USING btree (\"email\");"
        );
    }

    #[test]
    fn index_stmt_omits_using_clause_when_absent() {
        let index = Index {
            name: "idx_email".to_string(),
            unique: false,
            columns: vec!["email".to_string()],
            using: None,
        };
        let stmt = index_stmt(&PostgresSql, "accounts", &index);
        assert_eq!(stmt, "CREATE INDEX \"idx_email\" ON \"accounts\" (\"email\");");
    }

    #[test]
    fn index_stmt_preserves_composite_column_order() {
        let index = Index {
            name: "idx_ba".to_string(),
            unique: false,
            columns: vec!["b".to_string(), "a".to_string()],
            using: None,
        };
        let stmt = index_stmt(&PostgresSql, "orders", &index);
        assert!(stmt.ends_with("(\"b\", \"a\");"));
    }

    #[test]
    fn safe_mode_banner_appears_only_when_a_table_drop_is_present() {
        let mut b = SchemaModel::default();
        b.tables.push(Table::new("legacy"));
        let diff = compute_diff(&SchemaModel::default(), &b);

        let opts = GenOptions {
            safe_mode: true,
            ..GenOptions::default()
        };
        let sql = render(&PostgresSql, &diff, &opts);
        assert!(sql.contains("-- SAFE MODE:"));

        let no_drop_diff = compute_diff(&b, &b);
        let sql_no_drop = render(&PostgresSql, &no_drop_diff, &opts);
        assert!(!sql_no_drop.contains("-- SAFE MODE:"));
    }

    #[test]
    fn safe_mode_banner_is_absent_when_safe_mode_is_off() {
        let mut b = SchemaModel::default();
        b.tables.push(Table::new("legacy"));
        let diff = compute_diff(&SchemaModel::default(), &b);

        let opts = GenOptions {
            safe_mode: false,
            ..GenOptions::default()
        };
        let sql = render(&PostgresSql, &diff, &opts);
        assert!(!sql.contains("-- SAFE MODE:"));
    }
}

fn timing_sql(timing: crate::model::TriggerTiming) -> &'static str {
    match timing {
        crate::model::TriggerTiming::Before => "BEFORE",
        crate::model::TriggerTiming::After => "AFTER",
    }
}

fn events_sql(events: &[crate::model::TriggerEvent]) -> String {
    events
        .iter()
        .map(|e| match e {
            crate::model::TriggerEvent::Insert => "INSERT",
            crate::model::TriggerEvent::Update => "UPDATE",
            crate::model::TriggerEvent::Delete => "DELETE",
        })
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn create_trigger_stmt(dialect: &dyn DialectSql, trigger: &crate::model::Trigger) -> String {
    format!(
        "CREATE TRIGGER {} {} {} ON {} FOR EACH ROW {};",
        dialect.quote_ident(&trigger.name),
        timing_sql(trigger.timing),
        events_sql(&trigger.events),
        dialect.quote_ident(&trigger.table),
        trigger.body,
    )
}

fn routine_kind_sql(kind: crate::model::RoutineKind) -> &'static str {
    match kind {
        crate::model::RoutineKind::Function => "FUNCTION",
        crate::model::RoutineKind::Procedure => "PROCEDURE",
    }
}

fn render_table_diff(
    dialect: &dyn DialectSql,
    table_diff: &crate::differ::TableDiff,
    opts: &GenOptions,
    statements: &mut Vec<String>,
) {
    let table = &table_diff.table;
    let direction = opts.direction;

    let (column_creates, column_drops) = entity_creates_drops(&table_diff.columns, direction);
    for column in column_drops {
        let stmt = format!(
            "ALTER TABLE {} DROP COLUMN {};",
            dialect.quote_ident(table),
            dialect.quote_ident(&column.name)
        );
        statements.push(wrap_destructive(stmt, opts.safe_mode));
    }
    for column in column_creates {
        statements.push(format!(
            "ALTER TABLE {} ADD COLUMN {};",
            dialect.quote_ident(table),
            column_def(dialect, column)
        ));
    }
    for change in &table_diff.columns.changed {
        let (target, current) = change_target_current(change, direction);
        render_column_alter(dialect, table, current, target, statements);
    }

    let (index_creates, index_drops) = entity_creates_drops(&table_diff.indexes, direction);
    for index in index_drops {
        statements.push(wrap_destructive(
            format!("DROP INDEX {};", dialect.quote_ident(&index.name)),
            opts.safe_mode,
        ));
    }
    for index in index_creates {
        statements.push(index_stmt(dialect, table, index));
    }
    for change in &table_diff.indexes.changed {
        let (target, current) = change_target_current(change, direction);
        statements.push(wrap_destructive(
            format!("DROP INDEX {};", dialect.quote_ident(&current.name)),
            opts.safe_mode,
        ));
        statements.push(index_stmt(dialect, table, target));
    }

    let (check_creates, check_drops) = entity_creates_drops(&table_diff.checks, direction);
    for check in check_drops {
        statements.push(wrap_destructive(check_stmt(dialect, table, check, false), opts.safe_mode));
    }
    for check in check_creates {
        statements.push(check_stmt(dialect, table, check, true));
    }
    for change in &table_diff.checks.changed {
        let (target, current) = change_target_current(change, direction);
        statements.push(wrap_destructive(check_stmt(dialect, table, current, false), opts.safe_mode));
        statements.push(check_stmt(dialect, table, target, true));
    }

    let (fk_creates, fk_drops) = entity_creates_drops(&table_diff.foreign_keys, direction);
    for fk in fk_drops {
        statements.push(wrap_destructive(
            format!("ALTER TABLE {} DROP CONSTRAINT {};", dialect.quote_ident(table), dialect.quote_ident(&fk.name)),
            opts.safe_mode,
        ));
    }
    for fk in fk_creates {
        statements.push(format!(
            "ALTER TABLE {} ADD {};",
            dialect.quote_ident(table),
            foreign_key_clause(dialect, fk)
        ));
    }
    for change in &table_diff.foreign_keys.changed {
        let (target, current) = change_target_current(change, direction);
        statements.push(wrap_destructive(
            format!("ALTER TABLE {} DROP CONSTRAINT {};", dialect.quote_ident(table), dialect.quote_ident(&current.name)),
            opts.safe_mode,
        ));
        statements.push(format!(
            "ALTER TABLE {} ADD {};",
            dialect.quote_ident(table),
            foreign_key_clause(dialect, target)
        ));
    }

    if table_diff.primary_key_changed {
        statements.push(format!(
            "-- TODO: primary key for '{}' changed; review before applying\nALTER TABLE {} DROP CONSTRAINT IF EXISTS {}_pkey;",
            table, dialect.quote_ident(table), table
        ));
    }
}

/// Emit one `ALTER COLUMN` (or TODO) per attribute that actually differs
/// between `current` (what exists now) and `target` (what it should become).
fn render_column_alter(
    dialect: &dyn DialectSql,
    table: &str,
    current: &Column,
    target: &Column,
    statements: &mut Vec<String>,
) {
    if current.data_type != target.data_type
        || current.length != target.length
        || current.precision_scale != target.precision_scale
    {
        statements.push(format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {};",
            dialect.quote_ident(table),
            dialect.quote_ident(&current.name),
            dialect.column_type_sql(target)
        ));
        statements.push(format!("-- TODO: verify casts for {}", current.name));
    }

    if current.nullable != target.nullable {
        let clause = if target.nullable {
            "DROP NOT NULL"
        } else {
            "SET NOT NULL"
        };
        statements.push(format!(
            "ALTER TABLE {} ALTER COLUMN {} {clause};",
            dialect.quote_ident(table),
            dialect.quote_ident(&current.name),
        ));
    }

    if !default_eq(&current.default, &target.default) {
        match &target.default {
            Some(expr) => statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {};",
                dialect.quote_ident(table),
                dialect.quote_ident(&current.name),
                expr
            )),
            None => statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT;",
                dialect.quote_ident(table),
                dialect.quote_ident(&current.name),
            )),
        }
    }

    if current.generated != target.generated {
        statements.push(format!(
            "-- TODO: reconcile generation strategy for {}",
            current.name
        ));
    }

    if current.collation != target.collation {
        statements.push(format!("-- TODO: adjust collation for {}", current.name));
    }
}
