//! The Normalizer — folds dialect quirks and cosmetic catalog variance out of
//! a [`SchemaModel`] before it is diffed.
//!
//! A handful of narrow, regex-backed helper functions composed by one
//! top-level `normalize_schema_model`.

use std::collections::HashMap;

use regex::Regex;
use tracing::warn;

use crate::model::{Routine, SchemaModel, Table, Trigger, View};

/// How table/column/etc. names are case-folded before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameCaseStrategy {
    Preserve,
    Lower,
    Upper,
}

/// Options controlling [`normalize_schema_model`]. `ignore` lists entity
/// names exempt from case folding (e.g. quoted identifiers the source
/// database preserves verbatim).
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub name_case: NameCaseStrategy,
    pub name_case_ignore: Vec<String>,
    pub normalize_defaults: bool,
    pub map_types: HashMap<String, String>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            name_case: NameCaseStrategy::Preserve,
            name_case_ignore: Vec::new(),
            normalize_defaults: true,
            map_types: HashMap::new(),
        }
    }
}

/// Built-in type synonyms collapsed before any user-supplied `map_types`
/// override is consulted.
fn builtin_type_synonym(data_type: &str) -> Option<&'static str> {
    match data_type.to_ascii_lowercase().as_str() {
        "double precision" => Some("double"),
        "character varying" => Some("varchar"),
        "timestamp without time zone" => Some("timestamp"),
        "timestamp with time zone" => Some("timestamptz"),
        "integer" | "int4" => Some("int"),
        "int8" => Some("bigint"),
        "int2" => Some("smallint"),
        "tinyint(1)" => Some("boolean"),
        "bool" => Some("boolean"),
        "bit(1)" => Some("boolean"),
        _ => None,
    }
}

fn redundant_parens_re() -> Regex {
    Regex::new(r"^\((.*)\)$").expect("static regex")
}

fn whitespace_re() -> Regex {
    Regex::new(r"\s+").expect("static regex")
}

fn now_call_re() -> Regex {
    Regex::new(r"(?i)^now\(\)$").expect("static regex")
}

/// Collapse internal whitespace to single spaces and trim ends.
fn collapse_whitespace(expr: &str) -> String {
    whitespace_re().replace_all(expr.trim(), " ").to_string()
}

/// Strip one layer of redundant wrapping parentheses at a time, repeatedly,
/// e.g. `((a = 1))` -> `a = 1`. Stops once the wrapped text would itself
/// contain an unbalanced paren pair (so `(a) + (b)` keeps its parens).
fn strip_redundant_parens(expr: &str) -> String {
    let mut current = expr.trim().to_string();
    let re = redundant_parens_re();
    loop {
        let Some(caps) = re.captures(&current) else {
            break;
        };
        let inner = caps.get(1).unwrap().as_str();
        if !parens_balanced(inner) {
            break;
        }
        current = inner.trim().to_string();
    }
    current
}

fn parens_balanced(s: &str) -> bool {
    let mut depth = 0i32;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

fn canonicalize_default(expr: &str, options: &NormalizeOptions) -> String {
    if !options.normalize_defaults {
        return expr.to_string();
    }
    let trimmed = strip_redundant_parens(&collapse_whitespace(expr));
    if now_call_re().is_match(&trimmed) {
        "CURRENT_TIMESTAMP".to_string()
    } else {
        trimmed
    }
}

fn canonicalize_type(data_type: &str, options: &NormalizeOptions) -> String {
    if let Some(mapped) = options.map_types.get(data_type) {
        return mapped.clone();
    }
    if let Some(mapped) = options.map_types.get(&data_type.to_ascii_lowercase()) {
        return mapped.clone();
    }
    match builtin_type_synonym(data_type) {
        Some(canonical) => canonical.to_string(),
        None => {
            warn!(data_type, "no type synonym mapping, keeping as-is");
            data_type.to_string()
        }
    }
}

fn fold_name(name: &str, options: &NormalizeOptions) -> String {
    if options
        .name_case_ignore
        .iter()
        .any(|ignored| ignored == name)
    {
        return name.to_string();
    }
    match options.name_case {
        NameCaseStrategy::Preserve => name.to_string(),
        NameCaseStrategy::Lower => name.to_ascii_lowercase(),
        NameCaseStrategy::Upper => name.to_ascii_uppercase(),
    }
}

/// Normalize a whole schema: fold name case, collapse type synonyms,
/// canonicalize default expressions and check-constraint text, uppercase
/// referential actions, and stable-sort views/routines/triggers by
/// lowercased key so diffing sees the same order regardless of catalog
/// iteration order.
///
/// Idempotent: `normalize_schema_model(normalize_schema_model(m, o), o) ==
/// normalize_schema_model(m, o)`.
pub fn normalize_schema_model(model: &SchemaModel, options: &NormalizeOptions) -> SchemaModel {
    let mut tables: Vec<Table> = model
        .tables
        .iter()
        .map(|t| normalize_table(t, options))
        .collect();
    tables.sort_by_key(|t| t.name.to_ascii_lowercase());

    let mut views: Vec<View> = model
        .views
        .iter()
        .map(|v| View {
            name: fold_name(&v.name, options),
            definition: collapse_whitespace(&v.definition),
        })
        .collect();
    views.sort_by_key(|v| v.name.to_ascii_lowercase());

    let mut routines: Vec<Routine> = model
        .routines
        .iter()
        .map(|r| Routine {
            kind: r.kind,
            name: fold_name(&r.name, options),
            language: r.language.clone(),
            body: collapse_whitespace(&r.body),
        })
        .collect();
    routines.sort_by(|a, b| {
        (a.name.to_ascii_lowercase(), a.kind)
            .partial_cmp(&(b.name.to_ascii_lowercase(), b.kind))
            .unwrap()
    });

    let mut triggers: Vec<Trigger> = model
        .triggers
        .iter()
        .map(|t| Trigger {
            table: fold_name(&t.table, options),
            name: fold_name(&t.name, options),
            timing: t.timing,
            events: t.events.clone(),
            body: collapse_whitespace(&t.body),
        })
        .collect();
    triggers.sort_by_key(|t| (t.table.to_ascii_lowercase(), t.name.to_ascii_lowercase()));

    SchemaModel {
        tables,
        views,
        routines,
        triggers,
    }
}

fn fold_names(names: &[String], options: &NormalizeOptions) -> Vec<String> {
    names.iter().map(|n| fold_name(n, options)).collect()
}

/// Name-case folding applies uniformly to table, column, index, check, FK
/// (local and reference), and primary-key names — including the column
/// names referenced *by* indexes, checks, FKs, and the primary key, so the
/// "subset of the table's columns" invariant keeps holding after folding.
fn normalize_table(table: &Table, options: &NormalizeOptions) -> Table {
    let mut columns = table.columns.clone();
    for column in &mut columns {
        column.name = fold_name(&column.name, options);
        column.data_type = canonicalize_type(&column.data_type, options);
        column.default = column
            .default
            .as_deref()
            .map(|d| canonicalize_default(d, options));
    }
    columns.sort_by_key(|c| c.ordinal_position);

    let mut checks = table.checks.clone();
    for check in &mut checks {
        check.name = fold_name(&check.name, options);
        check.expression = collapse_whitespace(&check.expression);
    }
    checks.sort_by_key(|c| c.name.to_ascii_lowercase());

    let mut indexes = table.indexes.clone();
    for index in &mut indexes {
        index.name = fold_name(&index.name, options);
        index.columns = fold_names(&index.columns, options);
    }
    indexes.sort_by_key(|i| i.name.to_ascii_lowercase());

    let mut foreign_keys = table.foreign_keys.clone();
    for fk in &mut foreign_keys {
        fk.name = fold_name(&fk.name, options);
        fk.columns = fold_names(&fk.columns, options);
        fk.referenced_table = fold_name(&fk.referenced_table, options);
        fk.referenced_columns = fold_names(&fk.referenced_columns, options);
        fk.on_update = fk.on_update.as_deref().map(|a| a.to_ascii_uppercase());
        fk.on_delete = fk.on_delete.as_deref().map(|a| a.to_ascii_uppercase());
    }
    foreign_keys.sort_by_key(|fk| fk.name.to_ascii_lowercase());

    let mut primary_key = table.primary_key.clone();
    if let Some(pk) = &mut primary_key {
        pk.name = pk.name.as_deref().map(|n| fold_name(n, options));
        pk.columns = fold_names(&pk.columns, options);
    }

    Table {
        name: fold_name(&table.name, options),
        columns,
        primary_key,
        indexes,
        checks,
        foreign_keys,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, Table};

    #[test]
    fn collapses_known_type_synonyms() {
        let options = NormalizeOptions::default();
        assert_eq!(canonicalize_type("double precision", &options), "double");
        assert_eq!(canonicalize_type("character varying", &options), "varchar");
        assert_eq!(canonicalize_type("INT8", &options), "bigint");
    }

    #[test]
    fn strips_redundant_parens_on_defaults() {
        let options = NormalizeOptions::default();
        assert_eq!(canonicalize_default("((1 + 1))", &options), "1 + 1");
        assert_eq!(canonicalize_default("now()", &options), "CURRENT_TIMESTAMP");
        assert_eq!(canonicalize_default("NOW( )", &options), "CURRENT_TIMESTAMP");
    }

    #[test]
    fn keeps_unbalanced_looking_expression_parens() {
        let expr = "(a) + (b)";
        assert_eq!(strip_redundant_parens(expr), "(a) + (b)");
    }

    #[test]
    fn is_idempotent() {
        let options = NormalizeOptions::default();
        let mut table = Table::new("Accounts");
        table.columns.push(Column::new("Id", "INTEGER"));
        let model = SchemaModel {
            tables: vec![table],
            views: Vec::new(),
            routines: Vec::new(),
            triggers: Vec::new(),
        };
        let once = normalize_schema_model(&model, &options);
        let twice = normalize_schema_model(&once, &options);
        assert_eq!(once, twice);
    }

    #[test]
    fn folds_name_case_when_requested() {
        let options = NormalizeOptions {
            name_case: NameCaseStrategy::Lower,
            ..NormalizeOptions::default()
        };
        let mut table = Table::new("Accounts");
        table.columns.push(Column::new("Id", "int"));
        let model = SchemaModel {
            tables: vec![table],
            ..SchemaModel::default()
        };
        let normalized = normalize_schema_model(&model, &options);
        assert_eq!(normalized.tables[0].name, "accounts");
        assert_eq!(normalized.tables[0].columns[0].name, "id");
    }

    #[test]
    fn folds_name_case_in_index_and_primary_key_column_references() {
        use crate::model::{Index, PrimaryKey};

        let options = NormalizeOptions {
            name_case: NameCaseStrategy::Lower,
            ..NormalizeOptions::default()
        };
        let mut table = Table::new("Accounts");
        table.columns.push(Column::new("Id", "int"));
        table.primary_key = Some(PrimaryKey {
            name: None,
            columns: vec!["Id".to_string()],
        });
        table.indexes.push(Index {
            name: "Idx_Id".to_string(),
            unique: true,
            columns: vec!["Id".to_string()],
            using: None,
        });
        let model = SchemaModel {
            tables: vec![table],
            ..SchemaModel::default()
        };
        let normalized = normalize_schema_model(&model, &options);
        let table = &normalized.tables[0];
        assert_eq!(table.primary_key.as_ref().unwrap().columns, vec!["id"]);
        assert_eq!(table.indexes[0].columns, vec!["id"]);
        assert_eq!(table.indexes[0].name, "idx_id");
        // still a subset of the table's (folded) columns
        assert!(table
            .primary_key
            .as_ref()
            .unwrap()
            .columns
            .iter()
            .all(|c| table.column(c).is_some()));
    }

    #[test]
    fn preserves_catalog_ordinal_order_of_composite_index_and_primary_key_columns() {
        use crate::model::{Index, PrimaryKey};

        let options = NormalizeOptions::default();
        let mut table = Table::new("orders");
        table.primary_key = Some(PrimaryKey {
            name: None,
            columns: vec!["tenant".to_string(), "id".to_string()],
        });
        table.indexes.push(Index {
            name: "idx_status_account".to_string(),
            unique: false,
            columns: vec!["status".to_string(), "account_id".to_string()],
            using: None,
        });
        let model = SchemaModel {
            tables: vec![table],
            ..SchemaModel::default()
        };
        let normalized = normalize_schema_model(&model, &options);
        let table = &normalized.tables[0];
        assert_eq!(
            table.primary_key.as_ref().unwrap().columns,
            vec!["tenant", "id"]
        );
        assert_eq!(
            table.indexes[0].columns,
            vec!["status", "account_id"]
        );
    }
}
