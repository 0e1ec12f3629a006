//! PostgreSQL catalog introspection.
//!
//! Raw row structs are fetched with one query each, then pure `process_*`
//! functions fold rows
//! into [`crate::model`] types. Keeping the folding logic pure and
//! row-driven (rather than inline in the query loop) is what lets it be
//! unit tested without a live database.

use std::collections::BTreeMap;

use sqlx::postgres::PgPoolOptions;
use sqlx::Row;
use tracing::{debug, info, instrument, warn};

use crate::connection::ConnectionRef;
use crate::error::{CatalogError, ConnectError, EngineError, EngineResult};
use crate::model::{
    Check, Column, ForeignKey, GenerationKind, Index, PrimaryKey, Routine, RoutineKind,
    SchemaModel, Table, Trigger, TriggerEvent, TriggerTiming, View,
};

use super::MAX_POOL_CONNECTIONS;

struct RawColumn {
    table: String,
    name: String,
    data_type: String,
    length: Option<i32>,
    precision: Option<i32>,
    scale: Option<i32>,
    not_null: bool,
    default_value: Option<String>,
    is_identity: bool,
    identity_generation: Option<String>,
    collation: Option<String>,
    ordinal_position: i32,
}

struct RawIndex {
    table: String,
    name: String,
    unique: bool,
    method: String,
    columns: Vec<String>,
}

struct RawForeignKeyRow {
    table: String,
    constraint: String,
    column: String,
    referenced_table: String,
    referenced_column: String,
    on_update: String,
    on_delete: String,
}

struct RawPrimaryKeyRow {
    table: String,
    constraint: Option<String>,
    column: String,
}

struct RawCheck {
    table: String,
    name: String,
    expression: String,
}

struct RawTrigger {
    table: String,
    name: String,
    timing: String,
    event: String,
    body: String,
}

/// Load and fold one PostgreSQL schema into a [`SchemaModel`].
///
/// Opens a pool capped at [`MAX_POOL_CONNECTIONS`], runs the catalog queries
/// against `conn.schema`, and closes the pool unconditionally before
/// returning — on both the success and error paths.
#[instrument(skip(conn), fields(engine = "postgres", host = %conn.host, schema = %conn.schema))]
pub async fn load_postgres(conn: &ConnectionRef) -> EngineResult<SchemaModel> {
    let url = format!(
        "postgres://{}{}@{}:{}/{}{}",
        conn.user,
        conn.password
            .as_ref()
            .map(|p| format!(":{p}"))
            .unwrap_or_default(),
        conn.host,
        conn.port,
        conn.database,
        if conn.ssl { "?sslmode=require" } else { "" },
    );

    debug!("opening postgres pool");
    let pool = PgPoolOptions::new()
        .max_connections(MAX_POOL_CONNECTIONS)
        .connect(&url)
        .await
        .map_err(|source| {
            EngineError::Connect(ConnectError::Unreachable {
                engine: "postgres",
                host: conn.host.clone(),
                port: conn.port,
                source,
            })
        })?;

    let result = load_from_pool(&pool, &conn.schema).await;

    pool.close().await;
    info!("closed postgres pool");

    result
}

async fn load_from_pool(pool: &sqlx::PgPool, schema: &str) -> EngineResult<SchemaModel> {
    let table_names = fetch_table_names(pool, schema).await?;
    let raw_columns = fetch_columns(pool, schema).await?;
    let raw_indexes = fetch_indexes(pool, schema).await?;
    let raw_pks = fetch_primary_keys(pool, schema).await?;
    let raw_fks = fetch_foreign_keys(pool, schema).await?;
    let raw_checks = fetch_checks(pool, schema).await?;
    let raw_views = fetch_views(pool, schema).await?;
    let raw_routines = fetch_routines(pool, schema).await?;
    let raw_triggers = fetch_triggers(pool, schema).await?;

    let mut model = SchemaModel::new();
    model.tables = process_tables(
        &table_names,
        &raw_columns,
        &raw_indexes,
        &raw_pks,
        &raw_fks,
        &raw_checks,
    )?;
    model.views = raw_views
        .into_iter()
        .map(|(name, definition)| View { name, definition })
        .collect();
    model.routines = raw_routines;
    model.triggers = process_triggers(raw_triggers)?;

    Ok(model)
}

async fn fetch_table_names(pool: &sqlx::PgPool, schema: &str) -> EngineResult<Vec<String>> {
    let rows = sqlx::query(
        "select table_name from information_schema.tables \
         where table_schema = $1 and table_type = 'BASE TABLE' order by table_name",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|source| pool_error("postgres", source))?;
    Ok(rows.iter().map(|r| r.get::<String, _>(0)).collect())
}

async fn fetch_columns(pool: &sqlx::PgPool, schema: &str) -> EngineResult<Vec<RawColumn>> {
    let rows = sqlx::query(
        "select c.table_name, c.column_name, c.data_type, \
                c.character_maximum_length, c.numeric_precision, c.numeric_scale, \
                (c.is_nullable = 'NO') as not_null, c.column_default, \
                (c.is_identity = 'YES') as is_identity, c.identity_generation, \
                c.collation_name, c.ordinal_position \
         from information_schema.columns c \
         where c.table_schema = $1 order by c.table_name, c.ordinal_position",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|source| pool_error("postgres", source))?;

    Ok(rows
        .into_iter()
        .map(|r| RawColumn {
            table: r.get(0),
            name: r.get(1),
            data_type: r.get(2),
            length: r.get(3),
            precision: r.get(4),
            scale: r.get(5),
            not_null: r.get(6),
            default_value: r.get(7),
            is_identity: r.get(8),
            identity_generation: r.get(9),
            collation: r.get(10),
            ordinal_position: r.get(11),
        })
        .collect())
}

async fn fetch_indexes(pool: &sqlx::PgPool, schema: &str) -> EngineResult<Vec<RawIndex>> {
    let rows = sqlx::query(
        "select t.relname as table_name, i.relname as index_name, \
                ix.indisunique, am.amname as method, \
                array_agg(a.attname order by array_position(ix.indkey, a.attnum)) as columns \
         from pg_index ix \
         join pg_class t on t.oid = ix.indrelid \
         join pg_class i on i.oid = ix.indexrelid \
         join pg_am am on am.oid = i.relam \
         join pg_namespace n on n.oid = t.relnamespace \
         join pg_attribute a on a.attrelid = t.oid and a.attnum = any(ix.indkey) \
         where n.nspname = $1 and not ix.indisprimary \
         group by t.relname, i.relname, ix.indisunique, am.amname",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|source| pool_error("postgres", source))?;

    Ok(rows
        .into_iter()
        .map(|r| RawIndex {
            table: r.get(0),
            name: r.get(1),
            unique: r.get(2),
            method: r.get(3),
            columns: r.get(4),
        })
        .collect())
}

async fn fetch_primary_keys(
    pool: &sqlx::PgPool,
    schema: &str,
) -> EngineResult<Vec<RawPrimaryKeyRow>> {
    let rows = sqlx::query(
        "select tc.table_name, tc.constraint_name, kcu.column_name \
         from information_schema.table_constraints tc \
         join information_schema.key_column_usage kcu \
           on tc.constraint_name = kcu.constraint_name and tc.table_schema = kcu.table_schema \
         where tc.table_schema = $1 and tc.constraint_type = 'PRIMARY KEY' \
         order by tc.table_name, kcu.ordinal_position",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|source| pool_error("postgres", source))?;

    Ok(rows
        .into_iter()
        .map(|r| RawPrimaryKeyRow {
            table: r.get(0),
            constraint: r.get(1),
            column: r.get(2),
        })
        .collect())
}

async fn fetch_foreign_keys(
    pool: &sqlx::PgPool,
    schema: &str,
) -> EngineResult<Vec<RawForeignKeyRow>> {
    let rows = sqlx::query(
        "select tc.table_name, tc.constraint_name, kcu.column_name, \
                ccu.table_name as referenced_table, ccu.column_name as referenced_column, \
                rc.update_rule, rc.delete_rule \
         from information_schema.table_constraints tc \
         join information_schema.key_column_usage kcu \
           on tc.constraint_name = kcu.constraint_name and tc.table_schema = kcu.table_schema \
         join information_schema.referential_constraints rc \
           on rc.constraint_name = tc.constraint_name and rc.constraint_schema = tc.table_schema \
         join information_schema.constraint_column_usage ccu \
           on ccu.constraint_name = tc.constraint_name and ccu.table_schema = tc.table_schema \
         where tc.table_schema = $1 and tc.constraint_type = 'FOREIGN KEY' \
         order by tc.table_name, tc.constraint_name, kcu.ordinal_position",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|source| pool_error("postgres", source))?;

    Ok(rows
        .into_iter()
        .map(|r| RawForeignKeyRow {
            table: r.get(0),
            constraint: r.get(1),
            column: r.get(2),
            referenced_table: r.get(3),
            referenced_column: r.get(4),
            on_update: r.get(5),
            on_delete: r.get(6),
        })
        .collect())
}

async fn fetch_checks(pool: &sqlx::PgPool, schema: &str) -> EngineResult<Vec<RawCheck>> {
    let rows = sqlx::query(
        "select tc.table_name, tc.constraint_name, cc.check_clause \
         from information_schema.table_constraints tc \
         join information_schema.check_constraints cc \
           on cc.constraint_name = tc.constraint_name and cc.constraint_schema = tc.table_schema \
         where tc.table_schema = $1 and tc.constraint_type = 'CHECK' \
         order by tc.table_name, tc.constraint_name",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|source| pool_error("postgres", source))?;

    Ok(rows
        .into_iter()
        .map(|r| RawCheck {
            table: r.get(0),
            name: r.get(1),
            expression: r.get(2),
        })
        .collect())
}

async fn fetch_views(pool: &sqlx::PgPool, schema: &str) -> EngineResult<Vec<(String, String)>> {
    let rows = sqlx::query(
        "select table_name, view_definition from information_schema.views \
         where table_schema = $1 order by table_name",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|source| pool_error("postgres", source))?;
    Ok(rows.into_iter().map(|r| (r.get(0), r.get(1))).collect())
}

async fn fetch_routines(pool: &sqlx::PgPool, schema: &str) -> EngineResult<Vec<Routine>> {
    let rows = sqlx::query(
        "select routine_name, routine_type, external_language, routine_definition \
         from information_schema.routines where routine_schema = $1 order by routine_name",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|source| pool_error("postgres", source))?;

    Ok(rows
        .into_iter()
        .map(|r| {
            let kind_str: String = r.get(1);
            let kind = if kind_str.eq_ignore_ascii_case("PROCEDURE") {
                RoutineKind::Procedure
            } else {
                RoutineKind::Function
            };
            Routine {
                kind,
                name: r.get(0),
                language: r.get::<String, _>(2),
                body: r.get::<Option<String>, _>(3).unwrap_or_default(),
            }
        })
        .collect())
}

async fn fetch_triggers(pool: &sqlx::PgPool, schema: &str) -> EngineResult<Vec<RawTrigger>> {
    let rows = sqlx::query(
        "select event_object_table, trigger_name, action_timing, event_manipulation, \
                action_statement \
         from information_schema.triggers where trigger_schema = $1 \
         order by event_object_table, trigger_name",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|source| pool_error("postgres", source))?;

    Ok(rows
        .into_iter()
        .map(|r| RawTrigger {
            table: r.get(0),
            name: r.get(1),
            timing: r.get(2),
            event: r.get(3),
            body: r.get(4),
        })
        .collect())
}

fn pool_error(engine: &'static str, source: sqlx::Error) -> EngineError {
    EngineError::Connect(ConnectError::Unreachable {
        engine,
        host: String::new(),
        port: 0,
        source,
    })
}

/// Fold every raw row set into [`Table`]s. Pure and side-effect free, so it
/// is exercised directly by unit tests without a live database.
pub(crate) fn process_tables(
    table_names: &[String],
    raw_columns: &[RawColumn],
    raw_indexes: &[RawIndex],
    raw_pks: &[RawPrimaryKeyRow],
    raw_fks: &[RawForeignKeyRow],
    raw_checks: &[RawCheck],
) -> EngineResult<Vec<Table>> {
    let mut tables: BTreeMap<String, Table> = table_names
        .iter()
        .map(|n| (n.clone(), Table::new(n.clone())))
        .collect();

    for raw in raw_columns {
        let Some(table) = tables.get_mut(&raw.table) else {
            continue;
        };
        let generated = if raw.is_identity {
            GenerationKind::Identity
        } else if raw
            .default_value
            .as_deref()
            .is_some_and(|d| d.contains("nextval("))
        {
            GenerationKind::Sequence {
                owning_sequence: extract_sequence_name(raw.default_value.as_deref()),
            }
        } else {
            GenerationKind::None
        };
        let precision_scale = match (raw.precision, raw.scale) {
            (Some(p), Some(s)) => Some((p as u32, s as u32)),
            _ => None,
        };
        table.columns.push(Column {
            name: raw.name.clone(),
            data_type: raw.data_type.clone(),
            length: raw.length.map(|l| l as u32),
            precision_scale,
            nullable: !raw.not_null,
            default: raw.default_value.clone(),
            generated,
            collation: raw.collation.clone(),
            ordinal_position: raw.ordinal_position,
        });
        let _ = &raw.identity_generation;
    }

    for raw in raw_indexes {
        let Some(table) = tables.get_mut(&raw.table) else {
            continue;
        };
        table.indexes.push(Index {
            name: raw.name.clone(),
            unique: raw.unique,
            columns: raw.columns.clone(),
            using: Some(raw.method.clone()),
        });
    }

    for raw in raw_pks {
        let Some(table) = tables.get_mut(&raw.table) else {
            continue;
        };
        match &mut table.primary_key {
            Some(pk) => pk.columns.push(raw.column.clone()),
            None => {
                table.primary_key = Some(PrimaryKey {
                    name: raw.constraint.clone(),
                    columns: vec![raw.column.clone()],
                })
            }
        }
    }

    for raw in raw_checks {
        let Some(table) = tables.get_mut(&raw.table) else {
            continue;
        };
        table.checks.push(Check {
            name: raw.name.clone(),
            expression: raw.expression.clone(),
        });
    }

    let mut fk_index: BTreeMap<(String, String), ForeignKey> = BTreeMap::new();
    for raw in raw_fks {
        let key = (raw.table.clone(), raw.constraint.clone());
        let entry = fk_index.entry(key).or_insert_with(|| ForeignKey {
            name: raw.constraint.clone(),
            columns: Vec::new(),
            referenced_table: raw.referenced_table.clone(),
            referenced_columns: Vec::new(),
            on_update: Some(raw.on_update.clone()),
            on_delete: Some(raw.on_delete.clone()),
        });
        entry.columns.push(raw.column.clone());
        entry.referenced_columns.push(raw.referenced_column.clone());
    }
    for ((table_name, _), fk) in fk_index {
        if let Some(table) = tables.get_mut(&table_name) {
            table.foreign_keys.push(fk);
        } else {
            return Err(EngineError::Catalog(CatalogError::ForeignKey {
                table: table_name,
                constraint: fk.name,
                message: "foreign key references a table outside the introspected schema"
                    .to_string(),
            }));
        }
    }

    Ok(tables.into_values().collect())
}

fn extract_sequence_name(default_expr: Option<&str>) -> Option<String> {
    let expr = default_expr?;
    let start = expr.find("nextval('")? + "nextval('".len();
    let rest = &expr[start..];
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}

pub(crate) fn process_triggers(raw: Vec<RawTrigger>) -> EngineResult<Vec<Trigger>> {
    let mut grouped: BTreeMap<(String, String), Trigger> = BTreeMap::new();
    for row in raw {
        let timing = match row.timing.to_ascii_uppercase().as_str() {
            "BEFORE" => TriggerTiming::Before,
            "AFTER" | "INSTEAD OF" => TriggerTiming::After,
            other => {
                warn!(timing = other, "unrecognized trigger timing, defaulting to after");
                TriggerTiming::After
            }
        };
        let event = match row.event.to_ascii_uppercase().as_str() {
            "INSERT" => TriggerEvent::Insert,
            "UPDATE" => TriggerEvent::Update,
            "DELETE" => TriggerEvent::Delete,
            other => {
                return Err(EngineError::Catalog(CatalogError::MalformedRow {
                    entity: format!("trigger {}.{}", row.table, row.name),
                    message: format!("unrecognized trigger event '{other}'"),
                }))
            }
        };
        let key = (row.table.clone(), row.name.clone());
        let entry = grouped.entry(key).or_insert_with(|| Trigger {
            table: row.table.clone(),
            name: row.name.clone(),
            timing,
            events: Vec::new(),
            body: row.body.clone(),
        });
        if !entry.events.contains(&event) {
            entry.events.push(event);
        }
    }
    Ok(grouped.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_table_names() -> Vec<String> {
        vec!["accounts".to_string(), "orders".to_string()]
    }

    #[test]
    fn folds_identity_columns() {
        let tables = raw_table_names();
        let columns = vec![RawColumn {
            table: "accounts".to_string(),
            name: "id".to_string(),
            data_type: "integer".to_string(),
            length: None,
            precision: None,
            scale: None,
            not_null: true,
            default_value: None,
            is_identity: true,
            identity_generation: Some("ALWAYS".to_string()),
            collation: None,
            ordinal_position: 1,
        }];
        let result = process_tables(&tables, &columns, &[], &[], &[], &[]).unwrap();
        let accounts = result.iter().find(|t| t.name == "accounts").unwrap();
        assert_eq!(accounts.columns.len(), 1);
        assert_eq!(accounts.columns[0].generated, GenerationKind::Identity);
    }

    #[test]
    fn folds_sequence_default_into_owning_sequence() {
        let tables = raw_table_names();
        let columns = vec![RawColumn {
            table: "orders".to_string(),
            name: "id".to_string(),
            data_type: "integer".to_string(),
            length: None,
            precision: None,
            scale: None,
            not_null: true,
            default_value: Some("nextval('orders_id_seq'::regclass)".to_string()),
            is_identity: false,
            identity_generation: None,
            collation: None,
            ordinal_position: 1,
        }];
        let result = process_tables(&tables, &columns, &[], &[], &[], &[]).unwrap();
        let orders = result.iter().find(|t| t.name == "orders").unwrap();
        match &orders.columns[0].generated {
            GenerationKind::Sequence { owning_sequence } => {
                assert_eq!(owning_sequence.as_deref(), Some("orders_id_seq"));
            }
            other => panic!("expected Sequence, got {other:?}"),
        }
    }

    #[test]
    fn groups_foreign_key_columns_by_constraint() {
        let tables = raw_table_names();
        let fks = vec![
            RawForeignKeyRow {
                table: "orders".to_string(),
                constraint: "fk_owner".to_string(),
                column: "account_id".to_string(),
                referenced_table: "accounts".to_string(),
                referenced_column: "id".to_string(),
                on_update: "NO ACTION".to_string(),
                on_delete: "CASCADE".to_string(),
            },
        ];
        let result = process_tables(&tables, &[], &[], &[], &fks, &[]).unwrap();
        let orders = result.iter().find(|t| t.name == "orders").unwrap();
        assert_eq!(orders.foreign_keys.len(), 1);
        assert_eq!(orders.foreign_keys[0].columns, vec!["account_id".to_string()]);
    }

    #[test]
    fn rejects_foreign_key_on_unknown_table() {
        let fks = vec![RawForeignKeyRow {
            table: "ghost".to_string(),
            constraint: "fk_x".to_string(),
            column: "a".to_string(),
            referenced_table: "accounts".to_string(),
            referenced_column: "id".to_string(),
            on_update: "NO ACTION".to_string(),
            on_delete: "NO ACTION".to_string(),
        }];
        let err = process_tables(&raw_table_names(), &[], &[], &[], &fks, &[]).unwrap_err();
        assert!(matches!(err, EngineError::Catalog(CatalogError::ForeignKey { .. })));
    }

    #[test]
    fn groups_trigger_events_by_table_and_name() {
        let raw = vec![
            RawTrigger {
                table: "orders".to_string(),
                name: "trg_audit".to_string(),
                timing: "AFTER".to_string(),
                event: "INSERT".to_string(),
                body: "EXECUTE FUNCTION audit()".to_string(),
            },
            RawTrigger {
                table: "orders".to_string(),
                name: "trg_audit".to_string(),
                timing: "AFTER".to_string(),
                event: "UPDATE".to_string(),
                body: "EXECUTE FUNCTION audit()".to_string(),
            },
        ];
        let triggers = process_triggers(raw).unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].events.len(), 2);
    }
}
