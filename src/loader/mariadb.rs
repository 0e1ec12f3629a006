//! MariaDB catalog introspection, via `information_schema` — the one
//! catalog surface MariaDB and MySQL agree on closely enough to rely on.
//!
//! Mirrors `postgres.rs`'s shape: raw row structs, then pure `process_*`
//! folding functions, applied to MariaDB's `information_schema` catalog.

use std::collections::BTreeMap;

use sqlx::mysql::MySqlPoolOptions;
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
    length: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
    not_null: bool,
    default_value: Option<String>,
    extra: String,
    collation: Option<String>,
    ordinal_position: i32,
}

struct RawIndexRow {
    table: String,
    name: String,
    non_unique: bool,
    column: String,
    index_type: String,
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

#[instrument(skip(conn), fields(engine = "mariadb", host = %conn.host, schema = %conn.schema))]
pub async fn load_mariadb(conn: &ConnectionRef) -> EngineResult<SchemaModel> {
    let url = format!(
        "mysql://{}{}@{}:{}/{}",
        conn.user,
        conn.password
            .as_ref()
            .map(|p| format!(":{p}"))
            .unwrap_or_default(),
        conn.host,
        conn.port,
        conn.database,
    );

    debug!("opening mariadb pool");
    let pool = MySqlPoolOptions::new()
        .max_connections(MAX_POOL_CONNECTIONS)
        .connect(&url)
        .await
        .map_err(|source| {
            EngineError::Connect(ConnectError::Unreachable {
                engine: "mariadb",
                host: conn.host.clone(),
                port: conn.port,
                source,
            })
        })?;

    let result = load_from_pool(&pool, &conn.schema).await;

    pool.close().await;
    info!("closed mariadb pool");

    result
}

async fn load_from_pool(pool: &sqlx::MySqlPool, schema: &str) -> EngineResult<SchemaModel> {
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

async fn fetch_table_names(pool: &sqlx::MySqlPool, schema: &str) -> EngineResult<Vec<String>> {
    let rows = sqlx::query(
        "select table_name from information_schema.tables \
         where table_schema = ? and table_type = 'BASE TABLE' order by table_name",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|source| pool_error("mariadb", source))?;
    Ok(rows.iter().map(|r| r.get::<String, _>(0)).collect())
}

async fn fetch_columns(pool: &sqlx::MySqlPool, schema: &str) -> EngineResult<Vec<RawColumn>> {
    let rows = sqlx::query(
        "select table_name, column_name, data_type, character_maximum_length, \
                numeric_precision, numeric_scale, (is_nullable = 'NO') as not_null, \
                column_default, extra, collation_name, ordinal_position \
         from information_schema.columns where table_schema = ? \
         order by table_name, ordinal_position",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|source| pool_error("mariadb", source))?;

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
            extra: r.get(8),
            collation: r.get(9),
            ordinal_position: r.get(10),
        })
        .collect())
}

async fn fetch_indexes(pool: &sqlx::MySqlPool, schema: &str) -> EngineResult<Vec<RawIndexRow>> {
    let rows = sqlx::query(
        "select table_name, index_name, non_unique, column_name, index_type \
         from information_schema.statistics where table_schema = ? and index_name <> 'PRIMARY' \
         order by table_name, index_name, seq_in_index",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|source| pool_error("mariadb", source))?;

    Ok(rows
        .into_iter()
        .map(|r| RawIndexRow {
            table: r.get(0),
            name: r.get(1),
            non_unique: r.get::<i32, _>(2) != 0,
            column: r.get(3),
            index_type: r.get(4),
        })
        .collect())
}

async fn fetch_primary_keys(
    pool: &sqlx::MySqlPool,
    schema: &str,
) -> EngineResult<Vec<RawPrimaryKeyRow>> {
    let rows = sqlx::query(
        "select table_name, column_name from information_schema.key_column_usage \
         where table_schema = ? and constraint_name = 'PRIMARY' \
         order by table_name, ordinal_position",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|source| pool_error("mariadb", source))?;

    Ok(rows
        .into_iter()
        .map(|r| RawPrimaryKeyRow {
            table: r.get(0),
            column: r.get(1),
        })
        .collect())
}

async fn fetch_foreign_keys(
    pool: &sqlx::MySqlPool,
    schema: &str,
) -> EngineResult<Vec<RawForeignKeyRow>> {
    let rows = sqlx::query(
        "select kcu.table_name, kcu.constraint_name, kcu.column_name, \
                kcu.referenced_table_name, kcu.referenced_column_name, \
                rc.update_rule, rc.delete_rule \
         from information_schema.key_column_usage kcu \
         join information_schema.referential_constraints rc \
           on rc.constraint_name = kcu.constraint_name and rc.constraint_schema = kcu.table_schema \
         where kcu.table_schema = ? and kcu.referenced_table_name is not null \
         order by kcu.table_name, kcu.constraint_name, kcu.ordinal_position",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|source| pool_error("mariadb", source))?;

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

async fn fetch_checks(pool: &sqlx::MySqlPool, schema: &str) -> EngineResult<Vec<RawCheck>> {
    let rows = sqlx::query(
        "select tc.table_name, tc.constraint_name, cc.check_clause \
         from information_schema.table_constraints tc \
         join information_schema.check_constraints cc \
           on cc.constraint_name = tc.constraint_name and cc.constraint_schema = tc.table_schema \
         where tc.table_schema = ? and tc.constraint_type = 'CHECK' \
         order by tc.table_name, tc.constraint_name",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|source| pool_error("mariadb", source))?;

    Ok(rows
        .into_iter()
        .map(|r| RawCheck {
            table: r.get(0),
            name: r.get(1),
            expression: r.get(2),
        })
        .collect())
}

async fn fetch_views(pool: &sqlx::MySqlPool, schema: &str) -> EngineResult<Vec<(String, String)>> {
    let rows = sqlx::query(
        "select table_name, view_definition from information_schema.views \
         where table_schema = ? order by table_name",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|source| pool_error("mariadb", source))?;
    Ok(rows.into_iter().map(|r| (r.get(0), r.get(1))).collect())
}

async fn fetch_routines(pool: &sqlx::MySqlPool, schema: &str) -> EngineResult<Vec<Routine>> {
    let rows = sqlx::query(
        "select routine_name, routine_type, routine_body, routine_definition \
         from information_schema.routines where routine_schema = ? order by routine_name",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|source| pool_error("mariadb", source))?;

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

async fn fetch_triggers(pool: &sqlx::MySqlPool, schema: &str) -> EngineResult<Vec<RawTrigger>> {
    let rows = sqlx::query(
        "select event_object_table, trigger_name, action_timing, event_manipulation, \
                action_statement \
         from information_schema.triggers where trigger_schema = ? \
         order by event_object_table, trigger_name",
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|source| pool_error("mariadb", source))?;

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

pub(crate) fn process_tables(
    table_names: &[String],
    raw_columns: &[RawColumn],
    raw_indexes: &[RawIndexRow],
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
        let generated = if raw.extra.to_ascii_lowercase().contains("auto_increment") {
            GenerationKind::AutoIncrement
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
    }

    let mut index_index: BTreeMap<(String, String), Index> = BTreeMap::new();
    for raw in raw_indexes {
        let key = (raw.table.clone(), raw.name.clone());
        let entry = index_index.entry(key).or_insert_with(|| Index {
            name: raw.name.clone(),
            unique: !raw.non_unique,
            columns: Vec::new(),
            using: Some(raw.index_type.clone()),
        });
        entry.columns.push(raw.column.clone());
    }
    for ((table_name, _), index) in index_index {
        if let Some(table) = tables.get_mut(&table_name) {
            table.indexes.push(index);
        }
    }

    for raw in raw_pks {
        let Some(table) = tables.get_mut(&raw.table) else {
            continue;
        };
        match &mut table.primary_key {
            Some(pk) => pk.columns.push(raw.column.clone()),
            None => {
                table.primary_key = Some(PrimaryKey {
                    name: Some("PRIMARY".to_string()),
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

pub(crate) fn process_triggers(raw: Vec<RawTrigger>) -> EngineResult<Vec<Trigger>> {
    let mut grouped: BTreeMap<(String, String), Trigger> = BTreeMap::new();
    for row in raw {
        let timing = match row.timing.to_ascii_uppercase().as_str() {
            "BEFORE" => TriggerTiming::Before,
            "AFTER" => TriggerTiming::After,
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
    fn folds_auto_increment_extra() {
        let columns = vec![RawColumn {
            table: "accounts".to_string(),
            name: "id".to_string(),
            data_type: "int".to_string(),
            length: None,
            precision: None,
            scale: None,
            not_null: true,
            default_value: None,
            extra: "auto_increment".to_string(),
            collation: None,
            ordinal_position: 1,
        }];
        let result =
            process_tables(&raw_table_names(), &columns, &[], &[], &[], &[]).unwrap();
        let accounts = result.iter().find(|t| t.name == "accounts").unwrap();
        assert_eq!(accounts.columns[0].generated, GenerationKind::AutoIncrement);
    }

    #[test]
    fn groups_index_columns_by_seq_in_index_order() {
        let indexes = vec![
            RawIndexRow {
                table: "orders".to_string(),
                name: "idx_account_status".to_string(),
                non_unique: true,
                column: "account_id".to_string(),
                index_type: "BTREE".to_string(),
            },
            RawIndexRow {
                table: "orders".to_string(),
                name: "idx_account_status".to_string(),
                non_unique: true,
                column: "status".to_string(),
                index_type: "BTREE".to_string(),
            },
        ];
        let result =
            process_tables(&raw_table_names(), &[], &indexes, &[], &[], &[]).unwrap();
        let orders = result.iter().find(|t| t.name == "orders").unwrap();
        assert_eq!(orders.indexes.len(), 1);
        assert_eq!(
            orders.indexes[0].columns,
            vec!["account_id".to_string(), "status".to_string()]
        );
    }

    #[test]
    fn primary_key_constraint_is_named_primary() {
        let pks = vec![RawPrimaryKeyRow {
            table: "accounts".to_string(),
            column: "id".to_string(),
        }];
        let result = process_tables(&raw_table_names(), &[], &[], &pks, &[], &[]).unwrap();
        let accounts = result.iter().find(|t| t.name == "accounts").unwrap();
        assert_eq!(accounts.primary_key.as_ref().unwrap().name.as_deref(), Some("PRIMARY"));
    }
}
