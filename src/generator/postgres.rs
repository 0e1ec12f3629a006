//! PostgreSQL rendering: double-quoted identifiers, `BEGIN;`/`COMMIT;`.

use crate::differ::DiffResult;
use crate::model::Column;

use super::{render, DialectSql, GenOptions};

pub struct PostgresSql;

impl DialectSql for PostgresSql {
    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn create_table_suffix(&self) -> &'static str {
        ""
    }

    fn column_extra(&self, _column: &Column) -> Option<&'static str> {
        None
    }

    fn begin_stmt(&self) -> &'static str {
        "BEGIN;"
    }

    fn commit_stmt(&self) -> &'static str {
        "COMMIT;"
    }

    fn column_type_sql(&self, column: &Column) -> String {
        match (column.length, column.precision_scale) {
            (Some(len), _) => format!("{}({})", column.data_type, len),
            (None, Some((p, s))) => format!("{}({}, {})", column.data_type, p, s),
            (None, None) => column.data_type.clone(),
        }
    }

    fn identity_todo(&self, table: &str, column: &Column) -> Option<String> {
        Some(format!(
            "-- TODO: ensure generation strategy is preserved for {}.{}",
            table, column.name
        ))
    }
}

/// Render `diff` as a PostgreSQL script.
pub fn to_postgres(diff: &DiffResult, opts: &GenOptions) -> String {
    render(&PostgresSql, diff, opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers_with_doubled_internal_quotes() {
        let dialect = PostgresSql;
        assert_eq!(dialect.quote_ident("weird\"name"), "\"weird\"\"name\"");
    }

    #[test]
    fn renders_length_and_precision() {
        let dialect = PostgresSql;
        let mut col = Column::new("amount", "numeric");
        col.precision_scale = Some((10, 2));
        assert_eq!(dialect.column_type_sql(&col), "numeric(10, 2)");

        let mut col2 = Column::new("name", "varchar");
        col2.length = Some(255);
        assert_eq!(dialect.column_type_sql(&col2), "varchar(255)");
    }
}
