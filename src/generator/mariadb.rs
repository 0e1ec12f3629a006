//! MariaDB rendering: backtick-quoted identifiers, `START TRANSACTION;`,
//! `ENGINE=InnoDB` on every `CREATE TABLE`.

use crate::differ::DiffResult;
use crate::model::{Column, GenerationKind};

use super::{render, DialectSql, GenOptions};

pub struct MariaDbSql;

impl DialectSql for MariaDbSql {
    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn create_table_suffix(&self) -> &'static str {
        " ENGINE=InnoDB"
    }

    fn column_extra(&self, column: &Column) -> Option<&'static str> {
        match column.generated {
            GenerationKind::AutoIncrement => Some("AUTO_INCREMENT"),
            _ => None,
        }
    }

    fn begin_stmt(&self) -> &'static str {
        "START TRANSACTION;"
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

    fn identity_todo(&self, _table: &str, _column: &Column) -> Option<String> {
        None
    }
}

/// Render `diff` as a MariaDB script.
pub fn to_mariadb(diff: &DiffResult, opts: &GenOptions) -> String {
    render(&MariaDbSql, diff, opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers_with_backticks() {
        let dialect = MariaDbSql;
        assert_eq!(dialect.quote_ident("weird`name"), "`weird``name`");
    }

    #[test]
    fn auto_increment_is_the_only_column_extra() {
        let dialect = MariaDbSql;
        let mut col = Column::new("id", "int");
        col.generated = GenerationKind::AutoIncrement;
        assert_eq!(dialect.column_extra(&col), Some("AUTO_INCREMENT"));

        let plain = Column::new("name", "varchar");
        assert_eq!(dialect.column_extra(&plain), None);
    }

    #[test]
    fn identity_todo_is_not_emitted_for_mariadb() {
        let dialect = MariaDbSql;
        let col = Column::new("id", "int");
        assert!(dialect.identity_todo("accounts", &col).is_none());
    }
}
