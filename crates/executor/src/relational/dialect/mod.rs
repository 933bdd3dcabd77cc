//! SQL dialects.
//!
//! A dialect renders single statements and catalog predicates. Idempotence is
//! added by wrapping bodies in [`Dialect::guard`], which every dialect
//! implements with whatever conditional construct its server offers.

mod mssql;
mod mysql;
mod postgres;

pub use mssql::MsSql;
pub use mysql::MySql;
pub use postgres::Postgres;

use crate::relational::columns::ColumnDef;
use common::types::{DatabaseType, Field, FieldKind};

/// Catalog object whose presence a guard checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Object<'a> {
    Table(&'a str),
    Column { table: &'a str, column: &'a str },
    Index { table: &'a str, name: &'a str },
    Constraint { table: &'a str, name: &'a str },
}

pub trait Dialect: Send + Sync + 'static {
    fn db_type(&self) -> DatabaseType;

    fn quote(&self, ident: &str) -> String;

    fn literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Boolean SQL expression that holds when `object` exists.
    fn exists(&self, object: Object<'_>) -> String;

    fn missing(&self, object: Object<'_>) -> String {
        format!("NOT {}", self.exists(object))
    }

    /// Runs `body` only when `condition` holds.
    fn guard(&self, condition: &str, body: &str) -> String;

    fn column_type(&self, field: &Field, kind: FieldKind) -> String;

    fn current_timestamp(&self) -> &'static str;

    fn boolean(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn primary_key(&self, name: &str) -> String {
        format!("CONSTRAINT {} PRIMARY KEY", self.quote(name))
    }

    /// Enumerations become a native type instead of a check constraint.
    fn inline_enum(&self) -> bool {
        false
    }

    /// Defaults carry a constraint name, so they can be dropped before their column.
    fn named_defaults(&self) -> bool {
        false
    }

    /// Column reference inside an index key.
    fn index_key(&self, column: &str, _field: &Field) -> String {
        self.quote(column)
    }

    fn create_table(&self, table: &str, columns: &[String]) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n);",
            self.quote(table),
            columns.join(",\n  ")
        )
    }

    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {};", self.quote(table))
    }

    fn rename_table(&self, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote(from),
            self.quote(to)
        )
    }

    fn add_column(&self, table: &str, definition: &str) -> String {
        format!("ALTER TABLE {} ADD COLUMN {definition}", self.quote(table))
    }

    fn drop_column(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote(table),
            self.quote(column)
        )
    }

    fn rename_column(&self, table: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote(table),
            self.quote(from),
            self.quote(to)
        )
    }

    fn set_nullability(&self, table: &str, column: &ColumnDef) -> String;

    fn create_index(&self, table: &str, name: &str, key: &str) -> String {
        format!(
            "CREATE INDEX {} ON {} ({key})",
            self.quote(name),
            self.quote(table)
        )
    }

    fn drop_index(&self, table: &str, name: &str) -> String {
        format!("DROP INDEX {} ON {}", self.quote(name), self.quote(table))
    }

    fn add_unique(&self, table: &str, name: &str, key: &str) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({key})",
            self.quote(table),
            self.quote(name)
        )
    }

    fn drop_constraint(&self, table: &str, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote(table),
            self.quote(name)
        )
    }

    fn drop_unique(&self, table: &str, name: &str) -> String {
        self.drop_constraint(table, name)
    }

    fn drop_foreign_key(&self, table: &str, name: &str) -> String {
        self.drop_constraint(table, name)
    }

    /// Complete, guarded statement adding `column` to the table's full-text search.
    fn add_full_text(&self, table: &str, column: &str, name: &str, key_index: &str) -> String;

    fn drop_full_text(&self, table: &str, column: &str, name: &str) -> String;

    fn create_database(&self, name: &str) -> String;

    fn drop_database(&self, name: &str) -> String {
        format!("DROP DATABASE IF EXISTS {};", self.quote(name))
    }

    /// Query listing database names in its first column.
    fn databases_query(&self) -> &'static str;

    /// Query listing the base tables of the current database.
    fn tables_query(&self) -> &'static str;
}

pub(crate) fn quote_with(ident: &str, open: char, close: char) -> String {
    let escaped = ident.replace(close, &format!("{close}{close}"));
    format!("{open}{escaped}{close}")
}

/// `VARCHAR` length able to hold every enumeration value.
pub(crate) fn enum_width(field: &Field) -> usize {
    field
        .enum_options
        .as_ref()
        .and_then(|e| e.select_list.iter().map(|v| v.chars().count()).max())
        .unwrap_or(0)
        .max(255)
}

pub(crate) fn decimal_digits(field: &Field) -> u32 {
    field
        .decimal
        .as_ref()
        .and_then(|d| d.decimal_digits)
        .unwrap_or(2)
}
