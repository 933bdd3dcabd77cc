use super::{decimal_digits, enum_width, quote_with, Dialect, Object};
use crate::relational::columns::ColumnDef;
use common::types::{DatabaseType, Field, FieldKind};

const FULL_TEXT_CATALOG: &str = "engine_catalog";

/// SQL Server. A table holds at most one full-text index, keyed on its
/// primary key, so search columns are added to and removed from that index.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsSql;

impl MsSql {
    fn object_id(&self, table: &str) -> String {
        format!("OBJECT_ID({})", self.literal(&self.quote(table)))
    }

    fn has_full_text_index(&self, table: &str) -> String {
        format!(
            "EXISTS (SELECT 1 FROM sys.fulltext_indexes WHERE object_id = {})",
            self.object_id(table)
        )
    }

    fn in_full_text_index(&self, table: &str, column: &str) -> String {
        format!(
            "EXISTS (SELECT 1 FROM sys.fulltext_index_columns fc \
             JOIN sys.columns c ON c.object_id = fc.object_id AND c.column_id = fc.column_id \
             WHERE fc.object_id = {} AND c.name = {})",
            self.object_id(table),
            self.literal(column)
        )
    }
}

impl Dialect for MsSql {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::SQLServer
    }

    fn quote(&self, ident: &str) -> String {
        quote_with(ident, '[', ']')
    }

    fn literal(&self, value: &str) -> String {
        format!("N'{}'", value.replace('\'', "''"))
    }

    fn exists(&self, object: Object<'_>) -> String {
        match object {
            Object::Table(table) => format!(
                "OBJECT_ID({}, N'U') IS NOT NULL",
                self.literal(&self.quote(table))
            ),
            Object::Column { table, column } => format!(
                "COL_LENGTH({}, {}) IS NOT NULL",
                self.literal(&self.quote(table)),
                self.literal(column)
            ),
            Object::Index { table, name } => format!(
                "EXISTS (SELECT 1 FROM sys.indexes WHERE name = {} AND object_id = {})",
                self.literal(name),
                self.object_id(table)
            ),
            Object::Constraint { table, name } => format!(
                "EXISTS (SELECT 1 FROM sys.objects WHERE name = {} AND parent_object_id = {})",
                self.literal(name),
                self.object_id(table)
            ),
        }
    }

    fn missing(&self, object: Object<'_>) -> String {
        match object {
            Object::Table(_) | Object::Column { .. } => self
                .exists(object)
                .replace(" IS NOT NULL", " IS NULL"),
            _ => format!("NOT {}", self.exists(object)),
        }
    }

    fn guard(&self, condition: &str, body: &str) -> String {
        format!("IF {condition} BEGIN {body}; END;")
    }

    fn column_type(&self, field: &Field, kind: FieldKind) -> String {
        match kind {
            FieldKind::Id => "BIGINT IDENTITY(1,1)".to_string(),
            FieldKind::Text => match field.max_length() {
                Some(n) if n <= 4000 => format!("NVARCHAR({n})"),
                _ => "NVARCHAR(MAX)".to_string(),
            },
            FieldKind::RichText | FieldKind::EncryptedText => "NVARCHAR(MAX)".to_string(),
            FieldKind::Email => "NVARCHAR(320)".to_string(),
            FieldKind::Link => "NVARCHAR(2048)".to_string(),
            FieldKind::Phone => "NVARCHAR(32)".to_string(),
            FieldKind::Boolean => "BIT".to_string(),
            FieldKind::Integer => "INTEGER".to_string(),
            FieldKind::Decimal => format!("DECIMAL(30, {})", decimal_digits(field)),
            FieldKind::Monetary => "MONEY".to_string(),
            FieldKind::CreatedAt | FieldKind::UpdatedAt | FieldKind::DateTime => {
                "DATETIMEOFFSET".to_string()
            }
            FieldKind::Date => "DATE".to_string(),
            FieldKind::Time => "TIME".to_string(),
            FieldKind::Enum => format!("NVARCHAR({})", enum_width(field)),
            FieldKind::GeoPoint => "GEOGRAPHY".to_string(),
            FieldKind::Binary => "VARBINARY(MAX)".to_string(),
            FieldKind::Json
            | FieldKind::BasicValuesList
            | FieldKind::Object
            | FieldKind::ObjectList => "NVARCHAR(MAX)".to_string(),
            FieldKind::Reference => "BIGINT".to_string(),
        }
    }

    fn current_timestamp(&self) -> &'static str {
        "SYSDATETIMEOFFSET()"
    }

    fn boolean(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn named_defaults(&self) -> bool {
        true
    }

    fn create_table(&self, table: &str, columns: &[String]) -> String {
        let body = format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.quote(table),
            columns.join(",\n  ")
        );
        self.guard(&self.missing(Object::Table(table)), &body)
    }

    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {};", self.quote(table))
    }

    fn rename_table(&self, from: &str, to: &str) -> String {
        format!(
            "EXEC sp_rename {}, {}",
            self.literal(&self.quote(from)),
            self.literal(to)
        )
    }

    fn add_column(&self, table: &str, definition: &str) -> String {
        format!("ALTER TABLE {} ADD {definition}", self.quote(table))
    }

    fn rename_column(&self, table: &str, from: &str, to: &str) -> String {
        format!(
            "EXEC sp_rename {}, {}, N'COLUMN'",
            self.literal(&format!("{}.{}", self.quote(table), self.quote(from))),
            self.literal(to)
        )
    }

    fn set_nullability(&self, table: &str, column: &ColumnDef) -> String {
        let null = if column.not_null { "NOT NULL" } else { "NULL" };
        format!(
            "ALTER TABLE {} ALTER COLUMN {} {} {null}",
            self.quote(table),
            self.quote(&column.name),
            column.sql_type
        )
    }

    fn add_full_text(&self, table: &str, column: &str, _name: &str, key_index: &str) -> String {
        let catalog = format!(
            "IF NOT EXISTS (SELECT 1 FROM sys.fulltext_catalogs WHERE name = {}) \
             CREATE FULLTEXT CATALOG {};",
            self.literal(FULL_TEXT_CATALOG),
            self.quote(FULL_TEXT_CATALOG)
        );
        let create = self.guard(
            &format!("NOT {}", self.has_full_text_index(table)),
            &format!(
                "CREATE FULLTEXT INDEX ON {} ({}) KEY INDEX {} ON {}",
                self.quote(table),
                self.quote(column),
                self.quote(key_index),
                self.quote(FULL_TEXT_CATALOG)
            ),
        );
        let extend = self.guard(
            &format!("NOT {}", self.in_full_text_index(table, column)),
            &format!(
                "ALTER FULLTEXT INDEX ON {} ADD ({})",
                self.quote(table),
                self.quote(column)
            ),
        );
        format!("{catalog}\n{create}\n{extend}")
    }

    fn drop_full_text(&self, table: &str, column: &str, _name: &str) -> String {
        self.guard(
            &self.in_full_text_index(table, column),
            &format!(
                "ALTER FULLTEXT INDEX ON {} DROP ({})",
                self.quote(table),
                self.quote(column)
            ),
        )
    }

    fn create_database(&self, name: &str) -> String {
        format!("CREATE DATABASE {};", self.quote(name))
    }

    fn databases_query(&self) -> &'static str {
        "SELECT name FROM sys.databases"
    }

    fn tables_query(&self) -> &'static str {
        "SELECT name FROM sys.tables"
    }
}
