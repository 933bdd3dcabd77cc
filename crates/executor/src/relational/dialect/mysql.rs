use super::{decimal_digits, quote_with, Dialect, Object};
use crate::relational::columns::ColumnDef;
use common::types::{DatabaseType, Field, FieldKind};

const GUARD_PROCEDURE: &str = "engine_guard";
/// Key prefix for text columns without a declared length.
const TEXT_KEY_PREFIX: u32 = 255;

/// MySQL 8. Conditional DDL only exists inside stored programs, so guards
/// run through a throwaway procedure.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    fn quote(&self, ident: &str) -> String {
        quote_with(ident, '`', '`')
    }

    fn exists(&self, object: Object<'_>) -> String {
        match object {
            Object::Table(table) => format!(
                "EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = {})",
                self.literal(table)
            ),
            Object::Column { table, column } => format!(
                "EXISTS (SELECT 1 FROM information_schema.columns \
                 WHERE table_schema = DATABASE() AND table_name = {} AND column_name = {})",
                self.literal(table),
                self.literal(column)
            ),
            Object::Index { table, name } => format!(
                "EXISTS (SELECT 1 FROM information_schema.statistics \
                 WHERE table_schema = DATABASE() AND table_name = {} AND index_name = {})",
                self.literal(table),
                self.literal(name)
            ),
            Object::Constraint { table, name } => format!(
                "EXISTS (SELECT 1 FROM information_schema.table_constraints \
                 WHERE table_schema = DATABASE() AND table_name = {} AND constraint_name = {})",
                self.literal(table),
                self.literal(name)
            ),
        }
    }

    fn guard(&self, condition: &str, body: &str) -> String {
        format!(
            "DROP PROCEDURE IF EXISTS {GUARD_PROCEDURE};\n\
             CREATE PROCEDURE {GUARD_PROCEDURE}() BEGIN IF {condition} THEN {body}; END IF; END;\n\
             CALL {GUARD_PROCEDURE}();\n\
             DROP PROCEDURE IF EXISTS {GUARD_PROCEDURE};"
        )
    }

    fn column_type(&self, field: &Field, kind: FieldKind) -> String {
        match kind {
            FieldKind::Id => "BIGINT AUTO_INCREMENT".to_string(),
            FieldKind::Text => match field.max_length() {
                Some(n) => format!("VARCHAR({n})"),
                None => "TEXT".to_string(),
            },
            FieldKind::RichText | FieldKind::EncryptedText => "LONGTEXT".to_string(),
            FieldKind::Email => "VARCHAR(320)".to_string(),
            FieldKind::Link => "VARCHAR(2048)".to_string(),
            FieldKind::Phone => "VARCHAR(32)".to_string(),
            FieldKind::Boolean => "BOOLEAN".to_string(),
            FieldKind::Integer => "INTEGER".to_string(),
            FieldKind::Decimal => format!("DECIMAL(30, {})", decimal_digits(field)),
            FieldKind::Monetary => "DECIMAL(19, 4)".to_string(),
            FieldKind::CreatedAt | FieldKind::UpdatedAt | FieldKind::DateTime => {
                "DATETIME(3)".to_string()
            }
            FieldKind::Date => "DATE".to_string(),
            FieldKind::Time => "TIME".to_string(),
            FieldKind::Enum => {
                let values = field
                    .enum_options
                    .as_ref()
                    .map(|e| e.select_list.as_slice())
                    .unwrap_or_default();
                if values.is_empty() {
                    "VARCHAR(255)".to_string()
                } else {
                    let values: Vec<String> = values.iter().map(|v| self.literal(v)).collect();
                    format!("ENUM({})", values.join(", "))
                }
            }
            FieldKind::GeoPoint => "POINT".to_string(),
            FieldKind::Binary => "LONGBLOB".to_string(),
            FieldKind::Json
            | FieldKind::BasicValuesList
            | FieldKind::Object
            | FieldKind::ObjectList => "JSON".to_string(),
            FieldKind::Reference => "BIGINT".to_string(),
        }
    }

    fn current_timestamp(&self) -> &'static str {
        "CURRENT_TIMESTAMP(3)"
    }

    // the primary key index is always called PRIMARY
    fn primary_key(&self, _name: &str) -> String {
        "PRIMARY KEY".to_string()
    }

    fn inline_enum(&self) -> bool {
        true
    }

    fn index_key(&self, column: &str, field: &Field) -> String {
        let unbounded = matches!(
            field.kind(),
            Ok(FieldKind::Text | FieldKind::RichText | FieldKind::EncryptedText)
        ) && field.max_length().is_none();
        if unbounded {
            format!("{}({TEXT_KEY_PREFIX})", self.quote(column))
        } else {
            self.quote(column)
        }
    }

    fn rename_table(&self, from: &str, to: &str) -> String {
        format!("RENAME TABLE {} TO {}", self.quote(from), self.quote(to))
    }

    fn set_nullability(&self, table: &str, column: &ColumnDef) -> String {
        format!(
            "ALTER TABLE {} MODIFY COLUMN {}",
            self.quote(table),
            column.render(self)
        )
    }

    fn drop_unique(&self, table: &str, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP INDEX {}",
            self.quote(table),
            self.quote(name)
        )
    }

    fn drop_foreign_key(&self, table: &str, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP FOREIGN KEY {}",
            self.quote(table),
            self.quote(name)
        )
    }

    fn add_full_text(&self, table: &str, column: &str, name: &str, _key_index: &str) -> String {
        let body = format!(
            "CREATE FULLTEXT INDEX {} ON {} ({})",
            self.quote(name),
            self.quote(table),
            self.quote(column)
        );
        self.guard(&self.missing(Object::Index { table, name }), &body)
    }

    fn drop_full_text(&self, table: &str, _column: &str, name: &str) -> String {
        self.guard(
            &self.exists(Object::Index { table, name }),
            &self.drop_index(table, name),
        )
    }

    fn create_database(&self, name: &str) -> String {
        format!("CREATE DATABASE IF NOT EXISTS {};", self.quote(name))
    }

    fn databases_query(&self) -> &'static str {
        "SELECT schema_name FROM information_schema.schemata"
    }

    fn tables_query(&self) -> &'static str {
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'"
    }
}
