use super::{decimal_digits, enum_width, quote_with, Dialect, Object};
use crate::relational::columns::ColumnDef;
use common::types::{DatabaseType, Field, FieldKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    fn quote(&self, ident: &str) -> String {
        quote_with(ident, '"', '"')
    }

    fn exists(&self, object: Object<'_>) -> String {
        match object {
            Object::Table(table) => format!(
                "EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = {})",
                self.literal(table)
            ),
            Object::Column { table, column } => format!(
                "EXISTS (SELECT 1 FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = {} AND column_name = {})",
                self.literal(table),
                self.literal(column)
            ),
            Object::Index { table, name } => format!(
                "EXISTS (SELECT 1 FROM pg_indexes \
                 WHERE schemaname = current_schema() AND tablename = {} AND indexname = {})",
                self.literal(table),
                self.literal(name)
            ),
            Object::Constraint { table, name } => format!(
                "EXISTS (SELECT 1 FROM information_schema.table_constraints \
                 WHERE table_schema = current_schema() AND table_name = {} AND constraint_name = {})",
                self.literal(table),
                self.literal(name)
            ),
        }
    }

    fn guard(&self, condition: &str, body: &str) -> String {
        format!("DO $$ BEGIN IF {condition} THEN {body}; END IF; END $$;")
    }

    fn column_type(&self, field: &Field, kind: FieldKind) -> String {
        match kind {
            FieldKind::Id => "BIGSERIAL".to_string(),
            FieldKind::Text => match field.max_length() {
                Some(n) => format!("VARCHAR({n})"),
                None => "TEXT".to_string(),
            },
            FieldKind::RichText | FieldKind::EncryptedText => "TEXT".to_string(),
            FieldKind::Email => "VARCHAR(320)".to_string(),
            FieldKind::Link => "VARCHAR(2048)".to_string(),
            FieldKind::Phone => "VARCHAR(32)".to_string(),
            FieldKind::Boolean => "BOOLEAN".to_string(),
            FieldKind::Integer => "INTEGER".to_string(),
            FieldKind::Decimal => format!("NUMERIC(30, {})", decimal_digits(field)),
            FieldKind::Monetary => "NUMERIC(19, 4)".to_string(),
            FieldKind::CreatedAt | FieldKind::UpdatedAt | FieldKind::DateTime => {
                "TIMESTAMPTZ".to_string()
            }
            FieldKind::Date => "DATE".to_string(),
            FieldKind::Time => "TIME".to_string(),
            FieldKind::Enum => format!("VARCHAR({})", enum_width(field)),
            FieldKind::GeoPoint => "POINT".to_string(),
            FieldKind::Binary => "BYTEA".to_string(),
            FieldKind::Json
            | FieldKind::BasicValuesList
            | FieldKind::Object
            | FieldKind::ObjectList => "JSONB".to_string(),
            FieldKind::Reference => "BIGINT".to_string(),
        }
    }

    fn current_timestamp(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {} CASCADE;", self.quote(table))
    }

    fn set_nullability(&self, table: &str, column: &ColumnDef) -> String {
        let action = if column.not_null { "SET" } else { "DROP" };
        format!(
            "ALTER TABLE {} ALTER COLUMN {} {action} NOT NULL",
            self.quote(table),
            self.quote(&column.name)
        )
    }

    fn drop_index(&self, _table: &str, name: &str) -> String {
        format!("DROP INDEX {}", self.quote(name))
    }

    fn add_full_text(&self, table: &str, column: &str, name: &str, _key_index: &str) -> String {
        let body = format!(
            "CREATE INDEX {} ON {} USING GIN (to_tsvector('simple', coalesce({}, '')))",
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
        format!("CREATE DATABASE {};", self.quote(name))
    }

    fn databases_query(&self) -> &'static str {
        "SELECT datname::text FROM pg_database WHERE datistemplate = false"
    }

    fn tables_query(&self) -> &'static str {
        "SELECT table_name::text FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'"
    }
}
