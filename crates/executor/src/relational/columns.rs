//! Column definitions rendered from field kinds.

use crate::relational::dialect::Dialect;
use crate::relational::naming;
use crate::ExecutorError;
use common::types::{Field, FieldKind, Model};
use serde_json::Value;

/// One rendered column, kept in parts so dialects can restate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
    pub primary_key: Option<String>,
    /// Default clause including the `DEFAULT` keyword.
    pub default: Option<String>,
    pub check: Option<String>,
}

impl ColumnDef {
    pub fn render<D: Dialect + ?Sized>(&self, dialect: &D) -> String {
        let mut sql = format!("{} {}", dialect.quote(&self.name), self.sql_type);
        if let Some(pk) = &self.primary_key {
            sql.push(' ');
            sql.push_str(pk);
        }
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push(' ');
            sql.push_str(default);
        }
        if let Some(check) = &self.check {
            sql.push(' ');
            sql.push_str(check);
        }
        sql
    }
}

/// Column for `field` of `model`. Unknown field kinds are rejected here.
pub fn column<D: Dialect + ?Sized>(
    dialect: &D,
    model: &Model,
    field: &Field,
) -> Result<ColumnDef, ExecutorError> {
    let kind = field.kind()?;
    let sql_type = dialect.column_type(field, kind);

    if kind == FieldKind::Id {
        return Ok(ColumnDef {
            name: field.name.clone(),
            sql_type,
            not_null: false,
            primary_key: Some(dialect.primary_key(&naming::primary_key(model))),
            default: None,
            check: None,
        });
    }

    let default = default_literal(dialect, field, kind).map(|value| {
        if dialect.named_defaults() {
            format!(
                "CONSTRAINT {} DEFAULT {value}",
                dialect.quote(&naming::default_constraint(field))
            )
        } else {
            format!("DEFAULT {value}")
        }
    });

    Ok(ColumnDef {
        name: field.name.clone(),
        sql_type,
        not_null: field.required,
        primary_key: None,
        default,
        check: enum_check(dialect, field, kind),
    })
}

fn default_literal<D: Dialect + ?Sized>(dialect: &D, field: &Field, kind: FieldKind) -> Option<String> {
    match &field.default_value {
        None | Some(Value::Null) => matches!(kind, FieldKind::CreatedAt | FieldKind::UpdatedAt)
            .then(|| dialect.current_timestamp().to_string()),
        Some(Value::Bool(value)) => Some(dialect.boolean(*value).to_string()),
        Some(Value::Number(value)) => Some(value.to_string()),
        Some(Value::String(value)) => Some(dialect.literal(value)),
        Some(other) => Some(dialect.literal(&other.to_string())),
    }
}

fn enum_check<D: Dialect + ?Sized>(dialect: &D, field: &Field, kind: FieldKind) -> Option<String> {
    if kind != FieldKind::Enum || dialect.inline_enum() {
        return None;
    }
    let values = &field.enum_options.as_ref()?.select_list;
    if values.is_empty() {
        return None;
    }
    let values: Vec<String> = values.iter().map(|v| dialect.literal(v)).collect();
    Some(format!(
        "CONSTRAINT {} CHECK ({} IN ({}))",
        dialect.quote(&naming::check_constraint(field)),
        dialect.quote(&field.name),
        values.join(", ")
    ))
}

/// Whether the field becomes a column created with its table.
///
/// Reference columns are added with their foreign key once every table exists.
pub fn is_inline(field: &Field) -> Result<bool, ExecutorError> {
    Ok(field.kind()? != FieldKind::Reference)
}
