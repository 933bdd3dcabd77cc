use crate::types::environment::Resource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    MongoDB,
    PostgreSQL,
    MySQL,
    #[serde(rename = "SQL Server")]
    SQLServer,
    Oracle,
}

impl DatabaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::MongoDB => "MongoDB",
            DatabaseType::PostgreSQL => "PostgreSQL",
            DatabaseType::MySQL => "MySQL",
            DatabaseType::SQLServer => "SQL Server",
            DatabaseType::Oracle => "Oracle",
        }
    }

    pub fn is_relational(&self) -> bool {
        !matches!(self, DatabaseType::MongoDB)
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRef {
    pub iid: String,
    pub name: String,
}

/// A tenant database design together with its models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub iid: String,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub db_type: DatabaseType,
    #[serde(default)]
    pub managed: bool,
    #[serde(default)]
    pub assign_unique_name: bool,
    #[serde(default)]
    pub schemas: Vec<SchemaRef>,
    #[serde(default)]
    pub models: Vec<Model>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DatabaseConfig {
    /// Name of the physical database backing this design.
    pub fn applied_name(&self, env_iid: &str) -> String {
        if self.assign_unique_name {
            format!("{}_{}", env_iid, self.iid)
        } else {
            self.name.clone()
        }
    }

    pub fn model(&self, iid: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.iid == iid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelType {
    Model,
    SubModel,
    SubModelList,
}

/// One ancestor step of a nested model, root first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyEntry {
    pub name: String,
    pub iid: String,
    /// Collection/table that stores the documents of this model.
    pub cname: String,
    #[serde(rename = "type")]
    pub model_type: ModelType,
    #[serde(default)]
    pub query_path: Option<String>,
}

/// A schema object. Nested models point at their parent via `parentiid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub iid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub model_type: ModelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parentiid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schemaiid: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub fields: Vec<Field>,

    // computed when the database is loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_hierarchy: Vec<HierarchyEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Model {
    pub fn is_top_level(&self) -> bool {
        self.model_type == ModelType::Model
    }

    pub fn field(&self, iid: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.iid == iid)
    }

    /// Nesting depth; 1 for top level models.
    pub fn depth(&self) -> usize {
        self.parent_hierarchy.len().max(1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldCreator {
    System,
    #[default]
    User,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceAction {
    #[serde(rename = "CASCADE")]
    Cascade,
    #[default]
    #[serde(rename = "NO ACTION")]
    NoAction,
    #[serde(rename = "SET NULL")]
    SetNull,
    #[serde(rename = "SET DEFAULT")]
    SetDefault,
}

impl ReferenceAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferenceAction::Cascade => "CASCADE",
            ReferenceAction::NoAction => "NO ACTION",
            ReferenceAction::SetNull => "SET NULL",
            ReferenceAction::SetDefault => "SET DEFAULT",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextOptions {
    #[serde(default)]
    pub searchable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceOptions {
    pub iid: String,
    #[serde(default)]
    pub action: ReferenceAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubModelRef {
    pub iid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumOptions {
    #[serde(default)]
    pub select_list: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecimalOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimal_digits: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub iid: String,
    pub name: String,
    /// Raw kind tag; resolve with [`Field::kind`].
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub creator: FieldCreator,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rich_text: Option<TextOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_text: Option<TextOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReferenceOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<SubModelRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_list: Option<SubModelRef>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_options: Option<EnumOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimal: Option<DecimalOptions>,

    // computed when the database is loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unwind_query_path: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Field {
    pub fn kind(&self) -> Result<FieldKind, UnknownFieldType> {
        self.field_type.parse()
    }

    /// Searchable text and rich-text fields take part in the full-text index.
    pub fn is_searchable(&self) -> bool {
        match self.field_type.as_str() {
            "text" => self.text.as_ref().is_some_and(|t| t.searchable),
            "rich-text" => self.rich_text.as_ref().is_some_and(|t| t.searchable),
            _ => false,
        }
    }

    pub fn is_sub_model(&self) -> bool {
        matches!(self.field_type.as_str(), "object" | "object-list")
    }

    pub fn sub_model_iid(&self) -> Option<&str> {
        match self.field_type.as_str() {
            "object" => self.object.as_ref().map(|o| o.iid.as_str()),
            "object-list" => self.object_list.as_ref().map(|o| o.iid.as_str()),
            _ => None,
        }
    }

    pub fn reference_iid(&self) -> Option<&str> {
        self.reference.as_ref().map(|r| r.iid.as_str())
    }

    pub fn reference_action(&self) -> Option<ReferenceAction> {
        self.reference.as_ref().map(|r| r.action)
    }

    pub fn max_length(&self) -> Option<u32> {
        match self.field_type.as_str() {
            "text" => self.text.as_ref().and_then(|t| t.max_length),
            "rich-text" => self.rich_text.as_ref().and_then(|t| t.max_length),
            "encrypted-text" => self.encrypted_text.as_ref().and_then(|t| t.max_length),
            _ => None,
        }
    }

    pub fn query_path(&self) -> &str {
        self.query_path.as_deref().unwrap_or(&self.name)
    }

    pub fn unwind_query_path(&self) -> &str {
        self.unwind_query_path.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Field type '{0}' is not supported")]
pub struct UnknownFieldType(pub String);

/// Every field kind the engine knows how to materialise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Id,
    Text,
    RichText,
    EncryptedText,
    Email,
    Link,
    Phone,
    Boolean,
    Integer,
    Decimal,
    Monetary,
    CreatedAt,
    UpdatedAt,
    DateTime,
    Date,
    Time,
    Enum,
    GeoPoint,
    Binary,
    Json,
    Reference,
    BasicValuesList,
    Object,
    ObjectList,
}

const FIELD_KINDS: &[(&str, FieldKind)] = &[
    ("id", FieldKind::Id),
    ("text", FieldKind::Text),
    ("rich-text", FieldKind::RichText),
    ("encrypted-text", FieldKind::EncryptedText),
    ("email", FieldKind::Email),
    ("link", FieldKind::Link),
    ("phone", FieldKind::Phone),
    ("boolean", FieldKind::Boolean),
    ("integer", FieldKind::Integer),
    ("decimal", FieldKind::Decimal),
    ("monetary", FieldKind::Monetary),
    ("createdat", FieldKind::CreatedAt),
    ("updatedat", FieldKind::UpdatedAt),
    ("datetime", FieldKind::DateTime),
    ("date", FieldKind::Date),
    ("time", FieldKind::Time),
    ("enum", FieldKind::Enum),
    ("geo-point", FieldKind::GeoPoint),
    ("binary", FieldKind::Binary),
    ("json", FieldKind::Json),
    ("reference", FieldKind::Reference),
    ("basic-values-list", FieldKind::BasicValuesList),
    ("object", FieldKind::Object),
    ("object-list", FieldKind::ObjectList),
];

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        FIELD_KINDS
            .iter()
            .find(|(_, kind)| kind == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }
}

impl FromStr for FieldKind {
    type Err = UnknownFieldType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FIELD_KINDS
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| UnknownFieldType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(value: Value) -> Field {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn kind_lookup_rejects_unknown_tags() {
        assert_eq!("geo-point".parse::<FieldKind>(), Ok(FieldKind::GeoPoint));
        assert_eq!(FieldKind::BasicValuesList.as_str(), "basic-values-list");
        let err = "hologram".parse::<FieldKind>().unwrap_err();
        assert_eq!(err.to_string(), "Field type 'hologram' is not supported");
    }

    #[test]
    fn searchable_depends_on_matching_options() {
        let text = field(json!({
            "iid": "f1", "name": "bio", "type": "text",
            "updatedAt": "2024-01-01T00:00:00Z",
            "text": {"searchable": true, "maxLength": 200, "trim": "any"}
        }));
        assert!(text.is_searchable());
        assert_eq!(text.max_length(), Some(200));
        assert_eq!(text.text.as_ref().unwrap().extra.get("trim"), Some(&json!("any")));

        // rich-text reads its own options, not `text`
        let rich = field(json!({
            "iid": "f2", "name": "body", "type": "rich-text",
            "updatedAt": "2024-01-01T00:00:00Z",
            "text": {"searchable": true}
        }));
        assert!(!rich.is_searchable());
    }

    #[test]
    fn derived_paths_are_optional_on_input() {
        let f = field(json!({
            "iid": "f3", "name": "tags", "type": "object-list",
            "creator": "system", "updatedAt": "2024-01-01T00:00:00Z",
            "objectList": {"iid": "m2"}
        }));
        assert_eq!(f.creator, FieldCreator::System);
        assert_eq!(f.sub_model_iid(), Some("m2"));
        assert_eq!(f.query_path(), "tags");
        let out = serde_json::to_value(&f).unwrap();
        assert!(out.get("queryPath").is_none());
    }

    #[test]
    fn applied_name_prefixes_environment_when_unique() {
        let mut db: DatabaseConfig = serde_json::from_value(json!({
            "iid": "db-1", "name": "shop", "type": "SQL Server", "managed": true
        }))
        .unwrap();
        assert_eq!(db.db_type, DatabaseType::SQLServer);
        assert_eq!(db.applied_name("env-1"), "shop");
        db.assign_unique_name = true;
        assert_eq!(db.applied_name("env-1"), "env-1_db-1");
    }
}
