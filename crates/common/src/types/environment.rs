use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionRef {
    #[serde(default)]
    pub name: String,
}

/// Tenant environment as carried by every job.
///
/// Attributes the engine does not interpret are kept in `extra` so the cached
/// `{env}.object` matches what the platform sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub iid: String,
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub org_id: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub version_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: VersionRef,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub mappings: Vec<ResourceMapping>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Environment {
    /// Resolves the resource mapped to a database design through `mappings`.
    pub fn resource_for(&self, design_iid: &str) -> Option<&Resource> {
        let mapping = self.mappings.iter().find(|m| m.design.iid == design_iid)?;
        self.resources
            .iter()
            .find(|r| r.iid == mapping.resource.iid)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IidRef {
    pub iid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMapping {
    pub design: IidRef,
    pub resource: IidRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub iid: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub resource_type: String,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub access: ResourceAccess,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Connection settings of a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAccess {
    #[serde(default)]
    pub host: String,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Logical database to connect to; empty until a relational backend
    /// switches to the database it created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conn_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conn_options: Option<String>,
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    struct PortVisitor;

    impl<'de> serde::de::Visitor<'de> for PortVisitor {
        type Value = Option<u16>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer port value")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            u16::try_from(value)
                .map(Some)
                .map_err(|_| E::custom(format!("port {value} is out of range")))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if value < 0 {
                return Err(E::custom("port cannot be negative"));
            }
            self.visit_u64(value as u64)
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if value.is_empty() {
                return Ok(None);
            }
            value
                .parse::<u16>()
                .map(Some)
                .map_err(|_| E::custom(format!("invalid port '{value}'")))
        }
    }

    deserializer.deserialize_any(PortVisitor)
}
