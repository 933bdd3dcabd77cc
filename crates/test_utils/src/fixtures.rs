//! Builders for the payload types used across the engine's tests.

use chrono::{DateTime, TimeZone, Utc};
use common::types::{
    DatabaseConfig, DatabaseType, Environment, Field, FieldCreator, Job, Model, ModelType,
    ReferenceAction, Resource, ResourceAccess, ResourceMapping,
};
use common::types::environment::{IidRef, VersionRef};
use common::types::schema::{ReferenceOptions, SubModelRef, TextOptions};
use serde_json::Map;

/// Fixed instant `secs` seconds after 2024-01-01T00:00:00Z.
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .map(|base| base + chrono::Duration::seconds(secs))
        .unwrap_or_default()
}

pub struct FieldBuilder {
    field: Field,
}

pub fn field(iid: &str, name: &str, kind: &str) -> FieldBuilder {
    FieldBuilder {
        field: Field {
            iid: iid.to_string(),
            name: name.to_string(),
            field_type: kind.to_string(),
            creator: FieldCreator::User,
            order: 0,
            required: false,
            unique: false,
            indexed: false,
            default_value: None,
            updated_at: ts(0),
            text: None,
            rich_text: None,
            encrypted_text: None,
            reference: None,
            object: None,
            object_list: None,
            enum_options: None,
            decimal: None,
            query_path: None,
            unwind_query_path: None,
            extra: Map::new(),
        },
    }
}

impl FieldBuilder {
    pub fn system(mut self) -> Self {
        self.field.creator = FieldCreator::System;
        self
    }

    pub fn order(mut self, order: i64) -> Self {
        self.field.order = order;
        self
    }

    pub fn required(mut self) -> Self {
        self.field.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.field.unique = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.field.indexed = true;
        self
    }

    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.field.default_value = Some(value);
        self
    }

    pub fn searchable(mut self) -> Self {
        let options = TextOptions {
            searchable: true,
            ..Default::default()
        };
        match self.field.field_type.as_str() {
            "rich-text" => self.field.rich_text = Some(options),
            _ => self.field.text = Some(options),
        }
        self
    }

    pub fn max_length(mut self, max: u32) -> Self {
        let options = self.field.text.get_or_insert_with(Default::default);
        options.max_length = Some(max);
        self
    }

    pub fn reference(mut self, model_iid: &str, action: ReferenceAction) -> Self {
        self.field.reference = Some(ReferenceOptions {
            iid: model_iid.to_string(),
            action,
        });
        self
    }

    /// Points an `object` or `object-list` field at its sub-model.
    pub fn sub_model(mut self, model_iid: &str) -> Self {
        let target = Some(SubModelRef {
            iid: model_iid.to_string(),
        });
        if self.field.field_type == "object-list" {
            self.field.object_list = target;
        } else {
            self.field.object = target;
        }
        self
    }

    pub fn updated(mut self, secs: i64) -> Self {
        self.field.updated_at = ts(secs);
        self
    }

    pub fn build(self) -> Field {
        self.field
    }
}

pub struct ModelBuilder {
    model: Model,
}

pub fn model(iid: &str, name: &str) -> ModelBuilder {
    ModelBuilder {
        model: Model {
            iid: iid.to_string(),
            name: name.to_string(),
            model_type: ModelType::Model,
            parentiid: None,
            schemaiid: None,
            updated_at: ts(0),
            fields: Vec::new(),
            query_path: None,
            parent_hierarchy: Vec::new(),
            schema: None,
            extra: Map::new(),
        },
    }
}

impl ModelBuilder {
    pub fn nested(mut self, parent_iid: &str, model_type: ModelType) -> Self {
        self.model.parentiid = Some(parent_iid.to_string());
        self.model.model_type = model_type;
        self
    }

    pub fn field(mut self, field: FieldBuilder) -> Self {
        self.model.fields.push(field.build());
        self
    }

    pub fn updated(mut self, secs: i64) -> Self {
        self.model.updated_at = ts(secs);
        self
    }

    pub fn build(self) -> Model {
        self.model
    }
}

pub fn resource(iid: &str) -> Resource {
    Resource {
        iid: iid.to_string(),
        name: format!("{iid}-resource"),
        access: ResourceAccess {
            host: "db.internal".to_string(),
            port: Some(5432),
            username: "engine".to_string(),
            password: "secret".to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn database(iid: &str, db_type: DatabaseType, models: Vec<Model>) -> DatabaseConfig {
    DatabaseConfig {
        iid: iid.to_string(),
        id: None,
        name: format!("{iid}_db"),
        db_type,
        managed: true,
        assign_unique_name: false,
        schemas: Vec::new(),
        models,
        resource: None,
        extra: Map::new(),
    }
}

/// Environment whose mappings resolve every listed database to its own resource.
pub fn environment(iid: &str, db_iids: &[&str]) -> Environment {
    Environment {
        iid: iid.to_string(),
        id: format!("{iid}-id"),
        org_id: "org1".to_string(),
        app_id: "app1".to_string(),
        version_id: "ver1".to_string(),
        name: "production".to_string(),
        version: VersionRef {
            name: "v1".to_string(),
        },
        resources: db_iids
            .iter()
            .map(|db| resource(&format!("res-{db}")))
            .collect(),
        mappings: db_iids
            .iter()
            .map(|db| ResourceMapping {
                design: IidRef {
                    iid: db.to_string(),
                },
                resource: IidRef {
                    iid: format!("res-{db}"),
                },
            })
            .collect(),
        extra: Map::new(),
    }
}

pub fn job(env: Environment, timestamp: DateTime<Utc>, databases: Vec<DatabaseConfig>) -> Job {
    Job {
        env,
        timestamp,
        callback: Some("http://platform.local/env/log".to_string()),
        actor: None,
        app: Default::default(),
        action: None,
        sub_action: Default::default(),
        databases,
        endpoints: Vec::new(),
        functions: Vec::new(),
        middlewares: Vec::new(),
        queues: Vec::new(),
        tasks: Vec::new(),
        storages: Vec::new(),
        caches: Vec::new(),
        updated_resource: None,
        drop_data: None,
    }
}
