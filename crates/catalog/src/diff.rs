//! Model Change Detector.
//!
//! Models and fields are matched by iid. A differing `updatedAt` is the only
//! change trigger, so a touched but structurally identical definition is still
//! reported as updated.

use common::types::{Field, Model};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSet {
    pub added: Vec<Model>,
    pub updated: Vec<ModelDelta>,
    pub deleted: Vec<Model>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Updated models, shallowest first.
    pub fn updated_by_depth(&self) -> Vec<&ModelDelta> {
        let mut updated: Vec<&ModelDelta> = self.updated.iter().collect();
        updated.sort_by_key(|delta| delta.model.depth());
        updated
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDelta {
    pub iid: String,
    pub is_name_changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_name: Option<String>,
    pub field_changes: FieldChanges,
    #[serde(skip)]
    pub model: Model,
    #[serde(skip)]
    pub previous: Model,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldChanges {
    pub added: Vec<Field>,
    pub updated: Vec<FieldDelta>,
    pub deleted: Vec<Field>,
}

impl FieldChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDelta {
    pub iid: String,
    pub is_name_changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_name: Option<String>,
    pub is_required_changed: bool,
    pub is_indexed_changed: bool,
    pub is_unique_changed: bool,
    pub is_searchable_changed: bool,
    pub is_ref_changed: bool,
    /// Model the field referenced before a reference change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_iid: Option<String>,
    pub is_action_changed: bool,
    #[serde(skip)]
    pub field: Field,
    #[serde(skip)]
    pub previous: Field,
}

impl FieldDelta {
    fn between(previous: &Field, field: &Field) -> Self {
        let is_name_changed = previous.name != field.name;
        let is_ref_changed = previous.reference_iid() != field.reference_iid();
        Self {
            iid: field.iid.clone(),
            is_name_changed,
            old_name: is_name_changed.then(|| previous.name.clone()),
            is_required_changed: previous.required != field.required,
            is_indexed_changed: previous.indexed != field.indexed,
            is_unique_changed: previous.unique != field.unique,
            is_searchable_changed: previous.is_searchable() != field.is_searchable(),
            is_ref_changed,
            old_iid: if is_ref_changed {
                previous.reference_iid().map(str::to_string)
            } else {
                None
            },
            is_action_changed: previous.reference_action() != field.reference_action(),
            field: field.clone(),
            previous: previous.clone(),
        }
    }
}

fn field_changes(previous: &Model, model: &Model) -> FieldChanges {
    let prev_fields: HashMap<&str, &Field> =
        previous.fields.iter().map(|f| (f.iid.as_str(), f)).collect();
    let mut changes = FieldChanges::default();

    for field in &model.fields {
        match prev_fields.get(field.iid.as_str()) {
            None => changes.added.push(field.clone()),
            Some(prev) if prev.updated_at != field.updated_at => {
                changes.updated.push(FieldDelta::between(prev, field))
            }
            Some(_) => {}
        }
    }

    changes.deleted = previous
        .fields
        .iter()
        .filter(|f| model.field(&f.iid).is_none())
        .cloned()
        .collect();
    changes
}

/// Structural diff between two versions of a database's models.
///
/// `None` when there is no previous configuration or nothing changed.
pub fn diff(prev: Option<&[Model]>, curr: &[Model]) -> Option<ChangeSet> {
    let prev = prev?;
    let prev_models: HashMap<&str, &Model> = prev.iter().map(|m| (m.iid.as_str(), m)).collect();
    let mut changes = ChangeSet::default();

    for model in curr {
        match prev_models.get(model.iid.as_str()) {
            None => changes.added.push(model.clone()),
            Some(previous) if previous.updated_at != model.updated_at => {
                let is_name_changed = previous.name != model.name;
                changes.updated.push(ModelDelta {
                    iid: model.iid.clone(),
                    is_name_changed,
                    old_name: is_name_changed.then(|| previous.name.clone()),
                    field_changes: field_changes(previous, model),
                    model: model.clone(),
                    previous: (*previous).clone(),
                });
            }
            Some(_) => {}
        }
    }

    let current: HashMap<&str, &Model> = curr.iter().map(|m| (m.iid.as_str(), m)).collect();
    changes.deleted = prev
        .iter()
        .filter(|m| !current.contains_key(m.iid.as_str()))
        .cloned()
        .collect();

    (!changes.is_empty()).then_some(changes)
}
