//! Derived model attributes: query paths, unwind paths, and parent hierarchies.
//!
//! Models reference their parent by iid only, so the tree is walked over the
//! model slice by index and every resolved model is memoized.

use crate::error::CatalogError;
use common::types::{DatabaseConfig, Field, FieldCreator, HierarchyEntry, Model, ModelType};
use std::collections::HashMap;

const UNWIND: &str = "$[]";

#[derive(Debug, Clone)]
struct Resolved {
    query_path: Option<String>,
    unwind_path: Option<String>,
    cname: String,
    hierarchy: Vec<HierarchyEntry>,
}

enum Slot {
    Pending,
    Visiting,
    Done(Resolved),
}

struct ModelTree<'a> {
    models: &'a [Model],
    by_iid: HashMap<&'a str, usize>,
    slots: Vec<Slot>,
}

fn join(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(parent) => format!("{parent}.{name}"),
        None => name.to_string(),
    }
}

impl<'a> ModelTree<'a> {
    fn new(models: &'a [Model]) -> Self {
        Self {
            models,
            by_iid: models
                .iter()
                .enumerate()
                .map(|(idx, m)| (m.iid.as_str(), idx))
                .collect(),
            slots: models.iter().map(|_| Slot::Pending).collect(),
        }
    }

    fn resolve(&mut self, idx: usize) -> Result<&Resolved, CatalogError> {
        self.fill(idx)?;
        match &self.slots[idx] {
            Slot::Done(resolved) => Ok(resolved),
            _ => Err(CatalogError::cycle(format!(
                "model '{}' was not resolved",
                self.models[idx].name
            ))),
        }
    }

    fn fill(&mut self, idx: usize) -> Result<(), CatalogError> {
        match self.slots[idx] {
            Slot::Done(_) => return Ok(()),
            Slot::Visiting => {
                return Err(CatalogError::cycle(format!(
                    "model '{}' is its own ancestor",
                    self.models[idx].name
                )))
            }
            Slot::Pending => self.slots[idx] = Slot::Visiting,
        }

        let models = self.models;
        let model = &models[idx];
        let resolved = if model.model_type == ModelType::Model {
            Resolved {
                query_path: None,
                unwind_path: None,
                cname: model.name.clone(),
                hierarchy: vec![entry(model, &model.name, None)],
            }
        } else {
            let parent_idx = model
                .parentiid
                .as_deref()
                .and_then(|iid| self.by_iid.get(iid).copied())
                .ok_or_else(|| {
                    CatalogError::missing_parent(format!(
                        "parent of sub-model '{}' does not exist",
                        model.name
                    ))
                })?;
            let parent = self.resolve(parent_idx)?.clone();

            let query_path = join(parent.query_path.as_deref(), &model.name);
            let mut unwind_path = join(parent.unwind_path.as_deref(), &model.name);
            if model.model_type == ModelType::SubModelList {
                unwind_path = format!("{unwind_path}.{UNWIND}");
            }
            let mut hierarchy = parent.hierarchy;
            hierarchy.push(entry(model, &parent.cname, Some(query_path.clone())));

            Resolved {
                query_path: Some(query_path),
                unwind_path: Some(unwind_path),
                cname: parent.cname,
                hierarchy,
            }
        };

        self.slots[idx] = Slot::Done(resolved);
        Ok(())
    }
}

fn entry(model: &Model, cname: &str, query_path: Option<String>) -> HierarchyEntry {
    HierarchyEntry {
        name: model.name.clone(),
        iid: model.iid.clone(),
        cname: cname.to_string(),
        model_type: model.model_type,
        query_path,
    }
}

/// Platform-created fields first, in their declared order, then user fields by `order`.
///
/// Identifier fields must exist before the fields that reference them.
pub fn sort_fields(fields: &mut [Field]) {
    fields.sort_by_key(|f| match f.creator {
        FieldCreator::System => (0, 0),
        FieldCreator::User => (1, f.order),
    });
}

/// Fills in every derived attribute of the database's models.
pub fn process_database(db: &mut DatabaseConfig) -> Result<(), CatalogError> {
    let resolved = {
        let mut tree = ModelTree::new(&db.models);
        (0..db.models.len())
            .map(|idx| tree.resolve(idx).cloned())
            .collect::<Result<Vec<_>, _>>()?
    };

    let schemas = &db.schemas;
    for (model, resolved) in db.models.iter_mut().zip(resolved) {
        sort_fields(&mut model.fields);
        for field in &mut model.fields {
            field.query_path = Some(join(resolved.query_path.as_deref(), &field.name));
            field.unwind_query_path = Some(join(resolved.unwind_path.as_deref(), &field.name));
        }
        model.schema = model
            .schemaiid
            .as_deref()
            .and_then(|iid| schemas.iter().find(|s| s.iid == iid))
            .map(|s| s.name.clone());
        model.query_path = resolved.query_path;
        model.parent_hierarchy = resolved.hierarchy;
    }
    Ok(())
}

/// Collection or table that stores the documents of `model`.
pub fn storage_name<'a>(models: &'a [Model], model: &'a Model) -> &'a str {
    model
        .parent_hierarchy
        .first()
        .map(|root| root.cname.as_str())
        .or_else(|| {
            let mut current = model;
            for _ in 0..models.len() {
                if current.is_top_level() {
                    return Some(current.name.as_str());
                }
                current = models
                    .iter()
                    .find(|m| Some(m.iid.as_str()) == current.parentiid.as_deref())?;
            }
            None
        })
        .unwrap_or(&model.name)
}
