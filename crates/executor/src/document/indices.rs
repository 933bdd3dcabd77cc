use crate::ExecutorError;
use common::types::{Field, FieldCreator, FieldKind, Model};
use shared_clients::document::{IndexKey, IndexSpec};

/// Indexes a top-level collection needs, in creation order.
///
/// Searchable text fields are folded into one compound text index, placed at
/// the position of the first searchable field. Fields past `max` are skipped.
pub(crate) fn required_indexes(
    models: &[Model],
    root: &Model,
    max: usize,
) -> Result<Vec<IndexSpec>, ExecutorError> {
    let mut plan = IndexPlan {
        models,
        max,
        indexes: Vec::new(),
        text_slot: None,
    };
    plan.collect(root, 0)?;
    Ok(plan.indexes)
}

struct IndexPlan<'a> {
    models: &'a [Model],
    max: usize,
    indexes: Vec<IndexSpec>,
    text_slot: Option<usize>,
}

impl IndexPlan<'_> {
    fn collect(&mut self, model: &Model, depth: usize) -> Result<(), ExecutorError> {
        // the model tree is validated for cycles on load; this only bounds recursion
        if depth > self.models.len() {
            return Ok(());
        }
        for field in &model.fields {
            let kind = field.kind()?;
            if needs_index(field, kind) {
                if self.indexes.len() + 1 > self.max {
                    continue;
                }
                self.push(field, kind);
            } else if field.is_sub_model() {
                let sub = field
                    .sub_model_iid()
                    .and_then(|iid| self.models.iter().find(|m| m.iid == iid));
                if let Some(sub) = sub {
                    self.collect(sub, depth + 1)?;
                }
            }
        }
        Ok(())
    }

    fn push(&mut self, field: &Field, kind: FieldKind) {
        let path = field.query_path();
        let key = if kind == FieldKind::GeoPoint {
            IndexKey::Geo2dSphere
        } else {
            IndexKey::Asc
        };
        let mut spec = IndexSpec::on(path, key);
        if field.unique && field.name != "_id" {
            spec = spec.unique_sparse();
        }

        if field.is_searchable() {
            match self.text_slot {
                Some(slot) => self.indexes[slot]
                    .keys
                    .push((path.to_string(), IndexKey::Text)),
                None => {
                    self.text_slot = Some(self.indexes.len());
                    self.indexes.push(IndexSpec::on(path, IndexKey::Text));
                }
            }
        }
        self.indexes.push(spec);
    }
}

fn needs_index(field: &Field, kind: FieldKind) -> bool {
    if field.creator == FieldCreator::System {
        return true;
    }
    if matches!(kind, FieldKind::Object | FieldKind::ObjectList) {
        return false;
    }
    field.unique
        || field.indexed
        || field.is_searchable()
        || matches!(
            kind,
            FieldKind::GeoPoint | FieldKind::DateTime | FieldKind::Enum | FieldKind::Reference
        )
}

/// Whether an existing index is still wanted.
pub(crate) fn is_required(existing: &IndexSpec, required: &[IndexSpec]) -> bool {
    if existing.is_text() {
        return required
            .iter()
            .find(|r| r.is_text())
            .is_some_and(|text| text.text_paths() == existing.text_paths());
    }
    required
        .iter()
        .any(|r| !r.is_text() && r.same_definition(existing))
}

/// The server-managed primary key index is never touched.
pub(crate) fn is_primary(existing: &IndexSpec) -> bool {
    existing.resolved_name() == "_id_" || existing.keys.iter().any(|(path, _)| path == "_id")
}
