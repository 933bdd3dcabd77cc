//! Drives a [`SchemaBackend`] from a full model set or from a [`ChangeSet`].
//!
//! Work is grouped into phases and each phase runs as one batch. Anything
//! destructive runs last, after every surviving model is in its final shape.

use crate::backend::{Apply, Progress, SchemaBackend};
use crate::statement::Statement;
use crate::ExecutorError;
use catalog::{ChangeSet, FieldDelta, ModelDelta};
use common::types::{Field, FieldKind, Model};

async fn run_phase(
    backend: &mut dyn SchemaBackend,
    batch: Vec<Statement>,
) -> Result<bool, ExecutorError> {
    if batch.is_empty() {
        return Ok(false);
    }
    backend.execute(batch).await?;
    Ok(true)
}

fn is_reference(field: &Field) -> bool {
    matches!(field.kind(), Ok(FieldKind::Reference))
}

/// Index, unique and full-text statements for a field's flags.
async fn index_statements(
    backend: &mut dyn SchemaBackend,
    model: &Model,
    field: &Field,
    batch: &mut Vec<Statement>,
) -> Result<(), ExecutorError> {
    if field.indexed {
        batch.extend(backend.add_index(model, field, Apply::Deferred).await?);
    }
    if field.unique {
        batch.extend(
            backend
                .add_unique_constraint(model, field, Apply::Deferred)
                .await?,
        );
    }
    if field.is_searchable() {
        batch.extend(
            backend
                .add_full_text_index(model, field, Apply::Deferred)
                .await?,
        );
    }
    Ok(())
}

fn foreign_keys(
    backend: &dyn SchemaBackend,
    model: &Model,
    fields: &[Field],
    batch: &mut Vec<Statement>,
) -> Result<(), ExecutorError> {
    for field in fields.iter().filter(|f| is_reference(f)) {
        batch.extend(backend.create_foreign_key_query(model, field)?);
    }
    Ok(())
}

/// Materialises `models` on a database that has no previous configuration.
pub async fn deploy_models(
    backend: &mut dyn SchemaBackend,
    models: &[Model],
    progress: &mut dyn Progress,
) -> Result<(), ExecutorError> {
    let existing = backend.existing_models().await?;

    let mut batch = Vec::new();
    let mut created = Vec::new();
    for model in models.iter().filter(|m| m.is_top_level()) {
        if existing.contains(&model.name) {
            continue;
        }
        if let Some(statement) = backend.create_model(model, Apply::Deferred).await? {
            batch.push(statement);
            created.push(model.name.as_str());
        }
    }
    run_phase(backend, batch).await?;
    for name in created {
        progress.step(format!("Created model '{name}'"));
    }

    let mut batch = Vec::new();
    for model in models {
        foreign_keys(backend, model, &model.fields, &mut batch)?;
    }
    if run_phase(backend, batch).await? {
        progress.step("Created foreign keys".to_string());
    }

    let mut batch = Vec::new();
    for model in models {
        for field in &model.fields {
            index_statements(backend, model, field, &mut batch).await?;
        }
    }
    if run_phase(backend, batch).await? {
        progress.step("Created indices".to_string());
    }

    backend.finalize(progress).await
}

/// Applies a change set. Deleted models, then deleted fields, go last.
pub async fn apply_changes(
    backend: &mut dyn SchemaBackend,
    changes: &ChangeSet,
    progress: &mut dyn Progress,
) -> Result<(), ExecutorError> {
    let mut batch = Vec::new();
    for model in &changes.added {
        batch.extend(backend.create_model(model, Apply::Deferred).await?);
    }
    run_phase(backend, batch).await?;

    let mut batch = Vec::new();
    for model in &changes.added {
        foreign_keys(backend, model, &model.fields, &mut batch)?;
        for field in &model.fields {
            index_statements(backend, model, field, &mut batch).await?;
        }
    }
    run_phase(backend, batch).await?;
    for model in &changes.added {
        progress.step(format!("Created model '{}'", model.name));
    }

    for delta in changes.updated_by_depth() {
        let batch = update_statements(backend, delta).await?;
        if run_phase(backend, batch).await? {
            progress.step(format!("Updated model '{}'", delta.model.name));
        }
    }

    let mut batch = Vec::new();
    for model in &changes.deleted {
        batch.extend(backend.drop_model(model, Apply::Deferred).await?);
    }
    run_phase(backend, batch).await?;
    for model in &changes.deleted {
        progress.step(format!("Deleted model '{}'", model.name));
    }

    let mut batch = Vec::new();
    let mut dropped = Vec::new();
    for delta in &changes.updated {
        for field in &delta.field_changes.deleted {
            batch.extend(backend.drop_field(&delta.model, field, Apply::Deferred).await?);
            dropped.push((field.name.as_str(), delta.model.name.as_str()));
        }
    }
    run_phase(backend, batch).await?;
    for (field, model) in dropped {
        progress.step(format!("Deleted field '{field}' in model '{model}'"));
    }

    backend.finalize(progress).await
}

/// Every non-destructive change of one updated model, in application order.
async fn update_statements(
    backend: &mut dyn SchemaBackend,
    delta: &ModelDelta,
) -> Result<Vec<Statement>, ExecutorError> {
    let model = &delta.model;
    let changes = &delta.field_changes;
    let mut batch = Vec::new();

    if let Some(old_name) = delta.old_name.as_deref().filter(|_| delta.is_name_changed) {
        batch.extend(backend.rename_model(old_name, model, Apply::Deferred).await?);
    }

    for field in &changes.added {
        batch.extend(backend.create_field(model, field, Apply::Deferred).await?);
    }
    foreign_keys(backend, model, &changes.added, &mut batch)?;

    for change in changes.updated.iter().filter(|c| c.is_name_changed) {
        batch.extend(
            backend
                .rename_field(model, &change.field, &change.previous, Apply::Deferred)
                .await?,
        );
    }
    // the column carries its new name from here on
    for change in changes.updated.iter().filter(|c| c.is_required_changed) {
        batch.extend(
            backend
                .set_nullability(model, &change.field, Apply::Deferred)
                .await?,
        );
    }

    for change in changes.updated.iter().filter(|c| c.is_indexed_changed) {
        let statement = if change.field.indexed {
            backend.add_index(model, &change.field, Apply::Deferred).await?
        } else {
            backend.drop_index(model, &change.previous, Apply::Deferred).await?
        };
        batch.extend(statement);
    }
    for field in changes.added.iter().filter(|f| f.indexed) {
        batch.extend(backend.add_index(model, field, Apply::Deferred).await?);
    }

    for change in changes.updated.iter().filter(|c| c.is_unique_changed) {
        let statement = if change.field.unique {
            backend
                .add_unique_constraint(model, &change.field, Apply::Deferred)
                .await?
        } else {
            backend
                .drop_unique_constraint(model, &change.previous, Apply::Deferred)
                .await?
        };
        batch.extend(statement);
    }
    for field in changes.added.iter().filter(|f| f.unique) {
        batch.extend(
            backend
                .add_unique_constraint(model, field, Apply::Deferred)
                .await?,
        );
    }

    for change in changes.updated.iter().filter(|c| c.is_searchable_changed) {
        let statement = if change.field.is_searchable() {
            backend
                .add_full_text_index(model, &change.field, Apply::Deferred)
                .await?
        } else {
            backend
                .drop_full_text_index(model, &change.previous, Apply::Deferred)
                .await?
        };
        batch.extend(statement);
    }
    for field in changes.added.iter().filter(|f| f.is_searchable()) {
        batch.extend(
            backend
                .add_full_text_index(model, field, Apply::Deferred)
                .await?,
        );
    }

    for change in changes.updated.iter().filter(|c| reference_changed(c)) {
        if is_reference(&change.previous) {
            batch.extend(
                backend
                    .drop_foreign_key(model, &change.previous, Apply::Deferred)
                    .await?,
            );
        }
        batch.extend(backend.create_foreign_key_query(model, &change.field)?);
    }

    Ok(batch)
}

fn reference_changed(change: &FieldDelta) -> bool {
    change.is_ref_changed || change.is_action_changed
}
