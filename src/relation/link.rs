use super::naming::{belongs_to_title, fk_column_name, fk_constraint_name, has_many_title, unique_name};
use super::{find_counterpart, invalidate_columns, Link, LinkRequest, PhysicalSteps};
use crate::error::MetaError;
use crate::meta::{Column, Model, RelationDescriptor, RelationKind};
use crate::model::NewColumn;
use crate::schema::{ForeignKeySpec, PhysicalColumn};
use crate::state::MetaContext;

/// Inputs for one belongs-to/has-many column pair over an existing foreign-key column.
pub(super) struct PairSpec<'m> {
    pub parent: &'m Model,
    pub child: &'m Model,
    pub fk_column: &'m Column,
    pub parent_pk: &'m Column,
    pub bt_title: Option<String>,
    pub hm_title: Option<String>,
    pub system: bool,
    pub fk_index_name: Option<String>,
    pub is_virtual: bool,
    pub custom: bool,
}

impl PairSpec<'_> {
    fn descriptor(&self, kind: RelationKind, related: &Model) -> RelationDescriptor {
        let mut d = RelationDescriptor::new(kind, &self.fk_column.id, &self.parent_pk.id, &related.id);
        d.fk_index_name = self.fk_index_name.clone();
        d.is_virtual = self.is_virtual;
        d.custom = self.custom;
        d
    }
}

async fn titles(ctx: &MetaContext, model_id: &str) -> Result<Vec<String>, MetaError> {
    Ok(ctx
        .columns()
        .list(model_id)
        .await?
        .into_iter()
        .map(|c| c.title)
        .collect())
}

/// Insert the `bt` column on the child and the `hm` column on the parent.
pub(super) async fn insert_pair(ctx: &MetaContext, spec: PairSpec<'_>) -> Result<(Column, Column), MetaError> {
    let self_referencing = spec.parent.id == spec.child.id;

    let taken = titles(ctx, &spec.child.id).await?;
    let bt_title = unique_name(
        spec.bt_title
            .as_deref()
            .unwrap_or(&belongs_to_title(&spec.parent.title)),
        taken.iter().map(String::as_str),
    );
    let bt = ctx
        .columns()
        .insert(
            &spec.child.id,
            NewColumn::relation(&bt_title, spec.descriptor(RelationKind::BelongsTo, spec.parent))
                .system(spec.system || self_referencing),
        )
        .await?;

    let taken = titles(ctx, &spec.parent.id).await?;
    let hm_title = unique_name(
        spec.hm_title
            .as_deref()
            .unwrap_or(&has_many_title(&spec.child.title)),
        taken.iter().map(String::as_str),
    );
    let hm = ctx
        .columns()
        .insert(
            &spec.parent.id,
            NewColumn::relation(&hm_title, spec.descriptor(RelationKind::HasMany, spec.child))
                .system(spec.system),
        )
        .await?;
    Ok((bt, hm))
}

pub(super) fn physical_name<'c>(column: &'c Column, model: &Model) -> Result<&'c str, MetaError> {
    column.column_name.as_deref().ok_or_else(|| {
        MetaError::Validation(format!(
            "column '{}' of table '{}' has no physical name",
            column.title, model.title
        ))
    })
}

pub(super) async fn create(ctx: &MetaContext, req: &LinkRequest) -> Result<Link, MetaError> {
    let parent = ctx.models().require_with_info(&req.parent_id).await?;
    let child = if req.child_id == req.parent_id {
        parent.clone()
    } else {
        ctx.models().require_with_info(&req.child_id).await?
    };
    let parent_pk = parent.primary_key().cloned().ok_or_else(|| {
        MetaError::Validation(format!("table '{}' has no primary key", parent.title))
    })?;
    let parent_column = physical_name(&parent_pk, &parent)?.to_string();

    let steps = PhysicalSteps::new(ctx.schema.as_ref());
    let (fk_column, custom, fk_index_name) = match &req.child_column_id {
        Some(id) => {
            let column = child.column(id).cloned().ok_or_else(|| {
                MetaError::Validation(format!("column {} does not belong to table '{}'", id, child.title))
            })?;
            physical_name(&column, &child)?;
            (column, true, None)
        }
        None => {
            let name = unique_name(
                &fk_column_name(&parent.table_name),
                child.columns.iter().filter_map(|c| c.column_name.as_deref()),
            );
            let data_type = parent_pk.data_type.clone().unwrap_or_else(|| "text".to_string());
            steps
                .add_column(&child.table_name, &PhysicalColumn::nullable(&name, &data_type))
                .await;

            let fk_index_name = if req.is_virtual {
                None
            } else {
                let constraint = fk_constraint_name(&parent.table_name, &child.table_name);
                steps
                    .add_foreign_key(&ForeignKeySpec {
                        constraint_name: Some(constraint.clone()),
                        child_table: child.table_name.clone(),
                        child_column: name.clone(),
                        parent_table: parent.table_name.clone(),
                        parent_column: parent_column.clone(),
                        on_update: req.on_update.unwrap_or(ctx.fk_on_update),
                        on_delete: req.on_delete.unwrap_or(ctx.fk_on_delete),
                    })
                    .await;
                Some(constraint)
            };

            let title = unique_name(&name, child.columns.iter().map(|c| c.title.as_str()));
            let column = ctx
                .columns()
                .insert(
                    &child.id,
                    NewColumn {
                        title,
                        ..NewColumn::foreign_key(&name, &data_type)
                    },
                )
                .await?;
            (column, false, fk_index_name)
        }
    };

    let (requested_bt, requested_hm) = match req.kind {
        RelationKind::BelongsTo => (req.title.clone(), None),
        _ => (None, req.title.clone()),
    };
    let (belongs_to, has_many) = insert_pair(
        ctx,
        PairSpec {
            parent: &parent,
            child: &child,
            fk_column: &fk_column,
            parent_pk: &parent_pk,
            bt_title: requested_bt,
            hm_title: requested_hm,
            system: false,
            fk_index_name,
            is_virtual: req.is_virtual,
            custom,
        },
    )
    .await?;

    invalidate_columns(ctx, &[child.id.as_str(), parent.id.as_str()]).await;
    tracing::info!(
        parent = %parent.table_name,
        child = %child.table_name,
        fk = ?fk_column.column_name,
        "relation created"
    );
    Ok(Link {
        foreign_key: fk_column,
        belongs_to,
        has_many,
    })
}

/// Everything a belongs-to/has-many delete touches, resolved before the first mutation.
pub(super) struct ResolvedLink {
    pub belongs_to: Column,
    pub has_many: Column,
    pub descriptor: RelationDescriptor,
    pub fk_column: Column,
    pub parent_pk: Column,
    pub child: Model,
    pub parent: Model,
}

pub(super) async fn resolve(
    ctx: &MetaContext,
    column: &Column,
    descriptor: &RelationDescriptor,
) -> Result<ResolvedLink, MetaError> {
    let fk_column = ctx
        .columns()
        .get(&descriptor.fk_child_column_id)
        .await?
        .ok_or_else(|| {
            MetaError::Integrity(format!(
                "foreign key column {} of relation '{}' is missing",
                descriptor.fk_child_column_id, column.title
            ))
        })?;
    let parent_pk = ctx
        .columns()
        .get(&descriptor.fk_parent_column_id)
        .await?
        .ok_or_else(|| {
            MetaError::Integrity(format!(
                "referenced column {} of relation '{}' is missing",
                descriptor.fk_parent_column_id, column.title
            ))
        })?;
    let child = ctx.models().get(&fk_column.fk_model_id).await?.ok_or_else(|| {
        MetaError::Integrity(format!("model {} of column '{}' is missing", fk_column.fk_model_id, fk_column.title))
    })?;
    let parent = ctx.models().get(&parent_pk.fk_model_id).await?.ok_or_else(|| {
        MetaError::Integrity(format!("model {} of column '{}' is missing", parent_pk.fk_model_id, parent_pk.title))
    })?;

    let (other, other_descriptor) = find_counterpart(ctx, column, descriptor).await?;
    let (belongs_to, has_many, descriptor) = match descriptor.kind {
        RelationKind::BelongsTo => (column.clone(), other, descriptor.clone()),
        _ => (other, column.clone(), other_descriptor),
    };
    Ok(ResolvedLink {
        belongs_to,
        has_many,
        descriptor,
        fk_column,
        parent_pk,
        child,
        parent,
    })
}

/// Drop the constraint, both relation columns and, unless kept, the foreign-key column.
pub(super) async fn remove(ctx: &MetaContext, link: &ResolvedLink, keep_fk_column: bool) -> Result<(), MetaError> {
    let d = &link.descriptor;
    let steps = PhysicalSteps::new(ctx.schema.as_ref());
    let fk_name = link.fk_column.column_name.clone();

    if !d.is_virtual && !d.custom {
        if let (Some(child_column), Some(parent_column)) = (&fk_name, &link.parent_pk.column_name) {
            steps
                .drop_foreign_key(&ForeignKeySpec {
                    constraint_name: d.fk_index_name.clone(),
                    child_table: link.child.table_name.clone(),
                    child_column: child_column.clone(),
                    parent_table: link.parent.table_name.clone(),
                    parent_column: parent_column.clone(),
                    on_update: ctx.fk_on_update,
                    on_delete: ctx.fk_on_delete,
                })
                .await;
        }
    }

    ctx.columns().delete(&link.belongs_to.id).await?;
    ctx.columns().delete(&link.has_many.id).await?;

    if !keep_fk_column && !d.custom {
        if let Some(name) = &fk_name {
            steps.drop_column(&link.child.table_name, name).await;
        }
        ctx.columns().delete(&link.fk_column.id).await?;
    }

    invalidate_columns(ctx, &[link.child.id.as_str(), link.parent.id.as_str()]).await;
    tracing::info!(
        parent = %link.parent.table_name,
        child = %link.child.table_name,
        fk = ?fk_name,
        "relation removed"
    );
    Ok(())
}
