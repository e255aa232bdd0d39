use super::link::{insert_pair, physical_name, remove, resolve, PairSpec};
use super::naming::{fk_constraint_name, has_many_title, junction_column_names, junction_table_name, unique_name};
use super::{find_counterpart, invalidate_columns, ManyToMany, ManyToManyRequest, PhysicalSteps};
use crate::error::MetaError;
use crate::meta::{Column, JunctionRef, Model, RelationDescriptor, RelationKind};
use crate::model::{NewColumn, NewModel};
use crate::schema::{ForeignKeySpec, PhysicalColumn, TableSpec};
use crate::state::MetaContext;

fn primary_key(model: &Model) -> Result<Column, MetaError> {
    model.primary_key().cloned().ok_or_else(|| {
        MetaError::Validation(format!("table '{}' has no primary key", model.title))
    })
}

/// Junction key column typed after the referenced primary key.
fn junction_key(referenced: &Column, name: &str) -> NewColumn {
    let data_type = referenced.data_type.as_deref().unwrap_or("text");
    NewColumn {
        pk: true,
        required: true,
        ..NewColumn::foreign_key(name, data_type)
    }
}

async fn junction_constraint(
    ctx: &MetaContext,
    steps: &PhysicalSteps<'_>,
    junction_table: &str,
    key: &str,
    parent: &Model,
    parent_column: &str,
) -> String {
    let constraint = fk_constraint_name(&parent.table_name, junction_table);
    steps
        .add_foreign_key(&ForeignKeySpec {
            constraint_name: Some(constraint.clone()),
            child_table: junction_table.to_string(),
            child_column: key.to_string(),
            parent_table: parent.table_name.clone(),
            parent_column: parent_column.to_string(),
            on_update: ctx.fk_on_update,
            on_delete: ctx.fk_on_delete,
        })
        .await;
    constraint
}

/// First `<prefix>_m2m_<a>_<b>[N]` free as both table name and title.
async fn free_junction_name(ctx: &MetaContext, a: &Model, b: &Model) -> Result<String, MetaError> {
    let base = junction_table_name("", &a.table_name, &b.table_name);
    let mut candidate = base.clone();
    let mut n = 0u32;
    loop {
        let models = ctx.models();
        if models.is_table_name_available(&candidate, None).await?
            && models.is_title_available(&candidate, None).await?
        {
            return Ok(candidate);
        }
        n += 1;
        candidate = format!("{}{}", base, n);
    }
}

pub(super) async fn create(ctx: &MetaContext, req: &ManyToManyRequest) -> Result<ManyToMany, MetaError> {
    let a = ctx.models().require_with_info(&req.model_a).await?;
    let b = if req.model_b == req.model_a {
        a.clone()
    } else {
        ctx.models().require_with_info(&req.model_b).await?
    };
    let a_pk = primary_key(&a)?;
    let b_pk = primary_key(&b)?;
    let a_pk_name = physical_name(&a_pk, &a)?.to_string();
    let b_pk_name = physical_name(&b_pk, &b)?.to_string();

    let table_name = free_junction_name(ctx, &a, &b).await?;
    let (a_key, b_key) = junction_column_names(&a.table_name, &b.table_name);
    let a_key_column = junction_key(&a_pk, &a_key);
    let b_key_column = junction_key(&b_pk, &b_key);

    let steps = PhysicalSteps::new(ctx.schema.as_ref());
    steps
        .create_table(&TableSpec {
            name: table_name.clone(),
            columns: vec![
                PhysicalColumn::key(&a_key, a_key_column.data_type.as_deref().unwrap_or("text")),
                PhysicalColumn::key(&b_key, b_key_column.data_type.as_deref().unwrap_or("text")),
            ],
        })
        .await;

    let junction = ctx
        .models()
        .insert(
            NewModel::new(&table_name, &table_name)
                .junction()
                .with_columns(vec![a_key_column, b_key_column]),
        )
        .await?;
    let key = |name: &str| {
        junction
            .columns
            .iter()
            .find(|c| c.column_name.as_deref() == Some(name))
            .cloned()
            .ok_or_else(|| {
                MetaError::Integrity(format!("junction '{}' lost column '{}'", table_name, name))
            })
    };
    let j_a = key(&a_key)?;
    let j_b = key(&b_key)?;

    let (a_constraint, b_constraint) = if req.is_virtual {
        (None, None)
    } else {
        (
            Some(junction_constraint(ctx, &steps, &table_name, &a_key, &a, &a_pk_name).await),
            Some(junction_constraint(ctx, &steps, &table_name, &b_key, &b, &b_pk_name).await),
        )
    };

    for (parent, parent_pk, jcol, fk_index_name) in [
        (&a, &a_pk, &j_a, a_constraint),
        (&b, &b_pk, &j_b, b_constraint),
    ] {
        insert_pair(
            ctx,
            PairSpec {
                parent,
                child: &junction,
                fk_column: jcol,
                parent_pk,
                bt_title: None,
                hm_title: None,
                system: true,
                fk_index_name,
                is_virtual: req.is_virtual,
                custom: false,
            },
        )
        .await?;
    }

    let taken: Vec<String> = ctx.columns().list(&a.id).await?.into_iter().map(|c| c.title).collect();
    let left_title = unique_name(
        req.title.as_deref().unwrap_or(&has_many_title(&b.title)),
        taken.iter().map(String::as_str),
    );
    let mut left = RelationDescriptor::new(RelationKind::ManyToMany, &a_pk.id, &b_pk.id, &b.id);
    left.junction = Some(JunctionRef {
        model_id: junction.id.clone(),
        child_column_id: j_a.id.clone(),
        parent_column_id: j_b.id.clone(),
    });
    left.is_virtual = req.is_virtual;
    let left = ctx
        .columns()
        .insert(&a.id, NewColumn::relation(&left_title, left))
        .await?;

    let taken: Vec<String> = ctx.columns().list(&b.id).await?.into_iter().map(|c| c.title).collect();
    let right_title = unique_name(&has_many_title(&a.title), taken.iter().map(String::as_str));
    let mut right = RelationDescriptor::new(RelationKind::ManyToMany, &b_pk.id, &a_pk.id, &a.id);
    right.junction = Some(JunctionRef {
        model_id: junction.id.clone(),
        child_column_id: j_b.id.clone(),
        parent_column_id: j_a.id.clone(),
    });
    right.is_virtual = req.is_virtual;
    let right = ctx
        .columns()
        .insert(
            &b.id,
            NewColumn::relation(&right_title, right).system(a.id == b.id),
        )
        .await?;

    invalidate_columns(ctx, &[a.id.as_str(), b.id.as_str(), junction.id.as_str()]).await;
    tracing::info!(a = %a.table_name, b = %b.table_name, junction = %table_name, "many-to-many relation created");
    Ok(ManyToMany {
        junction: ctx.models().require_with_info(&junction.id).await?,
        left,
        right,
    })
}

pub(super) async fn delete(
    ctx: &MetaContext,
    column: &Column,
    descriptor: &RelationDescriptor,
) -> Result<(), MetaError> {
    let junction_ref = descriptor.junction.as_ref().ok_or_else(|| {
        MetaError::Integrity(format!("many-to-many column '{}' has no junction", column.title))
    })?;
    let (counterpart, _) = find_counterpart(ctx, column, descriptor).await?;
    let junction = ctx
        .models()
        .get(&junction_ref.model_id)
        .await?
        .ok_or_else(|| {
            MetaError::Integrity(format!(
                "junction model {} of column '{}' is missing",
                junction_ref.model_id, column.title
            ))
        })?;

    let junction_relations = ctx.columns().relations_of(&junction.id).await?;
    let mut links = Vec::with_capacity(2);
    for key_id in [&junction_ref.child_column_id, &junction_ref.parent_column_id] {
        let (bt, d) = junction_relations
            .iter()
            .find(|(_, d)| d.kind == RelationKind::BelongsTo && &d.fk_child_column_id == key_id)
            .ok_or_else(|| {
                MetaError::Integrity(format!(
                    "junction '{}' has no relation over column {}",
                    junction.table_name, key_id
                ))
            })?;
        links.push(resolve(ctx, bt, d).await?);
    }

    for link in &links {
        remove(ctx, link, true).await?;
    }
    ctx.columns().delete(&column.id).await?;
    ctx.columns().delete(&counterpart.id).await?;

    let remaining = ctx.columns().list(&junction.id).await?;
    let only_keys = remaining.len() == 2
        && remaining
            .iter()
            .all(|c| c.id == junction_ref.child_column_id || c.id == junction_ref.parent_column_id);
    if only_keys {
        PhysicalSteps::new(ctx.schema.as_ref())
            .drop_table(&junction.table_name)
            .await;
        ctx.models().delete(&junction.id).await?;
    } else {
        tracing::info!(
            junction = %junction.table_name,
            columns = remaining.len(),
            "junction has other columns; keeping it"
        );
    }

    invalidate_columns(ctx, &[column.fk_model_id.as_str(), counterpart.fk_model_id.as_str()]).await;
    Ok(())
}
