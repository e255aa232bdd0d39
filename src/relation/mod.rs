//! Relation lifecycle: belongs-to/has-many pairs and many-to-many through a junction model.
//!
//! Each operation touches the metadata store, the entity cache and the physical schema
//! with no enclosing transaction. Physical steps are best-effort; store failures abort
//! the remaining steps. Lookups that can reject a delete run before the first mutation.
//! Nothing serializes concurrent creates between the same two models.

mod ddl;
mod link;
mod many_to_many;
pub mod naming;

pub use ddl::PhysicalSteps;

use crate::audit::{AuditEvent, AuditOp};
use crate::cache::CacheScope;
use crate::error::MetaError;
use crate::meta::{Column, Model, RelationDescriptor, RelationKind};
use crate::schema::ReferentialAction;
use crate::state::MetaContext;

/// Request for a belongs-to/has-many pair between a parent and a child model.
#[derive(Clone, Debug)]
pub struct LinkRequest {
    pub parent_id: String,
    pub child_id: String,
    /// Side the requested `title` names: `BelongsTo` titles the child's column, `HasMany` the parent's.
    pub kind: RelationKind,
    pub title: Option<String>,
    /// Existing child column to use as the foreign key instead of adding one.
    pub child_column_id: Option<String>,
    /// Skip the physical foreign-key constraint.
    pub is_virtual: bool,
    pub on_update: Option<ReferentialAction>,
    pub on_delete: Option<ReferentialAction>,
}

impl LinkRequest {
    pub fn has_many(parent_id: &str, child_id: &str) -> Self {
        LinkRequest {
            parent_id: parent_id.to_string(),
            child_id: child_id.to_string(),
            kind: RelationKind::HasMany,
            title: None,
            child_column_id: None,
            is_virtual: false,
            on_update: None,
            on_delete: None,
        }
    }

    pub fn belongs_to(child_id: &str, parent_id: &str) -> Self {
        LinkRequest {
            kind: RelationKind::BelongsTo,
            ..LinkRequest::has_many(parent_id, child_id)
        }
    }

    pub fn titled(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn over_column(mut self, child_column_id: &str) -> Self {
        self.child_column_id = Some(child_column_id.to_string());
        self
    }

    pub fn without_constraint(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }
}

/// The three columns a belongs-to/has-many pair consists of.
#[derive(Clone, Debug)]
pub struct Link {
    pub foreign_key: Column,
    pub belongs_to: Column,
    pub has_many: Column,
}

#[derive(Clone, Debug)]
pub struct ManyToManyRequest {
    pub model_a: String,
    pub model_b: String,
    /// Title of the column on `model_a`.
    pub title: Option<String>,
    pub is_virtual: bool,
}

impl ManyToManyRequest {
    pub fn new(model_a: &str, model_b: &str) -> Self {
        ManyToManyRequest {
            model_a: model_a.to_string(),
            model_b: model_b.to_string(),
            title: None,
            is_virtual: false,
        }
    }

    pub fn titled(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
}

#[derive(Clone, Debug)]
pub struct ManyToMany {
    pub junction: Model,
    /// Column on `model_a`.
    pub left: Column,
    /// Column on `model_b`.
    pub right: Column,
}

pub struct RelationManager<'a> {
    ctx: &'a MetaContext,
}

impl<'a> RelationManager<'a> {
    pub(crate) fn new(ctx: &'a MetaContext) -> Self {
        RelationManager { ctx }
    }

    pub async fn create(&self, req: LinkRequest) -> Result<Link, MetaError> {
        if req.kind == RelationKind::ManyToMany {
            return Err(MetaError::Validation(
                "many-to-many relations are created with create_many_to_many".into(),
            ));
        }
        let link = link::create(self.ctx, &req).await?;
        self.audit(
            AuditOp::RelationCreate,
            &link.has_many.fk_model_id,
            format!(
                "relation '{}' / '{}' created",
                link.has_many.title, link.belongs_to.title
            ),
        );
        Ok(link)
    }

    pub async fn create_many_to_many(&self, req: ManyToManyRequest) -> Result<ManyToMany, MetaError> {
        let mm = many_to_many::create(self.ctx, &req).await?;
        self.audit(
            AuditOp::RelationCreate,
            &mm.left.fk_model_id,
            format!(
                "many-to-many relation '{}' / '{}' created through '{}'",
                mm.left.title, mm.right.title, mm.junction.table_name
            ),
        );
        Ok(mm)
    }

    /// Delete a relation through either of its visible columns. The paired column goes with it.
    pub async fn delete(&self, column_id: &str) -> Result<(), MetaError> {
        let column = self.ctx.columns().require(column_id).await?;
        if column.system {
            return Err(MetaError::Validation(format!(
                "system column '{}' cannot be deleted directly",
                column.title
            )));
        }
        let descriptor = self.ctx.columns().relation(&column).await?;
        match descriptor.kind {
            RelationKind::BelongsTo | RelationKind::HasMany => {
                let resolved = link::resolve(self.ctx, &column, &descriptor).await?;
                link::remove(self.ctx, &resolved, false).await?;
            }
            RelationKind::ManyToMany => {
                many_to_many::delete(self.ctx, &column, &descriptor).await?;
            }
        }
        self.audit(
            AuditOp::RelationDelete,
            &column.fk_model_id,
            format!("relation '{}' deleted", column.title),
        );
        Ok(())
    }

    /// The paired column of a relation column.
    pub async fn counterpart(&self, column: &Column) -> Result<(Column, RelationDescriptor), MetaError> {
        let descriptor = self.ctx.columns().relation(column).await?;
        find_counterpart(self.ctx, column, &descriptor).await
    }

    fn audit(&self, op: AuditOp, model_id: &str, description: String) {
        self.ctx.audit_event(
            AuditEvent::new(op, &self.ctx.container, self.ctx.actor.as_deref(), description)
                .for_model(model_id),
        );
    }
}

/// Inverse descriptor on the related model. Its absence breaks the pairing and is an error.
pub(crate) async fn find_counterpart(
    ctx: &MetaContext,
    column: &Column,
    descriptor: &RelationDescriptor,
) -> Result<(Column, RelationDescriptor), MetaError> {
    ctx.columns()
        .relations_of(&descriptor.fk_related_model_id)
        .await?
        .into_iter()
        .find(|(c, other)| c.id != column.id && descriptor.is_inverse_of(other))
        .ok_or_else(|| {
            MetaError::Integrity(format!(
                "relation column '{}' ({}) has no counterpart in model {}",
                column.title,
                descriptor.kind.as_str(),
                descriptor.fk_related_model_id
            ))
        })
}

async fn invalidate_columns(ctx: &MetaContext, model_ids: &[&str]) {
    for id in model_ids {
        ctx.cache.del_list(CacheScope::Column, &[id]).await;
    }
}
