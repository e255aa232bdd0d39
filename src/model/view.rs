//! Views as named containers of per-column visibility.

use super::{decode, decode_all, next_order};
use crate::cache::{object_key, CacheScope, CascadeDirection};
use crate::error::MetaError;
use crate::meta::types::sort_by_order;
use crate::meta::{Column, MetaTable, Model, View, ViewColumn, ViewKind};
use crate::state::MetaContext;
use crate::store::{Filter, OrderBy};
use serde_json::json;

#[derive(Clone, Debug)]
pub struct NewView {
    pub fk_model_id: String,
    pub title: String,
    pub kind: ViewKind,
    pub is_default: bool,
}

impl NewView {
    pub fn default_grid(model: &Model) -> Self {
        NewView {
            fk_model_id: model.id.clone(),
            title: model.title.clone(),
            kind: ViewKind::Grid,
            is_default: true,
        }
    }
}

pub struct ViewRepo<'a> {
    ctx: &'a MetaContext,
}

impl<'a> ViewRepo<'a> {
    pub(crate) fn new(ctx: &'a MetaContext) -> Self {
        ViewRepo { ctx }
    }

    pub async fn list(&self, model_id: &str) -> Result<Vec<View>, MetaError> {
        let cached = self.ctx.cache.get_list::<View>(&[model_id]).await;
        if cached.is_loaded() {
            let mut views = cached.list;
            sort_by_order(&mut views, |v| v.order);
            return Ok(views);
        }
        let rows = self
            .ctx
            .store
            .list(
                &self.ctx.container,
                MetaTable::Views,
                &Filter::new().eq("fk_model_id", model_id),
                Some(&OrderBy::asc("order")),
            )
            .await?;
        let views: Vec<View> = decode_all(rows)?;
        self.ctx.cache.set_list(&[model_id], &views).await;
        Ok(views)
    }

    pub async fn get(&self, id: &str) -> Result<Option<View>, MetaError> {
        let key = object_key(CacheScope::View, id);
        if let Some(v) = self.ctx.cache.get::<View>(&key).await {
            return Ok(Some(v));
        }
        let row = self
            .ctx
            .store
            .get(&self.ctx.container, MetaTable::Views, &Filter::by_id(id))
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let view: View = decode(row)?;
        self.ctx.cache.set(&key, &view).await;
        Ok(Some(view))
    }

    /// Create a view showing every existing non-system column.
    pub async fn insert(&self, new: NewView) -> Result<View, MetaError> {
        if new.title.trim().is_empty() {
            return Err(MetaError::Validation("view title is required".into()));
        }
        let existing = self.list(&new.fk_model_id).await?;
        let mut view = View {
            id: String::new(),
            fk_model_id: new.fk_model_id,
            title: new.title,
            kind: new.kind,
            is_default: new.is_default,
            order: Some(next_order(existing.iter().map(|v| v.order))),
        };
        view.id = self
            .ctx
            .store
            .insert(&self.ctx.container, MetaTable::Views, serde_json::to_value(&view)?)
            .await?;
        if !self
            .ctx
            .cache
            .append_to_list(&[view.fk_model_id.as_str()], &view)
            .await
        {
            self.ctx
                .cache
                .set(&object_key(CacheScope::View, &view.id), &view)
                .await;
        }
        for column in self.ctx.columns().list(&view.fk_model_id).await? {
            self.add_column(&view.id, &column).await?;
        }
        Ok(view)
    }

    /// Per-column visibility rows of a view, in order.
    pub async fn columns(&self, view_id: &str) -> Result<Vec<ViewColumn>, MetaError> {
        let cached = self.ctx.cache.get_list::<ViewColumn>(&[view_id]).await;
        if cached.is_loaded() {
            let mut columns = cached.list;
            sort_by_order(&mut columns, |c| c.order);
            return Ok(columns);
        }
        let rows = self
            .ctx
            .store
            .list(
                &self.ctx.container,
                MetaTable::ViewColumns,
                &Filter::new().eq("fk_view_id", view_id),
                Some(&OrderBy::asc("order")),
            )
            .await?;
        let columns: Vec<ViewColumn> = decode_all(rows)?;
        self.ctx.cache.set_list(&[view_id], &columns).await;
        Ok(columns)
    }

    /// System columns are added hidden.
    pub(crate) async fn add_column(&self, view_id: &str, column: &Column) -> Result<ViewColumn, MetaError> {
        let existing = self
            .ctx
            .store
            .list(
                &self.ctx.container,
                MetaTable::ViewColumns,
                &Filter::new().eq("fk_view_id", view_id),
                None,
            )
            .await?;
        let orders = existing
            .iter()
            .map(|r| r.get("order").and_then(serde_json::Value::as_f64));
        let mut vc = ViewColumn {
            id: String::new(),
            fk_view_id: view_id.to_string(),
            fk_column_id: column.id.clone(),
            show: !column.system,
            order: Some(next_order(orders)),
        };
        vc.id = self
            .ctx
            .store
            .insert(&self.ctx.container, MetaTable::ViewColumns, serde_json::to_value(&vc)?)
            .await?;
        self.ctx.cache.append_to_list(&[view_id], &vc).await;
        Ok(vc)
    }

    /// Drop a column from every view it appears in.
    pub(crate) async fn remove_column(&self, column_id: &str) -> Result<(), MetaError> {
        let filter = Filter::new().eq("fk_column_id", column_id);
        let rows = self
            .ctx
            .store
            .list(&self.ctx.container, MetaTable::ViewColumns, &filter, None)
            .await?;
        for vc in decode_all::<ViewColumn>(rows)? {
            self.ctx
                .cache
                .deep_del(&object_key(CacheScope::ViewColumn, &vc.id), CascadeDirection::ChildToParent)
                .await;
        }
        self.ctx
            .store
            .delete(&self.ctx.container, MetaTable::ViewColumns, &filter)
            .await?;
        Ok(())
    }

    pub async fn set_column_visibility(&self, view_id: &str, column_id: &str, show: bool) -> Result<(), MetaError> {
        let filter = Filter::new()
            .eq("fk_view_id", view_id)
            .eq("fk_column_id", column_id);
        let touched = self
            .ctx
            .store
            .update(&self.ctx.container, MetaTable::ViewColumns, json!({ "show": show }), &filter)
            .await?;
        if touched == 0 {
            return Err(MetaError::not_found("view column", format!("{}/{}", view_id, column_id)));
        }
        self.ctx.cache.del_list(CacheScope::ViewColumn, &[view_id]).await;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), MetaError> {
        let view = self
            .get(id)
            .await?
            .ok_or_else(|| MetaError::not_found("view", id))?;
        for vc in self.columns(id).await? {
            self.ctx
                .cache
                .del(&object_key(CacheScope::ViewColumn, &vc.id))
                .await;
        }
        self.ctx.cache.del_list(CacheScope::ViewColumn, &[id]).await;
        self.ctx
            .store
            .delete(
                &self.ctx.container,
                MetaTable::ViewColumns,
                &Filter::new().eq("fk_view_id", id),
            )
            .await?;
        self.ctx
            .store
            .delete(&self.ctx.container, MetaTable::Views, &Filter::by_id(id))
            .await?;
        self.ctx
            .cache
            .deep_del(&object_key(CacheScope::View, id), CascadeDirection::ChildToParent)
            .await;
        tracing::debug!(view = %id, model = %view.fk_model_id, "view deleted");
        Ok(())
    }
}
