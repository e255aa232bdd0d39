//! Model aggregate: tables with their columns and views, read through the entity cache.

mod column;
mod view;

pub use column::{ColumnPatch, ColumnRepo, NewColumn};
pub use view::{NewView, ViewRepo};

use crate::cache::{alias_key, list_key, object_key, CacheScope, CascadeDirection};
use crate::error::MetaError;
use crate::meta::types::sort_by_order;
use crate::meta::{MetaTable, Model};
use crate::state::MetaContext;
use crate::store::{Filter, OrderBy};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

pub(crate) fn decode<T: DeserializeOwned>(row: Value) -> Result<T, MetaError> {
    Ok(serde_json::from_value(row)?)
}

pub(crate) fn decode_all<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, MetaError> {
    rows.into_iter().map(decode).collect()
}

/// One past the highest existing order, or 1.
pub(crate) fn next_order(orders: impl Iterator<Item = Option<f64>>) -> f64 {
    orders.flatten().fold(0.0, f64::max) + 1.0
}

/// Input for [`ModelRepo::insert`].
#[derive(Clone, Debug)]
pub struct NewModel {
    pub title: String,
    pub table_name: String,
    pub columns: Vec<NewColumn>,
    pub is_junction: bool,
    pub is_view_backed: bool,
    pub meta: Value,
}

impl NewModel {
    pub fn new(title: &str, table_name: &str) -> Self {
        NewModel {
            title: title.to_string(),
            table_name: table_name.to_string(),
            columns: Vec::new(),
            is_junction: false,
            is_view_backed: false,
            meta: Value::Null,
        }
    }

    pub fn with_columns(mut self, columns: Vec<NewColumn>) -> Self {
        self.columns = columns;
        self
    }

    pub fn junction(mut self) -> Self {
        self.is_junction = true;
        self
    }
}

pub struct ModelRepo<'a> {
    ctx: &'a MetaContext,
}

impl<'a> ModelRepo<'a> {
    pub(crate) fn new(ctx: &'a MetaContext) -> Self {
        ModelRepo { ctx }
    }

    fn base(&self) -> &str {
        &self.ctx.container.base_id
    }

    pub async fn get(&self, id: &str) -> Result<Option<Model>, MetaError> {
        let key = object_key(CacheScope::Model, id);
        if let Some(m) = self.ctx.cache.get::<Model>(&key).await {
            return Ok(Some(m));
        }
        let row = self
            .ctx
            .store
            .get(&self.ctx.container, MetaTable::Models, &Filter::by_id(id))
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let model: Model = decode(row)?;
        self.ctx.cache.set(&key, &model).await;
        Ok(Some(model))
    }

    pub(crate) async fn require(&self, id: &str) -> Result<Model, MetaError> {
        self.get(id)
            .await?
            .ok_or_else(|| MetaError::not_found("model", id))
    }

    /// Resolve by id, title or physical table name. Successful lookups are indexed under `model:<base>:alias:<alias>`.
    pub async fn get_by_alias_or_id(&self, alias_or_id: &str) -> Result<Option<Model>, MetaError> {
        let akey = alias_key(CacheScope::Model, self.base(), alias_or_id);
        if let Some(id) = self.ctx.cache.get::<String>(&akey).await {
            if let Some(m) = self.get(&id).await? {
                return Ok(Some(m));
            }
            self.ctx.cache.del(&akey).await;
        }
        let c = &self.ctx.container;
        let mut found = None;
        for field in ["id", "title", "table_name"] {
            let filter = Filter::new().eq(field, alias_or_id);
            if let Some(row) = self.ctx.store.get(c, MetaTable::Models, &filter).await? {
                found = Some(row);
                break;
            }
        }
        let Some(row) = found else {
            return Ok(None);
        };
        let model: Model = decode(row)?;
        self.ctx
            .cache
            .set(&object_key(CacheScope::Model, &model.id), &model)
            .await;
        self.ctx.cache.set_detached(akey, &model.id);
        Ok(Some(model))
    }

    /// Model with its columns (stored order) and views loaded.
    pub async fn get_with_info(&self, id: &str) -> Result<Option<Model>, MetaError> {
        let Some(mut model) = self.get(id).await? else {
            return Ok(None);
        };
        let columns = self.ctx.columns().list(id).await?;
        let views = self.ctx.views().list(id).await?;
        model.attach(columns, views);
        Ok(Some(model))
    }

    pub(crate) async fn require_with_info(&self, id: &str) -> Result<Model, MetaError> {
        self.get_with_info(id)
            .await?
            .ok_or_else(|| MetaError::not_found("model", id))
    }

    /// Bare model rows of the container, by order with unordered models last.
    pub async fn list(&self) -> Result<Vec<Model>, MetaError> {
        let base = self.base().to_string();
        let cached = self.ctx.cache.get_list::<Model>(&[base.as_str()]).await;
        if cached.is_loaded() {
            let mut models = cached.list;
            sort_by_order(&mut models, |m| m.order);
            return Ok(models);
        }
        let rows = self
            .ctx
            .store
            .list(
                &self.ctx.container,
                MetaTable::Models,
                &Filter::new(),
                Some(&OrderBy::asc("order")),
            )
            .await?;
        let models: Vec<Model> = decode_all(rows)?;
        self.ctx.cache.set_list(&[base.as_str()], &models).await;
        Ok(models)
    }

    pub async fn is_table_name_available(&self, table_name: &str, exclude_id: Option<&str>) -> Result<bool, MetaError> {
        self.is_free("table_name", table_name, exclude_id).await
    }

    pub async fn is_title_available(&self, title: &str, exclude_id: Option<&str>) -> Result<bool, MetaError> {
        self.is_free("title", title, exclude_id).await
    }

    async fn is_free(&self, field: &str, value: &str, exclude_id: Option<&str>) -> Result<bool, MetaError> {
        let rows = self
            .ctx
            .store
            .list(&self.ctx.container, MetaTable::Models, &Filter::new().eq(field, value), None)
            .await?;
        Ok(rows
            .iter()
            .all(|r| exclude_id.is_some() && r.get("id").and_then(Value::as_str) == exclude_id))
    }

    async fn check_names(&self, title: &str, table_name: &str, exclude_id: Option<&str>) -> Result<(), MetaError> {
        if title.trim().is_empty() {
            return Err(MetaError::Validation("table title is required".into()));
        }
        if table_name.trim().is_empty() {
            return Err(MetaError::Validation("table name is required".into()));
        }
        if !self.is_table_name_available(table_name, exclude_id).await? {
            return Err(MetaError::Validation(format!("table name '{}' already exists", table_name)));
        }
        if !self.is_title_available(title, exclude_id).await? {
            return Err(MetaError::Validation(format!("table title '{}' already exists", title)));
        }
        Ok(())
    }

    /// Persist a model, its default grid view and its columns. Returns the loaded model.
    pub async fn insert(&self, new: NewModel) -> Result<Model, MetaError> {
        self.check_names(&new.title, &new.table_name, None).await?;
        let existing = self.list().await?;
        let mut model = Model::new(self.base(), &new.title, &new.table_name);
        model.order = Some(next_order(existing.iter().map(|m| m.order)));
        model.is_junction = new.is_junction;
        model.is_view_backed = new.is_view_backed;
        model.meta = new.meta;
        let row = json!({
            "base_id": model.base_id,
            "title": model.title,
            "table_name": model.table_name,
            "order": model.order,
            "is_view_backed": model.is_view_backed,
            "is_junction": model.is_junction,
            "meta": model.meta,
        });
        model.id = self
            .ctx
            .store
            .insert(&self.ctx.container, MetaTable::Models, row)
            .await?;
        tracing::info!(model = %model.id, table = %model.table_name, "model created");

        let base = self.base().to_string();
        if !self.ctx.cache.append_to_list(&[base.as_str()], &model).await {
            self.ctx
                .cache
                .set(&object_key(CacheScope::Model, &model.id), &model)
                .await;
        }
        self.ctx.views().insert(NewView::default_grid(&model)).await?;
        for column in new.columns {
            self.ctx.columns().insert(&model.id, column).await?;
        }
        self.require_with_info(&model.id).await
    }

    /// Apply `patch` in the store and replace the whole cached object.
    async fn patch(&self, id: &str, patch: Value, apply: impl FnOnce(&mut Model)) -> Result<Model, MetaError> {
        let mut model = self.require(id).await?;
        self.ctx
            .store
            .update(&self.ctx.container, MetaTable::Models, patch, &Filter::by_id(id))
            .await?;
        apply(&mut model);
        self.ctx
            .cache
            .set(&object_key(CacheScope::Model, id), &model)
            .await;
        Ok(model)
    }

    pub async fn update_alias_and_table_name(&self, id: &str, title: &str, table_name: &str) -> Result<Model, MetaError> {
        self.check_names(title, table_name, Some(id)).await?;
        let old = self.require(id).await?;
        let updated = self
            .patch(id, json!({ "title": title, "table_name": table_name }), |m| {
                m.title = title.to_string();
                m.table_name = table_name.to_string();
            })
            .await?;
        self.clear_aliases(&old).await;
        Ok(updated)
    }

    pub async fn update_order(&self, id: &str, order: f64) -> Result<Model, MetaError> {
        self.patch(id, json!({ "order": order }), |m| m.order = Some(order))
            .await
    }

    pub async fn mark_as_junction(&self, id: &str, is_junction: bool) -> Result<Model, MetaError> {
        self.patch(id, json!({ "is_junction": is_junction }), |m| m.is_junction = is_junction)
            .await
    }

    /// Move the display-value flag to `column_id`.
    pub async fn update_primary_column(&self, model_id: &str, column_id: &str) -> Result<(), MetaError> {
        let columns = self.ctx.columns().list(model_id).await?;
        let target = columns
            .iter()
            .find(|c| c.id == column_id)
            .ok_or_else(|| {
                MetaError::Validation(format!("column {} does not belong to model {}", column_id, model_id))
            })?;
        for previous in columns.iter().filter(|c| c.pv && c.id != column_id) {
            self.ctx.columns().set_display_value(previous, false).await?;
        }
        if !target.pv {
            self.ctx.columns().set_display_value(target, true).await?;
        }
        Ok(())
    }

    /// Remove the model and everything that hangs off it, dependents first.
    pub async fn delete(&self, id: &str) -> Result<(), MetaError> {
        let model = self.require(id).await?;
        let c = &self.ctx.container;
        let by_model = Filter::new().eq("fk_model_id", id);

        self.ctx.store.delete(c, MetaTable::Comments, &by_model).await?;

        for view in self.ctx.views().list(id).await? {
            self.ctx.views().delete(&view.id).await?;
        }

        let columns = self.ctx.columns().list(id).await?;
        for column in &columns {
            self.ctx.columns().delete_options(column).await?;
        }
        self.ctx.store.delete(c, MetaTable::Columns, &by_model).await?;
        for column in &columns {
            self.ctx
                .cache
                .deep_del(&object_key(CacheScope::Column, &column.id), CascadeDirection::ChildToParent)
                .await;
        }

        self.ctx
            .store
            .delete(c, MetaTable::Models, &Filter::by_id(id))
            .await?;
        self.ctx
            .cache
            .deep_del(&object_key(CacheScope::Model, id), CascadeDirection::ChildToParent)
            .await;
        self.clear_aliases(&model).await;
        self.clear(id).await;
        self.ctx.cache.del_list(CacheScope::Model, &[self.base()]).await;
        tracing::info!(model = %id, table = %model.table_name, "model deleted");
        Ok(())
    }

    async fn clear_aliases(&self, model: &Model) {
        for alias in [&model.id, &model.title, &model.table_name] {
            self.ctx
                .cache
                .del(&alias_key(CacheScope::Model, self.base(), alias))
                .await;
        }
    }

    /// Drop cached entries for the model and its column and view lists, list members included.
    pub async fn clear(&self, id: &str) {
        self.ctx.cache.del(&object_key(CacheScope::Model, id)).await;
        for scope in [CacheScope::Column, CacheScope::View] {
            self.ctx
                .cache
                .deep_del(&list_key(scope, &[id]), CascadeDirection::ParentToChild)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::next_order;

    #[test]
    fn next_order_skips_missing() {
        assert_eq!(next_order([None, Some(2.0), Some(1.0)].into_iter()), 3.0);
        assert_eq!(next_order(std::iter::empty()), 1.0);
    }
}
