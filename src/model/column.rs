//! Column persistence: uniqueness, option rows, view membership and cascades.

use super::{decode, decode_all, next_order};
use crate::audit::{AuditEvent, AuditOp};
use crate::cache::{list_key, object_key, CacheScope, Cacheable, CascadeDirection};
use crate::error::MetaError;
use crate::meta::types::sort_by_order;
use crate::meta::{
    Column, ColumnKind, ColumnOptions, FormulaOptions, LookupOptions, MetaTable,
    RelationDescriptor, RollupOptions, SelectOption,
};
use crate::state::MetaContext;
use crate::store::{Filter, OrderBy};
use serde_json::{json, Map, Value};

/// Input for [`ColumnRepo::insert`].
#[derive(Clone, Debug)]
pub struct NewColumn {
    pub title: String,
    pub column_name: Option<String>,
    pub kind: ColumnKind,
    pub data_type: Option<String>,
    pub system: bool,
    pub pk: bool,
    pub pv: bool,
    pub required: bool,
    pub meta: Value,
    pub options: ColumnOptions,
}

impl NewColumn {
    pub fn physical(title: &str, column_name: &str, data_type: &str) -> Self {
        NewColumn {
            title: title.to_string(),
            column_name: Some(column_name.to_string()),
            kind: ColumnKind::Plain,
            data_type: Some(data_type.to_string()),
            system: false,
            pk: false,
            pv: false,
            required: false,
            meta: Value::Null,
            options: ColumnOptions::Plain,
        }
    }

    pub fn primary_key(title: &str, column_name: &str, data_type: &str) -> Self {
        NewColumn {
            pk: true,
            required: true,
            ..NewColumn::physical(title, column_name, data_type)
        }
    }

    pub fn foreign_key(column_name: &str, data_type: &str) -> Self {
        NewColumn {
            kind: ColumnKind::ForeignKey,
            ..NewColumn::physical(column_name, column_name, data_type)
        }
    }

    /// Virtual column carrying kind-specific options.
    pub fn with_options(title: &str, kind: ColumnKind, options: ColumnOptions) -> Self {
        NewColumn {
            title: title.to_string(),
            column_name: None,
            kind,
            data_type: None,
            system: false,
            pk: false,
            pv: false,
            required: false,
            meta: Value::Null,
            options,
        }
    }

    pub fn relation(title: &str, descriptor: RelationDescriptor) -> Self {
        NewColumn::with_options(title, ColumnKind::Relation, ColumnOptions::Relation(descriptor))
    }

    pub fn select(title: &str, column_name: &str, multi: bool, options: Vec<SelectOption>) -> Self {
        NewColumn {
            kind: if multi { ColumnKind::MultiSelect } else { ColumnKind::SingleSelect },
            options: ColumnOptions::SelectOptions(options),
            ..NewColumn::physical(title, column_name, "text")
        }
    }

    pub fn system(mut self, system: bool) -> Self {
        self.system = system;
        self
    }

    pub fn display_value(mut self) -> Self {
        self.pv = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Fields [`ColumnRepo::update`] may change. `None` keeps the current value.
#[derive(Clone, Debug, Default)]
pub struct ColumnPatch {
    pub title: Option<String>,
    pub column_name: Option<String>,
    pub meta: Option<Value>,
}

/// Title and physical name must be unique within the model.
fn check_unique(
    existing: &[Column],
    title: &str,
    column_name: Option<&str>,
    exclude_id: Option<&str>,
) -> Result<(), MetaError> {
    if title.trim().is_empty() {
        return Err(MetaError::Validation("column title is required".into()));
    }
    let others = existing
        .iter()
        .filter(|c| Some(c.id.as_str()) != exclude_id);
    for other in others {
        if other.title == title {
            return Err(MetaError::Validation(format!("duplicate column title '{}'", title)));
        }
        if let (Some(a), Some(b)) = (other.column_name.as_deref(), column_name) {
            if a == b {
                return Err(MetaError::Validation(format!("duplicate column name '{}'", b)));
            }
        }
    }
    Ok(())
}

pub struct ColumnRepo<'a> {
    ctx: &'a MetaContext,
}

impl<'a> ColumnRepo<'a> {
    pub(crate) fn new(ctx: &'a MetaContext) -> Self {
        ColumnRepo { ctx }
    }

    /// Columns of a model in stored order.
    pub async fn list(&self, model_id: &str) -> Result<Vec<Column>, MetaError> {
        let cached = self.ctx.cache.get_list::<Column>(&[model_id]).await;
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
                MetaTable::Columns,
                &Filter::new().eq("fk_model_id", model_id),
                Some(&OrderBy::asc("order")),
            )
            .await?;
        let columns: Vec<Column> = decode_all(rows)?;
        self.ctx.cache.set_list(&[model_id], &columns).await;
        Ok(columns)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Column>, MetaError> {
        let key = object_key(CacheScope::Column, id);
        if let Some(c) = self.ctx.cache.get::<Column>(&key).await {
            return Ok(Some(c));
        }
        let row = self
            .ctx
            .store
            .get(&self.ctx.container, MetaTable::Columns, &Filter::by_id(id))
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let column: Column = decode(row)?;
        self.ctx.cache.set(&key, &column).await;
        Ok(Some(column))
    }

    pub(crate) async fn require(&self, id: &str) -> Result<Column, MetaError> {
        self.get(id)
            .await?
            .ok_or_else(|| MetaError::not_found("column", id))
    }

    pub async fn insert(&self, model_id: &str, new: NewColumn) -> Result<Column, MetaError> {
        if !new.options.fits(new.kind) {
            return Err(MetaError::Validation(format!(
                "options do not fit column kind {:?}",
                new.kind
            )));
        }
        if !new.kind.is_virtual() && new.column_name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            return Err(MetaError::Validation(format!(
                "column '{}' needs a physical name",
                new.title
            )));
        }
        let model = self.ctx.models().require(model_id).await?;
        let existing = self.list(model_id).await?;
        check_unique(&existing, &new.title, new.column_name.as_deref(), None)?;
        if new.pv {
            for previous in existing.iter().filter(|c| c.pv) {
                self.set_display_value(previous, false).await?;
            }
        }

        let mut column = Column {
            id: String::new(),
            fk_model_id: model_id.to_string(),
            title: new.title,
            column_name: new.column_name,
            kind: new.kind,
            data_type: new.data_type,
            order: Some(next_order(existing.iter().map(|c| c.order))),
            system: new.system,
            pk: new.pk,
            pv: new.pv,
            required: new.required,
            meta: new.meta,
        };
        column.id = self
            .ctx
            .store
            .insert(&self.ctx.container, MetaTable::Columns, serde_json::to_value(&column)?)
            .await?;
        self.insert_options(&column, new.options).await?;

        if !self.ctx.cache.append_to_list(&[model_id], &column).await {
            self.ctx
                .cache
                .set(&object_key(CacheScope::Column, &column.id), &column)
                .await;
        }
        let views = self.ctx.views().list(model_id).await?;
        for view in &views {
            self.ctx.views().add_column(&view.id, &column).await?;
        }

        if !column.system {
            self.ctx.audit_event(
                AuditEvent::new(
                    AuditOp::ColumnCreate,
                    &self.ctx.container,
                    self.ctx.actor.as_deref(),
                    format!("column '{}' created in table '{}'", column.title, model.title),
                )
                .for_model(model_id),
            );
        }
        Ok(column)
    }

    async fn put_option<T: Cacheable>(&self, table: MetaTable, option: &T) -> Result<(), MetaError> {
        self.ctx
            .store
            .insert(&self.ctx.container, table, serde_json::to_value(option)?)
            .await?;
        self.ctx
            .cache
            .set(&object_key(T::SCOPE, option.cache_id()), option)
            .await;
        Ok(())
    }

    async fn insert_options(&self, column: &Column, options: ColumnOptions) -> Result<(), MetaError> {
        let owner = column.id.clone();
        match options {
            ColumnOptions::Plain => Ok(()),
            ColumnOptions::Relation(mut d) => {
                d.id = MetaTable::ColRelations.generate_id();
                d.fk_column_id = owner;
                self.put_option(MetaTable::ColRelations, &d).await
            }
            ColumnOptions::Lookup(mut o) => {
                o.fk_column_id = owner;
                self.put_option(MetaTable::ColLookup, &o).await
            }
            ColumnOptions::Rollup(mut o) => {
                o.fk_column_id = owner;
                self.put_option(MetaTable::ColRollup, &o).await
            }
            ColumnOptions::Formula(mut o) => {
                o.fk_column_id = owner;
                self.put_option(MetaTable::ColFormula, &o).await
            }
            ColumnOptions::SelectOptions(options) => {
                for (i, mut o) in options.into_iter().enumerate() {
                    o.id = MetaTable::ColSelectOptions.generate_id();
                    o.fk_column_id = owner.clone();
                    o.order = o.order.or(Some(i as f64 + 1.0));
                    self.put_option(MetaTable::ColSelectOptions, &o).await?;
                }
                Ok(())
            }
        }
    }

    async fn load_option<T: Cacheable>(&self, table: MetaTable, column: &Column) -> Result<T, MetaError> {
        let key = object_key(T::SCOPE, &column.id);
        if let Some(o) = self.ctx.cache.get::<T>(&key).await {
            return Ok(o);
        }
        let row = self
            .ctx
            .store
            .get(
                &self.ctx.container,
                table,
                &Filter::new().eq("fk_column_id", column.id.as_str()),
            )
            .await?
            .ok_or_else(|| {
                MetaError::Integrity(format!(
                    "column {} has no row in {}",
                    column.id,
                    table.name()
                ))
            })?;
        let option: T = decode(row)?;
        self.ctx.cache.set(&key, &option).await;
        Ok(option)
    }

    /// Kind-specific data of a column.
    pub async fn options(&self, column: &Column) -> Result<ColumnOptions, MetaError> {
        match column.kind {
            ColumnKind::Plain | ColumnKind::ForeignKey => Ok(ColumnOptions::Plain),
            ColumnKind::Relation => Ok(ColumnOptions::Relation(
                self.load_option::<RelationDescriptor>(MetaTable::ColRelations, column)
                    .await?,
            )),
            ColumnKind::Lookup => Ok(ColumnOptions::Lookup(
                self.load_option::<LookupOptions>(MetaTable::ColLookup, column)
                    .await?,
            )),
            ColumnKind::Rollup => Ok(ColumnOptions::Rollup(
                self.load_option::<RollupOptions>(MetaTable::ColRollup, column)
                    .await?,
            )),
            ColumnKind::Formula => Ok(ColumnOptions::Formula(
                self.load_option::<FormulaOptions>(MetaTable::ColFormula, column)
                    .await?,
            )),
            ColumnKind::SingleSelect | ColumnKind::MultiSelect => {
                Ok(ColumnOptions::SelectOptions(self.select_options(column).await?))
            }
        }
    }

    async fn select_options(&self, column: &Column) -> Result<Vec<SelectOption>, MetaError> {
        let cached = self.ctx.cache.get_list::<SelectOption>(&[column.id.as_str()]).await;
        if cached.is_loaded() {
            let mut options = cached.list;
            sort_by_order(&mut options, |o| o.order);
            return Ok(options);
        }
        let rows = self
            .ctx
            .store
            .list(
                &self.ctx.container,
                MetaTable::ColSelectOptions,
                &Filter::new().eq("fk_column_id", column.id.as_str()),
                Some(&OrderBy::asc("order")),
            )
            .await?;
        let options: Vec<SelectOption> = decode_all(rows)?;
        self.ctx.cache.set_list(&[column.id.as_str()], &options).await;
        Ok(options)
    }

    /// Relation descriptor of a relation column.
    pub async fn relation(&self, column: &Column) -> Result<RelationDescriptor, MetaError> {
        if column.kind != ColumnKind::Relation {
            return Err(MetaError::Validation(format!(
                "column '{}' is not a relation",
                column.title
            )));
        }
        self.load_option(MetaTable::ColRelations, column).await
    }

    /// Relation columns of a model paired with their descriptors.
    pub async fn relations_of(&self, model_id: &str) -> Result<Vec<(Column, RelationDescriptor)>, MetaError> {
        let mut out = Vec::new();
        for column in self.list(model_id).await? {
            if column.kind == ColumnKind::Relation {
                let d = self.relation(&column).await?;
                out.push((column, d));
            }
        }
        Ok(out)
    }

    pub async fn update(&self, id: &str, patch: ColumnPatch) -> Result<Column, MetaError> {
        let mut column = self.require(id).await?;
        let existing = self.list(&column.fk_model_id).await?;
        let title = patch.title.clone().unwrap_or_else(|| column.title.clone());
        let column_name = patch.column_name.clone().or_else(|| column.column_name.clone());
        check_unique(&existing, &title, column_name.as_deref(), Some(id))?;

        let mut changes = Map::new();
        if let Some(t) = patch.title {
            changes.insert("title".into(), Value::String(t.clone()));
            column.title = t;
        }
        if let Some(n) = patch.column_name {
            changes.insert("column_name".into(), Value::String(n.clone()));
            column.column_name = Some(n);
        }
        if let Some(m) = patch.meta {
            changes.insert("meta".into(), m.clone());
            column.meta = m;
        }
        if changes.is_empty() {
            return Ok(column);
        }
        self.ctx
            .store
            .update(&self.ctx.container, MetaTable::Columns, Value::Object(changes), &Filter::by_id(id))
            .await?;
        self.ctx
            .cache
            .set(&object_key(CacheScope::Column, id), &column)
            .await;
        if !column.system {
            self.ctx.audit_event(
                AuditEvent::new(
                    AuditOp::ColumnUpdate,
                    &self.ctx.container,
                    self.ctx.actor.as_deref(),
                    format!("column '{}' updated", column.title),
                )
                .for_model(&column.fk_model_id),
            );
        }
        Ok(column)
    }

    pub(crate) async fn set_display_value(&self, column: &Column, pv: bool) -> Result<(), MetaError> {
        self.ctx
            .store
            .update(
                &self.ctx.container,
                MetaTable::Columns,
                json!({ "pv": pv }),
                &Filter::by_id(&column.id),
            )
            .await?;
        let mut updated = column.clone();
        updated.pv = pv;
        self.ctx
            .cache
            .set(&object_key(CacheScope::Column, &column.id), &updated)
            .await;
        Ok(())
    }

    /// Delete the column's option rows, invalidating their cache entries first.
    pub(crate) async fn delete_options(&self, column: &Column) -> Result<(), MetaError> {
        let Some(table) = column.kind.option_table() else {
            return Ok(());
        };
        let filter = Filter::new().eq("fk_column_id", column.id.as_str());
        match column.kind {
            ColumnKind::SingleSelect | ColumnKind::MultiSelect => {
                self.ctx
                    .cache
                    .deep_del(
                        &list_key(CacheScope::ColSelectOption, &[column.id.as_str()]),
                        CascadeDirection::ParentToChild,
                    )
                    .await;
            }
            ColumnKind::Relation => self.drop_option_key(CacheScope::ColRelation, column).await,
            ColumnKind::Lookup => self.drop_option_key(CacheScope::ColLookup, column).await,
            ColumnKind::Rollup => self.drop_option_key(CacheScope::ColRollup, column).await,
            ColumnKind::Formula => self.drop_option_key(CacheScope::ColFormula, column).await,
            ColumnKind::Plain | ColumnKind::ForeignKey => {}
        }
        self.ctx.store.delete(&self.ctx.container, table, &filter).await?;
        Ok(())
    }

    async fn drop_option_key(&self, scope: CacheScope, column: &Column) {
        self.ctx
            .cache
            .deep_del(&object_key(scope, &column.id), CascadeDirection::ChildToParent)
            .await;
    }

    /// Ids of lookup, rollup and relation columns that point at `column`.
    async fn dependents(&self, column: &Column) -> Result<Vec<String>, MetaError> {
        let references = [
            (MetaTable::ColLookup, "fk_relation_column_id"),
            (MetaTable::ColLookup, "fk_lookup_column_id"),
            (MetaTable::ColRollup, "fk_relation_column_id"),
            (MetaTable::ColRollup, "fk_rollup_column_id"),
            (MetaTable::ColRelations, "fk_child_column_id"),
            (MetaTable::ColRelations, "fk_parent_column_id"),
        ];
        let mut ids: Vec<String> = Vec::new();
        for (table, field) in references {
            let rows = self
                .ctx
                .store
                .list(
                    &self.ctx.container,
                    table,
                    &Filter::new().eq(field, column.id.as_str()),
                    None,
                )
                .await?;
            for row in rows {
                let Some(owner) = row.get("fk_column_id").and_then(Value::as_str) else {
                    continue;
                };
                if owner != column.id && !ids.iter().any(|i| i == owner) {
                    ids.push(owner.to_string());
                }
            }
        }
        Ok(ids)
    }

    /// Option rows, view memberships, then the column row itself.
    async fn delete_row(&self, column: &Column) -> Result<(), MetaError> {
        self.delete_options(column).await?;
        self.ctx.views().remove_column(&column.id).await?;
        self.ctx
            .store
            .delete(&self.ctx.container, MetaTable::Columns, &Filter::by_id(&column.id))
            .await?;
        self.ctx
            .cache
            .deep_del(&object_key(CacheScope::Column, &column.id), CascadeDirection::ChildToParent)
            .await;
        Ok(())
    }

    /// Delete a column and the virtual columns built directly on it.
    pub async fn delete(&self, id: &str) -> Result<(), MetaError> {
        let column = self.require(id).await?;
        for dependent_id in self.dependents(&column).await? {
            if let Some(dependent) = self.get(&dependent_id).await? {
                tracing::debug!(column = %id, dependent = %dependent_id, "deleting dependent column");
                self.delete_row(&dependent).await?;
                self.ctx
                    .cache
                    .del_list(CacheScope::Column, &[dependent.fk_model_id.as_str()])
                    .await;
            }
        }
        self.delete_row(&column).await?;
        if !column.system {
            self.ctx.audit_event(
                AuditEvent::new(
                    AuditOp::ColumnDelete,
                    &self.ctx.container,
                    self.ctx.actor.as_deref(),
                    format!("column '{}' deleted", column.title),
                )
                .for_model(&column.fk_model_id),
            );
        }
        Ok(())
    }
}
