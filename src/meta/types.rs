//! Metadata entities as persisted in the store and cached by the entity cache.

use crate::cache::{CacheScope, Cacheable};
use crate::meta::MetaTable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A user table. `columns`/`views` are only populated by `ModelRepo::get_with_info`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub base_id: String,
    pub title: String,
    pub table_name: String,
    #[serde(default)]
    pub order: Option<f64>,
    #[serde(default)]
    pub is_view_backed: bool,
    /// Hidden junction table backing many-to-many relations.
    #[serde(default)]
    pub is_junction: bool,
    #[serde(default)]
    pub meta: Value,
    #[serde(skip)]
    pub columns: Vec<Column>,
    #[serde(skip)]
    pub views: Vec<View>,
    #[serde(skip)]
    columns_by_id: HashMap<String, usize>,
}

impl Model {
    pub fn new(base_id: &str, title: &str, table_name: &str) -> Self {
        Model {
            id: String::new(),
            base_id: base_id.to_string(),
            title: title.to_string(),
            table_name: table_name.to_string(),
            order: None,
            is_view_backed: false,
            is_junction: false,
            meta: Value::Null,
            columns: Vec::new(),
            views: Vec::new(),
            columns_by_id: HashMap::new(),
        }
    }

    /// Attach loaded columns and views, rebuilding the id index.
    pub fn attach(&mut self, columns: Vec<Column>, views: Vec<View>) {
        self.columns_by_id = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        self.columns = columns;
        self.views = views;
    }

    pub fn column(&self, id: &str) -> Option<&Column> {
        self.columns_by_id.get(id).and_then(|&i| self.columns.get(i))
    }

    pub fn column_by_title(&self, title: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.title == title)
    }

    pub fn primary_key(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.pk)
    }

    pub fn primary_keys(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.pk).collect()
    }

    /// Display column: the flagged one, else the column right after the primary key, else the first.
    /// Junction tables have no meaningful display column and use the first.
    pub fn display_value(&self) -> Option<&Column> {
        if let Some(flagged) = self.columns.iter().find(|c| c.pv) {
            return Some(flagged);
        }
        if self.is_junction {
            return self.columns.first();
        }
        match self.columns.iter().position(|c| c.pk) {
            Some(i) => self.columns.get(i + 1).or_else(|| self.columns.first()),
            None => self.columns.first(),
        }
    }
}

impl Cacheable for Model {
    const SCOPE: CacheScope = CacheScope::Model;

    fn cache_id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Plain,
    ForeignKey,
    Relation,
    Lookup,
    Rollup,
    Formula,
    SingleSelect,
    MultiSelect,
}

impl ColumnKind {
    /// Table holding this kind's option rows, if it has any.
    pub fn option_table(self) -> Option<MetaTable> {
        match self {
            ColumnKind::Plain | ColumnKind::ForeignKey => None,
            ColumnKind::Relation => Some(MetaTable::ColRelations),
            ColumnKind::Lookup => Some(MetaTable::ColLookup),
            ColumnKind::Rollup => Some(MetaTable::ColRollup),
            ColumnKind::Formula => Some(MetaTable::ColFormula),
            ColumnKind::SingleSelect | ColumnKind::MultiSelect => Some(MetaTable::ColSelectOptions),
        }
    }

    /// Virtual columns have no physical counterpart.
    pub fn is_virtual(self) -> bool {
        match self {
            ColumnKind::Relation | ColumnKind::Lookup | ColumnKind::Rollup | ColumnKind::Formula => true,
            ColumnKind::Plain | ColumnKind::ForeignKey | ColumnKind::SingleSelect | ColumnKind::MultiSelect => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub fk_model_id: String,
    pub title: String,
    /// Physical name; `None` for virtual columns.
    #[serde(default)]
    pub column_name: Option<String>,
    pub kind: ColumnKind,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub order: Option<f64>,
    #[serde(default)]
    pub system: bool,
    #[serde(default)]
    pub pk: bool,
    /// Display value flag.
    #[serde(default)]
    pub pv: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub meta: Value,
}

impl Cacheable for Column {
    const SCOPE: CacheScope = CacheScope::Column;

    fn cache_id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    #[serde(rename = "bt")]
    BelongsTo,
    #[serde(rename = "hm")]
    HasMany,
    #[serde(rename = "mm")]
    ManyToMany,
}

impl RelationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::BelongsTo => "bt",
            RelationKind::HasMany => "hm",
            RelationKind::ManyToMany => "mm",
        }
    }
}

/// Junction model and its two foreign-key columns, seen from one many-to-many side.
/// `child_column_id` references this side's primary key, `parent_column_id` the other side's.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JunctionRef {
    pub model_id: String,
    pub child_column_id: String,
    pub parent_column_id: String,
}

/// Options row of a relation column.
///
/// For `bt`/`hm` the child column is the physical foreign key and the parent column is
/// the referenced primary key; both sides of a pair carry the same two ids. For `mm`
/// the child/parent columns are the primary keys of this side and the related side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    #[serde(default)]
    pub id: String,
    /// Owning (virtual) column.
    #[serde(default)]
    pub fk_column_id: String,
    #[serde(rename = "type")]
    pub kind: RelationKind,
    pub fk_child_column_id: String,
    pub fk_parent_column_id: String,
    pub fk_related_model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub junction: Option<JunctionRef>,
    #[serde(default)]
    pub fk_index_name: Option<String>,
    /// No physical constraint backs this relation.
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
    /// Built over a caller-supplied column that the relation never drops.
    #[serde(default)]
    pub custom: bool,
}

impl RelationDescriptor {
    pub fn new(
        kind: RelationKind,
        fk_child_column_id: &str,
        fk_parent_column_id: &str,
        fk_related_model_id: &str,
    ) -> Self {
        RelationDescriptor {
            id: String::new(),
            fk_column_id: String::new(),
            kind,
            fk_child_column_id: fk_child_column_id.to_string(),
            fk_parent_column_id: fk_parent_column_id.to_string(),
            fk_related_model_id: fk_related_model_id.to_string(),
            junction: None,
            fk_index_name: None,
            is_virtual: false,
            custom: false,
        }
    }

    /// True when `other` is the paired side of this relation.
    pub fn is_inverse_of(&self, other: &RelationDescriptor) -> bool {
        match (self.kind, other.kind) {
            (RelationKind::BelongsTo, RelationKind::HasMany)
            | (RelationKind::HasMany, RelationKind::BelongsTo) => {
                self.fk_child_column_id == other.fk_child_column_id
                    && self.fk_parent_column_id == other.fk_parent_column_id
            }
            (RelationKind::ManyToMany, RelationKind::ManyToMany) => {
                match (&self.junction, &other.junction) {
                    (Some(a), Some(b)) => {
                        a.model_id == b.model_id
                            && a.child_column_id == b.parent_column_id
                            && a.parent_column_id == b.child_column_id
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

impl Cacheable for RelationDescriptor {
    const SCOPE: CacheScope = CacheScope::ColRelation;

    fn cache_id(&self) -> &str {
        &self.fk_column_id
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LookupOptions {
    #[serde(default)]
    pub fk_column_id: String,
    pub fk_relation_column_id: String,
    pub fk_lookup_column_id: String,
}

impl Cacheable for LookupOptions {
    const SCOPE: CacheScope = CacheScope::ColLookup;

    fn cache_id(&self) -> &str {
        &self.fk_column_id
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RollupOptions {
    #[serde(default)]
    pub fk_column_id: String,
    pub fk_relation_column_id: String,
    pub fk_rollup_column_id: String,
    pub rollup_function: String,
}

impl Cacheable for RollupOptions {
    const SCOPE: CacheScope = CacheScope::ColRollup;

    fn cache_id(&self) -> &str {
        &self.fk_column_id
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FormulaOptions {
    #[serde(default)]
    pub fk_column_id: String,
    pub formula: String,
}

impl Cacheable for FormulaOptions {
    const SCOPE: CacheScope = CacheScope::ColFormula;

    fn cache_id(&self) -> &str {
        &self.fk_column_id
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub fk_column_id: String,
    pub title: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub order: Option<f64>,
}

impl Cacheable for SelectOption {
    const SCOPE: CacheScope = CacheScope::ColSelectOption;

    fn cache_id(&self) -> &str {
        &self.id
    }
}

/// Kind-specific column data. One variant per option table.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnOptions {
    Plain,
    Relation(RelationDescriptor),
    Lookup(LookupOptions),
    Rollup(RollupOptions),
    Formula(FormulaOptions),
    SelectOptions(Vec<SelectOption>),
}

impl ColumnOptions {
    pub fn fits(&self, kind: ColumnKind) -> bool {
        match self {
            ColumnOptions::Plain => matches!(kind, ColumnKind::Plain | ColumnKind::ForeignKey),
            ColumnOptions::Relation(_) => kind == ColumnKind::Relation,
            ColumnOptions::Lookup(_) => kind == ColumnKind::Lookup,
            ColumnOptions::Rollup(_) => kind == ColumnKind::Rollup,
            ColumnOptions::Formula(_) => kind == ColumnKind::Formula,
            ColumnOptions::SelectOptions(_) => {
                matches!(kind, ColumnKind::SingleSelect | ColumnKind::MultiSelect)
            }
        }
    }

    pub fn as_relation(&self) -> Option<&RelationDescriptor> {
        match self {
            ColumnOptions::Relation(d) => Some(d),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Grid,
    Form,
    Gallery,
    Kanban,
    Calendar,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub id: String,
    pub fk_model_id: String,
    pub title: String,
    pub kind: ViewKind,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub order: Option<f64>,
}

impl Cacheable for View {
    const SCOPE: CacheScope = CacheScope::View;

    fn cache_id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewColumn {
    pub id: String,
    pub fk_view_id: String,
    pub fk_column_id: String,
    #[serde(default)]
    pub show: bool,
    #[serde(default)]
    pub order: Option<f64>,
}

impl Cacheable for ViewColumn {
    const SCOPE: CacheScope = CacheScope::ViewColumn;

    fn cache_id(&self) -> &str {
        &self.id
    }
}

/// Ascending by `order`, missing orders last, stable otherwise.
pub(crate) fn sort_by_order<T>(items: &mut [T], order: impl Fn(&T) -> Option<f64>) {
    items.sort_by(|a, b| match (order(a), order(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}
