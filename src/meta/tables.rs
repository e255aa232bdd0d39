//! Metadata tables and the container scope that partitions them.

use serde::{Deserialize, Serialize};

/// Workspace/base scope every metadata row belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Container {
    pub workspace_id: String,
    pub base_id: String,
}

impl Container {
    pub fn new(workspace_id: impl Into<String>, base_id: impl Into<String>) -> Self {
        Container {
            workspace_id: workspace_id.into(),
            base_id: base_id.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetaTable {
    Models,
    Columns,
    ColRelations,
    ColLookup,
    ColRollup,
    ColFormula,
    ColSelectOptions,
    Views,
    ViewColumns,
    Comments,
    Audit,
}

impl MetaTable {
    pub const ALL: [MetaTable; 11] = [
        MetaTable::Models,
        MetaTable::Columns,
        MetaTable::ColRelations,
        MetaTable::ColLookup,
        MetaTable::ColRollup,
        MetaTable::ColFormula,
        MetaTable::ColSelectOptions,
        MetaTable::Views,
        MetaTable::ViewColumns,
        MetaTable::Comments,
        MetaTable::Audit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MetaTable::Models => "models",
            MetaTable::Columns => "columns",
            MetaTable::ColRelations => "col_relations",
            MetaTable::ColLookup => "col_lookup",
            MetaTable::ColRollup => "col_rollup",
            MetaTable::ColFormula => "col_formula",
            MetaTable::ColSelectOptions => "col_select_options",
            MetaTable::Views => "views",
            MetaTable::ViewColumns => "view_columns",
            MetaTable::Comments => "comments",
            MetaTable::Audit => "audit",
        }
    }

    fn id_prefix(self) -> &'static str {
        match self {
            MetaTable::Models => "md",
            MetaTable::Columns => "cl",
            MetaTable::ColRelations => "ln",
            MetaTable::ColLookup => "lk",
            MetaTable::ColRollup => "rl",
            MetaTable::ColFormula => "fm",
            MetaTable::ColSelectOptions => "sl",
            MetaTable::Views => "vw",
            MetaTable::ViewColumns => "vc",
            MetaTable::Comments => "cm",
            MetaTable::Audit => "adt",
        }
    }

    /// New row id: table prefix plus 14 random hex chars (e.g. `md_3f9a0c1b2d4e5f`).
    pub fn generate_id(self) -> String {
        let raw = uuid::Uuid::new_v4().simple().to_string();
        format!("{}_{}", self.id_prefix(), &raw[..14])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_carry_table_prefix_and_are_distinct() {
        let a = MetaTable::Columns.generate_id();
        let b = MetaTable::Columns.generate_id();
        assert!(a.starts_with("cl_"));
        assert_eq!(a.len(), 17);
        assert_ne!(a, b);
    }

    #[test]
    fn table_names_are_unique() {
        let names: HashSet<_> = MetaTable::ALL.iter().map(|t| t.name()).collect();
        assert_eq!(names.len(), MetaTable::ALL.len());
    }
}
