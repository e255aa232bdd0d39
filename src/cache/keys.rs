//! Cache key grammar: `<scope>:<id>` for objects, `<scope>:<args..>:list` for lists,
//! `<scope>:<base>:alias:<alias>` for alias lookups.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheScope {
    Model,
    Column,
    View,
    ViewColumn,
    ColRelation,
    ColLookup,
    ColRollup,
    ColFormula,
    ColSelectOption,
}

impl CacheScope {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheScope::Model => "model",
            CacheScope::Column => "column",
            CacheScope::View => "view",
            CacheScope::ViewColumn => "view_column",
            CacheScope::ColRelation => "col_relation",
            CacheScope::ColLookup => "col_lookup",
            CacheScope::ColRollup => "col_rollup",
            CacheScope::ColFormula => "col_formula",
            CacheScope::ColSelectOption => "col_select_option",
        }
    }
}

pub fn object_key(scope: CacheScope, id: &str) -> String {
    format!("{}:{}", scope.as_str(), id)
}

pub fn list_key(scope: CacheScope, args: &[&str]) -> String {
    let mut key = scope.as_str().to_string();
    for a in args {
        key.push(':');
        key.push_str(a);
    }
    key.push_str(":list");
    key
}

/// Secondary lookup key mapping a title or physical name to an id within a base.
/// Kept under `alias:` so an alias named `list` cannot land on the base's list key.
pub fn alias_key(scope: CacheScope, base_id: &str, alias: &str) -> String {
    format!("{}:{}:alias:{}", scope.as_str(), base_id, alias)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes() {
        assert_eq!(object_key(CacheScope::Column, "cl_1"), "column:cl_1");
        assert_eq!(list_key(CacheScope::Model, &["b1"]), "model:b1:list");
        assert_eq!(list_key(CacheScope::ViewColumn, &[]), "view_column:list");
        assert_eq!(alias_key(CacheScope::Model, "b1", "Orders"), "model:b1:alias:Orders");
        assert_ne!(alias_key(CacheScope::Model, "b1", "list"), list_key(CacheScope::Model, &["b1"]));
    }
}
