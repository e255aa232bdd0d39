//! Metadata entities and the tables they persist to.

pub mod tables;
pub mod types;

pub use tables::{Container, MetaTable};
pub use types::{
    Column, ColumnKind, ColumnOptions, FormulaOptions, JunctionRef, LookupOptions, Model,
    RelationDescriptor, RelationKind, RollupOptions, SelectOption, View, ViewColumn, ViewKind,
};
