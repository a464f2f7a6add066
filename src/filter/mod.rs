//! # Filters
//!
//! Filter, filter-group and global-search descriptors and the builder that
//! turns them into a parameterized predicate.

mod builder;
mod types;

pub use builder::FilterExpressionBuilder;
pub use types::{
    Clause, FilterDescriptor, FilterGroup, FilterOperator, GlobalSearch, LogicalOperator,
    MatchMode, Predicate,
};
