//! # Query
//!
//! Read requests and the builder that turns them into a SELECT plus COUNT.

mod builder;
mod request;

pub use builder::{QueryBuilder, SelectPlan};
pub use request::{OrderDirection, QueryRequest, QueryResult};
