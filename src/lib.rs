//! tablecrud - allow-listed dynamic table CRUD
//!
//! Generic read, stream, write and bulk operations over a configured set
//! of relational tables. Table and column names are checked against an
//! allow-list and live catalog metadata before any SQL is built; every
//! value is bound as a parameter. Writes pass through one gateway that
//! authorizes, audits and records metrics.

pub mod audit;
pub mod auth;
pub mod bulk;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod filter;
pub mod logging;
pub mod metrics;
pub mod mutation;
pub mod query;
pub mod schema;
pub mod sql;
pub mod store;
pub mod stream;
pub mod transfer;

pub use config::{ConfigError, EngineConfig};
pub use engine::{CrudEngine, EngineBuilder};
pub use errors::{CrudError, CrudResult, ErrorKind};
