//! # Mutations
//!
//! CREATE, UPDATE and DELETE through the gateway.

mod gateway;
mod operation;
mod request;

pub use gateway::{MutationGateway, RowChange};
pub use operation::CrudOperation;
pub use request::{ColumnValue, MutationRequest, MutationResult};
