//! CRUD operation dispatch.
//!
//! Every request routes through this closed enum; all per-operation
//! behavior is an exhaustive match here.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::auth::Capability;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CrudOperation {
    #[serde(alias = "create", alias = "INSERT", alias = "insert")]
    Create,
    #[serde(alias = "read", alias = "SELECT", alias = "select")]
    Read,
    #[serde(alias = "update")]
    Update,
    #[serde(alias = "delete")]
    Delete,
}

impl CrudOperation {
    /// Get operation name for logs and audit records
    pub fn as_str(&self) -> &'static str {
        match self {
            CrudOperation::Create => "CREATE",
            CrudOperation::Read => "READ",
            CrudOperation::Update => "UPDATE",
            CrudOperation::Delete => "DELETE",
        }
    }

    /// Leading SQL keyword
    pub fn sql_verb(&self) -> &'static str {
        match self {
            CrudOperation::Create => "INSERT",
            CrudOperation::Read => "SELECT",
            CrudOperation::Update => "UPDATE",
            CrudOperation::Delete => "DELETE",
        }
    }

    pub fn is_write(&self) -> bool {
        match self {
            CrudOperation::Create | CrudOperation::Update | CrudOperation::Delete => true,
            CrudOperation::Read => false,
        }
    }

    /// Whether at least one column value must be supplied
    pub fn requires_columns(&self) -> bool {
        match self {
            CrudOperation::Create | CrudOperation::Update => true,
            CrudOperation::Read | CrudOperation::Delete => false,
        }
    }

    /// Whether at least one filter must be supplied
    pub fn requires_filters(&self) -> bool {
        match self {
            CrudOperation::Update | CrudOperation::Delete => true,
            CrudOperation::Create | CrudOperation::Read => false,
        }
    }

    /// Capability checked before a single-row request runs
    pub fn capability(&self) -> Capability {
        match self {
            CrudOperation::Read => Capability::ReadTable,
            CrudOperation::Create | CrudOperation::Update | CrudOperation::Delete => {
                Capability::WriteTable
            }
        }
    }
}

impl fmt::Display for CrudOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
