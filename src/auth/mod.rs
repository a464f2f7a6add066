//! # Authorization
//!
//! Principals, capabilities and the collaborator that decides whether a
//! principal may use a capability. Authentication happens upstream; the
//! engine only sees the resulting principal.

use serde::{Deserialize, Serialize};

use crate::errors::{CrudError, CrudResult};

/// Authority required by default for every capability
pub const ROLE_ADMIN: &str = "ROLE_ADMIN";

/// Identity of the caller
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Principal {
    /// Actor name recorded in audit records
    pub name: String,

    /// Granted authorities (e.g. `ROLE_ADMIN`)
    #[serde(default)]
    pub authorities: Vec<String>,

    /// Where the request came from (address, host, tool)
    #[serde(default)]
    pub client_origin: Option<String>,

    pub authenticated: bool,
}

impl Principal {
    /// Create an authenticated principal
    pub fn authenticated(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            authorities: Vec::new(),
            client_origin: None,
            authenticated: true,
        }
    }

    /// Create an anonymous principal
    pub fn anonymous() -> Self {
        Self {
            name: "anonymous".to_string(),
            ..Default::default()
        }
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authorities.push(authority.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.client_origin = Some(origin.into());
        self
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities
            .iter()
            .any(|a| a.eq_ignore_ascii_case(authority))
    }
}

/// What an entry point needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    ReadTable,
    DescribeSchema,
    WriteTable,
    BulkWrite,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ReadTable => "READ_TABLE",
            Capability::DescribeSchema => "DESCRIBE_SCHEMA",
            Capability::WriteTable => "WRITE_TABLE",
            Capability::BulkWrite => "BULK_WRITE",
        }
    }
}

/// Authorization collaborator
pub trait Authorizer: Send + Sync {
    fn has_capability(&self, principal: &Principal, capability: Capability) -> bool;

    /// `AccessDenied` unless the principal holds `capability`
    fn authorize(&self, principal: &Principal, capability: Capability) -> CrudResult<()> {
        if !principal.authenticated {
            return Err(CrudError::AccessDenied(format!(
                "{} requires authentication",
                capability.as_str()
            )));
        }
        if self.has_capability(principal, capability) {
            Ok(())
        } else {
            Err(CrudError::AccessDenied(format!(
                "'{}' lacks {}",
                principal.name,
                capability.as_str()
            )))
        }
    }
}

/// Grants every capability to authenticated holders of one authority
#[derive(Debug, Clone)]
pub struct RoleAuthorizer {
    required_authority: String,
}

impl RoleAuthorizer {
    pub fn new(required_authority: impl Into<String>) -> Self {
        Self {
            required_authority: required_authority.into(),
        }
    }

    pub fn required_authority(&self) -> &str {
        &self.required_authority
    }
}

impl Default for RoleAuthorizer {
    fn default() -> Self {
        Self::new(ROLE_ADMIN)
    }
}

impl Authorizer for RoleAuthorizer {
    fn has_capability(&self, principal: &Principal, _capability: Capability) -> bool {
        principal.authenticated && principal.has_authority(&self.required_authority)
    }
}
