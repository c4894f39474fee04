//! Roles, route allow-lists, and the authenticated principal.
//!
//! Authorization is a flat allow-list: every route declares the roles that may
//! call it and the principal's role must appear in that list. There is no role
//! hierarchy beyond what the lists themselves encode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Role of a user within their organisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform operator; manages organisations.
    SuperAdmin,
    /// Organisation administrator.
    Admin,
    /// Account/practice manager.
    Manager,
    /// Regular member.
    Member,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::SuperAdmin, Role::Admin, Role::Manager, Role::Member];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "super_admin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "member" => Ok(Role::Member),
            other => Err(Error::InvalidInput(format!("Unknown role '{}'", other))),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

// =============================================================================
// ROUTE ALLOW-LISTS
// =============================================================================

/// Organisation management.
pub const ORGANISATION_ADMIN: &[Role] = &[Role::SuperAdmin];

/// Users, practices, templates, and prompt overrides.
pub const ORG_ADMIN: &[Role] = &[Role::SuperAdmin, Role::Admin];

/// Creating, editing, and deleting clients; managing KB sources; deleting briefs.
pub const CONTENT_MANAGERS: &[Role] = &[Role::SuperAdmin, Role::Admin, Role::Manager];

/// Any authenticated member of an organisation.
pub const ALL_MEMBERS: &[Role] = &Role::ALL;

/// Authenticated caller resolved from a bearer token and their profile row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub organisation_id: Uuid,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub practice_id: Option<Uuid>,
}

impl Principal {
    /// Check the principal's role against a route allow-list.
    pub fn require_roles(&self, allowed: &[Role]) -> Result<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "Role '{}' is not permitted for this operation",
                self.role
            )))
        }
    }

    /// Check whether this principal may assign `target` to another user.
    ///
    /// Only super admins can grant `super_admin`.
    pub fn can_assign_role(&self, target: Role) -> bool {
        target != Role::SuperAdmin || self.role == Role::SuperAdmin
    }
}
