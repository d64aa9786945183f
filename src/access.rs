//! Caller identity handed in by the authentication layer
//!
//! The core never authenticates. It receives a resolved project and role
//! and only checks that write-class operations come from an editor or admin.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Role of the caller within a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Editor,
    Admin,
}

impl Role {
    /// Whether this role may mutate documents or drift state
    pub fn can_write(&self) -> bool {
        *self >= Role::Editor
    }

    /// Parse a role name as sent by the session layer
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "admin" | "owner" => Some(Role::Admin),
            "editor" | "member" => Some(Role::Editor),
            "viewer" | "reader" => Some(Role::Viewer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Viewer => write!(f, "viewer"),
            Role::Editor => write!(f, "editor"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// A resolved `(project_id, role)` pair for one call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectScope {
    pub project_id: String,
    pub role: Role,
}

impl ProjectScope {
    pub fn new(project_id: impl Into<String>, role: Role) -> Self {
        Self {
            project_id: project_id.into(),
            role,
        }
    }

    /// Fail with `PermissionDenied` unless the caller may write
    pub fn require_write(&self, action: &'static str) -> CoreResult<()> {
        if self.role.can_write() {
            Ok(())
        } else {
            tracing::warn!(
                project = %self.project_id,
                role = %self.role,
                action,
                "write rejected"
            );
            Err(CoreError::PermissionDenied {
                action,
                role: self.role,
            })
        }
    }
}
