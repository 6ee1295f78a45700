//! Role and permission catalog models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// A string that does not name a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownCatalogValue {
    pub kind: &'static str,
    pub value: String,
}

/// Built-in role names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleName {
    Admin,
    User,
}

impl RoleName {
    pub const ALL: [RoleName; 2] = [RoleName::Admin, RoleName::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::Admin => "ADMIN",
            RoleName::User => "USER",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, RoleName::Admin)
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleName {
    type Err = UnknownCatalogValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(RoleName::Admin),
            "USER" => Ok(RoleName::User),
            other => Err(UnknownCatalogValue {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for RoleName {
    type Error = UnknownCatalogValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The fixed action vocabulary of the permission catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    CreateDocument,
    ReadDocument,
    UpdateDocument,
    DeleteDocument,
    ManagePermissions,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::CreateDocument,
        Action::ReadDocument,
        Action::UpdateDocument,
        Action::DeleteDocument,
        Action::ManagePermissions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateDocument => "CREATE_DOCUMENT",
            Action::ReadDocument => "READ_DOCUMENT",
            Action::UpdateDocument => "UPDATE_DOCUMENT",
            Action::DeleteDocument => "DELETE_DOCUMENT",
            Action::ManagePermissions => "MANAGE_PERMISSIONS",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Action::CreateDocument => "Can upload the document",
            Action::ReadDocument => "Can view the document",
            Action::UpdateDocument => "Can update the document",
            Action::DeleteDocument => "Can delete the document",
            Action::ManagePermissions => "Can update/delete any document",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = UnknownCatalogValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownCatalogValue {
                kind: "action",
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for Action {
    type Error = UnknownCatalogValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Role entity
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Role {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub name: RoleName,
}

/// Seeded grant matrix: ADMIN holds every action, USER all but permission management.
pub fn default_grants(role: RoleName) -> &'static [Action] {
    match role {
        RoleName::Admin => &Action::ALL,
        RoleName::User => &[
            Action::CreateDocument,
            Action::ReadDocument,
            Action::UpdateDocument,
            Action::DeleteDocument,
        ],
    }
}

/// Per-(user, document) override flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PermissionFlags {
    #[serde(default = "default_true")]
    pub can_read: bool,
    #[serde(default)]
    pub can_update: bool,
    #[serde(default)]
    pub can_delete: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PermissionFlags {
    fn default() -> Self {
        Self {
            can_read: true,
            can_update: false,
            can_delete: false,
        }
    }
}

impl PermissionFlags {
    /// Whether the override covers `action`. Create and permission management
    /// are never document-scoped.
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::ReadDocument => self.can_read,
            Action::UpdateDocument => self.can_update,
            Action::DeleteDocument => self.can_delete,
            Action::CreateDocument | Action::ManagePermissions => false,
        }
    }
}

/// Per-document override row
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct DocumentPermission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub can_read: bool,
    pub can_update: bool,
    pub can_delete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentPermission {
    pub fn flags(&self) -> PermissionFlags {
        PermissionFlags {
            can_read: self.can_read,
            can_update: self.can_update,
            can_delete: self.can_delete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse_roundtrip() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = "DROP_TABLES".parse::<Action>().unwrap_err();
        assert_eq!(err.kind, "action");
        assert!("read_document".parse::<Action>().is_err());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("ADMIN".parse::<RoleName>().unwrap(), RoleName::Admin);
        assert_eq!("USER".parse::<RoleName>().unwrap(), RoleName::User);
        assert!("ROOT".parse::<RoleName>().is_err());
    }

    #[test]
    fn test_action_serde_uses_catalog_strings() {
        let json = serde_json::to_string(&Action::ManagePermissions).unwrap();
        assert_eq!(json, "\"MANAGE_PERMISSIONS\"");
        let parsed: RoleName = serde_json::from_str("\"ADMIN\"").unwrap();
        assert_eq!(parsed, RoleName::Admin);
    }

    #[test]
    fn test_default_grants() {
        assert_eq!(default_grants(RoleName::Admin).len(), 5);
        assert!(!default_grants(RoleName::User).contains(&Action::ManagePermissions));
    }

    #[test]
    fn test_flags_cover_only_document_actions() {
        let flags = PermissionFlags {
            can_read: true,
            can_update: true,
            can_delete: true,
        };
        assert!(flags.allows(Action::ReadDocument));
        assert!(flags.allows(Action::UpdateDocument));
        assert!(flags.allows(Action::DeleteDocument));
        assert!(!flags.allows(Action::CreateDocument));
        assert!(!flags.allows(Action::ManagePermissions));
    }

    #[test]
    fn test_flags_defaults_from_json() {
        let flags: PermissionFlags = serde_json::from_str("{}").unwrap();
        assert_eq!(flags, PermissionFlags::default());
        assert!(flags.can_read && !flags.can_update && !flags.can_delete);
    }
}
