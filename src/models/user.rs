use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::Role;
use crate::db::row_parsers::parse_uuid;
use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    /// `null` when the stored role is not one of the known roles
    pub role: Option<Role>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub company: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbUser {
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        parse_uuid(&self.id)
    }

    pub fn role(&self) -> Option<Role> {
        let role = Role::parse(&self.role);
        if role.is_none() {
            tracing::warn!(user_id = %self.id, stored = %self.role, "unrecognized role, user gets no permissions");
        }
        role
    }
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(value: DbUser) -> Result<Self, Self::Error> {
        let role = value.role();
        Ok(User {
            id: value.user_id()?,
            name: value.name,
            email: value.email,
            company: value.company,
            role,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
    #[schema(example = "Tech Solutions S.A.")]
    pub company: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// Current user plus the permission tokens its role grants
#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user: User,
    #[schema(example = json!(["rma:create", "rma:read_own"]))]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleUpdateRequest {
    #[schema(example = "ADMIN")]
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(role: &str) -> DbUser {
        let now = Utc::now();
        DbUser {
            id: Uuid::new_v4().to_string(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password_hash: "x".into(),
            company: None,
            role: role.into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn known_role_is_parsed() {
        let user: User = row("SUPERADMIN").try_into().unwrap();
        assert_eq!(user.role, Some(Role::Superadmin));
    }

    #[test]
    fn unknown_role_becomes_none() {
        let user: User = row("OWNER").try_into().unwrap();
        assert_eq!(user.role, None);
        let json = serde_json::to_value(&user).unwrap();
        assert!(json["role"].is_null());
    }
}
