use crate::model::role::Role;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
}

impl TryFrom<String> for UserStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Full user row including the password hash; never serialized to clients.
#[derive(Debug, sqlx::FromRow)]
pub struct UserCredentials {
    pub id: u64,
    pub email: String,
    pub password: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    #[sqlx(try_from = "String")]
    pub status: UserStatus,
    pub first_login: bool,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 7,
    "name": "Jane Doe",
    "email": "jane.doe@company.com",
    "role": "employee",
    "department": "Engineering",
    "manager_id": 2,
    "manager_name": "John Smith",
    "job_position": "Backend Engineer",
    "phone": "+8801712345678",
    "address": "Dhaka",
    "avatar_url": null,
    "status": "active",
    "first_login": false,
    "last_login_at": "2026-01-05T09:00:00",
    "created_at": "2026-01-01T00:00:00Z"
}))]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub department: Option<String>,
    pub manager_id: Option<u64>,
    pub manager_name: Option<String>,
    pub job_position: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub avatar_url: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: UserStatus,
    pub first_login: bool,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_login_at: Option<NaiveDateTime>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

/// Columns selected for [`User`], with the manager's name joined in.
pub const USER_COLUMNS: &str = r#"
    u.id, u.name, u.email, u.role, u.department, u.manager_id,
    m.name AS manager_name, u.job_position, u.phone, u.address, u.avatar_url,
    u.status, u.first_login, u.last_login_at, u.created_at
"#;

/// Lower-cased, trimmed login identity.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Loose shape check: one `@`, something on both sides, a dot in the domain.
pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        _ => false,
    }
}

pub const MIN_PASSWORD_LEN: usize = 8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_normalized_for_lookup() {
        assert_eq!(normalize_email("  Jane.Doe@Company.COM "), "jane.doe@company.com");
    }

    #[test]
    fn email_shape_check() {
        assert!(is_valid_email("jane@company.com"));
        assert!(!is_valid_email("jane.company.com"));
        assert!(!is_valid_email("jane@company"));
        assert!(!is_valid_email("@company.com"));
        assert!(!is_valid_email("a@b@company.com"));
        assert!(!is_valid_email("jane doe@company.com"));
    }
}
