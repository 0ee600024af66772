use crate::{
    api::users::fetch_user,
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::user::User,
    utils::db_utils::{Column, ColumnKind, build_update_sql, execute_update},
};
use actix_web::{HttpResponse, web};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::info;

/// What an employee may change about themselves.
const SELF_EDITABLE: &[Column] = &[
    Column {
        name: "name",
        kind: ColumnKind::Text,
        nullable: false,
    },
    Column {
        name: "phone",
        kind: ColumnKind::Text,
        nullable: true,
    },
    Column {
        name: "address",
        kind: ColumnKind::Text,
        nullable: true,
    },
    Column {
        name: "avatar_url",
        kind: ColumnKind::Text,
        nullable: true,
    },
];

/// The caller's own profile
#[utoipa::path(
    get,
    path = "/api/profile",
    responses(
        (status = 200, description = "Profile with manager name", body = User),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Profile"
)]
pub async fn get_profile(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let user = fetch_user(pool.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// Update name, phone, address or avatar of the caller
#[utoipa::path(
    put,
    path = "/api/profile",
    request_body(content = Object, description = "Any of: name, phone, address, avatar_url", example = json!({
        "phone": "+8801712345678", "address": "Dhaka"
    })),
    responses(
        (status = 200, description = "Updated profile", body = User),
        (status = 400, description = "Field not editable by the user", body = Object, example = json!({
            "message": "Field 'role' cannot be updated"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Profile"
)]
pub async fn update_profile(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    let update = build_update_sql("users", &body, SELF_EDITABLE, "id", auth.user_id)?;

    execute_update(pool.get_ref(), update)
        .await
        .map_err(AppError::db("Failed to update profile"))?;

    info!(user_id = auth.user_id, "Profile updated");

    let user = fetch_user(pool.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn employees_cannot_escalate_through_profile() {
        for field in ["role", "status", "department", "manager_id", "email"] {
            let body = json!({ field: "x" });
            assert!(build_update_sql("users", &body, SELF_EDITABLE, "id", 1).is_err());
        }
    }

    #[test]
    fn contact_fields_can_be_cleared() {
        let update =
            build_update_sql("users", &json!({"phone": null}), SELF_EDITABLE, "id", 1).unwrap();
        assert_eq!(update.sql, "UPDATE users SET phone = ? WHERE id = ?");
    }
}
