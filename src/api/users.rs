use crate::{
    auth::{
        auth::AuthUser,
        handlers::{insert_user, is_email_available, validate_password},
    },
    error::{AppError, AppResult},
    model::{
        role::Role,
        user::{USER_COLUMNS, User, UserStatus, is_valid_email, normalize_email},
    },
    utils::{
        activity,
        db_utils::{
            Column, ColumnKind, SqlUpdate, SqlValue, build_update_sql, execute_update, paginate,
        },
    },
};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Columns an admin may change on any user.
const ADMIN_EDITABLE: &[Column] = &[
    Column {
        name: "name",
        kind: ColumnKind::Text,
        nullable: false,
    },
    Column {
        name: "role",
        kind: ColumnKind::OneOf(&["admin", "hr", "employee"]),
        nullable: false,
    },
    Column {
        name: "department",
        kind: ColumnKind::Text,
        nullable: true,
    },
    Column {
        name: "manager_id",
        kind: ColumnKind::Id,
        nullable: true,
    },
    Column {
        name: "job_position",
        kind: ColumnKind::Text,
        nullable: true,
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
        name: "status",
        kind: ColumnKind::OneOf(&["active", "inactive"]),
        nullable: false,
    },
    Column {
        name: "avatar_url",
        kind: ColumnKind::Text,
        nullable: true,
    },
];

#[derive(Deserialize, ToSchema)]
pub struct CreateUserReq {
    #[schema(example = "Jane Doe")]
    pub name: String,
    #[schema(example = "jane.doe@company.com")]
    pub email: String,
    /// Temporary password; generated when omitted
    pub password: Option<String>,
    #[schema(example = "employee")]
    pub role: Option<Role>,
    #[schema(example = "Engineering")]
    pub department: Option<String>,
    #[schema(example = 2)]
    pub manager_id: Option<u64>,
    #[schema(example = "Backend Engineer")]
    pub job_position: Option<String>,
    pub phone: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct CreatedUser {
    pub user: User,
    /// Only present when the server generated the password
    pub temporary_password: Option<String>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct UserQuery {
    #[schema(example = 1)]
    pub page: Option<u32>,

    #[schema(example = 20)]
    pub per_page: Option<u32>,

    #[schema(example = "employee")]
    pub role: Option<Role>,

    #[schema(example = "Engineering")]
    pub department: Option<String>,

    #[schema(example = "active")]
    pub status: Option<UserStatus>,

    /// Matches name or email
    #[schema(example = "jane")]
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct UserListResponse {
    pub data: Vec<User>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 42)]
    pub total: i64,
}

pub async fn fetch_user(pool: &MySqlPool, user_id: u64) -> AppResult<User> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users u LEFT JOIN users m ON m.id = u.manager_id WHERE u.id = ?"
    );
    sqlx::query_as::<_, User>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::db("Failed to fetch user"))?
        .ok_or_else(|| AppError::not_found("User not found"))
}

/// A manager must be an existing user other than the one being managed.
async fn check_manager(pool: &MySqlPool, manager_id: u64, user_id: Option<u64>) -> AppResult<()> {
    if Some(manager_id) == user_id {
        return Err(AppError::bad_request("A user cannot manage themselves"));
    }
    let found = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
        .bind(manager_id)
        .fetch_one(pool)
        .await
        .map_err(AppError::db("Failed to look up manager"))?;

    if found == 0 {
        return Err(AppError::bad_request("manager_id does not refer to a user"));
    }
    Ok(())
}

/// Refuses an admin deactivating their own account and reports whether the
/// patch changes role or status, which ends the target's refresh sessions.
/// Works on converted values, so `" INACTIVE"` counts as `inactive`.
fn review_patch(update: &SqlUpdate, user_id: u64, admin_id: u64) -> AppResult<bool> {
    let inactive = SqlValue::String(UserStatus::Inactive.to_string());
    if user_id == admin_id && update.value_of("status") == Some(&inactive) {
        return Err(AppError::bad_request("You cannot deactivate your own account"));
    }
    Ok(update.value_of("status").is_some() || update.value_of("role").is_some())
}

async fn revoke_sessions(pool: &MySqlPool, user_id: u64) -> AppResult<()> {
    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(AppError::db("Failed to revoke refresh tokens"))?;
    Ok(())
}

fn temporary_password() -> String {
    Uuid::new_v4().to_simple().to_string()[..12].to_string()
}

/// Create a user with a temporary password (Admin)
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserReq,
    responses(
        (status = 201, description = "User created; must change password on first login", body = CreatedUser),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Email already exists", body = Object, example = json!({
            "message": "Email already exists"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn create_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateUserReq>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let payload = payload.into_inner();
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("Name is required"));
    }
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        return Err(AppError::bad_request("Invalid email address"));
    }

    let (password, generated) = match payload.password {
        Some(password) => {
            validate_password(&password)?;
            (password, false)
        }
        None => (temporary_password(), true),
    };

    if let Some(manager_id) = payload.manager_id {
        check_manager(pool.get_ref(), manager_id, None).await?;
    }

    if !is_email_available(&email, pool.get_ref()).await? {
        return Err(AppError::Conflict("Email already exists".into()));
    }

    let role = payload.role.unwrap_or(Role::Employee);
    let user_id = insert_user(pool.get_ref(), name, &email, &password, role, true).await?;

    sqlx::query(
        r#"
        UPDATE users
        SET department = ?, manager_id = ?, job_position = ?, phone = ?
        WHERE id = ?
        "#,
    )
    .bind(&payload.department)
    .bind(payload.manager_id)
    .bind(&payload.job_position)
    .bind(&payload.phone)
    .bind(user_id)
    .execute(pool.get_ref())
    .await
    .map_err(AppError::db("Failed to set user details"))?;

    info!(user_id, %role, admin = auth.user_id, "User created");
    activity::record(
        pool.get_ref(),
        auth.user_id,
        "user.created",
        format!("{email} as {role}"),
    )
    .await;

    let user = fetch_user(pool.get_ref(), user_id).await?;
    Ok(HttpResponse::Created().json(CreatedUser {
        user,
        temporary_password: generated.then_some(password),
    }))
}

/// List users with filters (HR/Admin)
#[utoipa::path(
    get,
    path = "/api/users",
    params(UserQuery),
    responses(
        (status = 200, description = "Paginated user list", body = UserListResponse),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<UserQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let (page, per_page, offset) = paginate(query.page, query.per_page, 20);

    // ---------- build WHERE clause dynamically ----------
    let mut conditions = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if let Some(role) = query.role {
        conditions.push("u.role = ?");
        bindings.push(role.to_string());
    }

    if let Some(department) = &query.department {
        conditions.push("u.department = ?");
        bindings.push(department.clone());
    }

    if let Some(status) = query.status {
        conditions.push("u.status = ?");
        bindings.push(status.to_string());
    }

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        conditions.push("(u.name LIKE ? OR u.email LIKE ?)");
        let like = format!("%{search}%");
        bindings.push(like.clone());
        bindings.push(like);
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    // ---------- total count ----------
    let count_sql = format!("SELECT COUNT(*) FROM users u {where_clause}");
    debug!(sql = %count_sql, bindings = ?bindings, "Counting users");

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for b in &bindings {
        count_query = count_query.bind(b);
    }
    let total = count_query
        .fetch_one(pool.get_ref())
        .await
        .map_err(AppError::db("Failed to count users"))?;

    // ---------- data query ----------
    let data_sql = format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM users u
        LEFT JOIN users m ON m.id = u.manager_id
        {where_clause}
        ORDER BY u.id DESC
        LIMIT ? OFFSET ?
        "#
    );
    debug!(page, per_page, offset, "Fetching users");

    let mut data_query = sqlx::query_as::<_, User>(&data_sql);
    for b in &bindings {
        data_query = data_query.bind(b);
    }
    let data = data_query
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(AppError::db("Failed to fetch users"))?;

    Ok(HttpResponse::Ok().json(UserListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

/// Get user by ID (HR/Admin, or the user themselves)
#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User found", body = User),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found", body = Object, example = json!({
            "message": "User not found"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn get_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let user_id = path.into_inner();
    auth.require_self_or_manager(user_id)?;

    let user = fetch_user(pool.get_ref(), user_id).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// Update user fields (Admin)
#[utoipa::path(
    put,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User ID")),
    request_body(content = Object, description = "Any of: name, role, department, manager_id, job_position, phone, address, status, avatar_url", example = json!({
        "department": "Finance", "manager_id": 2
    })),
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 400, description = "Unknown field or invalid value"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let user_id = path.into_inner();
    let update = build_update_sql("users", &body, ADMIN_EDITABLE, "id", user_id)?;
    let ends_sessions = review_patch(&update, user_id, auth.user_id)?;

    if let Some(SqlValue::U64(manager_id)) = update.value_of("manager_id") {
        check_manager(pool.get_ref(), *manager_id, Some(user_id)).await?;
    }

    // 404 before the write: MySQL reports 0 affected rows for no-op updates too
    fetch_user(pool.get_ref(), user_id).await?;

    execute_update(pool.get_ref(), update)
        .await
        .map_err(AppError::db("Failed to update user"))?;

    // live refresh tokens were issued for the old role or status
    if ends_sessions {
        revoke_sessions(pool.get_ref(), user_id).await?;
    }

    let fields: Vec<&str> = body
        .as_object()
        .map(|o| o.keys().map(String::as_str).collect())
        .unwrap_or_default();
    info!(user_id, admin = auth.user_id, ?fields, "User updated");
    activity::record(
        pool.get_ref(),
        auth.user_id,
        "user.updated",
        format!("user #{user_id}: {}", fields.join(", ")),
    )
    .await;

    let user = fetch_user(pool.get_ref(), user_id).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// Deactivate a user (Admin); the row is kept
#[utoipa::path(
    delete,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deactivated", body = Object, example = json!({
            "message": "User deactivated"
        })),
        (status = 400, description = "Cannot deactivate yourself"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn deactivate_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let user_id = path.into_inner();
    if user_id == auth.user_id {
        return Err(AppError::bad_request("You cannot deactivate your own account"));
    }

    fetch_user(pool.get_ref(), user_id).await?;

    sqlx::query("UPDATE users SET status = ? WHERE id = ?")
        .bind(UserStatus::Inactive.as_ref())
        .bind(user_id)
        .execute(pool.get_ref())
        .await
        .map_err(AppError::db("Failed to deactivate user"))?;

    // outstanding sessions die with the account
    revoke_sessions(pool.get_ref(), user_id).await?;

    info!(user_id, admin = auth.user_id, "User deactivated");
    activity::record(
        pool.get_ref(),
        auth.user_id,
        "user.deactivated",
        format!("user #{user_id}"),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({
        "message": "User deactivated"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_password_meets_minimum_length() {
        let password = temporary_password();
        assert_eq!(password.len(), 12);
        assert!(validate_password(&password).is_ok());
        assert_ne!(password, temporary_password());
    }

    #[test]
    fn admin_cannot_touch_credentials_through_update() {
        let err = build_update_sql(
            "users",
            &json!({"password": "hunter22"}),
            ADMIN_EDITABLE,
            "id",
            3,
        )
        .unwrap_err();
        assert!(err.to_string().contains("password"));

        let err = build_update_sql("users", &json!({"email": "x@y.z"}), ADMIN_EDITABLE, "id", 3)
            .unwrap_err();
        assert!(err.to_string().contains("email"));
    }

    #[test]
    fn admin_cannot_deactivate_self_in_any_spelling() {
        for status in ["inactive", "INACTIVE", " inactive", "Inactive "] {
            let update =
                build_update_sql("users", &json!({"status": status}), ADMIN_EDITABLE, "id", 1)
                    .unwrap();
            let err = review_patch(&update, 1, 1).unwrap_err();
            assert!(err.to_string().contains("deactivate"), "{status:?} slipped through");
        }
    }

    #[test]
    fn role_or_status_changes_end_sessions() {
        let patch = |body: Value| build_update_sql("users", &body, ADMIN_EDITABLE, "id", 5).unwrap();

        assert!(review_patch(&patch(json!({"status": "INACTIVE"})), 5, 1).unwrap());
        assert!(review_patch(&patch(json!({"role": "employee"})), 5, 1).unwrap());
        assert!(!review_patch(&patch(json!({"department": "Ops"})), 5, 1).unwrap());
        // reactivating oneself is harmless
        assert!(review_patch(&patch(json!({"status": "active"})), 5, 5).unwrap());
    }

    #[test]
    fn status_and_role_are_restricted() {
        assert!(build_update_sql("users", &json!({"status": "retired"}), ADMIN_EDITABLE, "id", 3).is_err());
        assert!(build_update_sql("users", &json!({"role": "Hr"}), ADMIN_EDITABLE, "id", 3).is_ok());
    }
}
