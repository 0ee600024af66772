use crate::{
    auth::{
        auth::AuthUser,
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    error::{AppError, AppResult, is_duplicate_key},
    model::{
        role::Role,
        user::{MIN_PASSWORD_LEN, UserCredentials, UserStatus, is_valid_email, normalize_email},
    },
    models::{ChangePasswordReq, Claims, LoginReqDto, LoginResponse, RegisterReq, TokenType},
    utils::{activity, email_cache, email_filter},
};
use actix_web::{HttpRequest, HttpResponse, web};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};

/// Ok(true)  => email AVAILABLE
/// Ok(false) => email TAKEN
pub async fn is_email_available(email: &str, pool: &MySqlPool) -> AppResult<bool> {
    let email = normalize_email(email);

    // 1️⃣ Cuckoo filter: fast negative
    if !email_filter::might_exist(&email) {
        return Ok(true);
    }

    // 2️⃣ Moka cache: fast positive
    if email_cache::is_taken(&email).await {
        return Ok(false);
    }

    // 3️⃣ Database fallback
    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ? LIMIT 1)",
    )
    .bind(&email)
    .fetch_one(pool)
    .await
    .map_err(AppError::db("Failed to check email availability"))?;

    Ok(exists == 0)
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn hash_or_internal(password: &str) -> AppResult<String> {
    hash_password(password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        AppError::Internal
    })
}

/// Inserts a user and keeps the email filter/cache in step.
pub async fn insert_user(
    pool: &MySqlPool,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
    first_login: bool,
) -> AppResult<u64> {
    let hashed = hash_or_internal(password)?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password, role, first_login)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(email)
    .bind(hashed)
    .bind(role.as_ref())
    .bind(first_login)
    .execute(pool)
    .await;

    match result {
        Ok(done) => {
            email_filter::insert(email);
            email_cache::mark_taken(email).await;
            Ok(done.last_insert_id())
        }
        Err(e) if is_duplicate_key(&e) => Err(AppError::Conflict("Email already exists".into())),
        Err(e) => {
            error!(error = %e, "Failed to insert user");
            Err(AppError::Internal)
        }
    }
}

/// Self-service signup; always creates an employee.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "User registered", body = Object, example = json!({
            "message": "User registered successfully", "id": 7
        })),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email already taken")
    ),
    tag = "Auth"
)]
pub async fn register(
    user: web::Json<RegisterReq>,
    pool: web::Data<MySqlPool>,
) -> AppResult<HttpResponse> {
    let name = user.name.trim();
    let email = normalize_email(&user.email);

    if name.is_empty() || email.is_empty() || user.password.is_empty() {
        return Err(AppError::bad_request(
            "Name, email and password must not be empty",
        ));
    }
    if !is_valid_email(&email) {
        return Err(AppError::bad_request("Invalid email address"));
    }
    validate_password(&user.password)?;

    if !is_email_available(&email, pool.get_ref()).await? {
        return Err(AppError::Conflict("Email already taken".into()));
    }

    let id = insert_user(
        pool.get_ref(),
        name,
        &email,
        &user.password,
        Role::Employee,
        false,
    )
    .await?;

    activity::record(pool.get_ref(), id, "user.registered", email.clone()).await;
    info!(user_id = id, "User registered");

    Ok(HttpResponse::Created().json(json!({
        "message": "User registered successfully",
        "id": id
    })))
}

async fn issue_tokens(
    pool: &MySqlPool,
    config: &Config,
    user_id: u64,
    email: &str,
    role: u8,
) -> AppResult<(String, String)> {
    let tokens = generate_access_token(
        user_id,
        email.to_string(),
        role,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .and_then(|access| {
        generate_refresh_token(
            user_id,
            email.to_string(),
            role,
            &config.jwt_secret,
            config.refresh_token_ttl,
        )
        .map(|refresh| (access, refresh))
    });

    let (access_token, (refresh_token, refresh_claims)) = tokens.map_err(|e| {
        error!(error = %e, "Failed to sign token");
        AppError::Internal
    })?;

    debug!(user_id, jti = %refresh_claims.jti, "Storing refresh token");

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(user_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool)
    .await
    .map_err(AppError::db("Failed to store refresh token"))?;

    Ok((access_token, refresh_token))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials or inactive account")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(email = %user.email)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    info!("Login request received");

    let email = normalize_email(&user.email);
    if email.is_empty() || user.password.is_empty() {
        info!("Validation failed: empty email or password");
        return Err(AppError::bad_request("Email and password required"));
    }

    let invalid = || AppError::Unauthorized("Invalid credentials".into());

    let db_user = sqlx::query_as::<_, UserCredentials>(
        r#"
        SELECT id, email, password, role, status, first_login
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(AppError::db("Database error while fetching user"))?
    .ok_or_else(|| {
        info!("Invalid credentials: user not found");
        invalid()
    })?;

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(invalid());
    }

    if db_user.status != UserStatus::Active {
        info!(user_id = db_user.id, "Login refused: account inactive");
        return Err(AppError::Unauthorized("Account is inactive".into()));
    }

    let (access_token, refresh_token) = issue_tokens(
        pool.get_ref(),
        &config,
        db_user.id,
        &db_user.email,
        db_user.role.id(),
    )
    .await?;

    // non-fatal
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }
    email_cache::mark_taken(&db_user.email).await;

    info!(user_id = db_user.id, "Login successful");

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token,
        refresh_token,
        first_login: db_user.first_login,
    }))
}

fn bearer_claims(req: &HttpRequest, config: &Config) -> Option<Claims> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))?;

    verify_token(token, &config.jwt_secret)
        .ok()
        .filter(|claims| claims.token_type == TokenType::Refresh)
}

/// The rotated pair is built from the account as stored now, not from the
/// old token; a deactivated or deleted account gets no new tokens.
fn active_account(account: Option<UserCredentials>) -> AppResult<UserCredentials> {
    match account {
        Some(account) if account.status == UserStatus::Active => Ok(account),
        Some(account) => {
            info!(user_id = account.id, "Refresh refused: account inactive");
            Err(AppError::Unauthorized("Account is inactive".into()))
        }
        None => Err(AppError::Unauthorized("Invalid refresh token".into())),
    }
}

/// Rotates a refresh token: the presented one is revoked and a new pair issued.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = Object, example = json!({
            "access_token": "eyJ...", "refresh_token": "eyJ..."
        })),
        (status = 401, description = "Missing, invalid or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let unauthorized = || AppError::Unauthorized("Invalid refresh token".into());
    let claims = bearer_claims(&req, &config).ok_or_else(unauthorized)?;

    // revoke-if-live doubles as the lookup
    let revoked = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = TRUE
        WHERE jti = ? AND revoked = FALSE AND expires_at > NOW()
        "#,
    )
    .bind(&claims.jti)
    .execute(pool.get_ref())
    .await
    .map_err(AppError::db("Failed to revoke refresh token"))?;

    if revoked.rows_affected() == 0 {
        return Err(unauthorized());
    }

    let account = sqlx::query_as::<_, UserCredentials>(
        r#"
        SELECT id, email, password, role, status, first_login
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(claims.user_id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(AppError::db("Failed to fetch user for refresh"))?;
    let account = active_account(account)?;

    let (access_token, refresh_token) = issue_tokens(
        pool.get_ref(),
        &config,
        account.id,
        &account.email,
        account.role.id(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "access_token": access_token,
        "refresh_token": refresh_token
    })))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 204, description = "Refresh token revoked (idempotent)")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let Some(claims) = bearer_claims(&req, &config) else {
        return HttpResponse::NoContent().finish();
    };

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token on logout");
    }

    HttpResponse::NoContent().finish()
}

/// Replaces the caller's password and clears the first-login flag.
#[utoipa::path(
    put,
    path = "/api/auth/password",
    request_body = ChangePasswordReq,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Weak password or wrong current password")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn change_password(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<ChangePasswordReq>,
) -> AppResult<HttpResponse> {
    validate_password(&body.new_password)?;

    let current: String = sqlx::query_scalar("SELECT password FROM users WHERE id = ?")
        .bind(auth.user_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(AppError::db("Failed to fetch password hash"))?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    if verify_password(&body.current_password, &current).is_err() {
        return Err(AppError::bad_request("Current password is incorrect"));
    }

    let hashed = hash_or_internal(&body.new_password)?;

    sqlx::query("UPDATE users SET password = ?, first_login = FALSE WHERE id = ?")
        .bind(hashed)
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await
        .map_err(AppError::db("Failed to update password"))?;

    // existing sessions must log in again
    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = ?")
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, user_id = auth.user_id, "Failed to revoke refresh tokens");
    }

    activity::record(pool.get_ref(), auth.user_id, "user.password_changed", "").await;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Password changed successfully"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(role: Role, status: UserStatus) -> UserCredentials {
        UserCredentials {
            id: 2,
            email: "jane@company.com".into(),
            password: String::new(),
            role,
            status,
            first_login: false,
        }
    }

    #[test]
    fn short_passwords_are_refused() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough").is_ok());
    }

    #[actix_web::test]
    async fn lookup_failure_is_an_error_not_a_taken_email() {
        use sqlx::mysql::MySqlPoolOptions;
        use std::time::Duration;

        // nothing listens on port 1
        let pool = MySqlPoolOptions::new()
            .acquire_timeout(Duration::from_secs(2))
            .connect_lazy("mysql://nobody@127.0.0.1:1/none")
            .unwrap();

        // the filter must answer "maybe" so the database is consulted
        email_filter::insert("lookup.failure@company.com");
        let result = is_email_available("lookup.failure@company.com", &pool).await;
        assert!(matches!(result, Err(AppError::Internal)));
    }

    #[test]
    fn refresh_uses_the_stored_role() {
        // token was minted while the user was an admin; the row now says employee
        let current = active_account(Some(account(Role::Employee, UserStatus::Active))).unwrap();
        assert_eq!(current.role.id(), Role::Employee.id());
    }

    #[test]
    fn refresh_is_refused_for_inactive_or_missing_accounts() {
        let err = active_account(Some(account(Role::Admin, UserStatus::Inactive))).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let err = active_account(None).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
