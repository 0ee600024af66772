use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::AppError;
use crate::model::role::Role;
use crate::models::{Claims, TokenType};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    /// Builds the caller from verified claims; refresh tokens are not accepted here.
    pub fn from_claims(claims: Claims) -> Result<Self, AppError> {
        if claims.token_type != TokenType::Access {
            return Err(AppError::Unauthorized("Access token required".into()));
        }
        let role = Role::from_id(claims.role)
            .ok_or_else(|| AppError::Unauthorized("Invalid role".into()))?;

        Ok(AuthUser {
            user_id: claims.user_id,
            email: claims.sub,
            role,
        })
    }

    /// Single role gate used by every handler.
    pub fn require_any(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::forbidden("You do not have permission for this action"))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        self.require_any(&[Role::Admin])
    }

    pub fn require_hr_or_admin(&self) -> Result<(), AppError> {
        self.require_any(&[Role::Admin, Role::Hr])
    }

    /// Owner of a resource, or someone who manages everyone's.
    pub fn require_self_or_manager(&self, owner_id: u64) -> Result<(), AppError> {
        if self.user_id == owner_id || self.role.is_manager() {
            Ok(())
        } else {
            Err(AppError::forbidden("You do not have permission for this action"))
        }
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthUser, AppError> {
    // set by auth_middleware on protected scopes
    if let Some(user) = req.extensions().get::<AuthUser>() {
        return Ok(user.clone());
    }

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Missing token".into()))?;

    let config = req.app_data::<Data<Config>>().ok_or_else(|| {
        tracing::error!("Config missing from app data");
        AppError::Internal
    })?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid token".into()))?;

    AuthUser::from_claims(claims)
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{generate_access_token, generate_refresh_token};
    use actix_web::{App, HttpResponse, http::StatusCode, test, web};

    fn test_config() -> Config {
        Config::from_lookup(|key| match key {
            "SERVER_ADDR" => Some("127.0.0.1:0".into()),
            "DATABASE_URL" => Some("mysql://localhost/test".into()),
            "JWT_SECRET" => Some("test-secret".into()),
            _ => None,
        })
        .unwrap()
    }

    async fn hr_only(auth: AuthUser) -> Result<HttpResponse, AppError> {
        auth.require_hr_or_admin()?;
        Ok(HttpResponse::Ok().body(auth.email))
    }

    fn bearer(role: Role) -> String {
        let token =
            generate_access_token(5, "user@company.com".into(), role.id(), "test-secret", 300)
                .unwrap();
        format!("Bearer {token}")
    }

    #[actix_web::test]
    async fn missing_header_is_unauthorized() {
        let app = test::init_service(
            App::new()
                .app_data(Data::new(test_config()))
                .route("/hr", web::get().to(hr_only)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/hr").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn role_gate_allows_hr_and_blocks_employee() {
        let app = test::init_service(
            App::new()
                .app_data(Data::new(test_config()))
                .route("/hr", web::get().to(hr_only)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/hr")
            .insert_header(("Authorization", bearer(Role::Hr)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri("/hr")
            .insert_header(("Authorization", bearer(Role::Employee)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn refresh_token_cannot_call_api() {
        let app = test::init_service(
            App::new()
                .app_data(Data::new(test_config()))
                .route("/hr", web::get().to(hr_only)),
        )
        .await;

        let (refresh, _) =
            generate_refresh_token(5, "user@company.com".into(), 1, "test-secret", 300).unwrap();
        let req = test::TestRequest::get()
            .uri("/hr")
            .insert_header(("Authorization", format!("Bearer {refresh}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[::core::prelude::v1::test]
    fn owner_or_manager() {
        let employee = AuthUser {
            user_id: 9,
            email: "e@company.com".into(),
            role: Role::Employee,
        };
        assert!(employee.require_self_or_manager(9).is_ok());
        assert!(employee.require_self_or_manager(10).is_err());

        let hr = AuthUser {
            role: Role::Hr,
            ..employee
        };
        assert!(hr.require_self_or_manager(10).is_ok());
        assert!(hr.require_admin().is_err());
    }
}
