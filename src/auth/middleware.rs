use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::AppError;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};

/// Rejects protected requests without a valid access token and stashes the
/// caller for the `AuthUser` extractor.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    let token = match req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
    {
        Some(header) => header.strip_prefix("Bearer "),
        None => {
            let resp = AppError::Unauthorized("Missing Authorization header".into()).error_response();
            return Ok(req.into_response(resp));
        }
    };

    let Some(token) = token else {
        let resp = AppError::Unauthorized("Authorization header must start with Bearer".into())
            .error_response();
        return Ok(req.into_response(resp));
    };

    let auth_user = match verify_token(token, &config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))
        .and_then(AuthUser::from_claims)
    {
        Ok(user) => user,
        Err(err) => {
            tracing::debug!(error = %err, path = %req.path(), "Rejected request");
            return Ok(req.into_response(err.error_response()));
        }
    };

    req.extensions_mut().insert(auth_user);

    next.call(req).await
}
