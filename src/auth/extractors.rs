use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use subtle::ConstantTimeEq;
use tracing::warn;
use uuid::Uuid;

use crate::auth::jwt::{JwtKeys, TokenKind};
use crate::error::AppError;
use crate::state::AppState;
use crate::users::repo_types::{User, UserRole};

pub const INTERNAL_API_KEY_HEADER: &str = "x-internal-api-key";

/// Validated access token; yields the user ID.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header".into()))?;

        let claims = keys.verify(token).map_err(|_| {
            warn!("invalid or expired token");
            AppError::Unauthorized("Invalid or expired token".into())
        })?;
        if claims.kind != TokenKind::Access {
            return Err(AppError::Unauthorized("Access token required".into()));
        }
        Ok(AuthUser(claims.sub))
    }
}

/// The authenticated user, loaded from the user store.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user_id) = AuthUser::from_request_parts(parts, state).await?;
        let user = state
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;
        Ok(CurrentUser(user))
    }
}

impl CurrentUser {
    pub fn require_role(&self, role: UserRole) -> Result<&User, AppError> {
        if self.0.role != role {
            return Err(AppError::Forbidden(format!(
                "This action requires the {:?} role",
                role
            )));
        }
        Ok(&self.0)
    }
}

/// Sibling service authenticated by the shared internal API key.
pub struct InternalService;

#[async_trait]
impl FromRequestParts<AppState> for InternalService {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let given = parts
            .headers
            .get(INTERNAL_API_KEY_HEADER)
            .map(|v| v.as_bytes())
            .unwrap_or_default();
        let expected = state.config.internal_api_key.as_bytes();
        if expected.is_empty() || !bool::from(expected.ct_eq(given)) {
            warn!("internal endpoint called with a bad api key");
            return Err(AppError::Forbidden("Invalid internal API key".into()));
        }
        Ok(InternalService)
    }
}
