use axum::{
    extract::{FromRef, State},
    routing::post,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RefreshRequest},
        jwt::JwtKeys,
        services::{authenticate, issue_tokens, refresh as refresh_tokens, TokenPair},
    },
    error::AppResult,
    state::AppState,
    users::{
        projection::{project, ViewScope},
        repo_types::User,
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

fn respond(user: &User, tokens: TokenPair) -> Json<AuthResponse> {
    Json(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: "bearer",
        user: project(ViewScope::Full, user),
    })
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let user = authenticate(state.users.as_ref(), &payload.email, &payload.password).await?;
    let tokens = issue_tokens(&JwtKeys::from_ref(&state), &user)?;
    Ok(respond(&user, tokens))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let (user, tokens) = refresh_tokens(state.users.as_ref(), &keys, &payload.refresh_token).await?;
    Ok(respond(&user, tokens))
}
