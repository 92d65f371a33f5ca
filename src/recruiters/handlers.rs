use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::extractors::CurrentUser,
    error::AppResult,
    recruiters::{
        dto::{CompanyList, RecruiterList, RecruiterRequest},
        repo_types::CompanyRecruiter,
        services,
    },
    state::AppState,
    users::dto::MessageResponse,
};

pub fn company_routes() -> Router<AppState> {
    Router::new().route(
        "/companies/recruiters",
        get(list_recruiters).post(add_recruiter).delete(remove_recruiter),
    )
}

pub fn recruiter_routes() -> Router<AppState> {
    Router::new()
        .route("/me/recruiting-for", get(recruiting_for))
        .route("/me/recruiting-for/:company_id", delete(resign))
}

#[instrument(skip(state, user, payload))]
pub async fn add_recruiter(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<RecruiterRequest>,
) -> AppResult<(StatusCode, Json<CompanyRecruiter>)> {
    let link = services::add_recruiter(&state, &user, &payload.recruiter_email).await?;
    Ok((StatusCode::CREATED, Json(link)))
}

#[instrument(skip(state, user))]
pub async fn list_recruiters(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<RecruiterList>> {
    let recruiters = services::list_recruiters(&state, &user).await?;
    Ok(Json(RecruiterList { recruiters }))
}

#[instrument(skip(state, user, payload))]
pub async fn remove_recruiter(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<RecruiterRequest>,
) -> AppResult<Json<MessageResponse>> {
    services::remove_recruiter(&state, &user, &payload.recruiter_email).await?;
    Ok(Json(MessageResponse::new("Recruiter removed")))
}

#[instrument(skip(state, user))]
pub async fn recruiting_for(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<CompanyList>> {
    let companies = services::recruiting_for(&state, &user).await?;
    Ok(Json(CompanyList { companies }))
}

#[instrument(skip(state, user))]
pub async fn resign(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(company_id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    services::resign(&state, &user, company_id).await?;
    Ok(Json(MessageResponse::new("You are no longer a recruiter for this company")))
}
