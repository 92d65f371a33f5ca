use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    routing::{get, patch, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::extractors::{CurrentUser, InternalService},
    error::AppResult,
    forms::FormData,
    registration::uploads::PICTURE_MAX_BYTES,
    state::AppState,
    users::{
        dto::{Pagination, RemovedResponse, VerificationRequest},
        projection::{project, UserView, ViewScope},
        repo_types::UserRole,
        services::{self, CandidateProfileInput, CompanyProfileInput},
    },
};

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/me/candidate", put(update_candidate))
        .route("/me/company", put(update_company))
        .route("/users/:id", get(get_user))
        .layer(DefaultBodyLimit::max(PICTURE_MAX_BYTES + 1024 * 1024))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(admin_list_users))
        .route("/admin/candidates", get(admin_list_candidates))
        .route("/admin/companies/unverified", get(admin_list_unverified_companies))
        .route("/admin/companies/:id/verification", patch(admin_set_verification))
        .route("/admin/maintenance/sweep-registrations", post(admin_sweep_registrations))
        .route("/admin/maintenance/sweep-temp-files", post(admin_sweep_temp_files))
}

pub fn internal_routes() -> Router<AppState> {
    Router::new().route("/internal/users/:id", get(internal_get_user))
}

#[instrument(skip(user))]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<UserView> {
    Json(project(ViewScope::Full, &user))
}

#[instrument(skip(state, user, mp))]
pub async fn update_candidate(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mp: Multipart,
) -> AppResult<Json<UserView>> {
    let mut form = FormData::read(mp).await?;
    let input = CandidateProfileInput {
        name: form.text("name"),
        surname: form.text("surname"),
        gender: form.parsed("gender")?,
        birth_date: form.date("birth_date")?,
    };
    let picture = form.take_file("profile_picture");
    let updated = services::update_candidate_profile(&state, &user, input, picture).await?;
    Ok(Json(project(ViewScope::Full, &updated)))
}

#[instrument(skip(state, user, mp))]
pub async fn update_company(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mp: Multipart,
) -> AppResult<Json<UserView>> {
    let mut form = FormData::read(mp).await?;
    let input = CompanyProfileInput {
        name: form.text("name"),
        description: form.text("description"),
    };
    let picture = form.take_file("profile_picture");
    let updated = services::update_company_profile(&state, &user, input, picture).await?;
    Ok(Json(project(ViewScope::Full, &updated)))
}

#[instrument(skip(state, user))]
pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserView>> {
    Ok(Json(services::view_user(&state, &user, id).await?))
}

#[instrument(skip(state, admin))]
pub async fn admin_list_users(
    State(state): State<AppState>,
    admin: CurrentUser,
    Query(p): Query<Pagination>,
) -> AppResult<Json<Vec<UserView>>> {
    admin.require_role(UserRole::Admin)?;
    Ok(Json(services::list_users(&state, None, None, p.skip, p.limit).await?))
}

#[instrument(skip(state, admin))]
pub async fn admin_list_candidates(
    State(state): State<AppState>,
    admin: CurrentUser,
    Query(p): Query<Pagination>,
) -> AppResult<Json<Vec<UserView>>> {
    admin.require_role(UserRole::Admin)?;
    let users = services::list_users(&state, Some(UserRole::Candidate), None, p.skip, p.limit).await?;
    Ok(Json(users))
}

#[instrument(skip(state, admin))]
pub async fn admin_list_unverified_companies(
    State(state): State<AppState>,
    admin: CurrentUser,
    Query(p): Query<Pagination>,
) -> AppResult<Json<Vec<UserView>>> {
    admin.require_role(UserRole::Admin)?;
    let users =
        services::list_users(&state, Some(UserRole::Company), Some(false), p.skip, p.limit).await?;
    Ok(Json(users))
}

#[instrument(skip(state, admin, body))]
pub async fn admin_set_verification(
    State(state): State<AppState>,
    admin: CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<VerificationRequest>,
) -> AppResult<Json<UserView>> {
    admin.require_role(UserRole::Admin)?;
    let company = services::set_company_verification(&state, id, body.verified).await?;
    Ok(Json(project(ViewScope::Full, &company)))
}

#[instrument(skip(state, admin))]
pub async fn admin_sweep_registrations(
    State(state): State<AppState>,
    admin: CurrentUser,
) -> AppResult<Json<RemovedResponse>> {
    admin.require_role(UserRole::Admin)?;
    let removed = state.gc.sweep_expired_registrations().await?;
    Ok(Json(RemovedResponse { removed }))
}

#[instrument(skip(state, admin))]
pub async fn admin_sweep_temp_files(
    State(state): State<AppState>,
    admin: CurrentUser,
) -> AppResult<Json<RemovedResponse>> {
    admin.require_role(UserRole::Admin)?;
    let removed = state.gc.sweep_orphaned_temp_files().await?;
    Ok(Json(RemovedResponse { removed }))
}

#[instrument(skip(state, _service))]
pub async fn internal_get_user(
    State(state): State<AppState>,
    _service: InternalService,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserView>> {
    Ok(Json(services::internal_user(&state, id).await?))
}
