use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::instrument;

use crate::{
    error::{AppError, AppResult},
    forms::FormData,
    registration::{
        dto::{CodeRequest, EmailRequest, ResendResponse, VerifyCodeResponse},
        services::{CandidateInput, CompanyInput, PendingSummary, ResendOutcome},
        uploads::{CV_MAX_BYTES, PICTURE_MAX_BYTES},
    },
    state::AppState,
    users::projection::{project, UserView, ViewScope},
};

pub fn begin_routes() -> Router<AppState> {
    Router::new()
        .route("/register/candidate", post(begin_candidate))
        .route("/register/company", post(begin_company))
        // room for both files plus form fields; per-file ceilings are checked later
        .layer(DefaultBodyLimit::max(CV_MAX_BYTES + PICTURE_MAX_BYTES + 1024 * 1024))
}

pub fn code_routes() -> Router<AppState> {
    Router::new()
        .route("/register/resend-code", post(resend_code))
        .route("/register/verify-code", post(verify_code))
        .route("/register/candidate/complete", post(complete_candidate))
        .route("/register/company/complete", post(complete_company))
}

#[instrument(skip(state, mp))]
pub async fn begin_candidate(
    State(state): State<AppState>,
    mp: Multipart,
) -> AppResult<(StatusCode, Json<PendingSummary>)> {
    let mut form = FormData::read(mp).await?;
    let input = CandidateInput {
        email: form.required("email")?,
        password: form.raw("password")?,
        name: form.required("name")?,
        surname: form.required("surname")?,
        gender: form
            .parsed("gender")?
            .ok_or_else(|| AppError::InvalidInput("gender is required".into()))?,
        birth_date: form
            .date("birth_date")?
            .ok_or_else(|| AppError::InvalidInput("birth_date is required".into()))?,
    };
    let cv = form
        .take_file("cv_file")
        .ok_or_else(|| AppError::InvalidInput("cv_file is required".into()))?;
    let picture = form.take_file("profile_picture");

    let summary = state
        .registration
        .begin_candidate_registration(input, cv, picture)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(summary)))
}

#[instrument(skip(state, mp))]
pub async fn begin_company(
    State(state): State<AppState>,
    mp: Multipart,
) -> AppResult<(StatusCode, Json<PendingSummary>)> {
    let mut form = FormData::read(mp).await?;
    let input = CompanyInput {
        email: form.required("email")?,
        password: form.raw("password")?,
        name: form.required("name")?,
        description: form.required("description")?,
    };
    let picture = form.take_file("profile_picture");

    let summary = state
        .registration
        .begin_company_registration(input, picture)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(summary)))
}

#[instrument(skip(state, payload))]
pub async fn resend_code(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> AppResult<(StatusCode, Json<ResendResponse>)> {
    match state.registration.resend_code(&payload.email).await? {
        ResendOutcome::Sent => Ok((
            StatusCode::OK,
            Json(ResendResponse {
                message: "A new verification code has been sent".into(),
                seconds_remaining: None,
            }),
        )),
        ResendOutcome::CoolingDown { seconds_remaining } => Ok((
            StatusCode::TOO_MANY_REQUESTS,
            Json(ResendResponse {
                message: format!(
                    "Please wait {} seconds before requesting a new code",
                    seconds_remaining
                ),
                seconds_remaining: Some(seconds_remaining),
            }),
        )),
    }
}

#[instrument(skip(state, payload))]
pub async fn verify_code(
    State(state): State<AppState>,
    Json(payload): Json<CodeRequest>,
) -> AppResult<Json<VerifyCodeResponse>> {
    let valid = state
        .registration
        .verify_code(&payload.email, &payload.code)
        .await?;
    let message = if valid {
        "Verification code is valid".to_string()
    } else {
        "Invalid or expired verification code".to_string()
    };
    Ok(Json(VerifyCodeResponse {
        valid,
        message,
        remaining_attempts: state.registration.remaining_attempts(&payload.email),
    }))
}

#[instrument(skip(state, payload))]
pub async fn complete_candidate(
    State(state): State<AppState>,
    Json(payload): Json<CodeRequest>,
) -> AppResult<(StatusCode, Json<UserView>)> {
    let user = state
        .registration
        .complete_candidate_registration(&payload.email, &payload.code)
        .await?;
    Ok((StatusCode::CREATED, Json(project(ViewScope::Full, &user))))
}

#[instrument(skip(state, payload))]
pub async fn complete_company(
    State(state): State<AppState>,
    Json(payload): Json<CodeRequest>,
) -> AppResult<(StatusCode, Json<UserView>)> {
    let user = state
        .registration
        .complete_company_registration(&payload.email, &payload.code)
        .await?;
    Ok((StatusCode::CREATED, Json(project(ViewScope::Full, &user))))
}
