use time::Date;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::auth::password::hash_password;
use crate::config::AdminBootstrap;
use crate::error::{AppError, AppResult};
use crate::registration::uploads::{validate_picture, Upload};
use crate::state::AppState;
use crate::storage::FileArea;
use crate::users::{
    projection::{project, view_scope, Requester, UserView, ViewScope},
    repo::UserRepository,
    repo_types::{Gender, NewUser, ProfileChanges, User, UserRole},
    validation::{normalize_email, required_text, validate_birth_date, validate_password},
};

pub const MAX_PAGE: i64 = 100;

#[derive(Debug, Default, Clone)]
pub struct CandidateProfileInput {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub gender: Option<Gender>,
    pub birth_date: Option<Date>,
}

#[derive(Debug, Default, Clone)]
pub struct CompanyProfileInput {
    pub name: Option<String>,
    pub description: Option<String>,
}

fn optional_text(field: &str, value: Option<String>) -> AppResult<Option<String>> {
    value.map(|v| required_text(field, &v)).transpose()
}

#[instrument(skip(state, user, input, picture), fields(user_id = %user.id))]
pub async fn update_candidate_profile(
    state: &AppState,
    user: &User,
    input: CandidateProfileInput,
    picture: Option<Upload>,
) -> AppResult<User> {
    if user.role != UserRole::Candidate {
        return Err(AppError::Forbidden("Only candidates can update a candidate profile".into()));
    }
    if let Some(birth_date) = input.birth_date {
        validate_birth_date(birth_date, state.registration.clock().now())?;
    }
    let changes = ProfileChanges {
        name: optional_text("name", input.name)?,
        surname: optional_text("surname", input.surname)?,
        gender: input.gender,
        birth_date: input.birth_date,
        ..ProfileChanges::default()
    };
    apply_profile_changes(state, user, changes, picture).await
}

#[instrument(skip(state, user, input, picture), fields(user_id = %user.id))]
pub async fn update_company_profile(
    state: &AppState,
    user: &User,
    input: CompanyProfileInput,
    picture: Option<Upload>,
) -> AppResult<User> {
    if user.role != UserRole::Company {
        return Err(AppError::Forbidden("Only companies can update a company profile".into()));
    }
    let changes = ProfileChanges {
        name: optional_text("name", input.name)?,
        description: optional_text("description", input.description)?,
        ..ProfileChanges::default()
    };
    apply_profile_changes(state, user, changes, picture).await
}

/// Stores a replacement picture first, then the row; the old picture is
/// removed only once the row points at the new one.
async fn apply_profile_changes(
    state: &AppState,
    user: &User,
    mut changes: ProfileChanges,
    picture: Option<Upload>,
) -> AppResult<User> {
    let new_picture = match picture {
        Some(p) => {
            let ext = validate_picture(&p)?;
            let name = format!("{}.{}", Uuid::new_v4(), ext);
            state
                .files
                .put_object(FileArea::PicturePermanent, &name, p.body, &p.content_type)
                .await
                .map_err(|e| {
                    error!(error = ?e, "profile picture upload failed");
                    AppError::TransientDependency("file storage unavailable".into())
                })?;
            Some(name)
        }
        None => None,
    };
    changes.profile_picture = new_picture.clone();

    let updated = match state.users.update_profile(user.id, changes).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            discard_picture(state, new_picture.as_deref()).await;
            return Err(AppError::NotFound("User not found".into()));
        }
        Err(e) => {
            discard_picture(state, new_picture.as_deref()).await;
            return Err(e);
        }
    };

    if new_picture.is_some() {
        discard_picture(state, user.profile_picture.as_deref()).await;
    }
    info!(user_id = %user.id, picture_replaced = new_picture.is_some(), "profile updated");
    Ok(updated)
}

async fn discard_picture(state: &AppState, name: Option<&str>) {
    let Some(name) = name else { return };
    if let Err(e) = state.files.delete_object(FileArea::PicturePermanent, name).await {
        warn!(error = ?e, file = %name, "could not delete profile picture");
    }
}

/// Another user's record as the requester is allowed to see it.
pub async fn view_user(state: &AppState, requester: &User, id: Uuid) -> AppResult<UserView> {
    let target = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    let associated = requester.id != target.id
        && state.recruiters.has_active_link(requester.id, target.id).await?;
    let scope = view_scope(Requester::User(requester), &target, associated);
    Ok(project(scope, &target))
}

pub async fn internal_user(state: &AppState, id: Uuid) -> AppResult<UserView> {
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(project(view_scope(Requester::InternalService, &user, false), &user))
}

pub async fn list_users(
    state: &AppState,
    role: Option<UserRole>,
    verified: Option<bool>,
    skip: i64,
    limit: i64,
) -> AppResult<Vec<UserView>> {
    let users = state
        .users
        .list(role, verified, skip.max(0), limit.clamp(1, MAX_PAGE))
        .await?;
    Ok(users.iter().map(|u| project(ViewScope::Full, u)).collect())
}

#[instrument(skip(state))]
pub async fn set_company_verification(state: &AppState, id: Uuid, verified: bool) -> AppResult<User> {
    let company = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Company not found".into()))?;
    if company.role != UserRole::Company {
        return Err(AppError::InvalidInput("Only companies can be verified".into()));
    }
    let updated = state
        .users
        .set_verified(id, verified)
        .await?
        .ok_or_else(|| AppError::NotFound("Company not found".into()))?;
    info!(company_id = %id, verified, "company verification changed");
    Ok(updated)
}

/// Creates the configured admin account unless the email is taken.
pub async fn ensure_admin(users: &dyn UserRepository, admin: &AdminBootstrap) -> AppResult<Option<User>> {
    let email = normalize_email(&admin.email)?;
    if let Some(existing) = users.find_by_email(&email).await? {
        if existing.role != UserRole::Admin {
            warn!(email = %email, role = ?existing.role, "admin bootstrap email belongs to a non-admin user");
        }
        return Ok(None);
    }
    validate_password(&admin.password)?;
    let user = users
        .insert(NewUser {
            email,
            password_hash: hash_password(&admin.password)?,
            role: UserRole::Admin,
            verified: true,
            email_verified: true,
            name: required_text("ADMIN_NAME", &admin.name)?,
            profile_picture: None,
            surname: None,
            gender: None,
            birth_date: None,
            cv_filename: None,
            cv_analysis: None,
            description: None,
        })
        .await?;
    info!(user_id = %user.id, email = %user.email, "admin account created");
    Ok(Some(user))
}
