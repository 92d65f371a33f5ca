use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::recruiters::{dto::AssignmentView, repo_types::CompanyRecruiter};
use crate::state::AppState;
use crate::users::{
    projection::{project, ViewScope},
    repo_types::{User, UserRole},
    validation::normalize_email,
};

fn require_company(user: &User) -> AppResult<()> {
    if user.role != UserRole::Company {
        return Err(AppError::Forbidden("Only companies can manage recruiters".into()));
    }
    Ok(())
}

async fn find_recruiter(state: &AppState, email: &str) -> AppResult<User> {
    let email = normalize_email(email)?;
    state
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound("Recruiter not found".into()))
}

#[instrument(skip(state, company), fields(company_id = %company.id))]
pub async fn add_recruiter(state: &AppState, company: &User, recruiter_email: &str) -> AppResult<CompanyRecruiter> {
    require_company(company)?;
    if !company.verified {
        return Err(AppError::Forbidden(
            "Your company must be verified by an administrator before assigning recruiters".into(),
        ));
    }
    let recruiter = find_recruiter(state, recruiter_email).await?;
    if recruiter.role != UserRole::Candidate {
        return Err(AppError::InvalidInput("Only candidates can be recruiters".into()));
    }
    if state.recruiters.find_active(company.id, recruiter.id).await?.is_some() {
        return Err(AppError::Conflict("This recruiter is already assigned to your company".into()));
    }
    let link = state.recruiters.assign(company.id, recruiter.id).await?;
    info!(recruiter_id = %recruiter.id, "recruiter assigned");
    Ok(link)
}

#[instrument(skip(state, company), fields(company_id = %company.id))]
pub async fn remove_recruiter(state: &AppState, company: &User, recruiter_email: &str) -> AppResult<()> {
    require_company(company)?;
    let recruiter = find_recruiter(state, recruiter_email).await?;
    if !state.recruiters.deactivate(company.id, recruiter.id).await? {
        return Err(AppError::NotFound("Assignment not found".into()));
    }
    info!(recruiter_id = %recruiter.id, "recruiter removed");
    Ok(())
}

pub async fn list_recruiters(state: &AppState, company: &User) -> AppResult<Vec<AssignmentView>> {
    require_company(company)?;
    let links = state.recruiters.list_active_for_company(company.id).await?;
    let mut out = Vec::with_capacity(links.len());
    for link in links {
        match state.users.find_by_id(link.recruiter_id).await? {
            Some(user) => out.push(AssignmentView {
                user: project(ViewScope::Associate, &user),
                assigned_at: link.assigned_at,
            }),
            None => warn!(recruiter_id = %link.recruiter_id, "assignment points at a missing user"),
        }
    }
    Ok(out)
}

pub async fn recruiting_for(state: &AppState, me: &User) -> AppResult<Vec<AssignmentView>> {
    let links = state.recruiters.list_active_for_recruiter(me.id).await?;
    let mut out = Vec::with_capacity(links.len());
    for link in links {
        if let Some(company) = state.users.find_by_id(link.company_id).await? {
            out.push(AssignmentView {
                user: project(ViewScope::Associate, &company),
                assigned_at: link.assigned_at,
            });
        }
    }
    Ok(out)
}

#[instrument(skip(state, me), fields(user_id = %me.id))]
pub async fn resign(state: &AppState, me: &User, company_id: Uuid) -> AppResult<()> {
    if !state.recruiters.deactivate(company_id, me.id).await? {
        return Err(AppError::NotFound("You are not a recruiter for this company".into()));
    }
    info!(company_id = %company_id, "recruiter resigned");
    Ok(())
}
