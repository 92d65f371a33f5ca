use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use crate::recruiters::repo_types::CompanyRecruiter;

const LINK_COLUMNS: &str = "id, company_id, recruiter_id, assigned_at, is_active";

/// At most one active link per (company, recruiter) pair.
#[async_trait]
pub trait RecruiterRepository: Send + Sync {
    async fn find_active(&self, company_id: Uuid, recruiter_id: Uuid) -> AppResult<Option<CompanyRecruiter>>;
    /// Fails with `Conflict` when an active link already exists.
    async fn assign(&self, company_id: Uuid, recruiter_id: Uuid) -> AppResult<CompanyRecruiter>;
    /// Returns whether an active link was deactivated.
    async fn deactivate(&self, company_id: Uuid, recruiter_id: Uuid) -> AppResult<bool>;
    async fn list_active_for_company(&self, company_id: Uuid) -> AppResult<Vec<CompanyRecruiter>>;
    async fn list_active_for_recruiter(&self, recruiter_id: Uuid) -> AppResult<Vec<CompanyRecruiter>>;
    /// Active link between the two users, in either direction.
    async fn has_active_link(&self, a: Uuid, b: Uuid) -> AppResult<bool>;
}

#[derive(Clone)]
pub struct PgRecruiterRepository {
    db: PgPool,
}

impl PgRecruiterRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecruiterRepository for PgRecruiterRepository {
    async fn find_active(&self, company_id: Uuid, recruiter_id: Uuid) -> AppResult<Option<CompanyRecruiter>> {
        let link = sqlx::query_as::<_, CompanyRecruiter>(&format!(
            r#"SELECT {LINK_COLUMNS} FROM company_recruiters
               WHERE company_id = $1 AND recruiter_id = $2 AND is_active"#
        ))
        .bind(company_id)
        .bind(recruiter_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(link)
    }

    async fn assign(&self, company_id: Uuid, recruiter_id: Uuid) -> AppResult<CompanyRecruiter> {
        // the partial unique index on active rows turns a duplicate into a Conflict
        let link = sqlx::query_as::<_, CompanyRecruiter>(&format!(
            r#"INSERT INTO company_recruiters (company_id, recruiter_id)
               VALUES ($1, $2)
               RETURNING {LINK_COLUMNS}"#
        ))
        .bind(company_id)
        .bind(recruiter_id)
        .fetch_one(&self.db)
        .await?;
        Ok(link)
    }

    async fn deactivate(&self, company_id: Uuid, recruiter_id: Uuid) -> AppResult<bool> {
        let res = sqlx::query(
            r#"UPDATE company_recruiters SET is_active = FALSE
               WHERE company_id = $1 AND recruiter_id = $2 AND is_active"#,
        )
        .bind(company_id)
        .bind(recruiter_id)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_active_for_company(&self, company_id: Uuid) -> AppResult<Vec<CompanyRecruiter>> {
        let links = sqlx::query_as::<_, CompanyRecruiter>(&format!(
            r#"SELECT {LINK_COLUMNS} FROM company_recruiters
               WHERE company_id = $1 AND is_active
               ORDER BY assigned_at ASC"#
        ))
        .bind(company_id)
        .fetch_all(&self.db)
        .await?;
        Ok(links)
    }

    async fn list_active_for_recruiter(&self, recruiter_id: Uuid) -> AppResult<Vec<CompanyRecruiter>> {
        let links = sqlx::query_as::<_, CompanyRecruiter>(&format!(
            r#"SELECT {LINK_COLUMNS} FROM company_recruiters
               WHERE recruiter_id = $1 AND is_active
               ORDER BY assigned_at ASC"#
        ))
        .bind(recruiter_id)
        .fetch_all(&self.db)
        .await?;
        Ok(links)
    }

    async fn has_active_link(&self, a: Uuid, b: Uuid) -> AppResult<bool> {
        let linked: bool = sqlx::query_scalar(
            r#"SELECT EXISTS (
                   SELECT 1 FROM company_recruiters
                   WHERE is_active
                     AND ((company_id = $1 AND recruiter_id = $2)
                       OR (company_id = $2 AND recruiter_id = $1)))"#,
        )
        .bind(a)
        .bind(b)
        .fetch_one(&self.db)
        .await?;
        Ok(linked)
    }
}
