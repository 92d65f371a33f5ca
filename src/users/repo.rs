use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use crate::users::repo_types::{NewUser, ProfileChanges, User, UserRole};

const USER_COLUMNS: &str = r#"id, email, password_hash, role, verified, email_verified, name,
    profile_picture, surname, gender, birth_date, cv_filename, cv_analysis, description, created_at"#;

/// Durable user storage. `email` is unique.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;
    /// Fails with `Conflict` when the email is already taken.
    async fn insert(&self, user: NewUser) -> AppResult<User>;
    async fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> AppResult<Option<User>>;
    async fn set_verified(&self, id: Uuid, verified: bool) -> AppResult<Option<User>>;
    async fn list(
        &self,
        role: Option<UserRole>,
        verified: Option<bool>,
        skip: i64,
        limit: i64,
    ) -> AppResult<Vec<User>>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert(&self, u: NewUser) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, role, verified, email_verified, name,
                               profile_picture, surname, gender, birth_date, cv_filename,
                               cv_analysis, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&u.email)
        .bind(&u.password_hash)
        .bind(u.role)
        .bind(u.verified)
        .bind(u.email_verified)
        .bind(&u.name)
        .bind(&u.profile_picture)
        .bind(&u.surname)
        .bind(u.gender)
        .bind(u.birth_date)
        .bind(&u.cv_filename)
        .bind(&u.cv_analysis)
        .bind(&u.description)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn update_profile(&self, id: Uuid, c: ProfileChanges) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                name            = COALESCE($2, name),
                surname         = COALESCE($3, surname),
                gender          = COALESCE($4, gender),
                birth_date      = COALESCE($5, birth_date),
                description     = COALESCE($6, description),
                profile_picture = COALESCE($7, profile_picture)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(c.name)
        .bind(c.surname)
        .bind(c.gender)
        .bind(c.birth_date)
        .bind(c.description)
        .bind(c.profile_picture)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn set_verified(&self, id: Uuid, verified: bool) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET verified = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(verified)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn list(
        &self,
        role: Option<UserRole>,
        verified: Option<bool>,
        skip: i64,
        limit: i64,
    ) -> AppResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE ($1::user_role IS NULL OR role = $1)
              AND ($2::boolean IS NULL OR verified = $2)
            ORDER BY created_at ASC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(role)
        .bind(verified)
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }
}
