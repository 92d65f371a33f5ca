use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Candidate,
    Company,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "gender", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl std::str::FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            other => Err(format!("unknown gender {:?}", other)),
        }
    }
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,        // Argon2 hash, not exposed in JSON
    pub role: UserRole,
    pub verified: bool,               // admin approval
    pub email_verified: bool,         // verification code confirmed
    pub name: String,
    pub profile_picture: Option<String>,
    pub surname: Option<String>,
    pub gender: Option<Gender>,
    pub birth_date: Option<Date>,
    pub cv_filename: Option<String>,
    pub cv_analysis: Option<serde_json::Value>,
    pub description: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Values for a fresh `users` row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub verified: bool,
    pub email_verified: bool,
    pub name: String,
    pub profile_picture: Option<String>,
    pub surname: Option<String>,
    pub gender: Option<Gender>,
    pub birth_date: Option<Date>,
    pub cv_filename: Option<String>,
    pub cv_analysis: Option<serde_json::Value>,
    pub description: Option<String>,
}

/// Editable profile fields. `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub gender: Option<Gender>,
    pub birth_date: Option<Date>,
    pub description: Option<String>,
    pub profile_picture: Option<String>,
}
