use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::storage::FileArea;
use crate::users::repo_types::Gender;

/// Candidate sign-up data held until the email is confirmed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidatePayload {
    pub name: String,
    pub surname: String,
    pub gender: Gender,
    pub birth_date: Date,
    pub password: String,             // hashed only at promotion
    pub cv_file: String,              // name inside cv-temp
    pub cv_content_type: String,
    pub cv_analysis: Option<serde_json::Value>,
    pub picture_file: Option<String>, // name inside picture-temp
}

/// Company sign-up data held until the email is confirmed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompanyPayload {
    pub name: String,
    pub description: String,
    pub password: String,
    pub picture_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "user_type", rename_all = "lowercase")]
pub enum RegistrationPayload {
    Candidate(CandidatePayload),
    Company(CompanyPayload),
}

impl RegistrationPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            RegistrationPayload::Candidate(_) => "candidate",
            RegistrationPayload::Company(_) => "company",
        }
    }

    /// Exact temp files owned by this registration.
    pub fn temp_files(&self) -> Vec<(FileArea, String)> {
        let mut files = Vec::new();
        match self {
            RegistrationPayload::Candidate(c) => {
                files.push((FileArea::CvTemp, c.cv_file.clone()));
                if let Some(p) = &c.picture_file {
                    files.push((FileArea::PictureTemp, p.clone()));
                }
            }
            RegistrationPayload::Company(c) => {
                if let Some(p) = &c.picture_file {
                    files.push((FileArea::PictureTemp, p.clone()));
                }
            }
        }
        files
    }
}

/// An unconfirmed sign-up, persisted as one JSON document per email.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingRegistration {
    pub email: String,
    pub payload: RegistrationPayload,
    pub verification_code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_resend_at: Option<OffsetDateTime>,
}

impl PendingRegistration {
    /// Strict: a record is still valid at exactly `expires_at`.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }
}
