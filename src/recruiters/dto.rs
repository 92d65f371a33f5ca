use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::users::projection::UserView;

#[derive(Debug, Deserialize)]
pub struct RecruiterRequest {
    pub recruiter_email: String,
}

/// The other side of an active assignment.
#[derive(Debug, Serialize)]
pub struct AssignmentView {
    #[serde(flatten)]
    pub user: UserView,
    #[serde(with = "time::serde::rfc3339")]
    pub assigned_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct RecruiterList {
    pub recruiters: Vec<AssignmentView>,
}

#[derive(Debug, Serialize)]
pub struct CompanyList {
    pub companies: Vec<AssignmentView>,
}
