use serde::{Deserialize, Serialize};

use crate::users::services::MAX_PAGE;

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}
fn default_limit() -> i64 { MAX_PAGE }

#[derive(Debug, Deserialize)]
pub struct VerificationRequest {
    pub verified: bool,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub removed: usize,
}
