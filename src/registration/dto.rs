use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyCodeResponse {
    pub valid: bool,
    pub message: String,
    pub remaining_attempts: u32,
}

#[derive(Debug, Serialize)]
pub struct ResendResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_remaining: Option<i64>,
}
