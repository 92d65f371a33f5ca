use std::{sync::Arc, time::Duration};

use rand::{rngs::OsRng, Rng};
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};

use crate::mailer::Mailer;
use crate::registration::temp_store::REGISTRATION_TTL;

pub const CODE_MIN: u32 = 100_000;
pub const CODE_MAX: u32 = 999_999;

/// Six-digit verification code drawn from the OS CSPRNG.
pub fn generate_code() -> String {
    OsRng.gen_range(CODE_MIN..=CODE_MAX).to_string()
}

pub fn codes_match(expected: &str, given: &str) -> bool {
    expected.as_bytes().ct_eq(given.trim().as_bytes()).into()
}

/// Hands verification codes to the mail collaborator.
#[derive(Clone)]
pub struct CodeIssuer {
    mailer: Arc<dyn Mailer>,
    timeout: Duration,
    product: String,
}

impl CodeIssuer {
    pub fn new(mailer: Arc<dyn Mailer>, timeout: Duration, product: impl Into<String>) -> Self {
        Self {
            mailer,
            timeout,
            product: product.into(),
        }
    }

    fn render(&self, code: &str) -> (String, String) {
        let subject = format!("{} - email verification", self.product);
        let body = format!(
            "Hello!\n\n\
             Your {product} verification code is: {code}\n\n\
             The code expires in {minutes} minutes.\n\n\
             If you did not sign up, you can ignore this email.\n\n\
             -- The {product} team\n",
            product = self.product,
            minutes = REGISTRATION_TTL.whole_minutes(),
        );
        (subject, body)
    }

    /// Never fails: delivery problems are logged and reported as `false`.
    pub async fn dispatch(&self, email: &str, code: &str) -> bool {
        let (subject, body) = self.render(code);
        match tokio::time::timeout(self.timeout, self.mailer.send(email, &subject, &body)).await {
            Ok(Ok(())) => {
                info!(email = %email, "verification email dispatched");
                true
            }
            Ok(Err(e)) => {
                error!(email = %email, error = ?e, "verification email failed");
                false
            }
            Err(_) => {
                warn!(email = %email, timeout_secs = self.timeout.as_secs(), "verification email timed out");
                false
            }
        }
    }
}
