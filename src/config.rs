use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local {
        root: String,
    },
    S3 {
        endpoint: String,
        bucket: String,
        access_key: String,
        secret_key: String,
        region: String,
    },
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CvAnalyzerConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

/// Whether a side task runs before the response or in a detached task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    Inline,
    Background,
}

impl std::str::FromStr for TaskMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(TaskMode::Inline),
            "background" => Ok(TaskMode::Background),
            other => anyhow::bail!("unknown task mode {:?}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    pub pending_dir: String,
    pub cv_analysis: TaskMode,
    pub email_delivery: TaskMode,
    pub sweep_interval_minutes: u64,
    pub product_name: String,
}

#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub smtp: Option<SmtpConfig>,
    pub cv_analyzer: CvAnalyzerConfig,
    pub registration: RegistrationConfig,
    pub internal_api_key: String,
    pub admin: Option<AdminBootstrap>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET")?,
            issuer: env_or("JWT_ISSUER", "userapi"),
            audience: env_or("JWT_AUDIENCE", "userapi-users"),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };

        let storage = match env_or("STORAGE_BACKEND", "local").as_str() {
            "s3" => StorageConfig::S3 {
                endpoint: std::env::var("S3_ENDPOINT").context("S3_ENDPOINT")?,
                bucket: std::env::var("S3_BUCKET").context("S3_BUCKET")?,
                access_key: std::env::var("S3_ACCESS_KEY").context("S3_ACCESS_KEY")?,
                secret_key: std::env::var("S3_SECRET_KEY").context("S3_SECRET_KEY")?,
                region: env_or("S3_REGION", "us-east-1"),
            },
            "local" => StorageConfig::Local {
                root: env_or("STORAGE_ROOT", "data/files"),
            },
            other => anyhow::bail!("unknown STORAGE_BACKEND {:?}", other),
        };

        let smtp = match std::env::var("SMTP_HOST") {
            Ok(host) => Some(SmtpConfig {
                host,
                port: env_parse("SMTP_PORT", 587),
                username: std::env::var("SMTP_USERNAME").context("SMTP_USERNAME")?,
                password: std::env::var("SMTP_PASSWORD").context("SMTP_PASSWORD")?,
                from: std::env::var("MAIL_FROM").context("MAIL_FROM")?,
                timeout: Duration::from_secs(env_parse("SMTP_TIMEOUT_SECS", 30)),
            }),
            Err(_) => None,
        };

        let cv_analyzer = CvAnalyzerConfig {
            base_url: env_or("CV_ANALYZER_URL", "http://localhost:8001"),
            api_key: std::env::var("CV_ANALYZER_API_KEY").ok(),
            timeout_secs: env_parse("CV_ANALYZER_TIMEOUT_SECS", 30),
        };

        let registration = RegistrationConfig {
            pending_dir: env_or("PENDING_REGISTRATIONS_DIR", "data/pending_registrations"),
            cv_analysis: env_or("CV_ANALYSIS_MODE", "inline").parse()?,
            email_delivery: env_or("EMAIL_DELIVERY_MODE", "background").parse()?,
            sweep_interval_minutes: env_parse("SWEEP_INTERVAL_MINUTES", 30),
            product_name: env_or("PRODUCT_NAME", "Polo52"),
        };

        let internal_api_key =
            std::env::var("INTERNAL_SERVICE_API_KEY").context("INTERNAL_SERVICE_API_KEY")?;

        let admin = match (std::env::var("ADMIN_EMAIL"), std::env::var("ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) => Some(AdminBootstrap {
                email,
                password,
                name: env_or("ADMIN_NAME", "Administrator"),
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt,
            storage,
            smtp,
            cv_analyzer,
            registration,
            internal_api_key,
            admin,
        })
    }
}
