use std::{sync::Arc, time::Duration};

use sqlx::PgPool;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{AppConfig, StorageConfig};
use crate::mailer::{LogMailer, Mailer, SmtpMailer};
use crate::recruiters::repo::{PgRecruiterRepository, RecruiterRepository};
use crate::registration::{
    codes::CodeIssuer,
    cv_analysis::HttpCvAnalyzer,
    gc::RegistrationGc,
    rate_limit::RateLimiter,
    services::{RegistrationDeps, RegistrationService, RegistrationSettings},
    temp_store::TempRegistrationStore,
};
use crate::storage::{FileStore, LocalFileStore, S3FileStore};
use crate::users::repo::{PgUserRepository, UserRepository};

const MAIL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepository>,
    pub recruiters: Arc<dyn RecruiterRepository>,
    pub files: Arc<dyn FileStore>,
    pub registration: RegistrationService,
    pub gc: RegistrationGc,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;

        let files: Arc<dyn FileStore> = match &config.storage {
            StorageConfig::Local { root } => {
                info!(root = %root, "using local file storage");
                Arc::new(LocalFileStore::new(root).await?)
            }
            StorageConfig::S3 {
                endpoint,
                bucket,
                access_key,
                secret_key,
                region,
            } => {
                info!(endpoint = %endpoint, bucket = %bucket, "using s3 file storage");
                Arc::new(S3FileStore::new(endpoint, bucket, access_key, secret_key, region).await?)
            }
        };

        let mailer: Arc<dyn Mailer> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
            None => {
                warn!("SMTP_HOST not set, verification emails will only be logged");
                Arc::new(LogMailer)
            }
        };

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(
            TempRegistrationStore::open(&config.registration.pending_dir, clock.clone()).await?,
        );
        let limiter = Arc::new(RateLimiter::new(clock.clone()));
        let users: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(db.clone()));
        let recruiters: Arc<dyn RecruiterRepository> =
            Arc::new(PgRecruiterRepository::new(db.clone()));

        let registration = RegistrationService::new(
            RegistrationDeps {
                users: users.clone(),
                files: files.clone(),
                store: store.clone(),
                limiter: limiter.clone(),
                issuer: CodeIssuer::new(mailer, MAIL_TIMEOUT, config.registration.product_name.clone()),
                analyzer: Arc::new(HttpCvAnalyzer::new(&config.cv_analyzer)?),
                clock: clock.clone(),
            },
            RegistrationSettings {
                cv_analysis: config.registration.cv_analysis,
                email_delivery: config.registration.email_delivery,
            },
        );
        let gc = RegistrationGc::new(store, files.clone(), limiter, clock);

        Ok(Self::from_parts(db, config, users, recruiters, files, registration, gc))
    }

    pub fn from_parts(
        db: PgPool,
        config: Arc<AppConfig>,
        users: Arc<dyn UserRepository>,
        recruiters: Arc<dyn RecruiterRepository>,
        files: Arc<dyn FileStore>,
        registration: RegistrationService,
        gc: RegistrationGc,
    ) -> Self {
        Self {
            db,
            config,
            users,
            recruiters,
            files,
            registration,
            gc,
        }
    }
}
