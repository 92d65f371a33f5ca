use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;
use serde::Serialize;
use time::{Date, Duration};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::auth::password::hash_password;
use crate::clock::Clock;
use crate::config::TaskMode;
use crate::error::{AppError, AppResult};
use crate::registration::{
    codes::{codes_match, generate_code, CodeIssuer},
    cv_analysis::CvAnalyzer,
    rate_limit::{RateLimiter, LOCKOUT},
    repo_types::{CandidatePayload, CompanyPayload, PendingRegistration, RegistrationPayload},
    temp_store::{TempRegistrationStore, REGISTRATION_TTL},
    uploads::{extension, validate_cv, validate_picture, Upload},
};
use crate::storage::{FileArea, FileStore};
use crate::users::{
    repo::UserRepository,
    repo_types::{Gender, NewUser, User, UserRole},
    validation::{normalize_email, required_text, validate_birth_date, validate_password},
};

pub const RESEND_COOLDOWN: Duration = Duration::minutes(2);

#[derive(Debug, Clone)]
pub struct CandidateInput {
    pub email: String,
    pub password: String,
    pub name: String,
    pub surname: String,
    pub gender: Gender,
    pub birth_date: Date,
}

#[derive(Debug, Clone)]
pub struct CompanyInput {
    pub email: String,
    pub password: String,
    pub name: String,
    pub description: String,
}

/// What a client learns after starting a registration. Never carries the code.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PendingSummary {
    pub message: String,
    pub email: String,
    pub expires_in_minutes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendOutcome {
    Sent,
    CoolingDown { seconds_remaining: i64 },
}

#[derive(Debug, Clone, Copy)]
pub struct RegistrationSettings {
    pub cv_analysis: TaskMode,
    pub email_delivery: TaskMode,
}

/// Collaborators of the registration flow.
pub struct RegistrationDeps {
    pub users: Arc<dyn UserRepository>,
    pub files: Arc<dyn FileStore>,
    pub store: Arc<TempRegistrationStore>,
    pub limiter: Arc<RateLimiter>,
    pub issuer: CodeIssuer,
    pub analyzer: Arc<dyn CvAnalyzer>,
    pub clock: Arc<dyn Clock>,
}

/// Drives a sign-up from the first form submission to a durable user:
/// `NONE -> PENDING -> PROMOTED`, with `PENDING -> NONE` on expiry.
#[derive(Clone)]
pub struct RegistrationService {
    users: Arc<dyn UserRepository>,
    files: Arc<dyn FileStore>,
    store: Arc<TempRegistrationStore>,
    limiter: Arc<RateLimiter>,
    issuer: CodeIssuer,
    analyzer: Arc<dyn CvAnalyzer>,
    clock: Arc<dyn Clock>,
    settings: RegistrationSettings,
    completing: Arc<Mutex<HashSet<String>>>,
}

type MovedFile = (FileArea, String, FileArea, String);

/// Marks an email as being promoted; released on drop.
struct CompletionGuard {
    set: Arc<Mutex<HashSet<String>>>,
    email: String,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.email);
    }
}

impl RegistrationService {
    pub fn new(deps: RegistrationDeps, settings: RegistrationSettings) -> Self {
        Self {
            users: deps.users,
            files: deps.files,
            store: deps.store,
            limiter: deps.limiter,
            issuer: deps.issuer,
            analyzer: deps.analyzer,
            clock: deps.clock,
            settings,
            completing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &Arc<TempRegistrationStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    async fn ensure_email_free(&self, email: &str) -> AppResult<()> {
        if self.users.find_by_email(email).await?.is_some() {
            warn!(email = %email, "registration for an existing account");
            return Err(AppError::Conflict("Email already registered".into()));
        }
        if self.store.get_pending_registration(email).await?.is_some() {
            return Err(AppError::Conflict(
                "A registration is already pending for this email. Check your inbox or request a new code."
                    .into(),
            ));
        }
        Ok(())
    }

    async fn store_temp(&self, area: FileArea, upload: &Upload, ext: &str) -> AppResult<String> {
        let name = format!("{}.{}", Uuid::new_v4(), ext);
        self.files
            .put_object(area, &name, upload.body.clone(), &upload.content_type)
            .await
            .map_err(|e| {
                error!(error = ?e, area = area.as_str(), "temp upload failed");
                AppError::TransientDependency("file storage unavailable".into())
            })?;
        debug!(area = area.as_str(), file = %name, size = upload.body.len(), "temp file stored");
        Ok(name)
    }

    async fn discard_temp_files(&self, payload: &RegistrationPayload) {
        for (area, name) in payload.temp_files() {
            if let Err(e) = self.files.delete_object(area, &name).await {
                warn!(error = ?e, area = area.as_str(), file = %name, "could not discard temp file");
            }
        }
    }

    /// Create-only write of a new record; temp files of a losing racer are
    /// discarded right away.
    async fn open_registration(&self, record: PendingRegistration) -> AppResult<PendingRegistration> {
        if let Err(e) = self.store.insert_new(&record).await {
            self.discard_temp_files(&record.payload).await;
            return Err(e);
        }
        Ok(record)
    }

    async fn send_code(&self, email: &str, code: &str) {
        match self.settings.email_delivery {
            TaskMode::Inline => {
                self.issuer.dispatch(email, code).await;
            }
            TaskMode::Background => {
                let issuer = self.issuer.clone();
                let email = email.to_string();
                let code = code.to_string();
                tokio::spawn(async move {
                    issuer.dispatch(&email, &code).await;
                });
            }
        }
    }

    /// Runs the analysis detached and writes the result back only if the
    /// pending record still refers to the same CV.
    fn spawn_cv_analysis(&self, email: String, cv_file: String, cv: Upload) {
        let analyzer = self.analyzer.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            let Some(analysis) = analyzer
                .analyze(cv.body, &cv.filename, &cv.content_type)
                .await
            else {
                return;
            };
            let written = store
                .update(&email, |record| match &mut record.payload {
                    RegistrationPayload::Candidate(c) if c.cv_file == cv_file => {
                        c.cv_analysis = Some(analysis);
                        true
                    }
                    _ => false,
                })
                .await;
            match written {
                Ok(true) => debug!(email = %email, "cv analysis attached to pending registration"),
                Ok(false) => debug!(email = %email, "pending registration gone before cv analysis finished"),
                Err(e) => warn!(email = %email, error = ?e, "could not store cv analysis"),
            }
        });
    }

    #[instrument(skip(self, input, cv, picture), fields(email = %input.email))]
    pub async fn begin_candidate_registration(
        &self,
        input: CandidateInput,
        cv: Upload,
        picture: Option<Upload>,
    ) -> AppResult<PendingSummary> {
        let email = normalize_email(&input.email)?;
        validate_password(&input.password)?;
        let name = required_text("name", &input.name)?;
        let surname = required_text("surname", &input.surname)?;
        validate_birth_date(input.birth_date, self.clock.now())?;

        self.ensure_email_free(&email).await?;

        let cv_ext = validate_cv(&cv)?;
        let picture_ext = picture.as_ref().map(validate_picture).transpose()?;

        // inline analysis runs before any temp write so a rejected CV leaves nothing behind
        let cv_analysis = match self.settings.cv_analysis {
            TaskMode::Inline => {
                let analysis = self
                    .analyzer
                    .analyze(cv.body.clone(), &cv.filename, &cv.content_type)
                    .await;
                if analysis.is_none() {
                    warn!(email = %email, "cv could not be analyzed");
                    return Err(AppError::InvalidInput(
                        "The file is not a valid CV or could not be analyzed".into(),
                    ));
                }
                analysis
            }
            TaskMode::Background => None,
        };

        let cv_file = self.store_temp(FileArea::CvTemp, &cv, &cv_ext).await?;
        let picture_file = match (&picture, picture_ext) {
            (Some(p), Some(ext)) => match self.store_temp(FileArea::PictureTemp, p, &ext).await {
                Ok(name) => Some(name),
                Err(e) => {
                    let _ = self.files.delete_object(FileArea::CvTemp, &cv_file).await;
                    return Err(e);
                }
            },
            _ => None,
        };

        let payload = RegistrationPayload::Candidate(CandidatePayload {
            name,
            surname,
            gender: input.gender,
            birth_date: input.birth_date,
            password: input.password,
            cv_file: cv_file.clone(),
            cv_content_type: cv.content_type.clone(),
            cv_analysis,
            picture_file,
        });
        let record = self
            .open_registration(self.store.new_record(&email, payload, generate_code()))
            .await?;
        info!(email = %email, "candidate registration pending");

        if self.settings.cv_analysis == TaskMode::Background {
            self.spawn_cv_analysis(email.clone(), cv_file, cv);
        }
        self.send_code(&email, &record.verification_code).await;

        Ok(pending_summary(email))
    }

    #[instrument(skip(self, input, picture), fields(email = %input.email))]
    pub async fn begin_company_registration(
        &self,
        input: CompanyInput,
        picture: Option<Upload>,
    ) -> AppResult<PendingSummary> {
        let email = normalize_email(&input.email)?;
        validate_password(&input.password)?;
        let name = required_text("name", &input.name)?;
        let description = required_text("description", &input.description)?;

        self.ensure_email_free(&email).await?;

        let picture_file = match &picture {
            Some(p) => {
                let ext = validate_picture(p)?;
                Some(self.store_temp(FileArea::PictureTemp, p, &ext).await?)
            }
            None => None,
        };

        let payload = RegistrationPayload::Company(CompanyPayload {
            name,
            description,
            password: input.password,
            picture_file,
        });
        let record = self
            .open_registration(self.store.new_record(&email, payload, generate_code()))
            .await?;
        info!(email = %email, "company registration pending");

        self.send_code(&email, &record.verification_code).await;

        Ok(pending_summary(email))
    }

    /// Rotates the code unless the last send was less than two minutes ago.
    /// Expiry is left untouched.
    #[instrument(skip(self))]
    pub async fn resend_code(&self, email: &str) -> AppResult<ResendOutcome> {
        let email = normalize_email(email)?;
        let now = self.clock.now();
        let code = generate_code();
        let mut outcome = None;

        self.store
            .update(&email, |record| {
                let since = now - record.last_resend_at.unwrap_or(record.created_at);
                if since < RESEND_COOLDOWN {
                    let remaining = RESEND_COOLDOWN - since;
                    let millis = remaining.whole_milliseconds();
                    outcome = Some(ResendOutcome::CoolingDown {
                        seconds_remaining: ((millis + 999) / 1000) as i64,
                    });
                    return false;
                }
                record.verification_code = code.clone();
                record.last_resend_at = Some(now);
                outcome = Some(ResendOutcome::Sent);
                true
            })
            .await?;

        match outcome {
            None => Err(AppError::NotFound(
                "No pending registration found for this email".into(),
            )),
            Some(ResendOutcome::Sent) => {
                info!(email = %email, "verification code rotated");
                self.send_code(&email, &code).await;
                Ok(ResendOutcome::Sent)
            }
            Some(cooling) => {
                debug!(email = %email, "resend requested during cooldown");
                Ok(cooling)
            }
        }
    }

    /// Counts against the attempt budget. Leaves the pending record in place.
    #[instrument(skip(self, code))]
    pub async fn verify_code(&self, email: &str, code: &str) -> AppResult<bool> {
        let email = normalize_email(email)?;
        if !self.limiter.check_and_increment(&email) {
            let minutes = self
                .limiter
                .block_minutes_remaining(&email)
                .unwrap_or(LOCKOUT.whole_minutes());
            return Err(AppError::TooManyAttempts {
                retry_after_minutes: minutes,
            });
        }

        let Some(record) = self.store.get_pending_registration(&email).await? else {
            debug!(email = %email, "verification against missing registration");
            return Ok(false);
        };
        if codes_match(&record.verification_code, code) {
            self.limiter.reset(&email);
            info!(email = %email, "verification code accepted");
            Ok(true)
        } else {
            warn!(email = %email, "verification code rejected");
            Ok(false)
        }
    }

    pub fn remaining_attempts(&self, email: &str) -> u32 {
        let email = email.trim().to_lowercase();
        self.limiter.remaining_attempts(&email)
    }

    #[instrument(skip(self, code))]
    pub async fn complete_candidate_registration(&self, email: &str, code: &str) -> AppResult<User> {
        let (email, _guard) = self.claim(email)?;
        let record = self.verified_record(&email, code).await?;
        if !matches!(record.payload, RegistrationPayload::Candidate(_)) {
            return Err(AppError::InvalidInput(
                "This registration is not a candidate registration".into(),
            ));
        }
        self.promote(&email, record.payload).await
    }

    #[instrument(skip(self, code))]
    pub async fn complete_company_registration(&self, email: &str, code: &str) -> AppResult<User> {
        let (email, _guard) = self.claim(email)?;
        let record = self.verified_record(&email, code).await?;
        if !matches!(record.payload, RegistrationPayload::Company(_)) {
            return Err(AppError::InvalidInput(
                "This registration is not a company registration".into(),
            ));
        }
        self.promote(&email, record.payload).await
    }

    fn claim(&self, email: &str) -> AppResult<(String, CompletionGuard)> {
        let email = normalize_email(email)?;
        if !self.completing.lock().insert(email.clone()) {
            return Err(AppError::Conflict(
                "This registration is already being completed".into(),
            ));
        }
        let guard = CompletionGuard {
            set: self.completing.clone(),
            email: email.clone(),
        };
        Ok((email, guard))
    }

    async fn verified_record(&self, email: &str, code: &str) -> AppResult<PendingRegistration> {
        if !self.verify_code(email, code).await? {
            return Err(AppError::InvalidInput(
                "Invalid or expired verification code".into(),
            ));
        }
        self.store
            .get_pending_registration(email)
            .await?
            .ok_or_else(|| AppError::InvalidInput("Registration not found or expired".into()))
    }

    async fn promote(&self, email: &str, payload: RegistrationPayload) -> AppResult<User> {
        let mut moved = Vec::new();
        match self.promote_inner(email, payload, &mut moved).await {
            Ok(user) => {
                if let Err(e) = self.store.remove_pending_registration(email).await {
                    warn!(email = %email, error = ?e, "could not remove promoted registration");
                }
                self.limiter.reset(email);
                info!(user_id = %user.id, email = %email, role = ?user.role, "registration completed");
                Ok(user)
            }
            Err(e) => {
                self.roll_back(moved).await;
                Err(e)
            }
        }
    }

    async fn promote_inner(
        &self,
        email: &str,
        payload: RegistrationPayload,
        moved: &mut Vec<MovedFile>,
    ) -> AppResult<User> {
        let new_user = match payload {
            RegistrationPayload::Candidate(c) => {
                let password_hash = hash_password(&c.password)?;
                let cv = self
                    .to_permanent(FileArea::CvTemp, &c.cv_file, FileArea::CvPermanent, moved)
                    .await?;
                let picture = match &c.picture_file {
                    Some(p) => Some(
                        self.to_permanent(FileArea::PictureTemp, p, FileArea::PicturePermanent, moved)
                            .await?,
                    ),
                    None => None,
                };
                NewUser {
                    email: email.to_string(),
                    password_hash,
                    role: UserRole::Candidate,
                    verified: true,
                    email_verified: true,
                    name: c.name,
                    profile_picture: picture,
                    surname: Some(c.surname),
                    gender: Some(c.gender),
                    birth_date: Some(c.birth_date),
                    cv_filename: Some(cv),
                    cv_analysis: c.cv_analysis,
                    description: None,
                }
            }
            RegistrationPayload::Company(c) => {
                let password_hash = hash_password(&c.password)?;
                let picture = match &c.picture_file {
                    Some(p) => Some(
                        self.to_permanent(FileArea::PictureTemp, p, FileArea::PicturePermanent, moved)
                            .await?,
                    ),
                    None => None,
                };
                NewUser {
                    email: email.to_string(),
                    password_hash,
                    role: UserRole::Company,
                    verified: false,
                    email_verified: true,
                    name: c.name,
                    profile_picture: picture,
                    surname: None,
                    gender: None,
                    birth_date: None,
                    cv_filename: None,
                    cv_analysis: None,
                    description: Some(c.description),
                }
            }
        };
        self.users.insert(new_user).await
    }

    async fn to_permanent(
        &self,
        from: FileArea,
        name: &str,
        to: FileArea,
        moved: &mut Vec<MovedFile>,
    ) -> AppResult<String> {
        let new_name = match extension(name) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        self.files
            .move_object(from, name, to, &new_name)
            .await
            .map_err(|e| {
                error!(error = ?e, file = %name, "promotion move failed");
                AppError::TransientDependency("file storage unavailable".into())
            })?;
        moved.push((from, name.to_string(), to, new_name.clone()));
        Ok(new_name)
    }

    /// Puts promoted files back in the temp areas so the record stays usable.
    async fn roll_back(&self, moved: Vec<MovedFile>) {
        for (from, name, to, new_name) in moved.into_iter().rev() {
            if let Err(e) = self.files.move_object(to, &new_name, from, &name).await {
                error!(error = ?e, file = %new_name, "rollback of promoted file failed");
            }
        }
    }
}

fn pending_summary(email: String) -> PendingSummary {
    PendingSummary {
        message: "Registration started. Check your email for the verification code.".into(),
        email,
        expires_in_minutes: REGISTRATION_TTL.whole_minutes(),
    }
}
