use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use parking_lot::Mutex;
use time::Duration;
use tokio::sync::{Mutex as KeyMutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::registration::repo_types::{PendingRegistration, RegistrationPayload};

pub const REGISTRATION_TTL: Duration = Duration::minutes(15);

/// Storage-safe form of an email: `@` -> `_at_`, `.` -> `_dot_`, any other
/// byte outside `[A-Za-z0-9_+-]` -> `_xHH_`.
///
/// Not strictly injective: a literal `_at_` inside the local part collides with
/// a real `@`. Accepted for file naming; callers normalize emails first.
pub fn storage_key(email: &str) -> String {
    let mut out = String::with_capacity(email.len() + 8);
    for b in email.bytes() {
        match b {
            b'@' => out.push_str("_at_"),
            b'.' => out.push_str("_dot_"),
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'+' | b'-' => out.push(b as char),
            other => out.push_str(&format!("_x{:02x}_", other)),
        }
    }
    out
}

/// File-backed, expiring store of pending registrations, one JSON document
/// per email. Mutations of one email are serialized by a per-key lock.
pub struct TempRegistrationStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<String, Arc<KeyMutex<()>>>>,
}

struct KeyGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    store: &'a TempRegistrationStore,
    key: String,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.store.locks.lock();
        if locks
            .get(&self.key)
            .is_some_and(|m| Arc::strong_count(m) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

impl TempRegistrationStore {
    pub async fn open(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("create pending registrations dir {}", dir.display()))?;
        Ok(Self {
            dir,
            clock,
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    async fn lock_key(&self, email: &str) -> KeyGuard<'_> {
        let key = storage_key(email);
        let mutex = self
            .locks
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(KeyMutex::new(())))
            .clone();
        KeyGuard {
            guard: Some(mutex.lock_owned().await),
            store: self,
            key,
        }
    }

    /// Builds a fresh record stamped with `now` and `now + TTL`.
    pub fn new_record(
        &self,
        email: &str,
        payload: RegistrationPayload,
        code: String,
    ) -> PendingRegistration {
        let now = self.clock.now();
        PendingRegistration {
            email: email.to_string(),
            payload,
            verification_code: code,
            created_at: now,
            expires_at: now + REGISTRATION_TTL,
            last_resend_at: None,
        }
    }

    /// Writes a fresh record, overwriting any existing one for the email.
    pub async fn save_pending_registration(
        &self,
        email: &str,
        payload: RegistrationPayload,
        code: String,
    ) -> anyhow::Result<PendingRegistration> {
        let record = self.new_record(email, payload, code);
        let key = self.lock_key(email).await;
        write_atomic(&self.path(&key.key), &record).await?;
        debug!(email = %email, "pending registration saved");
        Ok(record)
    }

    /// Create-only write. An active record for the same email is a `Conflict`;
    /// an expired or unreadable leftover is replaced.
    pub async fn insert_new(&self, record: &PendingRegistration) -> AppResult<()> {
        let key = self.lock_key(&record.email).await;
        let path = self.path(&key.key);
        if let Some(existing) = read_record(&path).await? {
            if !existing.is_expired_at(self.clock.now()) {
                return Err(AppError::Conflict(
                    "A registration is already pending for this email. Verify it or wait for it to expire."
                        .into(),
                ));
            }
        }
        write_atomic(&path, record).await?;
        debug!(email = %record.email, "pending registration created");
        Ok(())
    }

    /// Read-modify-write under the key lock. `f` returning `false` skips the
    /// write. Returns `false` if no active record exists.
    pub async fn update<F>(&self, email: &str, f: F) -> anyhow::Result<bool>
    where
        F: FnOnce(&mut PendingRegistration) -> bool,
    {
        let key = self.lock_key(email).await;
        let path = self.path(&key.key);
        let Some(mut record) = read_record(&path).await? else {
            return Ok(false);
        };
        if record.is_expired_at(self.clock.now()) || !f(&mut record) {
            return Ok(false);
        }
        write_atomic(&path, &record).await?;
        Ok(true)
    }

    /// Lazy expiry: an expired record is deleted and reported as absent.
    pub async fn get_pending_registration(
        &self,
        email: &str,
    ) -> anyhow::Result<Option<PendingRegistration>> {
        let key = self.lock_key(email).await;
        let path = self.path(&key.key);
        let Some(record) = read_record(&path).await? else {
            return Ok(None);
        };
        if record.is_expired_at(self.clock.now()) {
            debug!(email = %email, "pending registration expired on read");
            remove_file(&path).await?;
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Idempotent; returns whether a record was deleted.
    pub async fn remove_pending_registration(&self, email: &str) -> anyhow::Result<bool> {
        let key = self.lock_key(email).await;
        remove_file(&self.path(&key.key)).await
    }

    /// Deletes the record only if it is still expired once the key lock is held.
    pub async fn remove_if_expired(&self, email: &str) -> anyhow::Result<bool> {
        let key = self.lock_key(email).await;
        let path = self.path(&key.key);
        match read_record(&path).await? {
            Some(r) if r.is_expired_at(self.clock.now()) => remove_file(&path).await,
            _ => Ok(false),
        }
    }

    /// Every stored record, expired ones included.
    pub async fn list_all(&self) -> anyhow::Result<Vec<PendingRegistration>> {
        let mut out = Vec::new();
        let mut rd = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("read dir {}", self.dir.display()))?;
        while let Some(entry) = rd.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(record) = read_record(&path).await? {
                out.push(record);
            }
        }
        Ok(out)
    }
}

async fn read_record(path: &Path) -> anyhow::Result<Option<PendingRegistration>> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    match serde_json::from_slice(&raw) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "discarding unreadable pending registration");
            remove_file(path).await?;
            Ok(None)
        }
    }
}

async fn write_atomic(path: &Path, record: &PendingRegistration) -> anyhow::Result<()> {
    let body = serde_json::to_vec_pretty(record).context("encode pending registration")?;
    let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4()));
    tokio::fs::write(&tmp, &body)
        .await
        .with_context(|| format!("write {}", tmp.display()))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e).with_context(|| format!("rename into {}", path.display()));
    }
    Ok(())
}

async fn remove_file(path: &Path) -> anyhow::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::repo_types::CompanyPayload;
    use crate::testing::ManualClock;

    fn company() -> RegistrationPayload {
        RegistrationPayload::Company(CompanyPayload {
            name: "Acme".into(),
            description: "Anvils".into(),
            password: "password123".into(),
            picture_file: None,
        })
    }

    async fn store() -> (tempfile::TempDir, Arc<ManualClock>, TempRegistrationStore) {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::default());
        let store = TempRegistrationStore::open(dir.path().join("pending"), clock.clone())
            .await
            .unwrap();
        (dir, clock, store)
    }

    #[test]
    fn storage_key_replaces_separators() {
        assert_eq!(storage_key("a.b@x.com"), "a_dot_b_at_x_dot_com");
        assert_eq!(storage_key("we/ird@x.io"), "we_x2f_ird_at_x_dot_io");
        assert_eq!(storage_key("first+tag@x.io"), "first+tag_at_x_dot_io");
    }

    #[tokio::test]
    async fn save_then_get_roundtrips() {
        let (_d, _c, store) = store().await;
        let saved = store
            .save_pending_registration("a@x.com", company(), "123456".into())
            .await
            .unwrap();
        assert_eq!(saved.expires_at - saved.created_at, REGISTRATION_TTL);

        let loaded = store.get_pending_registration("a@x.com").await.unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert!(store.get_pending_registration("b@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_record_is_deleted_on_read() {
        let (_d, clock, store) = store().await;
        store
            .save_pending_registration("a@x.com", company(), "123456".into())
            .await
            .unwrap();

        clock.advance(REGISTRATION_TTL);
        assert!(store.get_pending_registration("a@x.com").await.unwrap().is_some());

        clock.advance(Duration::seconds(1));
        assert!(store.get_pending_registration("a@x.com").await.unwrap().is_none());
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (_d, _c, store) = store().await;
        store
            .save_pending_registration("a@x.com", company(), "123456".into())
            .await
            .unwrap();
        assert!(store.remove_pending_registration("a@x.com").await.unwrap());
        assert!(!store.remove_pending_registration("a@x.com").await.unwrap());
    }

    #[tokio::test]
    async fn insert_new_rejects_active_record_but_replaces_expired() {
        let (_d, clock, store) = store().await;
        let first = store.new_record("a@x.com", company(), "111111".into());
        store.insert_new(&first).await.unwrap();

        let second = store.new_record("a@x.com", company(), "222222".into());
        assert!(matches!(
            store.insert_new(&second).await,
            Err(AppError::Conflict(_))
        ));

        clock.advance(REGISTRATION_TTL + Duration::seconds(1));
        let third = store.new_record("a@x.com", company(), "333333".into());
        store.insert_new(&third).await.unwrap();
        let loaded = store.get_pending_registration("a@x.com").await.unwrap().unwrap();
        assert_eq!(loaded.verification_code, "333333");
    }

    #[tokio::test]
    async fn update_skips_missing_and_expired_records() {
        let (_d, clock, store) = store().await;
        assert!(!store.update("a@x.com", |_| true).await.unwrap());

        store
            .save_pending_registration("a@x.com", company(), "123456".into())
            .await
            .unwrap();
        assert!(store
            .update("a@x.com", |r| {
                r.verification_code = "654321".into();
                true
            })
            .await
            .unwrap());
        let loaded = store.get_pending_registration("a@x.com").await.unwrap().unwrap();
        assert_eq!(loaded.verification_code, "654321");

        clock.advance(REGISTRATION_TTL + Duration::seconds(1));
        assert!(!store.update("a@x.com", |_| true).await.unwrap());
    }

    #[tokio::test]
    async fn unreadable_documents_are_discarded() {
        let (dir, _c, store) = store().await;
        let path = dir.path().join("pending").join(format!("{}.json", storage_key("a@x.com")));
        tokio::fs::write(&path, b"{not json").await.unwrap();

        assert!(store.get_pending_registration("a@x.com").await.unwrap().is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn remove_if_expired_leaves_active_records() {
        let (_d, clock, store) = store().await;
        store
            .save_pending_registration("a@x.com", company(), "123456".into())
            .await
            .unwrap();
        assert!(!store.remove_if_expired("a@x.com").await.unwrap());
        clock.advance(REGISTRATION_TTL + Duration::seconds(1));
        assert!(store.remove_if_expired("a@x.com").await.unwrap());
    }

    #[tokio::test]
    async fn key_locks_are_released() {
        let (_d, _c, store) = store().await;
        store
            .save_pending_registration("a@x.com", company(), "123456".into())
            .await
            .unwrap();
        store.get_pending_registration("a@x.com").await.unwrap();
        assert!(store.locks.lock().is_empty());
    }
}
