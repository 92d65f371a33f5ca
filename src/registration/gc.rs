use std::{collections::HashSet, sync::Arc};

use time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::registration::{rate_limit::RateLimiter, temp_store::TempRegistrationStore};
use crate::storage::{FileArea, FileStore};

/// Temp files younger than this are never treated as orphans.
pub const ORPHAN_GRACE: Duration = Duration::minutes(5);

/// Reclaims expired registrations and temp uploads nothing refers to.
#[derive(Clone)]
pub struct RegistrationGc {
    store: Arc<TempRegistrationStore>,
    files: Arc<dyn FileStore>,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
}

impl RegistrationGc {
    pub fn new(
        store: Arc<TempRegistrationStore>,
        files: Arc<dyn FileStore>,
        limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            files,
            limiter,
            clock,
        }
    }

    /// Deletes each expired record together with its temp files.
    /// Returns how many records were removed.
    #[instrument(skip(self))]
    pub async fn sweep_expired_registrations(&self) -> anyhow::Result<usize> {
        let now = self.clock.now();
        let mut removed = 0;
        for record in self.store.list_all().await? {
            if !record.is_expired_at(now) {
                continue;
            }
            // A fresh registration may have replaced it since the listing.
            if !self.store.remove_if_expired(&record.email).await? {
                continue;
            }
            for (area, name) in record.payload.temp_files() {
                if let Err(e) = self.files.delete_object(area, &name).await {
                    warn!(error = ?e, area = area.as_str(), file = %name, "could not delete expired temp file");
                }
            }
            debug!(email = %record.email, "expired registration removed");
            removed += 1;
        }
        let purged = self.limiter.purge_stale();
        if removed > 0 || purged > 0 {
            info!(removed, limiter_entries_purged = purged, "expired registrations swept");
        }
        Ok(removed)
    }

    /// Deletes temp files that no active record names. Returns the count.
    #[instrument(skip(self))]
    pub async fn sweep_orphaned_temp_files(&self) -> anyhow::Result<usize> {
        let now = self.clock.now();
        let referenced: HashSet<(FileArea, String)> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .filter(|r| !r.is_expired_at(now))
            .flat_map(|r| r.payload.temp_files())
            .collect();

        let mut removed = 0;
        for area in FileArea::TEMP {
            for object in self.files.list(area).await? {
                if referenced.contains(&(area, object.name.clone())) {
                    continue;
                }
                let young = object
                    .modified_at
                    .is_some_and(|modified| now - modified < ORPHAN_GRACE);
                if young {
                    continue;
                }
                match self.files.delete_object(area, &object.name).await {
                    Ok(true) => {
                        debug!(area = area.as_str(), file = %object.name, "orphaned temp file removed");
                        removed += 1;
                    }
                    Ok(false) => {}
                    Err(e) => warn!(error = ?e, area = area.as_str(), file = %object.name, "could not delete orphaned temp file"),
                }
            }
        }
        if removed > 0 {
            info!(removed, "orphaned temp files swept");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::temp_store::REGISTRATION_TTL;
    use crate::testing::{candidate_input, company_input, cv_upload, picture_upload, Harness};
    use bytes::Bytes;

    #[tokio::test]
    async fn expired_records_and_their_files_are_removed() {
        let h = Harness::new().await;
        h.service
            .begin_candidate_registration(candidate_input("a@x.com"), cv_upload(), Some(picture_upload()))
            .await
            .unwrap();
        h.service
            .begin_company_registration(company_input("c@x.com"), None)
            .await
            .unwrap();
        let files = h.store_record("a@x.com").await.payload.temp_files();

        assert_eq!(h.gc.sweep_expired_registrations().await.unwrap(), 0);

        h.clock.advance(REGISTRATION_TTL + Duration::seconds(1));
        assert_eq!(h.gc.sweep_expired_registrations().await.unwrap(), 2);
        for (area, name) in files {
            assert!(!h.files.exists(area, &name).await.unwrap());
        }
        assert!(h.service.store().list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn orphans_are_removed_but_referenced_and_young_files_stay() {
        let h = Harness::new().await;
        h.service
            .begin_candidate_registration(candidate_input("a@x.com"), cv_upload(), None)
            .await
            .unwrap();
        let kept = h.store_record("a@x.com").await.payload.temp_files();

        h.files
            .put_object(FileArea::CvTemp, "stray.pdf", Bytes::from_static(b"%PDF-"), "application/pdf")
            .await
            .unwrap();
        h.files.backdate(FileArea::CvTemp, "stray.pdf", ORPHAN_GRACE + Duration::seconds(1));
        h.files
            .put_object(FileArea::PictureTemp, "fresh.png", Bytes::from_static(b"\x89PNG"), "image/png")
            .await
            .unwrap();

        assert_eq!(h.gc.sweep_orphaned_temp_files().await.unwrap(), 1);
        assert!(!h.files.exists(FileArea::CvTemp, "stray.pdf").await.unwrap());
        assert!(h.files.exists(FileArea::PictureTemp, "fresh.png").await.unwrap());
        for (area, name) in kept {
            assert!(h.files.exists(area, &name).await.unwrap());
        }
    }

    #[tokio::test]
    async fn files_of_expired_records_count_as_orphans() {
        let h = Harness::new().await;
        h.service
            .begin_candidate_registration(candidate_input("a@x.com"), cv_upload(), None)
            .await
            .unwrap();
        h.clock.advance(REGISTRATION_TTL + Duration::seconds(1));
        assert_eq!(h.gc.sweep_orphaned_temp_files().await.unwrap(), 1);
    }
}
