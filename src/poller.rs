//! Periodic status sweep
//!
//! Each sweep walks the contact list, marks unseen statuses as viewed and
//! saves any status media. Ticks that fall due while a sweep is still running
//! are skipped.

use crate::error::Result;
use crate::media::{download_and_store, MediaStore, STATUS_PREFIX};
use crate::seen::SeenStatusSet;
use crate::transport::Transport;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Counters from one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub contacts: usize,
    pub new_statuses: usize,
    pub media_saved: usize,
    pub failures: usize,
}

pub struct StatusPoller {
    transport: Arc<dyn Transport>,
    media: MediaStore,
    seen: Mutex<SeenStatusSet>,
    contact_limit: usize,
    sweeping: AtomicBool,
}

/// Clears the in-progress flag however the sweep ends
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl StatusPoller {
    /// `contact_limit` of 0 means every contact
    pub fn new(
        transport: Arc<dyn Transport>,
        media: MediaStore,
        seen_capacity: usize,
        contact_limit: usize,
    ) -> Self {
        Self {
            transport,
            media,
            seen: Mutex::new(SeenStatusSet::new(seen_capacity)),
            contact_limit,
            sweeping: AtomicBool::new(false),
        }
    }

    /// Number of status ids currently remembered
    pub fn seen_count(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeping.load(Ordering::Acquire)
    }

    /// Run a sweep unless one is already in progress
    pub async fn try_sweep(&self) -> Option<Result<SweepReport>> {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Status sweep still running, skipping tick");
            return None;
        }
        let _guard = SweepGuard(&self.sweeping);
        Some(self.sweep().await)
    }

    async fn sweep(&self) -> Result<SweepReport> {
        let mut contacts = self.transport.list_contacts().await?;
        if self.contact_limit > 0 {
            contacts.truncate(self.contact_limit);
        }

        let mut report = SweepReport {
            contacts: contacts.len(),
            ..Default::default()
        };

        for contact in &contacts {
            let status = match self.transport.get_status(&contact.id).await {
                Ok(Some(status)) => status,
                Ok(None) => continue,
                Err(e) => {
                    debug!(contact = %contact.id, error = %e, "Status fetch failed, skipping");
                    report.failures += 1;
                    continue;
                }
            };

            let is_new = match self.seen.lock() {
                Ok(mut seen) => seen.insert(&status.id),
                Err(poisoned) => poisoned.into_inner().insert(&status.id),
            };
            if !is_new {
                continue;
            }
            report.new_statuses += 1;

            if let Err(e) = self.transport.mark_seen(&contact.id, &status.id).await {
                warn!(contact = %contact.id, error = %e, "Failed to mark status seen");
                report.failures += 1;
            }

            if let Some(media) = &status.media {
                match download_and_store(
                    self.transport.as_ref(),
                    &self.media,
                    media,
                    STATUS_PREFIX,
                    &contact.id,
                    Utc::now(),
                )
                .await
                {
                    Ok(path) => {
                        info!(contact = %contact.label(), path = %path.display(), "Saved status media");
                        report.media_saved += 1;
                    }
                    Err(e) => {
                        warn!(contact = %contact.id, error = %e, "Failed to save status media");
                        report.failures += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Sweep on a fixed interval until the task is aborted.
    ///
    /// Sweeps run inline, so aborting the task also cancels a sweep in progress.
    pub async fn run(self: Arc<Self>, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Status poller started (every {:?})", every);
        loop {
            ticker.tick().await;

            match self.try_sweep().await {
                Some(Ok(report)) if report.new_statuses > 0 => {
                    info!(
                        contacts = report.contacts,
                        new = report.new_statuses,
                        media = report.media_saved,
                        failures = report.failures,
                        "Status sweep complete"
                    );
                }
                Some(Ok(report)) => {
                    debug!(contacts = report.contacts, "Status sweep found nothing new");
                }
                Some(Err(e)) => error!("Status sweep failed: {}", e),
                None => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::{Contact, ContactStatus};
    use crate::error::Error;
    use crate::messages::{MediaPayload, MediaRef};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Scripted {
        contacts: Vec<Contact>,
        statuses: HashMap<String, ContactStatus>,
        broken: Vec<String>,
        marked: Mutex<Vec<(String, String)>>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn download_media(&self, _media: &MediaRef) -> Result<MediaPayload> {
            Ok(MediaPayload {
                data: vec![1, 2, 3],
                mimetype: "image/jpeg".to_string(),
            })
        }

        async fn send_reply(&self, _chat_id: &str, _text: &str) -> Result<()> {
            Ok(())
        }

        async fn list_contacts(&self) -> Result<Vec<Contact>> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(self.contacts.clone())
        }

        async fn get_status(&self, contact_id: &str) -> Result<Option<ContactStatus>> {
            if self.broken.iter().any(|b| b == contact_id) {
                return Err(Error::Transport("boom".to_string()));
            }
            Ok(self.statuses.get(contact_id).cloned())
        }

        async fn mark_seen(&self, contact_id: &str, status_id: &str) -> Result<()> {
            self.marked
                .lock()
                .unwrap()
                .push((contact_id.to_string(), status_id.to_string()));
            Ok(())
        }
    }

    fn contact(id: &str) -> Contact {
        Contact {
            id: id.to_string(),
            name: Some(id.to_uppercase()),
        }
    }

    fn status(id: &str, media: bool) -> ContactStatus {
        ContactStatus {
            id: id.to_string(),
            text: Some("hi".to_string()),
            media: media.then(|| MediaRef::Status(id.to_string())),
            timestamp: Utc::now(),
        }
    }

    fn scripted() -> Scripted {
        let mut s = Scripted {
            contacts: vec![contact("a"), contact("b"), contact("c")],
            broken: vec!["b".to_string()],
            ..Default::default()
        };
        s.statuses.insert("a".to_string(), status("s-a", false));
        s.statuses.insert("c".to_string(), status("s-c", true));
        s
    }

    #[tokio::test]
    async fn test_sweep_skips_failures_and_saves_media() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(scripted());
        let poller = StatusPoller::new(transport.clone(), MediaStore::new(temp.path()), 10, 0);

        let report = poller.try_sweep().await.unwrap().unwrap();
        assert_eq!(report.contacts, 3);
        assert_eq!(report.new_statuses, 2);
        assert_eq!(report.media_saved, 1);
        assert_eq!(report.failures, 1);
        assert_eq!(poller.seen_count(), 2);
        assert_eq!(transport.marked.lock().unwrap().len(), 2);

        let files: Vec<_> = std::fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_second_sweep_marks_nothing_new() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(scripted());
        let poller = StatusPoller::new(transport.clone(), MediaStore::new(temp.path()), 10, 0);

        poller.try_sweep().await.unwrap().unwrap();
        let report = poller.try_sweep().await.unwrap().unwrap();
        assert_eq!(report.new_statuses, 0);
        assert_eq!(transport.marked.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_contact_limit() {
        let temp = TempDir::new().unwrap();
        let poller = StatusPoller::new(Arc::new(scripted()), MediaStore::new(temp.path()), 10, 1);

        let report = poller.try_sweep().await.unwrap().unwrap();
        assert_eq!(report.contacts, 1);
        assert_eq!(report.new_statuses, 1);
    }

    #[tokio::test]
    async fn test_overlapping_sweep_is_skipped() {
        let temp = TempDir::new().unwrap();
        let gate = Arc::new(Notify::new());
        let mut transport = scripted();
        transport.gate = Some(gate.clone());
        let poller = Arc::new(StatusPoller::new(
            Arc::new(transport),
            MediaStore::new(temp.path()),
            10,
            0,
        ));

        let first = {
            let poller = poller.clone();
            tokio::spawn(async move { poller.try_sweep().await })
        };
        while !poller.is_sweeping() {
            tokio::task::yield_now().await;
        }

        assert!(poller.try_sweep().await.is_none());

        gate.notify_one();
        let report = first.await.unwrap().unwrap().unwrap();
        assert_eq!(report.new_statuses, 2);
        assert!(!poller.is_sweeping());
    }
}
