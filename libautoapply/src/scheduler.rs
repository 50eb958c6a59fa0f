//! One-shot reminder scheduling and dispatch
//!
//! Jobs live in the `reminders` table; a poll loop picks up whatever is
//! due each tick. Scheduling a reminder whose time has already passed
//! dispatches it synchronously rather than parking it for up to a full
//! poll interval. Dispatch failures leave the job unsent, so the next
//! tick retries it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::error::{PlatformError, Result};
use crate::platforms::Notifier;
use crate::types::{ReminderJob, ReminderType};

pub struct ReminderScheduler {
    db: Database,
    notifier: Arc<dyn Notifier>,
    dispatch_timeout: Duration,
}

impl ReminderScheduler {
    pub fn new(db: Database, notifier: Arc<dyn Notifier>, dispatch_timeout: Duration) -> Self {
        Self {
            db,
            notifier,
            dispatch_timeout,
        }
    }

    /// Schedule a reminder to fire `offset_days` before `event_time`.
    ///
    /// If the computed fire time is already in the past the reminder is
    /// dispatched immediately; a failed immediate dispatch stores the
    /// job unsent and the poll loop retries it. Returns the job id.
    pub async fn schedule(
        &self,
        application_id: &str,
        user_id: &str,
        reminder_type: ReminderType,
        event_time: DateTime<Utc>,
        offset_days: i64,
        metadata: HashMap<String, String>,
    ) -> Result<String> {
        let fire_at = event_time - chrono::Duration::days(offset_days);
        let mut job = ReminderJob::new(
            application_id.to_string(),
            user_id.to_string(),
            reminder_type,
            fire_at,
            metadata,
        );

        let now = Utc::now();
        if fire_at <= now {
            match self.dispatch(&job).await {
                Ok(()) => {
                    job.sent = true;
                    job.sent_at = Some(now.timestamp());
                    info!(job_id = %job.id, user_id, "dispatched already-due reminder on schedule");
                }
                Err(e) => {
                    warn!(
                        job_id = %job.id,
                        error = %e,
                        "immediate dispatch failed, reminder queued for next tick"
                    );
                }
            }
        }

        self.db.insert_reminder(&job).await?;
        debug!(
            job_id = %job.id,
            reminder_type = %reminder_type,
            scheduled_time = job.scheduled_time,
            "reminder stored"
        );
        Ok(job.id)
    }

    /// Cancel a pending reminder. Returns `false` (not an error) when
    /// the id is unknown or the reminder already fired.
    pub async fn cancel(&self, job_id: &str) -> Result<bool> {
        let removed = self.db.delete_unsent_reminder(job_id).await?;
        if removed {
            info!(job_id, "reminder cancelled");
        }
        Ok(removed)
    }

    /// Unsent reminders for a user, soonest first.
    pub async fn list_pending(&self, user_id: &str) -> Result<Vec<ReminderJob>> {
        self.db.pending_reminders(user_id).await
    }

    /// One poll pass: dispatch every job due at `now`. Returns how many
    /// were sent. A failed dispatch is logged and left for the next tick.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.db.due_reminders(now.timestamp()).await?;
        if due.is_empty() {
            return Ok(0);
        }

        debug!(count = due.len(), "dispatching due reminders");
        let mut sent = 0;
        for job in due {
            match self.dispatch(&job).await {
                Ok(()) => {
                    if self
                        .db
                        .mark_reminder_sent(&job.id, Utc::now().timestamp())
                        .await?
                    {
                        sent += 1;
                        info!(job_id = %job.id, user_id = %job.user_id, "reminder sent");
                    }
                }
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "reminder dispatch failed, will retry");
                }
            }
        }
        Ok(sent)
    }

    async fn dispatch(&self, job: &ReminderJob) -> Result<()> {
        match tokio::time::timeout(self.dispatch_timeout, self.notifier.send(job)).await {
            Ok(result) => result,
            Err(_) => Err(PlatformError::Notification(format!(
                "dispatch timed out after {:?}",
                self.dispatch_timeout
            ))
            .into()),
        }
    }

    /// Poll until `shutdown` is set. Sleeps in one-second increments so
    /// a signal is picked up promptly. Tick errors are logged, not fatal.
    pub async fn run_poll_loop(&self, poll_interval: Duration, shutdown: Arc<AtomicBool>) {
        info!(interval_secs = poll_interval.as_secs(), "reminder poll loop started");

        while !shutdown.load(Ordering::Relaxed) {
            match self.tick(Utc::now()).await {
                Ok(0) => {}
                Ok(sent) => info!(sent, "poll tick dispatched reminders"),
                Err(e) => error!("poll tick failed: {}", e),
            }

            let mut slept = Duration::ZERO;
            while slept < poll_interval && !shutdown.load(Ordering::Relaxed) {
                tokio::time::sleep(Duration::from_secs(1)).await;
                slept += Duration::from_secs(1);
            }
        }

        info!("reminder poll loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::platforms::mock::MockNotifier;

    async fn test_scheduler() -> (ReminderScheduler, Arc<MockNotifier>, Database) {
        let db = Database::in_memory().await.unwrap();
        let notifier = Arc::new(MockNotifier::new());
        let scheduler = ReminderScheduler::new(
            db.clone(),
            notifier.clone(),
            Duration::from_secs(5),
        );
        (scheduler, notifier, db)
    }

    #[tokio::test]
    async fn test_future_reminder_is_stored_pending() {
        let (scheduler, notifier, _db) = test_scheduler().await;
        let event = Utc::now() + chrono::Duration::days(10);

        let id = scheduler
            .schedule("app-1", "u1", ReminderType::FollowUp, event, 3, HashMap::new())
            .await
            .unwrap();

        let pending = scheduler.list_pending("u1").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        // Fires three days before the event
        assert_eq!(
            pending[0].scheduled_time,
            (event - chrono::Duration::days(3)).timestamp()
        );
        assert!(notifier.delivered_ids().is_empty());
    }

    #[tokio::test]
    async fn test_already_due_reminder_dispatches_immediately() {
        let (scheduler, notifier, db) = test_scheduler().await;
        let event = Utc::now() - chrono::Duration::hours(1);

        let id = scheduler
            .schedule("app-1", "u1", ReminderType::StatusCheck, event, 0, HashMap::new())
            .await
            .unwrap();

        assert_eq!(notifier.delivered_ids(), vec![id.clone()]);
        let stored = db.get_reminder(&id).await.unwrap().unwrap();
        assert!(stored.sent);
        assert!(stored.sent_at.is_some());
        assert!(scheduler.list_pending("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_immediate_dispatch_leaves_job_for_poll_retry() {
        let (scheduler, notifier, _db) = test_scheduler().await;
        notifier.fail_next(1);

        let id = scheduler
            .schedule(
                "app-1",
                "u1",
                ReminderType::FollowUp,
                Utc::now() - chrono::Duration::minutes(5),
                0,
                HashMap::new(),
            )
            .await
            .unwrap();

        // Stored unsent after the failed attempt
        let pending = scheduler.list_pending("u1").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);

        // Notifier recovered; the next tick delivers it
        let sent = scheduler.tick(Utc::now()).await.unwrap();
        assert_eq!(sent, 1);
        assert_eq!(notifier.delivered_ids(), vec![id]);
        assert!(scheduler.list_pending("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tick_dispatches_due_and_skips_future() {
        let (scheduler, notifier, _db) = test_scheduler().await;
        let now = Utc::now();

        let due_id = scheduler
            .schedule(
                "app-1",
                "u1",
                ReminderType::FollowUp,
                now + chrono::Duration::days(3),
                3,
                HashMap::new(),
            )
            .await
            .unwrap();
        scheduler
            .schedule(
                "app-2",
                "u1",
                ReminderType::InterviewPrep,
                now + chrono::Duration::days(30),
                2,
                HashMap::new(),
            )
            .await
            .unwrap();

        // Tick slightly ahead so the boundary job counts as due
        let sent = scheduler
            .tick(now + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(sent, 1);
        assert_eq!(notifier.delivered_ids(), vec![due_id]);
        assert_eq!(scheduler.list_pending("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sent_reminder_never_fires_again() {
        let (scheduler, notifier, _db) = test_scheduler().await;

        scheduler
            .schedule(
                "app-1",
                "u1",
                ReminderType::FollowUp,
                Utc::now() - chrono::Duration::hours(1),
                0,
                HashMap::new(),
            )
            .await
            .unwrap();
        assert_eq!(notifier.delivered_ids().len(), 1);

        // Subsequent ticks find nothing due
        for _ in 0..3 {
            assert_eq!(scheduler.tick(Utc::now()).await.unwrap(), 0);
        }
        assert_eq!(notifier.delivered_ids().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_pending_unknown_and_sent() {
        let (scheduler, _notifier, _db) = test_scheduler().await;

        let pending_id = scheduler
            .schedule(
                "app-1",
                "u1",
                ReminderType::FollowUp,
                Utc::now() + chrono::Duration::days(5),
                0,
                HashMap::new(),
            )
            .await
            .unwrap();
        let sent_id = scheduler
            .schedule(
                "app-2",
                "u1",
                ReminderType::StatusCheck,
                Utc::now() - chrono::Duration::hours(1),
                0,
                HashMap::new(),
            )
            .await
            .unwrap();

        assert!(scheduler.cancel(&pending_id).await.unwrap());
        // Cancelled job is gone
        assert!(scheduler.list_pending("u1").await.unwrap().is_empty());

        assert!(!scheduler.cancel(&pending_id).await.unwrap());
        assert!(!scheduler.cancel("no-such-id").await.unwrap());
        assert!(!scheduler.cancel(&sent_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_dispatch_timeout_counts_as_failure() {
        let db = Database::in_memory().await.unwrap();
        let notifier = Arc::new(MockNotifier::new());
        notifier.set_delay(Duration::from_millis(200));
        let scheduler = ReminderScheduler::new(
            db,
            notifier.clone(),
            Duration::from_millis(20),
        );

        scheduler
            .schedule(
                "app-1",
                "u1",
                ReminderType::FollowUp,
                Utc::now() + chrono::Duration::days(1),
                1,
                HashMap::new(),
            )
            .await
            .unwrap();

        let sent = scheduler.tick(Utc::now()).await.unwrap();
        assert_eq!(sent, 0);
        assert!(notifier.delivered_ids().is_empty());
        // Still pending for the next tick
        assert_eq!(scheduler.list_pending("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_metadata_round_trips_through_store() {
        let (scheduler, _notifier, db) = test_scheduler().await;
        let metadata = HashMap::from([
            ("company".to_string(), "Initech".to_string()),
            ("title".to_string(), "Rust Engineer".to_string()),
        ]);

        let id = scheduler
            .schedule(
                "app-1",
                "u1",
                ReminderType::InterviewPrep,
                Utc::now() + chrono::Duration::days(7),
                2,
                metadata.clone(),
            )
            .await
            .unwrap();

        let stored = db.get_reminder(&id).await.unwrap().unwrap();
        assert_eq!(stored.metadata, metadata);
        assert_eq!(stored.reminder_type, ReminderType::InterviewPrep);
    }
}
