//! Database operations for AutoApply
//!
//! Wraps a SQLite connection pool and exposes CRUD for the durable
//! records the automation core depends on: rate-limit counters, session
//! cookies, reminder jobs, activity-log entries, per-user search
//! configs, submitted applications, and the quota retry queue.

use std::collections::HashSet;
use std::path::Path;

use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::error::{DbError, Result};
use crate::types::{
    ActivityLogEntry, ApplicationRecord, Candidate, CycleCounts, CycleStatus, RateLimitRecord,
    ReminderJob, ReminderType, SearchConfig, SessionCookieRecord,
};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at `db_path` and run migrations.
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // mode=rwc creates the database file if it doesn't exist
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Open an in-memory database, used by tests.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // --- Rate limits ---

    pub async fn get_rate_limit(
        &self,
        user_id: &str,
        platform: &str,
    ) -> Result<Option<RateLimitRecord>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, platform, hourly_count, daily_count, last_reset,
                   hourly_limit, daily_limit
            FROM rate_limits WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(user_id)
        .bind(platform)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| RateLimitRecord {
            user_id: r.get("user_id"),
            platform: r.get("platform"),
            hourly_count: r.get("hourly_count"),
            daily_count: r.get("daily_count"),
            last_reset: r.get("last_reset"),
            hourly_limit: r.get("hourly_limit"),
            daily_limit: r.get("daily_limit"),
        }))
    }

    pub async fn upsert_rate_limit(&self, record: &RateLimitRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rate_limits
                (user_id, platform, hourly_count, daily_count, last_reset,
                 hourly_limit, daily_limit)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, platform)
            DO UPDATE SET
                hourly_count = excluded.hourly_count,
                daily_count = excluded.daily_count,
                last_reset = excluded.last_reset,
                hourly_limit = excluded.hourly_limit,
                daily_limit = excluded.daily_limit
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.platform)
        .bind(record.hourly_count)
        .bind(record.daily_count)
        .bind(record.last_reset)
        .bind(record.hourly_limit)
        .bind(record.daily_limit)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // --- Sessions ---

    pub async fn get_session(
        &self,
        user_id: &str,
        platform: &str,
    ) -> Result<Option<SessionCookieRecord>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, platform, cookie_blob, expires_at
            FROM sessions WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(user_id)
        .bind(platform)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| SessionCookieRecord {
            user_id: r.get("user_id"),
            platform: r.get("platform"),
            cookie_blob: r.get("cookie_blob"),
            expires_at: r.get("expires_at"),
        }))
    }

    /// Upsert semantics: exactly one live row per (user, platform).
    pub async fn upsert_session(&self, record: &SessionCookieRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (user_id, platform, cookie_blob, expires_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id, platform)
            DO UPDATE SET
                cookie_blob = excluded.cookie_blob,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.platform)
        .bind(&record.cookie_blob)
        .bind(record.expires_at)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn delete_session(&self, user_id: &str, platform: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ? AND platform = ?")
            .bind(user_id)
            .bind(platform)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// Bulk sweep of rows whose expiry has passed. Returns the removed count.
    pub async fn delete_expired_sessions(&self, now: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    // --- Reminders ---

    pub async fn insert_reminder(&self, job: &ReminderJob) -> Result<()> {
        let metadata = serde_json::to_string(&job.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO reminders
                (id, application_id, user_id, reminder_type, scheduled_time,
                 sent, sent_at, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.application_id)
        .bind(&job.user_id)
        .bind(job.reminder_type.as_str())
        .bind(job.scheduled_time)
        .bind(if job.sent { 1 } else { 0 })
        .bind(job.sent_at)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_reminder(&self, job_id: &str) -> Result<Option<ReminderJob>> {
        let row = sqlx::query(
            r#"
            SELECT id, application_id, user_id, reminder_type, scheduled_time,
                   sent, sent_at, metadata
            FROM reminders WHERE id = ?
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(row_to_reminder).transpose()
    }

    /// Unsent jobs whose scheduled time has passed, oldest first.
    pub async fn due_reminders(&self, now: i64) -> Result<Vec<ReminderJob>> {
        let rows = sqlx::query(
            r#"
            SELECT id, application_id, user_id, reminder_type, scheduled_time,
                   sent, sent_at, metadata
            FROM reminders
            WHERE sent = 0 AND scheduled_time <= ?
            ORDER BY scheduled_time ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(row_to_reminder).collect()
    }

    pub async fn pending_reminders(&self, user_id: &str) -> Result<Vec<ReminderJob>> {
        let rows = sqlx::query(
            r#"
            SELECT id, application_id, user_id, reminder_type, scheduled_time,
                   sent, sent_at, metadata
            FROM reminders
            WHERE sent = 0 AND user_id = ?
            ORDER BY scheduled_time ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(row_to_reminder).collect()
    }

    /// Transition a job to sent. The WHERE guard keeps the at-most-once
    /// invariant even if a stale id is passed twice.
    pub async fn mark_reminder_sent(&self, job_id: &str, sent_at: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE reminders SET sent = 1, sent_at = ? WHERE id = ? AND sent = 0",
        )
        .bind(sent_at)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove an unsent job. Sent or unknown ids affect zero rows.
    pub async fn delete_unsent_reminder(&self, job_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reminders WHERE id = ? AND sent = 0")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    // --- Activity log ---

    pub async fn insert_activity(&self, entry: &ActivityLogEntry) -> Result<()> {
        let errors = serde_json::to_string(&entry.errors)?;
        let screenshots = serde_json::to_string(&entry.screenshots)?;

        sqlx::query(
            r#"
            INSERT INTO activity_log
                (cycle_id, user_id, cycle_start, cycle_end, status,
                 jobs_searched, jobs_matched, jobs_applied,
                 applications_successful, applications_failed, errors, screenshots)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.cycle_id)
        .bind(&entry.user_id)
        .bind(entry.cycle_start)
        .bind(entry.cycle_end)
        .bind(entry.status.as_str())
        .bind(entry.jobs_searched)
        .bind(entry.jobs_matched)
        .bind(entry.jobs_applied)
        .bind(entry.applications_successful)
        .bind(entry.applications_failed)
        .bind(errors)
        .bind(screenshots)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// The single end-of-cycle update. Final counts, status, and
    /// timestamps land together; the row is immutable afterwards.
    pub async fn finish_activity(
        &self,
        cycle_id: &str,
        counts: &CycleCounts,
        status: CycleStatus,
        errors: &[String],
        screenshots: &[String],
        cycle_end: i64,
    ) -> Result<()> {
        let errors = serde_json::to_string(errors)?;
        let screenshots = serde_json::to_string(screenshots)?;

        sqlx::query(
            r#"
            UPDATE activity_log SET
                cycle_end = ?,
                status = ?,
                jobs_searched = ?,
                jobs_matched = ?,
                jobs_applied = ?,
                applications_successful = ?,
                applications_failed = ?,
                errors = ?,
                screenshots = ?
            WHERE cycle_id = ?
            "#,
        )
        .bind(cycle_end)
        .bind(status.as_str())
        .bind(counts.jobs_searched)
        .bind(counts.jobs_matched)
        .bind(counts.jobs_applied)
        .bind(counts.applications_successful)
        .bind(counts.applications_failed)
        .bind(errors)
        .bind(screenshots)
        .bind(cycle_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_activity(&self, cycle_id: &str) -> Result<Option<ActivityLogEntry>> {
        let row = sqlx::query(
            r#"
            SELECT cycle_id, user_id, cycle_start, cycle_end, status,
                   jobs_searched, jobs_matched, jobs_applied,
                   applications_successful, applications_failed, errors, screenshots
            FROM activity_log WHERE cycle_id = ?
            "#,
        )
        .bind(cycle_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(row_to_activity).transpose()
    }

    pub async fn recent_activity(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ActivityLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT cycle_id, user_id, cycle_start, cycle_end, status,
                   jobs_searched, jobs_matched, jobs_applied,
                   applications_successful, applications_failed, errors, screenshots
            FROM activity_log
            WHERE user_id = ?
            ORDER BY cycle_start DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(row_to_activity).collect()
    }

    // --- Search configs ---

    pub async fn get_search_config(&self, user_id: &str) -> Result<Option<SearchConfig>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, keywords, locations, platforms, max_per_cycle,
                   resume_path, cover_letter_path, active
            FROM search_configs WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(row_to_search_config).transpose()
    }

    pub async fn upsert_search_config(&self, config: &SearchConfig) -> Result<()> {
        let keywords = serde_json::to_string(&config.keywords)?;
        let locations = serde_json::to_string(&config.locations)?;
        let platforms = serde_json::to_string(&config.platforms)?;

        sqlx::query(
            r#"
            INSERT INTO search_configs
                (user_id, keywords, locations, platforms, max_per_cycle,
                 resume_path, cover_letter_path, active)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id)
            DO UPDATE SET
                keywords = excluded.keywords,
                locations = excluded.locations,
                platforms = excluded.platforms,
                max_per_cycle = excluded.max_per_cycle,
                resume_path = excluded.resume_path,
                cover_letter_path = excluded.cover_letter_path,
                active = excluded.active
            "#,
        )
        .bind(&config.user_id)
        .bind(keywords)
        .bind(locations)
        .bind(platforms)
        .bind(config.max_per_cycle)
        .bind(&config.resume_path)
        .bind(&config.cover_letter_path)
        .bind(if config.active { 1 } else { 0 })
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Users with an active search config, for batch runs.
    pub async fn active_user_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT user_id FROM search_configs WHERE active = 1")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(|r| r.get("user_id")).collect())
    }

    // --- Applications ---

    pub async fn record_application(&self, record: &ApplicationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO applications (user_id, platform, external_job_id, title, applied_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id, platform, external_job_id) DO NOTHING
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.platform)
        .bind(&record.external_job_id)
        .bind(&record.title)
        .bind(record.applied_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// (platform, external_job_id) pairs already applied to, for dedupe.
    pub async fn applied_job_ids(&self, user_id: &str) -> Result<HashSet<(String, String)>> {
        let rows = sqlx::query(
            "SELECT platform, external_job_id FROM applications WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| (r.get("platform"), r.get("external_job_id")))
            .collect())
    }

    // --- Retry queue ---

    /// Park a quota-refused candidate until `retry_after`.
    pub async fn enqueue_retry(
        &self,
        user_id: &str,
        candidate: &Candidate,
        retry_after: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO retry_queue
                (user_id, platform, external_job_id, title, company, url,
                 location, retry_after, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&candidate.platform)
        .bind(&candidate.external_job_id)
        .bind(&candidate.title)
        .bind(&candidate.company)
        .bind(&candidate.url)
        .bind(&candidate.location)
        .bind(retry_after)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Remove and return queued candidates whose retry time has passed.
    pub async fn take_due_retries(&self, user_id: &str, now: i64) -> Result<Vec<Candidate>> {
        let rows = sqlx::query(
            r#"
            SELECT id, platform, external_job_id, title, company, url, location
            FROM retry_queue
            WHERE user_id = ? AND retry_after <= ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.get("id");
            candidates.push(Candidate {
                platform: row.get("platform"),
                external_job_id: row.get("external_job_id"),
                title: row.get("title"),
                company: row.get("company"),
                url: row.get("url"),
                location: row.get("location"),
            });

            sqlx::query("DELETE FROM retry_queue WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(DbError::SqlxError)?;
        }

        Ok(candidates)
    }
}

fn row_to_reminder(row: sqlx::sqlite::SqliteRow) -> Result<ReminderJob> {
    let type_str: String = row.get("reminder_type");
    let reminder_type = ReminderType::parse(&type_str).ok_or_else(|| {
        crate::error::AutoApplyError::InvalidInput(format!(
            "Unknown reminder type in store: {}",
            type_str
        ))
    })?;
    let metadata: String = row.get("metadata");

    Ok(ReminderJob {
        id: row.get("id"),
        application_id: row.get("application_id"),
        user_id: row.get("user_id"),
        reminder_type,
        scheduled_time: row.get("scheduled_time"),
        sent: row.get::<i64, _>("sent") != 0,
        sent_at: row.get("sent_at"),
        metadata: serde_json::from_str(&metadata)?,
    })
}

fn row_to_activity(row: sqlx::sqlite::SqliteRow) -> Result<ActivityLogEntry> {
    let status_str: String = row.get("status");
    let status = CycleStatus::parse(&status_str).ok_or_else(|| {
        crate::error::AutoApplyError::InvalidInput(format!(
            "Unknown cycle status in store: {}",
            status_str
        ))
    })?;
    let errors: String = row.get("errors");
    let screenshots: String = row.get("screenshots");

    Ok(ActivityLogEntry {
        cycle_id: row.get("cycle_id"),
        user_id: row.get("user_id"),
        cycle_start: row.get("cycle_start"),
        cycle_end: row.get("cycle_end"),
        status,
        jobs_searched: row.get("jobs_searched"),
        jobs_matched: row.get("jobs_matched"),
        jobs_applied: row.get("jobs_applied"),
        applications_successful: row.get("applications_successful"),
        applications_failed: row.get("applications_failed"),
        errors: serde_json::from_str(&errors)?,
        screenshots: serde_json::from_str(&screenshots)?,
    })
}

fn row_to_search_config(row: sqlx::sqlite::SqliteRow) -> Result<SearchConfig> {
    let keywords: String = row.get("keywords");
    let locations: String = row.get("locations");
    let platforms: String = row.get("platforms");

    Ok(SearchConfig {
        user_id: row.get("user_id"),
        keywords: serde_json::from_str(&keywords)?,
        locations: serde_json::from_str(&locations)?,
        platforms: serde_json::from_str(&platforms)?,
        max_per_cycle: row.get("max_per_cycle"),
        resume_path: row.get("resume_path"),
        cover_letter_path: row.get("cover_letter_path"),
        active: row.get::<i64, _>("active") != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_candidate(platform: &str, job_id: &str) -> Candidate {
        Candidate {
            platform: platform.to_string(),
            external_job_id: job_id.to_string(),
            title: "Backend Engineer".to_string(),
            company: Some("Initech".to_string()),
            url: Some(format!("https://{platform}.example/jobs/{job_id}")),
            location: Some("Remote".to_string()),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_upsert_and_get() {
        let db = Database::in_memory().await.unwrap();

        assert!(db.get_rate_limit("u1", "linkedin").await.unwrap().is_none());

        let record = RateLimitRecord {
            user_id: "u1".to_string(),
            platform: "linkedin".to_string(),
            hourly_count: 2,
            daily_count: 9,
            last_reset: 1_700_000_000,
            hourly_limit: 5,
            daily_limit: 50,
        };
        db.upsert_rate_limit(&record).await.unwrap();

        let loaded = db.get_rate_limit("u1", "linkedin").await.unwrap().unwrap();
        assert_eq!(loaded.hourly_count, 2);
        assert_eq!(loaded.daily_count, 9);

        let updated = RateLimitRecord {
            hourly_count: 3,
            ..record
        };
        db.upsert_rate_limit(&updated).await.unwrap();

        let loaded = db.get_rate_limit("u1", "linkedin").await.unwrap().unwrap();
        assert_eq!(loaded.hourly_count, 3);
    }

    #[tokio::test]
    async fn test_session_upsert_replaces_existing_row() {
        let db = Database::in_memory().await.unwrap();

        let first = SessionCookieRecord {
            user_id: "u1".to_string(),
            platform: "indeed".to_string(),
            cookie_blob: r#"{"sid":"abc"}"#.to_string(),
            expires_at: 2_000_000_000,
        };
        db.upsert_session(&first).await.unwrap();

        let second = SessionCookieRecord {
            cookie_blob: r#"{"sid":"def"}"#.to_string(),
            ..first.clone()
        };
        db.upsert_session(&second).await.unwrap();

        let loaded = db.get_session("u1", "indeed").await.unwrap().unwrap();
        assert_eq!(loaded.cookie_blob, r#"{"sid":"def"}"#);
    }

    #[tokio::test]
    async fn test_delete_expired_sessions_returns_count() {
        let db = Database::in_memory().await.unwrap();
        let now = 1_700_000_000;

        for (platform, expires_at) in [("a", now - 10), ("b", now), ("c", now + 100)] {
            db.upsert_session(&SessionCookieRecord {
                user_id: "u1".to_string(),
                platform: platform.to_string(),
                cookie_blob: "{}".to_string(),
                expires_at,
            })
            .await
            .unwrap();
        }

        // expires_at <= now is swept
        let removed = db.delete_expired_sessions(now).await.unwrap();
        assert_eq!(removed, 2);
        assert!(db.get_session("u1", "c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reminder_lifecycle_in_store() {
        let db = Database::in_memory().await.unwrap();
        let now = chrono::Utc::now();

        let job = ReminderJob::new(
            "app-1".to_string(),
            "u1".to_string(),
            ReminderType::FollowUp,
            now - chrono::Duration::hours(1),
            HashMap::from([("company".to_string(), "Initech".to_string())]),
        );
        db.insert_reminder(&job).await.unwrap();

        let due = db.due_reminders(now.timestamp()).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, job.id);
        assert_eq!(due[0].metadata.get("company").unwrap(), "Initech");

        assert!(db.mark_reminder_sent(&job.id, now.timestamp()).await.unwrap());
        // Second attempt affects zero rows
        assert!(!db.mark_reminder_sent(&job.id, now.timestamp()).await.unwrap());

        assert!(db.due_reminders(now.timestamp()).await.unwrap().is_empty());

        // Deleting a sent job is refused
        assert!(!db.delete_unsent_reminder(&job.id).await.unwrap());
        let stored = db.get_reminder(&job.id).await.unwrap().unwrap();
        assert!(stored.sent);
        assert!(stored.sent_at.is_some());
    }

    #[tokio::test]
    async fn test_activity_insert_finish_and_recent() {
        let db = Database::in_memory().await.unwrap();
        let start = chrono::Utc::now().timestamp();

        let entry = ActivityLogEntry {
            cycle_id: "cycle-1".to_string(),
            user_id: "u1".to_string(),
            cycle_start: start,
            cycle_end: None,
            status: CycleStatus::Running,
            jobs_searched: 0,
            jobs_matched: 0,
            jobs_applied: 0,
            applications_successful: 0,
            applications_failed: 0,
            errors: vec![],
            screenshots: vec![],
        };
        db.insert_activity(&entry).await.unwrap();

        let counts = CycleCounts {
            jobs_searched: 12,
            jobs_matched: 10,
            jobs_applied: 8,
            applications_successful: 8,
            applications_failed: 2,
        };
        db.finish_activity(
            "cycle-1",
            &counts,
            CycleStatus::Completed,
            &["form timeout on job-9".to_string()],
            &["/tmp/shots/job-9.png".to_string()],
            start + 30,
        )
        .await
        .unwrap();

        let loaded = db.get_activity("cycle-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, CycleStatus::Completed);
        assert_eq!(loaded.jobs_applied, 8);
        assert_eq!(loaded.applications_failed, 2);
        assert_eq!(loaded.cycle_end, Some(start + 30));
        assert_eq!(loaded.errors, vec!["form timeout on job-9".to_string()]);
        assert_eq!(loaded.screenshots.len(), 1);

        let recent = db.recent_activity("u1", 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].cycle_id, "cycle-1");
    }

    #[tokio::test]
    async fn test_search_config_round_trip_and_active_users() {
        let db = Database::in_memory().await.unwrap();

        let config = SearchConfig {
            user_id: "u1".to_string(),
            keywords: vec!["rust".to_string(), "backend".to_string()],
            locations: vec!["Remote".to_string()],
            platforms: vec!["linkedin".to_string(), "indeed".to_string()],
            max_per_cycle: 10,
            resume_path: "/home/u1/resume.pdf".to_string(),
            cover_letter_path: None,
            active: true,
        };
        db.upsert_search_config(&config).await.unwrap();

        let loaded = db.get_search_config("u1").await.unwrap().unwrap();
        assert_eq!(loaded.keywords, config.keywords);
        assert_eq!(loaded.platforms, config.platforms);
        assert!(loaded.active);

        let inactive = SearchConfig {
            user_id: "u2".to_string(),
            active: false,
            ..config.clone()
        };
        db.upsert_search_config(&inactive).await.unwrap();

        let active = db.active_user_ids().await.unwrap();
        assert_eq!(active, vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn test_applied_job_ids_dedupe_set() {
        let db = Database::in_memory().await.unwrap();

        let record = ApplicationRecord {
            user_id: "u1".to_string(),
            platform: "linkedin".to_string(),
            external_job_id: "job-1".to_string(),
            title: "Backend Engineer".to_string(),
            applied_at: 1_700_000_000,
        };
        db.record_application(&record).await.unwrap();
        // Re-recording the same application is a no-op
        db.record_application(&record).await.unwrap();

        let applied = db.applied_job_ids("u1").await.unwrap();
        assert_eq!(applied.len(), 1);
        assert!(applied.contains(&("linkedin".to_string(), "job-1".to_string())));
    }

    #[tokio::test]
    async fn test_retry_queue_takes_only_due_rows() {
        let db = Database::in_memory().await.unwrap();
        let now = 1_700_000_000;

        db.enqueue_retry("u1", &test_candidate("linkedin", "job-1"), now - 5)
            .await
            .unwrap();
        db.enqueue_retry("u1", &test_candidate("linkedin", "job-2"), now + 3600)
            .await
            .unwrap();
        db.enqueue_retry("u2", &test_candidate("indeed", "job-3"), now - 5)
            .await
            .unwrap();

        let due = db.take_due_retries("u1", now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].external_job_id, "job-1");

        // Taken rows are consumed; the future row stays queued
        let again = db.take_due_retries("u1", now).await.unwrap();
        assert!(again.is_empty());
        let later = db.take_due_retries("u1", now + 7200).await.unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].external_job_id, "job-2");
    }
}
