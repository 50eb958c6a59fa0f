//! Write-once audit log for automation cycles
//!
//! A cycle opens a `running` row at start and closes it with exactly one
//! final update carrying the counts, errors, and screenshots. No API
//! exists to modify a closed row.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::db::Database;
use crate::error::Result;
use crate::types::{ActivityLogEntry, CycleCounts, CycleStatus};

#[derive(Clone)]
pub struct ActivityLogger {
    db: Database,
}

impl ActivityLogger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open a cycle: insert a `running` row with zeroed counts and
    /// return the new cycle id.
    pub async fn start_cycle(&self, user_id: &str) -> Result<String> {
        let entry = ActivityLogEntry {
            cycle_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            cycle_start: Utc::now().timestamp(),
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

        self.db.insert_activity(&entry).await?;
        info!(cycle_id = %entry.cycle_id, user_id, "cycle started");
        Ok(entry.cycle_id)
    }

    /// Close a cycle with its final counts and status. Called exactly
    /// once per cycle.
    pub async fn finish_cycle(
        &self,
        cycle_id: &str,
        counts: &CycleCounts,
        status: CycleStatus,
        errors: &[String],
        screenshots: &[String],
    ) -> Result<()> {
        self.db
            .finish_activity(
                cycle_id,
                counts,
                status,
                errors,
                screenshots,
                Utc::now().timestamp(),
            )
            .await?;

        info!(
            cycle_id,
            status = status.as_str(),
            jobs_applied = counts.jobs_applied,
            applications_failed = counts.applications_failed,
            "cycle finished"
        );
        Ok(())
    }

    pub async fn get(&self, cycle_id: &str) -> Result<Option<ActivityLogEntry>> {
        self.db.get_activity(cycle_id).await
    }

    /// The user's most recent cycles, newest first.
    pub async fn get_recent(&self, user_id: &str, limit: usize) -> Result<Vec<ActivityLogEntry>> {
        self.db.recent_activity(user_id, limit).await
    }
}
