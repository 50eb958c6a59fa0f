//! Per-(user, platform) submission quotas
//!
//! Tracks submission counts against clock-aligned hourly and UTC-daily
//! windows. Windows are boundary-aligned, not sliding, so a refusal
//! always carries a deterministic `retry_after`: the top of the next
//! clock hour, or the next UTC midnight.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::db::Database;
use crate::error::Result;
use crate::types::{RateDecision, RateLimitRecord};

const HOUR_SECS: i64 = 3600;
const DAY_SECS: i64 = 86_400;

pub struct RateLimiter {
    db: Database,
    limits: RateLimitConfig,
    /// Serializes the read-modify-write per key so two near-simultaneous
    /// callers cannot both claim the last remaining slot.
    locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl RateLimiter {
    pub fn new(db: Database, limits: RateLimitConfig) -> Self {
        Self {
            db,
            limits,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether a submission is allowed right now.
    ///
    /// Does not consume a slot; call [`RateLimiter::record_application`]
    /// after the submission actually succeeds. A refusal is not an error:
    /// the decision carries the next timestamp at which a slot opens.
    pub async fn can_apply(
        &self,
        user_id: &str,
        platform: &str,
        now: DateTime<Utc>,
    ) -> Result<RateDecision> {
        let lock = self.key_lock(user_id, platform).await;
        let _guard = lock.lock().await;

        let now_ts = now.timestamp();
        let (mut record, dirty) = self.load_or_create(user_id, platform, now_ts).await?;
        let rolled = roll_windows(&mut record, now_ts);
        if dirty || rolled {
            self.db.upsert_rate_limit(&record).await?;
        }

        if record.hourly_count >= record.hourly_limit {
            debug!(
                user_id,
                platform,
                hourly_count = record.hourly_count,
                "hourly quota exhausted"
            );
            return Ok(RateDecision::refused(from_ts(hour_floor(now_ts) + HOUR_SECS)));
        }

        if record.daily_count >= record.daily_limit {
            debug!(
                user_id,
                platform,
                daily_count = record.daily_count,
                "daily quota exhausted"
            );
            return Ok(RateDecision::refused(from_ts(day_floor(now_ts) + DAY_SECS)));
        }

        Ok(RateDecision::allowed())
    }

    /// Consume one slot in both windows after a successful submission.
    ///
    /// Must follow a successful [`RateLimiter::can_apply`] in the same
    /// logical operation; the orchestrator keeps submissions for one
    /// (user, platform) sequential, and the per-key lock here covers the
    /// read-modify-write itself.
    pub async fn record_application(
        &self,
        user_id: &str,
        platform: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let lock = self.key_lock(user_id, platform).await;
        let _guard = lock.lock().await;

        let now_ts = now.timestamp();
        let (mut record, _) = self.load_or_create(user_id, platform, now_ts).await?;
        roll_windows(&mut record, now_ts);

        record.hourly_count += 1;
        record.daily_count += 1;
        self.db.upsert_rate_limit(&record).await?;

        Ok(())
    }

    async fn key_lock(&self, user_id: &str, platform: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry((user_id.to_string(), platform.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Load the record for a key, creating it lazily with the configured
    /// limits on first check. The bool reports whether the record is new
    /// and still needs persisting.
    async fn load_or_create(
        &self,
        user_id: &str,
        platform: &str,
        now_ts: i64,
    ) -> Result<(RateLimitRecord, bool)> {
        if let Some(record) = self.db.get_rate_limit(user_id, platform).await? {
            return Ok((record, false));
        }

        let limits = self.limits.limits_for(platform);
        Ok((
            RateLimitRecord {
                user_id: user_id.to_string(),
                platform: platform.to_string(),
                hourly_count: 0,
                daily_count: 0,
                last_reset: now_ts,
                hourly_limit: limits.hourly_limit,
                daily_limit: limits.daily_limit,
            },
            true,
        ))
    }
}

/// Reset counters whose window boundary has been crossed.
///
/// The hourly window resets once a full hour has elapsed since the last
/// reset; `last_reset` then realigns to the top of the current clock hour
/// so retry-after values stay hour-aligned. The daily window resets when
/// the UTC calendar day changes.
fn roll_windows(record: &mut RateLimitRecord, now_ts: i64) -> bool {
    let prev_reset = record.last_reset;
    let mut changed = false;

    if now_ts - prev_reset >= HOUR_SECS {
        record.hourly_count = 0;
        record.last_reset = hour_floor(now_ts);
        changed = true;
    }

    if day_floor(prev_reset) != day_floor(now_ts) {
        record.daily_count = 0;
        // Keep the stored reset inside the current day so the day
        // comparison does not refire on the next check.
        if record.last_reset < day_floor(now_ts) {
            record.last_reset = day_floor(now_ts);
        }
        changed = true;
    }

    changed
}

fn hour_floor(ts: i64) -> i64 {
    ts - ts.rem_euclid(HOUR_SECS)
}

fn day_floor(ts: i64) -> i64 {
    ts - ts.rem_euclid(DAY_SECS)
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}
