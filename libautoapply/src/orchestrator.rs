//! The application cycle: search, dedupe, rate-check, submit, log
//!
//! One `run_cycle` call is one audited pass for one user. Failures are
//! contained at the narrowest scope that keeps the cycle useful: a dead
//! platform costs its candidates, a failed submission or storage write
//! costs one application, and only an unreadable config or dedupe
//! history ends the cycle early. The audit entry opened at cycle start
//! is closed exactly once on every path.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::activity_log::ActivityLogger;
use crate::db::Database;
use crate::error::{AutoApplyError, Result};
use crate::platforms::{Applier, JobSearchProvider};
use crate::rate_limiter::RateLimiter;
use crate::session_cache::SessionCache;
use crate::types::{
    ActivityLogEntry, ApplicationRecord, Candidate, CycleCounts, CycleStatus, SearchConfig,
    SearchCriteria,
};

pub struct CycleOrchestrator {
    db: Database,
    rate_limiter: Arc<RateLimiter>,
    sessions: Arc<SessionCache>,
    activity: ActivityLogger,
    search: Arc<dyn JobSearchProvider>,
    applier: Arc<dyn Applier>,
}

impl CycleOrchestrator {
    pub fn new(
        db: Database,
        rate_limiter: Arc<RateLimiter>,
        sessions: Arc<SessionCache>,
        search: Arc<dyn JobSearchProvider>,
        applier: Arc<dyn Applier>,
    ) -> Self {
        let activity = ActivityLogger::new(db.clone());
        Self {
            db,
            rate_limiter,
            sessions,
            activity,
            search,
            applier,
        }
    }

    /// Run one full cycle for a user and return its closed audit entry.
    ///
    /// Quota refusals are not failures: the candidate is parked in the
    /// retry queue until the window the limiter named, and a later cycle
    /// drains it ahead of fresh search results. A storage failure while
    /// a candidate is being processed costs that candidate only, and the
    /// audit entry is closed no matter how the cycle went.
    pub async fn run_cycle(&self, user_id: &str) -> Result<ActivityLogEntry> {
        let cycle_id = self.activity.start_cycle(user_id).await?;
        let mut counts = CycleCounts::default();
        let mut errors: Vec<String> = Vec::new();
        let mut screenshots: Vec<String> = Vec::new();

        let status = self
            .execute(user_id, &mut counts, &mut errors, &mut screenshots)
            .await;

        self.activity
            .finish_cycle(&cycle_id, &counts, status, &errors, &screenshots)
            .await?;
        self.closed_entry(&cycle_id).await
    }

    /// The cycle body. Infallible by construction: every failure inside
    /// is either contained to one candidate or ends the cycle `failed`,
    /// so the caller can always close the audit entry.
    async fn execute(
        &self,
        user_id: &str,
        counts: &mut CycleCounts,
        errors: &mut Vec<String>,
        screenshots: &mut Vec<String>,
    ) -> CycleStatus {
        let config = match self.db.get_search_config(user_id).await {
            Ok(Some(config)) if config.active => config,
            Ok(_) => {
                errors.push(format!("no active search config for user {}", user_id));
                return CycleStatus::Failed;
            }
            Err(e) => {
                errors.push(format!("could not load search config: {}", e));
                return CycleStatus::Failed;
            }
        };

        // Quota-parked candidates whose window has opened go first. A
        // failed drain costs only the parked candidates, not the cycle.
        let mut candidates = match self
            .db
            .take_due_retries(user_id, Utc::now().timestamp())
            .await
        {
            Ok(parked) => {
                if !parked.is_empty() {
                    debug!(count = parked.len(), "drained retry queue");
                }
                parked
            }
            Err(e) => {
                warn!(error = %e, "could not drain retry queue");
                errors.push(format!("could not drain retry queue: {}", e));
                Vec::new()
            }
        };

        // Search all platforms concurrently; results keep platform order
        let searches: Vec<_> = config
            .platforms
            .iter()
            .map(|platform| {
                let criteria = SearchCriteria {
                    platform: platform.clone(),
                    keywords: config.keywords.clone(),
                    locations: config.locations.clone(),
                };
                let search = self.search.clone();
                async move {
                    let result = search.search(&criteria).await;
                    (criteria.platform, result)
                }
            })
            .collect();

        for (platform, result) in join_all(searches).await {
            match result {
                Ok(found) => {
                    counts.jobs_searched += found.len() as i64;
                    candidates.extend(found);
                }
                Err(e) => {
                    warn!(platform = %platform, error = %e, "search failed, skipping platform");
                    errors.push(format!("search failed on {}: {}", platform, e));
                }
            }
        }

        // Without the applied-job history we would risk duplicate
        // submissions, so a failed read ends the cycle.
        let candidates = match self.dedupe(user_id, candidates, &config).await {
            Ok(candidates) => candidates,
            Err(e) => {
                errors.push(format!("could not load applied-job history: {}", e));
                return CycleStatus::Failed;
            }
        };
        counts.jobs_matched = candidates.len() as i64;

        let docs = config.docs();
        for candidate in &candidates {
            let decision = match self
                .rate_limiter
                .can_apply(user_id, &candidate.platform, Utc::now())
                .await
            {
                Ok(decision) => decision,
                Err(e) => {
                    errors.push(format!(
                        "rate check failed for {}: {}",
                        candidate.external_job_id, e
                    ));
                    continue;
                }
            };

            if !decision.allowed {
                let retry_after = decision
                    .retry_after
                    .map(|t| t.timestamp())
                    .unwrap_or_else(|| Utc::now().timestamp() + 3600);
                if let Err(e) = self.db.enqueue_retry(user_id, candidate, retry_after).await {
                    errors.push(format!(
                        "could not park {} for retry: {}",
                        candidate.external_job_id, e
                    ));
                    continue;
                }
                debug!(
                    job_id = %candidate.external_job_id,
                    platform = %candidate.platform,
                    retry_after,
                    "quota reached, candidate parked for retry"
                );
                continue;
            }

            let session = match self.sessions.load(user_id, &candidate.platform).await {
                Ok(Some(session)) => session,
                Ok(None) => {
                    errors.push(format!(
                        "no usable session for {}, re-login required",
                        candidate.platform
                    ));
                    continue;
                }
                Err(e) => {
                    errors.push(format!(
                        "could not load session for {}: {}",
                        candidate.platform, e
                    ));
                    continue;
                }
            };

            match self.applier.submit(candidate, &docs, &session).await {
                Ok(outcome) if outcome.success => {
                    // The submission went through; bookkeeping failures
                    // are recorded but cannot undo it
                    if let Err(e) = self
                        .rate_limiter
                        .record_application(user_id, &candidate.platform, Utc::now())
                        .await
                    {
                        errors.push(format!(
                            "could not record quota usage for {}: {}",
                            candidate.external_job_id, e
                        ));
                    }
                    if let Err(e) = self
                        .db
                        .record_application(&ApplicationRecord {
                            user_id: user_id.to_string(),
                            platform: candidate.platform.clone(),
                            external_job_id: candidate.external_job_id.clone(),
                            title: candidate.title.clone(),
                            applied_at: Utc::now().timestamp(),
                        })
                        .await
                    {
                        errors.push(format!(
                            "could not record application {}: {}",
                            candidate.external_job_id, e
                        ));
                    }
                    counts.jobs_applied += 1;
                    counts.applications_successful += 1;
                    if let Some(shot) = outcome.screenshot {
                        screenshots.push(shot);
                    }
                    info!(
                        job_id = %candidate.external_job_id,
                        platform = %candidate.platform,
                        "application submitted"
                    );
                }
                Ok(outcome) => {
                    counts.applications_failed += 1;
                    if let Some(err) = outcome.error {
                        errors.push(format!("{}: {}", candidate.external_job_id, err));
                    }
                    if let Some(shot) = outcome.screenshot {
                        screenshots.push(shot);
                    }
                }
                Err(e) => {
                    counts.applications_failed += 1;
                    errors.push(format!(
                        "submission error on {}: {}",
                        candidate.external_job_id, e
                    ));
                }
            }
        }

        CycleStatus::Completed
    }

    /// Run a cycle for every user with an active config. One user's
    /// failure does not stop the batch.
    pub async fn run_all(&self) -> Result<Vec<ActivityLogEntry>> {
        let users = self.db.active_user_ids().await?;
        info!(users = users.len(), "batch cycle starting");

        let mut entries = Vec::with_capacity(users.len());
        for user_id in users {
            match self.run_cycle(&user_id).await {
                Ok(entry) => entries.push(entry),
                Err(e) => error!(user_id = %user_id, "cycle failed: {}", e),
            }
        }
        Ok(entries)
    }

    /// Drop candidates already applied to (durably or earlier in this
    /// batch) and cap the list at the per-cycle maximum.
    async fn dedupe(
        &self,
        user_id: &str,
        candidates: Vec<Candidate>,
        config: &SearchConfig,
    ) -> Result<Vec<Candidate>> {
        let applied = self.db.applied_job_ids(user_id).await?;
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut deduped = Vec::new();

        for candidate in candidates {
            let key = (candidate.platform.clone(), candidate.external_job_id.clone());
            if applied.contains(&key) || !seen.insert(key) {
                continue;
            }
            deduped.push(candidate);
            if deduped.len() as i64 >= config.max_per_cycle {
                break;
            }
        }

        Ok(deduped)
    }

    async fn closed_entry(&self, cycle_id: &str) -> Result<ActivityLogEntry> {
        self.activity.get(cycle_id).await?.ok_or_else(|| {
            AutoApplyError::InvalidInput(format!("activity entry missing for cycle {}", cycle_id))
        })
    }
}
