//! Mock collaborators for testing and dry runs
//!
//! Available to all builds (not just `cfg(test)`) so the binaries can
//! wire a full pipeline without touching a real job board. Each mock
//! records its calls behind a mutex so tests can assert on exactly what
//! the core handed it.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{PlatformError, Result};
use crate::types::{
    ApplicationDocs, Candidate, CookieJar, ReminderJob, SearchCriteria, SubmissionOutcome,
};

use super::{Applier, JobSearchProvider, Notifier};

/// In-memory job board. Returns whatever candidates were seeded for a
/// platform; unseeded platforms return an empty page.
pub struct MockJobBoard {
    candidates: Mutex<HashMap<String, Vec<Candidate>>>,
    failing_platforms: Mutex<HashSet<String>>,
    searches: Mutex<Vec<SearchCriteria>>,
}

impl MockJobBoard {
    pub fn new() -> Self {
        Self {
            candidates: Mutex::new(HashMap::new()),
            failing_platforms: Mutex::new(HashSet::new()),
            searches: Mutex::new(Vec::new()),
        }
    }

    /// Seed the postings a platform will return.
    pub fn seed(&self, platform: &str, candidates: Vec<Candidate>) {
        self.candidates
            .lock()
            .unwrap()
            .insert(platform.to_string(), candidates);
    }

    /// Make searches against a platform fail with a search error.
    pub fn fail_platform(&self, platform: &str) {
        self.failing_platforms
            .lock()
            .unwrap()
            .insert(platform.to_string());
    }

    pub fn search_count(&self) -> usize {
        self.searches.lock().unwrap().len()
    }
}

impl Default for MockJobBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobSearchProvider for MockJobBoard {
    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Candidate>> {
        self.searches.lock().unwrap().push(criteria.clone());

        if self
            .failing_platforms
            .lock()
            .unwrap()
            .contains(&criteria.platform)
        {
            return Err(PlatformError::Search(format!(
                "mock search failure on {}",
                criteria.platform
            ))
            .into());
        }

        let results = self
            .candidates
            .lock()
            .unwrap()
            .get(&criteria.platform)
            .cloned()
            .unwrap_or_default();

        debug!(
            platform = %criteria.platform,
            count = results.len(),
            "mock search"
        );
        Ok(results)
    }
}

/// In-memory applier. Submissions succeed unless the job id was marked
/// to fail (form-level failure) or to error (the attempt itself blows up).
pub struct MockApplier {
    failing_jobs: Mutex<HashSet<String>>,
    erroring_jobs: Mutex<HashSet<String>>,
    submissions: Mutex<Vec<String>>,
}

impl MockApplier {
    pub fn new() -> Self {
        Self {
            failing_jobs: Mutex::new(HashSet::new()),
            erroring_jobs: Mutex::new(HashSet::new()),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Submissions for this job id complete but report failure, with a
    /// screenshot path attached.
    pub fn fail_job(&self, external_job_id: &str) {
        self.failing_jobs
            .lock()
            .unwrap()
            .insert(external_job_id.to_string());
    }

    /// Submissions for this job id return a network error.
    pub fn error_job(&self, external_job_id: &str) {
        self.erroring_jobs
            .lock()
            .unwrap()
            .insert(external_job_id.to_string());
    }

    /// External job ids of every submission attempted, in order.
    pub fn submitted_ids(&self) -> Vec<String> {
        self.submissions.lock().unwrap().clone()
    }
}

impl Default for MockApplier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Applier for MockApplier {
    async fn submit(
        &self,
        candidate: &Candidate,
        _docs: &ApplicationDocs,
        _session: &CookieJar,
    ) -> Result<SubmissionOutcome> {
        self.submissions
            .lock()
            .unwrap()
            .push(candidate.external_job_id.clone());

        if self
            .erroring_jobs
            .lock()
            .unwrap()
            .contains(&candidate.external_job_id)
        {
            return Err(PlatformError::Network(format!(
                "mock network error submitting {}",
                candidate.external_job_id
            ))
            .into());
        }

        if self
            .failing_jobs
            .lock()
            .unwrap()
            .contains(&candidate.external_job_id)
        {
            let mut outcome = SubmissionOutcome::failure(format!(
                "mock form failure on {}",
                candidate.external_job_id
            ));
            outcome.screenshot = Some(format!(
                "/tmp/autoapply/{}.png",
                candidate.external_job_id
            ));
            return Ok(outcome);
        }

        Ok(SubmissionOutcome::success())
    }
}

/// In-memory notifier. Optionally fails the first N sends, and can
/// delay each send to exercise dispatch timeouts.
pub struct MockNotifier {
    delivered: Mutex<Vec<String>>,
    fail_remaining: Mutex<u32>,
    delay: Mutex<Option<Duration>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            fail_remaining: Mutex::new(0),
            delay: Mutex::new(None),
        }
    }

    /// Fail the next `n` sends before recovering.
    pub fn fail_next(&self, n: u32) {
        *self.fail_remaining.lock().unwrap() = n;
    }

    /// Sleep this long inside every send.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Ids of reminder jobs delivered so far.
    pub fn delivered_ids(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, job: &ReminderJob) -> Result<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut remaining = self.fail_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PlatformError::Notification(format!(
                    "mock delivery failure for {}",
                    job.id
                ))
                .into());
            }
        }

        self.delivered.lock().unwrap().push(job.id.clone());
        Ok(())
    }
}
