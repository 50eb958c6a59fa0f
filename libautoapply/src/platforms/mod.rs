//! Collaborator interfaces consumed by the automation core
//!
//! The orchestrator and scheduler depend only on these traits, never on
//! concrete platform clients. Implementations handle the actual job-board
//! search APIs, browser-automation submission, and notification delivery;
//! the in-repo [`mock`] module is the only driver that ships today and is
//! available to all builds so integration tests can exercise full cycles.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{AutoApplyError, Result};
use crate::types::{
    ApplicationDocs, Candidate, CookieJar, ReminderJob, SearchCriteria, SubmissionOutcome,
};

pub mod mock;

/// Searches one platform for candidate postings.
///
/// A failed search is not fatal to a cycle: the orchestrator treats an
/// `Err` as zero candidates from that platform and logs it.
#[async_trait]
pub trait JobSearchProvider: Send + Sync {
    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Candidate>>;
}

/// Submits one application through browser automation.
///
/// A submission that ran but did not go through reports
/// `SubmissionOutcome { success: false, .. }`; an `Err` means the attempt
/// itself blew up (network, driver). The orchestrator counts both as a
/// failed application and keeps going.
#[async_trait]
pub trait Applier: Send + Sync {
    async fn submit(
        &self,
        candidate: &Candidate,
        docs: &ApplicationDocs,
        session: &CookieJar,
    ) -> Result<SubmissionOutcome>;
}

/// Delivers one reminder to the user (email/push).
///
/// An `Err` is a dispatch failure: the scheduler leaves the job unsent
/// and retries on the next poll tick.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, job: &ReminderJob) -> Result<()>;
}

/// The full collaborator set a binary wires into the core.
pub struct Collaborators {
    pub search: Arc<dyn JobSearchProvider>,
    pub applier: Arc<dyn Applier>,
    pub notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Build collaborators for the configured provider kind.
pub fn create_collaborators(config: &Config) -> Result<Collaborators> {
    match config.providers.kind.as_str() {
        "mock" => Ok(Collaborators {
            search: Arc::new(mock::MockJobBoard::new()),
            applier: Arc::new(mock::MockApplier::new()),
            notifier: Arc::new(mock::MockNotifier::new()),
        }),
        other => Err(AutoApplyError::InvalidInput(format!(
            "Unknown provider kind: {}",
            other
        ))),
    }
}
