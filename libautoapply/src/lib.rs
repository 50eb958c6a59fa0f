//! AutoApply - automated job application core
//!
//! This library provides the building blocks for unattended job
//! application cycles: platform rate limiting, session cookie caching,
//! follow-up reminders, and a write-once activity log, tied together by
//! the cycle orchestrator.

pub mod activity_log;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod platforms;
pub mod rate_limiter;
pub mod scheduler;
pub mod session_cache;
pub mod types;

// Re-export commonly used types
pub use activity_log::ActivityLogger;
pub use config::Config;
pub use db::Database;
pub use error::{AutoApplyError, Result};
pub use orchestrator::CycleOrchestrator;
pub use rate_limiter::RateLimiter;
pub use scheduler::ReminderScheduler;
pub use session_cache::SessionCache;
pub use types::{
    ActivityLogEntry, Candidate, CookieJar, CycleStatus, RateDecision, ReminderJob, ReminderType,
    SearchConfig,
};
