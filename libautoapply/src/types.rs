//! Core types for AutoApply

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque cookie map captured from a platform login session.
pub type CookieJar = HashMap<String, String>;

/// Per-(user, platform) submission counters against clock-aligned windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub user_id: String,
    pub platform: String,
    pub hourly_count: i64,
    pub daily_count: i64,
    /// Unix seconds; realigned to the top of the hour on hourly rollover.
    pub last_reset: i64,
    pub hourly_limit: i64,
    pub daily_limit: i64,
}

/// Outcome of a rate check. A refusal is not an error; `retry_after`
/// names the next boundary at which a slot opens.
#[derive(Debug, Clone, PartialEq)]
pub struct RateDecision {
    pub allowed: bool,
    pub retry_after: Option<DateTime<Utc>>,
}

impl RateDecision {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after: None,
        }
    }

    pub fn refused(retry_after: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            retry_after: Some(retry_after),
        }
    }
}

/// Durable row backing the session cache. `cookie_blob` is a JSON-encoded
/// [`CookieJar`]; a record is usable iff `now < expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCookieRecord {
    pub user_id: String,
    pub platform: String,
    pub cookie_blob: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReminderType {
    FollowUp,
    StatusCheck,
    InterviewPrep,
}

impl ReminderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderType::FollowUp => "follow_up",
            ReminderType::StatusCheck => "status_check",
            ReminderType::InterviewPrep => "interview_prep",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "follow_up" => Some(ReminderType::FollowUp),
            "status_check" => Some(ReminderType::StatusCheck),
            "interview_prep" => Some(ReminderType::InterviewPrep),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReminderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A one-shot human-facing reminder. Fires at most once: either the poll
/// loop marks it sent, or cancellation removes it first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderJob {
    pub id: String,
    pub application_id: String,
    pub user_id: String,
    pub reminder_type: ReminderType,
    pub scheduled_time: i64,
    pub sent: bool,
    pub sent_at: Option<i64>,
    pub metadata: HashMap<String, String>,
}

impl ReminderJob {
    pub fn new(
        application_id: String,
        user_id: String,
        reminder_type: ReminderType,
        scheduled_time: DateTime<Utc>,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            application_id,
            user_id,
            reminder_type,
            scheduled_time: scheduled_time.timestamp(),
            sent: false,
            sent_at: None,
            metadata,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CycleStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Pending => "pending",
            CycleStatus::Running => "running",
            CycleStatus::Completed => "completed",
            CycleStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CycleStatus::Pending),
            "running" => Some(CycleStatus::Running),
            "completed" => Some(CycleStatus::Completed),
            "failed" => Some(CycleStatus::Failed),
            _ => None,
        }
    }
}

/// Audit record for one automation cycle. Inserted at cycle start with
/// status `running`, updated exactly once at cycle end, immutable after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub cycle_id: String,
    pub user_id: String,
    pub cycle_start: i64,
    pub cycle_end: Option<i64>,
    pub status: CycleStatus,
    pub jobs_searched: i64,
    pub jobs_matched: i64,
    pub jobs_applied: i64,
    pub applications_successful: i64,
    pub applications_failed: i64,
    pub errors: Vec<String>,
    pub screenshots: Vec<String>,
}

/// Counters the orchestrator accumulates in memory and writes once at
/// cycle end.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleCounts {
    pub jobs_searched: i64,
    pub jobs_matched: i64,
    pub jobs_applied: i64,
    pub applications_successful: i64,
    pub applications_failed: i64,
}

/// A job posting returned by a search provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub platform: String,
    /// Platform-assigned posting id, used for dedupe across cycles.
    pub external_job_id: String,
    pub title: String,
    pub company: Option<String>,
    pub url: Option<String>,
    pub location: Option<String>,
}

/// Search parameters handed to a [`crate::platforms::JobSearchProvider`].
#[derive(Debug, Clone)]
pub struct SearchCriteria {
    pub platform: String,
    pub keywords: Vec<String>,
    pub locations: Vec<String>,
}

/// Per-user automation settings. A cycle aborts as `failed` when no
/// active config exists for the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub user_id: String,
    pub keywords: Vec<String>,
    pub locations: Vec<String>,
    pub platforms: Vec<String>,
    pub max_per_cycle: i64,
    pub resume_path: String,
    pub cover_letter_path: Option<String>,
    pub active: bool,
}

/// Documents handed to the applier alongside a candidate.
#[derive(Debug, Clone)]
pub struct ApplicationDocs {
    pub resume_path: String,
    pub cover_letter_path: Option<String>,
}

impl SearchConfig {
    pub fn docs(&self) -> ApplicationDocs {
        ApplicationDocs {
            resume_path: self.resume_path.clone(),
            cover_letter_path: self.cover_letter_path.clone(),
        }
    }
}

/// Result of one browser-automation submission attempt.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub screenshot: Option<String>,
}

impl SubmissionOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
            screenshot: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            screenshot: None,
        }
    }
}

/// Record of a submitted application, kept for dedupe and audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub user_id: String,
    pub platform: String,
    pub external_job_id: String,
    pub title: String,
    pub applied_at: i64,
}
