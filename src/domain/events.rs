//! Journal events for workflow runs.
//!
//! Every state change of a run is recorded as an immutable event in an
//! append-only log. Completed steps carry their JSON output so a resumed
//! run can skip them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single event in the append-only run journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Step name (if applicable)
    pub step_id: Option<String>,

    /// Type of event
    pub event_type: EventType,

    /// Idempotency key format: "{run_id}:{step}:{input_hash}"
    pub idempotency_key: String,

    /// Human-readable summary (NO secrets)
    pub payload_summary: String,

    /// Current status of the step/run
    pub status: StepStatus,

    /// Attempt number, 1-indexed (step events only)
    #[serde(default)]
    pub attempt: Option<u32>,

    /// Time taken in milliseconds (for finished attempts)
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,

    /// Error classification if failed (e.g. "transport")
    #[serde(default)]
    pub error_kind: Option<String>,

    /// Step or run output (completed events only)
    #[serde(default)]
    pub output: Option<Value>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(
        run_id: Uuid,
        step_id: Option<String>,
        event_type: EventType,
        idempotency_key: String,
        payload_summary: String,
        status: StepStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            step_id,
            event_type,
            idempotency_key,
            payload_summary,
            status,
            attempt: None,
            duration_ms: None,
            error: None,
            error_kind: None,
            output: None,
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attach an error message and its classification
    pub fn with_error(mut self, kind: &str, error: String) -> Self {
        self.error_kind = Some(kind.to_string());
        self.error = Some(error);
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }
}

/// Types of events that can occur during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A new run has started
    RunStarted,

    /// A failed or interrupted run was picked up again
    RunResumed,

    /// A run completed successfully
    RunCompleted,

    /// A run failed
    RunFailed,

    /// A step attempt has started
    StepStarted,

    /// A step completed successfully
    StepCompleted,

    /// A step failed permanently
    StepFailed,

    /// A step attempt failed and will be retried
    StepRetrying,

    /// A step was satisfied from the journal without executing
    StepSkipped,
}

/// Status of a step or run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet started
    #[default]
    Pending,

    /// Currently executing
    Running,

    /// Completed successfully
    Completed,

    /// Failed (with error)
    Failed,

    /// Skipped (idempotency check)
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serialization() {
        let event = Event::new(
            Uuid::new_v4(),
            Some("retrieve_user_profile".to_string()),
            EventType::StepCompleted,
            "test-key".to_string(),
            "Step completed".to_string(),
            StepStatus::Completed,
        )
        .with_attempt(2)
        .with_output(json!({ "name": "octocat" }));

        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.event_type, EventType::StepCompleted);
        assert_eq!(parsed.attempt, Some(2));
        assert_eq!(parsed.output, Some(json!({ "name": "octocat" })));
    }

    #[test]
    fn test_event_with_error() {
        let event = Event::new(
            Uuid::new_v4(),
            Some("retrieve_repositories".to_string()),
            EventType::StepFailed,
            "test-key".to_string(),
            "Step failed".to_string(),
            StepStatus::Failed,
        )
        .with_duration(1500)
        .with_error("remote_http", "HTTP 500".to_string());

        assert_eq!(event.duration_ms, Some(1500));
        assert_eq!(event.error.as_deref(), Some("HTTP 500"));
        assert_eq!(event.error_kind.as_deref(), Some("remote_http"));
    }

    #[test]
    fn test_optional_fields_default_when_absent() {
        let line = format!(
            r#"{{"id":"{}","timestamp":"2025-01-01T00:00:00Z","run_id":"{}","event_type":"run_started","idempotency_key":"k","payload_summary":"s","status":"running"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );

        let event: Event = serde_json::from_str(&line).unwrap();
        assert_eq!(event.event_type, EventType::RunStarted);
        assert!(event.step_id.is_none());
        assert!(event.attempt.is_none());
        assert!(event.error_kind.is_none());
        assert!(event.output.is_none());
    }
}
