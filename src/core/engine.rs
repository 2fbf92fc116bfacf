//! Step execution engine.
//!
//! The workflow hands every step to a [`StepEngine`] together with the
//! policy it declares. The engine owns everything durable about the call:
//! retries with backoff, the start-to-close timeout, heartbeat liveness and,
//! when a journal is attached, resumption from already completed steps.
//!
//! Steps cross the engine boundary as JSON values so that outputs can be
//! journaled and replayed.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{Event, EventType, StepKind, StepStatus};

use super::activities::StepError;
use super::event_store::{generate_idempotency_key, EventStore};
use super::policy::StepOptions;

/// Boxed future of one step attempt
pub type StepFuture = Pin<Box<dyn Future<Output = Result<Value, StepError>> + Send>>;

/// Type-erased step body: context and JSON input in, JSON output out
pub type StepFn = Arc<dyn Fn(ActivityContext, Value) -> StepFuture + Send + Sync>;

/// Wrap a typed step body into a [`StepFn`].
///
/// Input that does not decode into `I` fails the attempt with a
/// non-retryable [`StepError::InvalidInput`].
pub fn step_fn<I, O, F, Fut>(f: F) -> StepFn
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    F: Fn(ActivityContext, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, StepError>> + Send + 'static,
{
    Arc::new(move |ctx: ActivityContext, input: Value| -> StepFuture {
        let input = match serde_json::from_value::<I>(input) {
            Ok(input) => input,
            Err(e) => {
                return Box::pin(async move { Err::<Value, _>(StepError::InvalidInput(e)) })
            }
        };

        let attempt = f(ctx, input);
        Box::pin(async move {
            let output = attempt.await?;
            serde_json::to_value(output).map_err(StepError::Encode)
        })
    })
}

/// Liveness record of one attempt
#[derive(Debug)]
pub struct Heartbeat {
    started: Instant,
    /// Milliseconds since `started` at the last beat
    last_ms: AtomicU64,
    count: AtomicU64,
}

impl Heartbeat {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            last_ms: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn beat(&self) {
        let now = self.started.elapsed().as_millis() as u64;
        self.last_ms.store(now, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the last beat (or since the attempt began)
    pub fn since_last(&self) -> Duration {
        let elapsed = self.started.elapsed();
        elapsed.saturating_sub(Duration::from_millis(self.last_ms.load(Ordering::Relaxed)))
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Handle given to a step attempt
#[derive(Debug, Clone)]
pub struct ActivityContext {
    step: String,
    attempt: u32,
    heartbeat: Arc<Heartbeat>,
}

impl ActivityContext {
    pub fn new(step: impl Into<String>, attempt: u32) -> Self {
        Self {
            step: step.into(),
            attempt,
            heartbeat: Arc::new(Heartbeat::new()),
        }
    }

    /// Context for calling a step directly, outside any engine
    pub fn detached(step: StepKind) -> Self {
        Self::new(step.name(), 1)
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    /// Attempt number, 1-indexed
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Signal that the step is still making progress
    pub fn heartbeat(&self) {
        self.heartbeat.beat();
    }

    pub fn heartbeats(&self) -> u64 {
        self.heartbeat.count()
    }
}

/// Why a single attempt did not produce output
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Step(#[from] StepError),

    #[error("Attempt exceeded its start-to-close timeout of {0:?}")]
    StartToCloseTimeout(Duration),

    #[error("No heartbeat received within {0:?}")]
    HeartbeatTimeout(Duration),
}

impl AttemptError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Step(e) => e.kind(),
            Self::StartToCloseTimeout(_) => "timeout",
            Self::HeartbeatTimeout(_) => "heartbeat_timeout",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Step(e) => e.is_retryable(),
            Self::StartToCloseTimeout(_) | Self::HeartbeatTimeout(_) => true,
        }
    }
}

/// Terminal failure of a step invocation
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Step '{step}' failed after {attempts} attempt(s): {source}")]
    StepFailed {
        step: StepKind,
        attempts: u32,
        #[source]
        source: AttemptError,
    },

    #[error(transparent)]
    Journal(#[from] anyhow::Error),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StepFailed { source, .. } => source.kind(),
            Self::Journal(_) => "journal",
        }
    }
}

/// Input of one step invocation.
///
/// `payload` is what the step receives. `key` identifies the invocation in
/// the journal; it defaults to the payload and must not carry secrets.
#[derive(Debug, Clone, PartialEq)]
pub struct StepInput {
    pub payload: Value,
    pub key: Value,
}

impl StepInput {
    pub fn new(payload: Value) -> Self {
        Self {
            key: payload.clone(),
            payload,
        }
    }

    /// Identify the invocation by `key` instead of the payload
    pub fn keyed_by(payload: Value, key: Value) -> Self {
        Self { payload, key }
    }
}

impl From<Value> for StepInput {
    fn from(payload: Value) -> Self {
        Self::new(payload)
    }
}

/// Execution engine contract consumed by the workflow.
///
/// An implementation runs at most one attempt of an invocation at a time,
/// retries per `options.retry_policy`, and enforces the timeouts.
#[async_trait]
pub trait StepEngine: Send + Sync {
    async fn execute_step(
        &self,
        step: StepKind,
        func: StepFn,
        input: StepInput,
        options: &StepOptions,
    ) -> Result<Value, EngineError>;
}

/// Aborts the automatic heartbeater when the attempt ends or is dropped
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// In-process engine with an optional run journal
pub struct LocalEngine {
    run_id: Uuid,
    journal: Option<Arc<EventStore>>,
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalEngine {
    /// Engine without a journal: retries and timeouts only
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            journal: None,
        }
    }

    /// Engine that records every attempt and reuses completed outputs
    pub fn with_journal(journal: Arc<EventStore>) -> Self {
        Self {
            run_id: journal.run_id(),
            journal: Some(journal),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    async fn record(&self, event: Event) -> Result<(), EngineError> {
        if let Some(ref journal) = self.journal {
            journal.append(&event).await?;
        }
        Ok(())
    }

    fn step_event(
        &self,
        step: StepKind,
        event_type: EventType,
        idem_key: &str,
        summary: String,
        status: StepStatus,
    ) -> Event {
        Event::new(
            self.run_id,
            Some(step.name().to_string()),
            event_type,
            idem_key.to_string(),
            summary,
            status,
        )
    }
}

#[async_trait]
impl StepEngine for LocalEngine {
    #[instrument(skip(self, func, input, options), fields(run_id = %self.run_id))]
    async fn execute_step(
        &self,
        step: StepKind,
        func: StepFn,
        input: StepInput,
        options: &StepOptions,
    ) -> Result<Value, EngineError> {
        let idem_key = generate_idempotency_key(self.run_id, step.name(), &input.key.to_string());
        let input = input.payload;

        if let Some(ref journal) = self.journal {
            if let Some(output) = journal.completed_output(&idem_key).await? {
                info!("Step already completed, reusing journaled output");
                self.record(self.step_event(
                    step,
                    EventType::StepSkipped,
                    &idem_key,
                    format!("Step '{}' satisfied from journal", step),
                    StepStatus::Skipped,
                ))
                .await?;
                return Ok(output);
            }
        }

        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let attempt_start = Instant::now();

            self.record(
                self.step_event(
                    step,
                    EventType::StepStarted,
                    &idem_key,
                    format!("Step '{}' attempt {}", step, attempt),
                    StepStatus::Running,
                )
                .with_attempt(attempt),
            )
            .await?;

            let ctx = ActivityContext::new(step.name(), attempt);
            let result = run_attempt(&func, ctx, input.clone(), options).await;
            let duration_ms = attempt_start.elapsed().as_millis() as u64;

            match result {
                Ok(output) => {
                    debug!(attempt, duration_ms, "Step completed");
                    self.record(
                        self.step_event(
                            step,
                            EventType::StepCompleted,
                            &idem_key,
                            format!("Step '{}' completed in {}ms", step, duration_ms),
                            StepStatus::Completed,
                        )
                        .with_attempt(attempt)
                        .with_duration(duration_ms)
                        .with_output(output.clone()),
                    )
                    .await?;
                    return Ok(output);
                }
                Err(e) if e.is_retryable() && options.retry_policy.should_retry(attempt) => {
                    let delay = options.retry_policy.delay_for_attempt(attempt);

                    self.record(
                        self.step_event(
                            step,
                            EventType::StepRetrying,
                            &format!("{}:retry:{}", idem_key, attempt),
                            format!("Step '{}' failed, retrying in {:?}", step, delay),
                            StepStatus::Running,
                        )
                        .with_attempt(attempt)
                        .with_duration(duration_ms)
                        .with_error(e.kind(), e.to_string()),
                    )
                    .await?;

                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        kind = e.kind(),
                        error = %e,
                        "Step failed, retrying"
                    );

                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.record(
                        self.step_event(
                            step,
                            EventType::StepFailed,
                            &idem_key,
                            format!("Step '{}' failed after {} attempts", step, attempt),
                            StepStatus::Failed,
                        )
                        .with_attempt(attempt)
                        .with_duration(duration_ms)
                        .with_error(e.kind(), e.to_string()),
                    )
                    .await?;

                    error!(attempt, kind = e.kind(), error = %e, "Step failed permanently");

                    return Err(EngineError::StepFailed {
                        step,
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }
}

/// Run one attempt under the start-to-close deadline and heartbeat watchdog
async fn run_attempt(
    func: &StepFn,
    ctx: ActivityContext,
    input: Value,
    options: &StepOptions,
) -> Result<Value, AttemptError> {
    let heartbeat = Arc::clone(&ctx.heartbeat);
    let beat_every = options.heartbeat_interval();

    let _auto_beat = options.auto_heartbeat.then(|| {
        let heartbeat = Arc::clone(&heartbeat);
        AbortOnDrop(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(beat_every);
            loop {
                ticker.tick().await;
                heartbeat.beat();
            }
        }))
    });

    let mut attempt = func(ctx, input);
    let deadline = tokio::time::sleep(options.start_to_close_timeout);
    tokio::pin!(deadline);

    let mut watchdog = tokio::time::interval(beat_every);
    watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            result = &mut attempt => return result.map_err(AttemptError::Step),
            _ = &mut deadline => {
                return Err(AttemptError::StartToCloseTimeout(options.start_to_close_timeout));
            }
            _ = watchdog.tick() => {
                if heartbeat.since_last() > options.heartbeat_timeout {
                    return Err(AttemptError::HeartbeatTimeout(options.heartbeat_timeout));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ClientError;
    use crate::config::credentials::CredentialError;
    use crate::core::policy::RetryPolicy;
    use std::sync::atomic::AtomicU32;

    fn fast_options(max_attempts: u32) -> StepOptions {
        StepOptions::new(
            RetryPolicy {
                max_attempts,
                initial_interval_ms: 1,
                backoff_coefficient: 2.0,
                maximum_interval_ms: 5,
            },
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    fn server_error() -> StepError {
        StepError::Client(ClientError::RemoteHttp {
            path: "/users/octocat".to_string(),
            page: None,
            status: 502,
            body: "bad gateway".to_string(),
        })
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let func = step_fn(move |ctx: ActivityContext, n: u32| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if ctx.attempt() < 3 {
                    Err(server_error())
                } else {
                    Ok(n * 2)
                }
            }
        });

        let output = LocalEngine::new()
            .execute_step(StepKind::RetrieveUserProfile, func, Value::from(21).into(), &fast_options(6))
            .await
            .unwrap();

        assert_eq!(output, Value::from(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let func = step_fn(move |_ctx: ActivityContext, _: Value| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(server_error())
            }
        });

        let err = LocalEngine::new()
            .execute_step(StepKind::RetrieveUserProfile, func, Value::Null.into(), &fast_options(6))
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(err.kind(), "remote_http");
        assert!(matches!(err, EngineError::StepFailed { attempts: 6, .. }));
    }

    #[tokio::test]
    async fn test_configuration_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let func = step_fn(move |_ctx: ActivityContext, _: Value| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(StepError::Configuration(CredentialError::MissingToken))
            }
        });

        let err = LocalEngine::new()
            .execute_step(StepKind::PreflightCheck, func, Value::Null.into(), &fast_options(6))
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), "configuration");
    }

    #[tokio::test]
    async fn test_invalid_input_is_not_retried() {
        let func = step_fn(|_ctx: ActivityContext, n: u32| async move { Ok(n) });

        let err = LocalEngine::new()
            .execute_step(
                StepKind::ComputeSummaryStats,
                func,
                Value::from("not a number").into(),
                &fast_options(6),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::StepFailed { attempts: 1, .. }));
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn test_start_to_close_timeout() {
        let func = step_fn(|_ctx: ActivityContext, _: Value| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        });
        let mut options = fast_options(2);
        options.start_to_close_timeout = Duration::from_millis(20);

        let err = LocalEngine::new()
            .execute_step(StepKind::RetrieveRepositories, func, Value::Null.into(), &options)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "timeout");
        assert!(matches!(err, EngineError::StepFailed { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_silent_step_hits_heartbeat_timeout() {
        let func = step_fn(|_ctx: ActivityContext, _: Value| async move {
            std::future::pending::<()>().await;
            Ok(())
        });
        let mut options = fast_options(1).manual_heartbeat();
        options.heartbeat_timeout = Duration::from_millis(30);

        let err = LocalEngine::new()
            .execute_step(StepKind::RetrieveRepositories, func, Value::Null.into(), &options)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "heartbeat_timeout");
    }

    #[tokio::test]
    async fn test_auto_heartbeat_keeps_slow_step_alive() {
        let func = step_fn(|ctx: ActivityContext, _: Value| async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            Ok(ctx.heartbeats())
        });
        let mut options = fast_options(1);
        options.heartbeat_timeout = Duration::from_millis(30);

        let beats = LocalEngine::new()
            .execute_step(StepKind::RetrieveRepositories, func, Value::Null.into(), &options)
            .await
            .unwrap();

        assert!(beats.as_u64().unwrap() > 0);
    }

    #[test]
    fn test_heartbeat_resets_silence() {
        let ctx = ActivityContext::detached(StepKind::PreflightCheck);
        std::thread::sleep(Duration::from_millis(20));
        assert!(ctx.heartbeat.since_last() >= Duration::from_millis(20));

        ctx.heartbeat();
        assert!(ctx.heartbeat.since_last() < Duration::from_millis(20));
        assert_eq!(ctx.heartbeats(), 1);
        assert_eq!(ctx.step(), "preflight_check");
    }
}
