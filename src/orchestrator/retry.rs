//! Bounded retry with exponential backoff around a single stage.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use clipforge_common::StageResult;
use futures::FutureExt;
use serde_json::Value;
use tokio::time::{sleep, timeout};

use crate::errors::StageError;
use crate::stage::{Stage, StageInput, StageName};
use crate::tracking::{StageExecution, TrackingStore};

/// How often and how patiently one stage is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; a stage runs at most `max_retries + 1` times.
    pub max_retries: u32,
    /// Backoff before retry `n` (0-based) is `backoff_unit × 2^n`.
    pub backoff_unit: Duration,
    pub attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_unit: Duration) -> Self {
        Self {
            max_retries,
            backoff_unit,
            attempt_timeout: None,
        }
    }

    pub fn with_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = Some(attempt_timeout);
        self
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_unit
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Default retry budget per stage.
pub fn default_max_retries(stage: StageName) -> u32 {
    match stage {
        StageName::KeyframeGeneration | StageName::ImageGeneration => 3,
        StageName::Regeneration => 0,
        _ => 2,
    }
}

/// Per-stage retry budgets sharing one backoff unit and attempt timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryTable {
    pub max_retries: BTreeMap<StageName, u32>,
    pub backoff_unit: Duration,
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryTable {
    fn default() -> Self {
        Self {
            max_retries: StageName::ALL
                .iter()
                .filter(|s| **s != StageName::Regeneration)
                .map(|s| (*s, default_max_retries(*s)))
                .collect(),
            backoff_unit: Duration::from_secs(1),
            attempt_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl RetryTable {
    pub fn policy_for(&self, stage: StageName) -> RetryPolicy {
        RetryPolicy {
            max_retries: self
                .max_retries
                .get(&stage)
                .copied()
                .unwrap_or_else(|| default_max_retries(stage)),
            backoff_unit: self.backoff_unit,
            attempt_timeout: self.attempt_timeout,
        }
    }
}

/// Final result of a retried stage plus how it got there.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub result: StageResult,
    pub attempts: u32,
    /// Backoff slept before each retry, in order.
    pub backoffs: Vec<Duration>,
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run one attempt of `stage`, converting a panic or a timeout into a
/// failing result, and record the attempt in `tracker`.
pub async fn invoke_once(
    stage: &dyn Stage,
    input: &StageInput,
    attempt_timeout: Option<Duration>,
    attempt: u32,
    tracker: &mut TrackingStore,
) -> StageResult {
    let name = stage.name();
    let started = Instant::now();

    let result = {
        let guarded = AssertUnwindSafe(stage.execute(input, &mut *tracker)).catch_unwind();
        let outcome = match attempt_timeout {
            Some(limit) => match timeout(limit, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(StageError::Timeout {
                    seconds: limit.as_secs_f64(),
                }
                .into_result(name.as_str())),
            },
            None => guarded.await,
        };
        match outcome {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(stage = %name, attempt, panic = %message, "stage panicked");
                StageError::Panicked(message).into_result(name.as_str())
            }
        }
    };

    let execution = StageExecution::new(
        attempt,
        result.success,
        Value::Object(input.clone()),
        started.elapsed().as_secs_f64(),
    )
    .with_output(result.data.clone().map(Value::Object))
    .with_error(result.error.clone());
    if let Err(e) = tracker.record_stage_execution(name.as_str(), execution) {
        tracing::warn!(stage = %name, error = %e, "failed to record stage execution");
    }

    result
}

/// Execute `stage` with retry and exponential backoff.
///
/// Validation failures are returned immediately. Any other failure is
/// retried until `policy.max_retries` retries have been spent.
pub async fn execute_with_retry(
    stage: &dyn Stage,
    input: &StageInput,
    policy: RetryPolicy,
    tracker: &mut TrackingStore,
) -> RetryOutcome {
    let name = stage.name();
    let mut backoffs = Vec::new();
    let mut attempt = 0u32;

    loop {
        let result = invoke_once(stage, input, policy.attempt_timeout, attempt, tracker).await;
        let attempts = attempt + 1;

        if result.success {
            if attempt > 0 {
                tracing::info!(stage = %name, attempts, "stage succeeded after retry");
            }
            return RetryOutcome {
                result,
                attempts,
                backoffs,
            };
        }

        if !result.is_retryable() {
            tracing::warn!(stage = %name, error = result.error_message(), "non-retryable failure");
            return RetryOutcome {
                result,
                attempts,
                backoffs,
            };
        }

        if attempt >= policy.max_retries {
            tracing::warn!(
                stage = %name,
                attempts,
                error = result.error_message(),
                "retry budget exhausted"
            );
            return RetryOutcome {
                result,
                attempts,
                backoffs,
            };
        }

        let delay = policy.backoff_for(attempt);
        tracing::warn!(
            stage = %name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = result.error_message(),
            "stage attempt failed, backing off"
        );
        sleep(delay).await;
        backoffs.push(delay);
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedStage, active_tracker, failure, success};
    use clipforge_common::ErrorKind;
    use serde_json::json;

    const UNIT: Duration = Duration::from_millis(1);

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.backoff_for(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(400));
    }

    #[test]
    fn test_default_table() {
        let table = RetryTable::default();
        assert_eq!(table.policy_for(StageName::Hotspot).max_retries, 2);
        assert_eq!(table.policy_for(StageName::ImageGeneration).max_retries, 3);
        assert_eq!(table.policy_for(StageName::KeyframeGeneration).max_retries, 3);
        assert_eq!(table.policy_for(StageName::Synthesis).max_retries, 2);
        assert!(!table.max_retries.contains_key(&StageName::Regeneration));
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt_after_two_backoffs() {
        let (mut tracker, _dir) = active_tracker();
        let stage = ScriptedStage::new(
            StageName::ImageGeneration,
            vec![
                failure(StageName::ImageGeneration, ErrorKind::ExternalService),
                failure(StageName::ImageGeneration, ErrorKind::ExternalService),
                success(json!({"artifacts": []})),
            ],
        );

        let outcome =
            execute_with_retry(&stage, &StageInput::new(), RetryPolicy::new(3, UNIT), &mut tracker)
                .await;

        assert!(outcome.result.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(stage.calls(), 3);
        assert_eq!(outcome.backoffs, vec![UNIT, UNIT * 2]);

        let id = tracker.current_session_id().unwrap().to_string();
        let runs = &tracker.session(&id).unwrap().agents["image_generation"];
        assert_eq!(runs.len(), 3);
        assert_eq!(
            runs.iter().map(|r| r.attempt).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(runs[2].success);
    }

    #[tokio::test]
    async fn test_invocations_bounded_by_max_retries_plus_one() {
        let (mut tracker, _dir) = active_tracker();
        let stage = ScriptedStage::new(
            StageName::Script,
            vec![failure(StageName::Script, ErrorKind::ExternalService)],
        );

        let outcome =
            execute_with_retry(&stage, &StageInput::new(), RetryPolicy::new(2, UNIT), &mut tracker)
                .await;

        assert!(!outcome.result.success);
        assert_eq!(stage.calls(), 3);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.backoffs, vec![UNIT, UNIT * 2]);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let (mut tracker, _dir) = active_tracker();
        let stage = ScriptedStage::new(
            StageName::Script,
            vec![failure(StageName::Script, ErrorKind::Timeout)],
        );
        let outcome =
            execute_with_retry(&stage, &StageInput::new(), RetryPolicy::new(0, UNIT), &mut tracker)
                .await;
        assert_eq!(stage.calls(), 1);
        assert!(outcome.backoffs.is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_is_not_retried() {
        let (mut tracker, _dir) = active_tracker();
        let stage = ScriptedStage::new(
            StageName::Storyboard,
            vec![failure(StageName::Storyboard, ErrorKind::Validation)],
        );

        let outcome =
            execute_with_retry(&stage, &StageInput::new(), RetryPolicy::new(3, UNIT), &mut tracker)
                .await;

        assert_eq!(stage.calls(), 1);
        assert_eq!(outcome.result.error_kind(), Some(ErrorKind::Validation));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failed_attempt() {
        let (mut tracker, _dir) = active_tracker();
        let stage = ScriptedStage::new(StageName::Synthesis, vec![success(json!({}))])
            .with_delay(Duration::from_millis(500));
        let policy = RetryPolicy::new(1, UNIT).with_timeout(Duration::from_millis(10));

        let outcome = execute_with_retry(&stage, &StageInput::new(), policy, &mut tracker).await;

        assert!(!outcome.result.success);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.result.error_kind(), Some(ErrorKind::Timeout));
        assert!(outcome.result.error_message().contains("timed out"));
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_failure() {
        let (mut tracker, _dir) = active_tracker();
        let stage = ScriptedStage::new(StageName::Hotspot, vec![]).panicking("crawler exploded");

        let outcome =
            execute_with_retry(&stage, &StageInput::new(), RetryPolicy::new(1, UNIT), &mut tracker)
                .await;

        assert!(!outcome.result.success);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.result.error_kind(), Some(ErrorKind::Internal));
        assert!(outcome.result.error_message().contains("crawler exploded"));
    }

    #[tokio::test]
    async fn test_invoke_once_without_session_still_returns_result() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = TrackingStore::new(dir.path().join("t.json"));
        let stage = ScriptedStage::new(StageName::Script, vec![success(json!({"script": {}}))]);
        let result = invoke_once(&stage, &StageInput::new(), None, 0, &mut tracker).await;
        assert!(result.success);
    }
}
