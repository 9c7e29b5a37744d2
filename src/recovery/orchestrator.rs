//! Recovery Orchestrator
//!
//! Retries transient failures with backoff and drives multi-step operations
//! from checkpoints, so a failed run resumes where it stopped instead of
//! starting over.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::{SharedClock, SystemClock};
use crate::error::{GuardError, Result};
use crate::recovery::{Checkpoint, CheckpointStore, MemoryCheckpointStore, RetryPolicy, Retryable};

// == Recovery Error ==
/// Failure of an orchestrated operation.
#[derive(Error, Debug)]
pub enum RecoveryError<E>
where
    E: std::error::Error + 'static,
{
    /// Every allowed attempt failed with a transient error
    #[error("{operation} failed after {attempts} attempts: {source}")]
    Exhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: E,
    },

    /// The operation failed with an error that retrying cannot fix
    #[error("{operation} failed permanently on attempt {attempt}: {source}")]
    Permanent {
        operation: String,
        attempt: u32,
        #[source]
        source: E,
    },

    /// Checkpoint could not be read, written or decoded
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] GuardError),
}

impl<E> RecoveryError<E>
where
    E: std::error::Error + 'static,
{
    /// The operation's own error, if it got that far.
    pub fn into_source(self) -> Option<E> {
        match self {
            RecoveryError::Exhausted { source, .. } | RecoveryError::Permanent { source, .. } => {
                Some(source)
            }
            RecoveryError::Checkpoint(_) => None,
        }
    }
}

// == Recovery Stats ==
/// Counters across every orchestrated call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryStats {
    /// Operation invocations, including retries
    pub attempts: u64,
    /// Invocations that were retries
    pub retries: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Checkpointed runs that resumed from a saved step
    pub resumed: u64,
    pub checkpoints_saved: u64,
}

// == Recovery Orchestrator ==
/// Wraps fallible async operations with retry and checkpoint/resume.
#[derive(Debug)]
pub struct RecoveryOrchestrator<S = MemoryCheckpointStore> {
    policy: RetryPolicy,
    store: S,
    stats: Mutex<RecoveryStats>,
    clock: SharedClock,
}

impl RecoveryOrchestrator {
    /// Orchestrator with the default policy and an in-memory store.
    pub fn with_defaults() -> Result<Self> {
        Self::new(
            RetryPolicy::default(),
            MemoryCheckpointStore::new(),
            SystemClock::shared(),
        )
    }
}

impl<S: CheckpointStore> RecoveryOrchestrator<S> {
    // == Constructor ==
    /// Creates an orchestrator, failing fast on an unusable policy.
    pub fn new(policy: RetryPolicy, store: S, clock: SharedClock) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            policy,
            store,
            stats: Mutex::new(RecoveryStats::default()),
            clock,
        })
    }

    fn update_stats(&self, update: impl FnOnce(&mut RecoveryStats)) {
        update(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }

    // == Execute ==
    /// Runs `op` until it succeeds, fails permanently or runs out of attempts.
    ///
    /// `op` receives the 1-based attempt number. Between attempts the task
    /// sleeps for the policy's backoff delay.
    pub async fn execute<T, E, F, Fut>(
        &self,
        name: &str,
        mut op: F,
    ) -> std::result::Result<T, RecoveryError<E>>
    where
        E: std::error::Error + Retryable + 'static,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            self.update_stats(|stats| {
                stats.attempts += 1;
                if attempt > 1 {
                    stats.retries += 1;
                }
            });

            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{} succeeded on attempt {}", name, attempt);
                    }
                    self.update_stats(|stats| stats.succeeded += 1);
                    return Ok(value);
                }
                Err(error) if !error.is_retryable() => {
                    warn!("{} failed permanently: {}", name, error);
                    self.update_stats(|stats| stats.failed += 1);
                    return Err(RecoveryError::Permanent {
                        operation: name.to_string(),
                        attempt,
                        source: error,
                    });
                }
                Err(error) if attempt >= self.policy.max_attempts => {
                    warn!("{} gave up after {} attempts: {}", name, attempt, error);
                    self.update_stats(|stats| stats.failed += 1);
                    return Err(RecoveryError::Exhausted {
                        operation: name.to_string(),
                        attempts: attempt,
                        source: error,
                    });
                }
                Err(error) => {
                    let delay = self.policy.backoff.delay_for_attempt(attempt);
                    warn!(
                        "{} attempt {}/{} failed: {}; retrying in {:?}",
                        name, attempt, self.policy.max_attempts, error, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    // == Run Checkpointed ==
    /// Runs steps `0..total_steps` in order, threading `state` through them.
    ///
    /// Each step is retried per policy and a checkpoint is saved after it
    /// succeeds. If a saved checkpoint exists for `operation_id`, the run
    /// resumes from its state at the first unfinished step and
    /// `initial_state` is ignored. The checkpoint is kept when a step fails
    /// and removed once every step has finished.
    pub async fn run_checkpointed<St, E, F, Fut>(
        &self,
        operation_id: &str,
        total_steps: u32,
        initial_state: St,
        mut step: F,
    ) -> std::result::Result<St, RecoveryError<E>>
    where
        St: Clone + Serialize + DeserializeOwned,
        E: std::error::Error + Retryable + 'static,
        F: FnMut(u32, St) -> Fut,
        Fut: Future<Output = std::result::Result<St, E>>,
    {
        let (first_step, mut state) = match self.store.load(operation_id)? {
            Some(checkpoint) => {
                if checkpoint.completed_steps > total_steps {
                    return Err(GuardError::InvalidConfig(format!(
                        "checkpoint for {} records {} steps but the operation has {}",
                        operation_id, checkpoint.completed_steps, total_steps
                    ))
                    .into());
                }
                info!(
                    "Resuming {} at step {}/{}",
                    operation_id, checkpoint.completed_steps, total_steps
                );
                self.update_stats(|stats| stats.resumed += 1);
                let state: St =
                    serde_json::from_value(checkpoint.state).map_err(GuardError::from)?;
                (checkpoint.completed_steps, state)
            }
            None => (0, initial_state),
        };

        for index in first_step..total_steps {
            let name = format!("{operation_id} step {index}");
            let next = self
                .execute(&name, |_attempt| step(index, state.clone()))
                .await?;
            state = next;
            self.save_checkpoint(operation_id, index + 1, &state)?;
        }

        self.store.clear(operation_id)?;
        debug!("{} completed all {} steps", operation_id, total_steps);
        Ok(state)
    }

    fn save_checkpoint<St: Serialize>(
        &self,
        operation_id: &str,
        completed_steps: u32,
        state: &St,
    ) -> Result<()> {
        self.store.save(Checkpoint {
            operation_id: operation_id.to_string(),
            completed_steps,
            state: serde_json::to_value(state)?,
            saved_at_ms: self.clock.now_ms(),
        })?;
        self.update_stats(|stats| stats.checkpoints_saved += 1);
        debug!("Checkpoint saved for {} at step {}", operation_id, completed_steps);
        Ok(())
    }

    /// Saved progress for `operation_id`, if a run is unfinished.
    pub fn checkpoint(&self, operation_id: &str) -> Result<Option<Checkpoint>> {
        self.store.load(operation_id)
    }

    /// Discards saved progress so the next run starts from scratch.
    pub fn abandon(&self, operation_id: &str) -> Result<bool> {
        self.store.clear(operation_id)
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> RecoveryStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The retry policy in force.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::recovery::BackoffConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Error, PartialEq)]
    enum StepError {
        #[error("backend unavailable")]
        Unavailable,
        #[error("malformed input")]
        Malformed,
    }

    impl Retryable for StepError {
        fn is_retryable(&self) -> bool {
            matches!(self, StepError::Unavailable)
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(max_attempts)
            .with_backoff(BackoffConfig::Fixed {
                delay: Duration::from_millis(1),
            })
    }

    fn orchestrator(
        max_attempts: u32,
    ) -> RecoveryOrchestrator<Arc<MemoryCheckpointStore>> {
        RecoveryOrchestrator::new(
            fast_policy(max_attempts),
            Arc::new(MemoryCheckpointStore::new()),
            ManualClock::new(5_000),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_execute_succeeds_first_time() {
        let orchestrator = orchestrator(3);

        let result = orchestrator
            .execute("fetch", |_| async { Ok::<_, StepError>(42) })
            .await;

        assert_eq!(result.unwrap(), 42);
        let stats = orchestrator.stats();
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.retries, 0);
        assert_eq!(stats.succeeded, 1);
    }

    #[tokio::test]
    async fn test_execute_retries_transient_failures() {
        let orchestrator = orchestrator(3);

        let result = orchestrator
            .execute("fetch", |attempt| async move {
                if attempt < 3 {
                    Err(StepError::Unavailable)
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(orchestrator.stats().retries, 2);
    }

    #[tokio::test]
    async fn test_execute_exhausts_attempts() {
        let orchestrator = orchestrator(3);
        let calls = AtomicU32::new(0);

        let result = orchestrator
            .execute("fetch", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(StepError::Unavailable) }
            })
            .await;

        match result {
            Err(RecoveryError::Exhausted { attempts, source, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(source, StepError::Unavailable);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(orchestrator.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_execute_stops_on_permanent_failure() {
        let orchestrator = orchestrator(5);
        let calls = AtomicU32::new(0);

        let result = orchestrator
            .execute("parse", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(StepError::Malformed) }
            })
            .await;

        assert!(matches!(
            result,
            Err(RecoveryError::Permanent { attempt: 1, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_checkpointed_completes_and_clears() {
        let orchestrator = orchestrator(3);

        let total = orchestrator
            .run_checkpointed("sum", 4, 0u64, |index, acc| async move {
                Ok::<_, StepError>(acc + u64::from(index) + 1)
            })
            .await
            .unwrap();

        assert_eq!(total, 10);
        assert!(orchestrator.checkpoint("sum").unwrap().is_none());
        assert_eq!(orchestrator.stats().checkpoints_saved, 4);
    }

    #[tokio::test]
    async fn test_run_checkpointed_resumes_after_failure() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let first = RecoveryOrchestrator::new(fast_policy(2), store.clone(), ManualClock::new(1))
            .unwrap();

        // Step 2 keeps failing, so the first run stops with two steps saved.
        let failed = first
            .run_checkpointed("batch", 4, Vec::<u32>::new(), |index, mut done| async move {
                if index == 2 {
                    return Err(StepError::Unavailable);
                }
                done.push(index);
                Ok(done)
            })
            .await;
        assert!(matches!(failed, Err(RecoveryError::Exhausted { .. })));

        let saved = first.checkpoint("batch").unwrap().unwrap();
        assert_eq!(saved.completed_steps, 2);
        assert_eq!(saved.saved_at_ms, 1);

        // A second run picks up at step 2 and never repeats steps 0 and 1.
        let second = RecoveryOrchestrator::new(fast_policy(2), store.clone(), ManualClock::new(2))
            .unwrap();
        let executed = Arc::new(Mutex::new(Vec::new()));
        let log = executed.clone();
        let done = second
            .run_checkpointed("batch", 4, vec![99], move |index, mut done| {
                log.lock().unwrap().push(index);
                async move {
                    done.push(index);
                    Ok::<_, StepError>(done)
                }
            })
            .await
            .unwrap();

        assert_eq!(done, vec![0, 1, 2, 3]);
        assert_eq!(*executed.lock().unwrap(), vec![2, 3]);
        assert_eq!(second.stats().resumed, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_run_checkpointed_rejects_oversized_checkpoint() {
        let orchestrator = orchestrator(1);
        orchestrator
            .store
            .save(Checkpoint {
                operation_id: "batch".into(),
                completed_steps: 9,
                state: serde_json::json!(0),
                saved_at_ms: 0,
            })
            .unwrap();

        let result = orchestrator
            .run_checkpointed("batch", 3, 0u32, |_, acc| async move {
                Ok::<_, StepError>(acc)
            })
            .await;

        assert!(matches!(result, Err(RecoveryError::Checkpoint(_))));
        assert!(orchestrator.abandon("batch").unwrap());
    }

    #[test]
    fn test_invalid_policy_fails_construction() {
        let result = RecoveryOrchestrator::new(
            RetryPolicy::default().with_max_attempts(0),
            MemoryCheckpointStore::new(),
            ManualClock::new(0),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_into_source() {
        let error: RecoveryError<StepError> = RecoveryError::Permanent {
            operation: "parse".into(),
            attempt: 1,
            source: StepError::Malformed,
        };
        assert_eq!(error.to_string(), "parse failed permanently on attempt 1: malformed input");
        assert_eq!(error.into_source(), Some(StepError::Malformed));
    }
}
