use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;

pub use nexadesk_common::metrics::Outcome as JobOutcome;

pub const SYNTHETIC_JOB: &str = "synthetic";
pub const DEFAULT_FAILURE_PROBABILITY: f64 = 0.03;
const MIN_DELAY: Duration = Duration::from_millis(200);
const MAX_JITTER: Duration = Duration::from_millis(300);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobError {
    #[error("simulated_job_failure")]
    SimulatedFailure,
}

/// Decides whether the next synthetic job succeeds.
pub trait OutcomeDecider: Send + Sync {
    fn decide(&self) -> JobOutcome;
}

/// Fails with a fixed probability.
pub struct RandomOutcome {
    failure_probability: f64,
}

impl RandomOutcome {
    pub fn new(failure_probability: f64) -> Self {
        Self {
            failure_probability: failure_probability.clamp(0.0, 1.0),
        }
    }
}

impl Default for RandomOutcome {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_PROBABILITY)
    }
}

impl OutcomeDecider for RandomOutcome {
    fn decide(&self) -> JobOutcome {
        if rand::thread_rng().gen::<f64>() < self.failure_probability {
            JobOutcome::Error
        } else {
            JobOutcome::Success
        }
    }
}

/// Replays a fixed sequence, then keeps answering `then`.
pub struct ScriptedOutcome {
    script: Mutex<VecDeque<JobOutcome>>,
    then: JobOutcome,
}

impl ScriptedOutcome {
    pub fn new(script: impl IntoIterator<Item = JobOutcome>, then: JobOutcome) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            then,
        }
    }
}

impl OutcomeDecider for ScriptedOutcome {
    fn decide(&self) -> JobOutcome {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(self.then)
    }
}

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self) -> Result<(), JobError>;
}

/// Placeholder unit of work: waits a random delay, then succeeds or fails
/// according to its decider.
pub struct SyntheticJob<D> {
    decider: D,
    min_delay: Duration,
    max_jitter: Duration,
}

impl<D: OutcomeDecider> SyntheticJob<D> {
    /// 200 to 499 ms per run.
    pub fn new(decider: D) -> Self {
        Self::with_delay(decider, MIN_DELAY, MAX_JITTER)
    }

    pub fn with_delay(decider: D, min_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            decider,
            min_delay,
            max_jitter,
        }
    }

    fn delay(&self) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.min_delay;
        }
        self.min_delay + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }
}

#[async_trait]
impl<D: OutcomeDecider> Job for SyntheticJob<D> {
    fn name(&self) -> &str {
        SYNTHETIC_JOB
    }

    async fn execute(&self) -> Result<(), JobError> {
        tokio::time::sleep(self.delay()).await;
        match self.decider.decide() {
            JobOutcome::Success => Ok(()),
            JobOutcome::Error => Err(JobError::SimulatedFailure),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;

    #[test]
    fn scripted_outcomes_replay_in_order() {
        let decider = ScriptedOutcome::new(
            [JobOutcome::Error, JobOutcome::Success, JobOutcome::Error],
            JobOutcome::Success,
        );
        let seen: Vec<JobOutcome> = (0..5).map(|_| decider.decide()).collect();

        assert_eq!(
            seen,
            vec![
                JobOutcome::Error,
                JobOutcome::Success,
                JobOutcome::Error,
                JobOutcome::Success,
                JobOutcome::Success,
            ]
        );
    }

    #[test]
    fn random_outcome_respects_extremes() {
        let never = RandomOutcome::new(0.0);
        let always = RandomOutcome::new(1.0);
        for _ in 0..100 {
            assert_eq!(never.decide(), JobOutcome::Success);
            assert_eq!(always.decide(), JobOutcome::Error);
        }
        assert_eq!(RandomOutcome::new(7.0).failure_probability, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn synthetic_job_waits_and_reports_outcome() {
        let job = SyntheticJob::new(ScriptedOutcome::new(
            [JobOutcome::Success, JobOutcome::Error],
            JobOutcome::Success,
        ));

        let start = Instant::now();
        assert_eq!(job.execute().await, Ok(()));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(500), "{elapsed:?}");

        assert_eq!(job.execute().await, Err(JobError::SimulatedFailure));
        assert_eq!(JobError::SimulatedFailure.to_string(), "simulated_job_failure");
    }
}
