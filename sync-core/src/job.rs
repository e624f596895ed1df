//! Job lifecycle state machine.
//!
//! Pure, side-effect-free transitions for one durable job. The job runner in
//! sync-client persists the state and executes the returned actions.
//!
//! ```text
//!            Dispatch               Finished(Success)
//!  Queued ─────────────► Dispatched ───────────────────► Confirmed
//!    ▲                      │
//!    └──── Finished(Retry) ─┘   Finished(Failure) ─────► Failed
//!
//!  any non-terminal ── Cancel ──► Cancelled
//! ```
//!
//! Periodic jobs never reach Confirmed or Failed: every finished run queues
//! the next one after the repeat interval.

use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::outcome::WorkResult;

/// Timing parameters a transition needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSchedule {
    /// Retry timing.
    pub backoff: BackoffPolicy,
    /// Repeat interval of a periodic job.
    pub period: Option<Duration>,
}

impl JobSchedule {
    /// Schedule of a one-time job.
    pub fn one_time(backoff: BackoffPolicy) -> Self {
        Self {
            backoff,
            period: None,
        }
    }

    /// Schedule of a periodic job.
    pub fn periodic(backoff: BackoffPolicy, period: Duration) -> Self {
        Self {
            backoff,
            period: Some(period),
        }
    }
}

/// Lifecycle state of a job - NO I/O, just state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting for its run time and constraints.
    Queued {
        /// Number of runs already completed.
        attempt: u32,
    },
    /// Handed to a worker.
    Dispatched {
        /// Number of runs completed before this one.
        attempt: u32,
    },
    /// Remote operation confirmed; the job is gone.
    Confirmed,
    /// Worker gave up; the job is gone but its pending row stays.
    Failed,
    /// Cancelled (logout); the job is gone.
    Cancelled,
}

impl JobState {
    /// A freshly submitted job.
    pub fn new() -> Self {
        Self::Queued { attempt: 0 }
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects.
    pub fn on_event(self, event: JobEvent, schedule: &JobSchedule) -> (Self, Vec<JobAction>) {
        match (self, event) {
            (Self::Queued { attempt }, JobEvent::Dispatch) => (
                Self::Dispatched { attempt },
                vec![JobAction::RunWorker { attempt }],
            ),

            // A periodic job backs off between failed runs, never past its
            // own period, and starts over once a run completes.
            (Self::Dispatched { attempt }, JobEvent::Finished { result }) if schedule.period.is_some() => {
                let period = schedule.period.unwrap_or_default();
                let (attempt, delay) = match result {
                    WorkResult::Retry => {
                        let next_attempt = attempt.saturating_add(1);
                        (next_attempt, schedule.backoff.delay_for(next_attempt).min(period))
                    }
                    WorkResult::Success | WorkResult::Failure => (0, period),
                };
                (
                    Self::Queued { attempt },
                    vec![JobAction::Requeue { attempt, delay }],
                )
            }

            (Self::Dispatched { .. }, JobEvent::Finished { result: WorkResult::Success }) => {
                (Self::Confirmed, vec![JobAction::Remove])
            }
            (Self::Dispatched { attempt }, JobEvent::Finished { result: WorkResult::Retry }) => {
                let next_attempt = attempt.saturating_add(1);
                (
                    Self::Queued {
                        attempt: next_attempt,
                    },
                    vec![JobAction::Requeue {
                        attempt: next_attempt,
                        delay: schedule.backoff.delay_for(next_attempt),
                    }],
                )
            }
            (Self::Dispatched { .. }, JobEvent::Finished { result: WorkResult::Failure }) => {
                (Self::Failed, vec![JobAction::Remove])
            }

            (Self::Queued { .. } | Self::Dispatched { .. }, JobEvent::Cancel) => {
                (Self::Cancelled, vec![JobAction::Remove])
            }

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Whether the job no longer exists.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed | Self::Cancelled)
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events in a job's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    /// Run time reached and constraints hold.
    Dispatch,
    /// The worker finished.
    Finished {
        /// What the worker reported.
        result: WorkResult,
    },
    /// All jobs were cancelled.
    Cancel,
}

/// Actions for the job runner to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    /// Build the worker for the job's intent and run it.
    RunWorker {
        /// Number of runs completed before this one.
        attempt: u32,
    },
    /// Put the job back in the queue.
    Requeue {
        /// Attempt counter to persist.
        attempt: u32,
        /// Delay before the job becomes due again.
        delay: Duration,
    },
    /// Delete the job.
    Remove,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_time() -> JobSchedule {
        JobSchedule::one_time(BackoffPolicy::exponential(Duration::from_secs(2)))
    }

    fn periodic() -> JobSchedule {
        JobSchedule::periodic(
            BackoffPolicy::exponential(Duration::from_secs(2)),
            Duration::from_secs(1800),
        )
    }

    #[test]
    fn starts_queued_at_attempt_zero() {
        assert_eq!(JobState::new(), JobState::Queued { attempt: 0 });
    }

    #[test]
    fn dispatch_runs_worker() {
        let (state, actions) = JobState::Queued { attempt: 2 }.on_event(JobEvent::Dispatch, &one_time());

        assert_eq!(state, JobState::Dispatched { attempt: 2 });
        assert_eq!(actions, vec![JobAction::RunWorker { attempt: 2 }]);
    }

    #[test]
    fn success_confirms_and_removes() {
        let (state, actions) = JobState::Dispatched { attempt: 0 }.on_event(
            JobEvent::Finished {
                result: WorkResult::Success,
            },
            &one_time(),
        );

        assert_eq!(state, JobState::Confirmed);
        assert!(state.is_terminal());
        assert_eq!(actions, vec![JobAction::Remove]);
    }

    #[test]
    fn retry_requeues_with_growing_delay() {
        let schedule = one_time();
        let (state, actions) = JobState::Dispatched { attempt: 0 }.on_event(
            JobEvent::Finished {
                result: WorkResult::Retry,
            },
            &schedule,
        );
        assert_eq!(state, JobState::Queued { attempt: 1 });
        assert_eq!(
            actions,
            vec![JobAction::Requeue {
                attempt: 1,
                delay: Duration::from_secs(2)
            }]
        );

        let (state, _) = state.on_event(JobEvent::Dispatch, &schedule);
        let (state, actions) = state.on_event(
            JobEvent::Finished {
                result: WorkResult::Retry,
            },
            &schedule,
        );
        assert_eq!(state, JobState::Queued { attempt: 2 });
        assert_eq!(
            actions,
            vec![JobAction::Requeue {
                attempt: 2,
                delay: Duration::from_secs(4)
            }]
        );
    }

    #[test]
    fn failure_removes_job() {
        let (state, actions) = JobState::Dispatched { attempt: 5 }.on_event(
            JobEvent::Finished {
                result: WorkResult::Failure,
            },
            &one_time(),
        );

        assert_eq!(state, JobState::Failed);
        assert_eq!(actions, vec![JobAction::Remove]);
    }

    #[test]
    fn periodic_success_repeats_after_interval() {
        let (state, actions) = JobState::Dispatched { attempt: 0 }.on_event(
            JobEvent::Finished {
                result: WorkResult::Success,
            },
            &periodic(),
        );

        assert_eq!(state, JobState::Queued { attempt: 0 });
        assert_eq!(
            actions,
            vec![JobAction::Requeue {
                attempt: 0,
                delay: Duration::from_secs(1800)
            }]
        );
    }

    #[test]
    fn periodic_retries_back_off_then_reset() {
        let schedule = periodic();
        let mut state = JobState::new();

        for (attempt, secs) in [(1, 2), (2, 4), (3, 8), (4, 16)] {
            let (dispatched, _) = state.on_event(JobEvent::Dispatch, &schedule);
            let (queued, actions) = dispatched.on_event(
                JobEvent::Finished {
                    result: WorkResult::Retry,
                },
                &schedule,
            );
            assert_eq!(queued, JobState::Queued { attempt });
            assert_eq!(
                actions,
                vec![JobAction::Requeue {
                    attempt,
                    delay: Duration::from_secs(secs)
                }]
            );
            state = queued;
        }

        let (dispatched, _) = state.on_event(JobEvent::Dispatch, &schedule);
        let (state, actions) = dispatched.on_event(
            JobEvent::Finished {
                result: WorkResult::Success,
            },
            &schedule,
        );
        assert_eq!(state, JobState::Queued { attempt: 0 });
        assert_eq!(
            actions,
            vec![JobAction::Requeue {
                attempt: 0,
                delay: Duration::from_secs(1800)
            }]
        );
    }

    #[test]
    fn periodic_retry_never_waits_past_period() {
        let schedule = JobSchedule::periodic(
            BackoffPolicy::exponential(Duration::from_secs(2)),
            Duration::from_secs(10),
        );
        let (_, actions) = JobState::Dispatched { attempt: 6 }.on_event(
            JobEvent::Finished {
                result: WorkResult::Retry,
            },
            &schedule,
        );

        assert_eq!(
            actions,
            vec![JobAction::Requeue {
                attempt: 7,
                delay: Duration::from_secs(10)
            }]
        );
    }

    #[test]
    fn periodic_failure_waits_for_next_period() {
        let (state, _) = JobState::Dispatched { attempt: 0 }.on_event(
            JobEvent::Finished {
                result: WorkResult::Failure,
            },
            &periodic(),
        );

        assert!(!state.is_terminal());
    }

    #[test]
    fn cancel_from_queued_and_dispatched() {
        for state in [
            JobState::Queued { attempt: 3 },
            JobState::Dispatched { attempt: 1 },
        ] {
            let (new_state, actions) = state.on_event(JobEvent::Cancel, &one_time());
            assert_eq!(new_state, JobState::Cancelled);
            assert_eq!(actions, vec![JobAction::Remove]);
        }
    }

    #[test]
    fn terminal_states_ignore_events() {
        for state in [JobState::Confirmed, JobState::Failed, JobState::Cancelled] {
            let (new_state, actions) = state.on_event(JobEvent::Dispatch, &one_time());
            assert_eq!(new_state, state);
            assert!(actions.is_empty());
        }
    }

    #[test]
    fn finish_without_dispatch_is_ignored() {
        let state = JobState::Queued { attempt: 0 };
        let (new_state, actions) = state.on_event(
            JobEvent::Finished {
                result: WorkResult::Success,
            },
            &one_time(),
        );

        assert_eq!(new_state, state);
        assert!(actions.is_empty());
    }
}
