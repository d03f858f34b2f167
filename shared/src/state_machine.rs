//! Polling Job State Machine
//!
//! Defines the lifecycle of one peripheral's polling job and the valid
//! transitions between its states.

use std::fmt;

/// Lifecycle state of a polling job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Session opened, startup probe not yet done
    Created,
    /// Startup probe done, timer not yet started
    Probed,
    /// Timer running, ticks are being executed
    Running,
    /// Job ended with the given process exit code
    Terminated { exit_code: i32 },
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Created => write!(f, "Created"),
            JobState::Probed => write!(f, "Probed"),
            JobState::Running => write!(f, "Running"),
            JobState::Terminated { exit_code } => write!(f, "Terminated({exit_code})"),
        }
    }
}

/// Events that drive a job through its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// Firmware and battery were read and logged
    ProbeCompleted,
    /// Repeating timer started
    TimerStarted,
    /// A tick completed (read + report)
    TickCompleted,
    /// A fault escaped the job
    Faulted { exit_code: i32 },
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid, job is now in this state
    Success(JobState),
    /// Transition was invalid from the current state
    Invalid { from: JobState, event: JobEvent },
}

/// Lifecycle tracker for one polling job
#[derive(Debug)]
pub struct JobLifecycle {
    current_state: JobState,
    ticks: u64,
}

impl Default for JobLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl JobLifecycle {
    /// Create a lifecycle in the Created state
    pub fn new() -> Self {
        Self {
            current_state: JobState::Created,
            ticks: 0,
        }
    }

    /// Get current state
    pub fn state(&self) -> JobState {
        self.current_state
    }

    /// Number of completed ticks
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Whether the job has ended
    pub fn is_terminated(&self) -> bool {
        matches!(self.current_state, JobState::Terminated { .. })
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: JobEvent) -> TransitionResult {
        match self.next_state(&event) {
            Some(state) => {
                if event == JobEvent::TickCompleted {
                    self.ticks += 1;
                }
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn next_state(&self, event: &JobEvent) -> Option<JobState> {
        use JobEvent::*;
        use JobState::*;

        match (self.current_state, event) {
            (Terminated { .. }, _) => None,

            // A fault ends the job from any live state
            (_, Faulted { exit_code }) => Some(Terminated {
                exit_code: *exit_code,
            }),

            (Created, ProbeCompleted) => Some(Probed),
            (Probed, TimerStarted) => Some(Running),
            (Running, TickCompleted) => Some(Running),

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let lifecycle = JobLifecycle::new();
        assert_eq!(lifecycle.state(), JobState::Created);
        assert_eq!(lifecycle.ticks(), 0);
    }

    #[test]
    fn test_normal_lifecycle() {
        let mut lifecycle = JobLifecycle::new();

        let result = lifecycle.process_event(JobEvent::ProbeCompleted);
        assert_eq!(result, TransitionResult::Success(JobState::Probed));

        let result = lifecycle.process_event(JobEvent::TimerStarted);
        assert_eq!(result, TransitionResult::Success(JobState::Running));

        lifecycle.process_event(JobEvent::TickCompleted);
        lifecycle.process_event(JobEvent::TickCompleted);
        assert_eq!(lifecycle.ticks(), 2);
        assert_eq!(lifecycle.state(), JobState::Running);

        let result = lifecycle.process_event(JobEvent::Faulted { exit_code: -1 });
        assert_eq!(
            result,
            TransitionResult::Success(JobState::Terminated { exit_code: -1 })
        );
        assert!(lifecycle.is_terminated());
    }

    #[test]
    fn test_fault_during_probe() {
        let mut lifecycle = JobLifecycle::new();
        let result = lifecycle.process_event(JobEvent::Faulted { exit_code: -1 });
        assert_eq!(
            result,
            TransitionResult::Success(JobState::Terminated { exit_code: -1 })
        );
    }

    #[test]
    fn test_cannot_tick_before_start() {
        let mut lifecycle = JobLifecycle::new();
        let result = lifecycle.process_event(JobEvent::TickCompleted);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(lifecycle.state(), JobState::Created);
        assert_eq!(lifecycle.ticks(), 0);
    }

    #[test]
    fn test_terminated_is_final() {
        let mut lifecycle = JobLifecycle::new();
        lifecycle.process_event(JobEvent::Faulted { exit_code: 130 });

        let result = lifecycle.process_event(JobEvent::TimerStarted);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        let result = lifecycle.process_event(JobEvent::Faulted { exit_code: -1 });
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(lifecycle.state(), JobState::Terminated { exit_code: 130 });
    }
}
