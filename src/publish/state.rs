use std::fmt;

use serde::{Deserialize, Serialize};

/// States of a single dispatch.
///
/// Each dispatch flows through: IDLE → [SCHEDULED_WAIT] → DISPATCHING → SUCCEEDED | FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchState {
    Idle,
    ScheduledWait,
    Dispatching,
    Succeeded,
    Failed,
}

impl DispatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DispatchState::Succeeded | DispatchState::Failed)
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchState::Idle => write!(f, "IDLE"),
            DispatchState::ScheduledWait => write!(f, "SCHEDULED_WAIT"),
            DispatchState::Dispatching => write!(f, "DISPATCHING"),
            DispatchState::Succeeded => write!(f, "SUCCEEDED"),
            DispatchState::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEvent {
    /// A future publish time was given.
    Schedule,
    /// Start talking to a channel.
    Begin,
    Succeed,
    Fail,
}

/// The result of feeding an event to the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Next(DispatchState),
    /// The event is not valid in the current state; nothing changed.
    Rejected { from: DispatchState, event: DispatchEvent },
}

/// Tracks one dispatch and the states it passed through.
#[derive(Debug, Clone)]
pub struct DispatchMachine {
    state: DispatchState,
    history: Vec<DispatchState>,
}

impl Default for DispatchMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchMachine {
    pub fn new() -> Self {
        Self {
            state: DispatchState::Idle,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Every state visited so far, current state last.
    pub fn transitions(&self) -> Vec<DispatchState> {
        let mut all = self.history.clone();
        all.push(self.state);
        all
    }

    /// Computes and applies the next transition.
    ///
    /// - `Idle` accepts `Schedule` and `Begin`.
    /// - `ScheduledWait` accepts only `Begin`.
    /// - `Dispatching` accepts `Succeed` and `Fail`.
    /// - Terminal states accept nothing.
    pub fn apply(&mut self, event: DispatchEvent) -> Transition {
        let next = match (self.state, event) {
            (DispatchState::Idle, DispatchEvent::Schedule) => Some(DispatchState::ScheduledWait),
            (DispatchState::Idle | DispatchState::ScheduledWait, DispatchEvent::Begin) => {
                Some(DispatchState::Dispatching)
            }
            (DispatchState::Dispatching, DispatchEvent::Succeed) => Some(DispatchState::Succeeded),
            (DispatchState::Dispatching, DispatchEvent::Fail) => Some(DispatchState::Failed),
            _ => None,
        };

        match next {
            Some(state) => {
                self.history.push(self.state);
                self.state = state;
                Transition::Next(state)
            }
            None => Transition::Rejected {
                from: self.state,
                event,
            },
        }
    }
}
