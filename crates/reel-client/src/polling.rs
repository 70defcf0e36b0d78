//! Fallback polling state machine.

/// Whether the fallback loop is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollingState {
    #[default]
    Idle,
    Polling,
}

/// A change of [`PollingState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started,
    Stopped,
}

/// Driven only by the number of outstanding jobs: polling while any are
/// outstanding, idle otherwise.
#[derive(Debug, Default)]
pub struct PollingMachine {
    state: PollingState,
}

impl PollingMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PollingState {
        self.state
    }

    pub fn is_polling(&self) -> bool {
        self.state == PollingState::Polling
    }

    /// Feed the current outstanding count; returns the transition, if any.
    pub fn observe(&mut self, outstanding: usize) -> Option<Transition> {
        match (self.state, outstanding > 0) {
            (PollingState::Idle, true) => {
                self.state = PollingState::Polling;
                Some(Transition::Started)
            }
            (PollingState::Polling, false) => {
                self.state = PollingState::Idle;
                Some(Transition::Stopped)
            }
            _ => None,
        }
    }
}
