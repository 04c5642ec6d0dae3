use crate::perception::classifier::ObstacleInfo;

/// Lifecycle states of the runner's control loop.
#[derive(Debug, Clone)]
pub enum RunnerState {
    /// Sensing for actionable candidates.
    Searching,
    /// A stuck condition was declared; running a recovery strategy.
    StuckRecovery,
    /// A long-travel obstacle is selected but its cooldown is still active.
    LongTravelWait,
    /// A candidate was chosen; clicking and verifying.
    Interacting {
        obstacle: ObstacleInfo,
        /// All candidates from the same detection pass.
        candidates: Vec<ObstacleInfo>,
    },
    /// The run ended; `reason` is the human-readable cause.
    Terminated { reason: String },
}

impl RunnerState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, RunnerState::Terminated { .. })
    }
}

/// Events the caller can send into a running loop.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    Stop,
}
