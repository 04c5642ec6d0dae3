pub mod agent_engine;
pub mod config;
pub mod errors;
pub mod executor;
pub mod learning;
pub mod perception;
pub mod recovery;
pub mod selection;

#[cfg(test)]
pub(crate) mod testkit;

use tokio::sync::{mpsc, watch};

use crate::agent_engine::engine::RunnerEngine;
use crate::agent_engine::state::AgentEvent;
use crate::config::RunnerConfig;
use crate::perception::traits::Perception;

/// Handle given to the embedding application: send events into the runner
/// loop and watch its progress through the time budget.
pub struct AgentHandle {
    pub tx: mpsc::Sender<AgentEvent>,
    pub progress: watch::Receiver<f64>,
}

impl AgentHandle {
    /// Request a cooperative stop. The loop finishes its current step,
    /// flushes the learning store, and terminates.
    pub async fn stop(&self) -> bool {
        self.tx.send(AgentEvent::Stop).await.is_ok()
    }
}

/// Build a runner over the given perception adapter, paired with the handle
/// the caller keeps.
pub fn build_runner<P: Perception>(
    perception: P,
    config: RunnerConfig,
) -> (RunnerEngine<P>, AgentHandle) {
    let (tx, rx) = mpsc::channel::<AgentEvent>(32);
    let (progress_tx, progress_rx) = watch::channel(0.0);
    let engine = RunnerEngine::new(perception, config, rx, progress_tx);
    let handle = AgentHandle {
        tx,
        progress: progress_rx,
    };
    (engine, handle)
}

/// Install the tracing subscriber. `RUST_LOG` overrides the default level.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
