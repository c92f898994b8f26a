use crate::metrics::Metrics;
use crate::state::AllocatorState;
use anyhow::Context;
use contract_net::{channel_link, AgentId};
use sim_agent::{AgentMachine, AgentSpec, ExecutionProfile};
use std::sync::Arc;
use std::time::Duration;
use tokio::{task::JoinHandle, time::sleep};

/// Requests an agent may have queued before it falls behind.
const MAILBOX_CAPACITY: usize = 16;

/// How long an agent gets to wind down after its link closes.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Manages the lifecycle of the in-process simulated agents.
pub struct AgentManager {
    agents: Vec<(AgentId, JoinHandle<()>)>,
    metrics: Arc<Metrics>,
}

impl AgentManager {
    /// Spawns one task per spec and registers its session, in spec order, so
    /// ties go to the first configured agent.
    ///
    /// When `profile` carries a seed, agent `i` rolls with `seed + i`.
    pub fn spawn_all(
        specs: &[AgentSpec],
        profile: &ExecutionProfile,
        initial_balance: f64,
        state: &mut AllocatorState,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let mut agents = Vec::with_capacity(specs.len());

        for (i, spec) in specs.iter().enumerate() {
            let (link, inbox) = channel_link(MAILBOX_CAPACITY);
            state
                .sessions
                .register(spec.id.clone(), spec.start, initial_balance, Box::new(link))
                .with_context(|| format!("Failed to register agent '{}'", spec.id))?;

            let profile = ExecutionProfile {
                seed: profile.seed.map(|seed| seed.wrapping_add(i as u64)),
                ..profile.clone()
            };
            tracing::info!(
                agent = %spec.id,
                start = %spec.start,
                markup = spec.markup,
                axis = %spec.axis_order,
                "Spawning agent"
            );
            let machine = AgentMachine::from_spec(spec, profile);
            agents.push((spec.id.clone(), tokio::spawn(machine.run(inbox))));
        }

        metrics.update_active_sessions(state.sessions.len());
        Ok(Self { agents, metrics })
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Removes every managed session, dropping its link, then waits for each
    /// agent task to finish. Tasks that outlive the grace period are aborted.
    pub async fn shutdown(self, state: &mut AllocatorState) {
        tracing::info!(agents = self.agents.len(), "Terminating all agents...");
        for (id, _) in &self.agents {
            if let Err(e) = state.sessions.deregister(id) {
                tracing::warn!(agent = %id, error = %e, "Agent had no session to remove.");
            }
        }
        self.metrics.update_active_sessions(state.sessions.len());

        for (id, mut handle) in self.agents {
            tokio::select! {
                _ = sleep(SHUTDOWN_GRACE) => {
                    tracing::warn!(agent = %id, "Agent did not stop in time. Aborting.");
                    handle.abort();
                }
                res = &mut handle => match res {
                    Ok(()) => tracing::debug!(agent = %id, "Agent stopped."),
                    Err(e) => tracing::error!(agent = %id, error = %e, "Agent task failed."),
                }
            }
        }

        tracing::info!("All agents terminated.");
    }
}
