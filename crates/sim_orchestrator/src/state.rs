use crate::error::{AuctionError, RegistryError, SessionError};
use crate::registry::TaskRegistry;
use crate::session::SessionTable;
use contract_net::{AgentId, GridPos, TaskId};

/// The whole allocation world: tasks and the sessions of the agents
/// competing for them.
///
/// Owned by the allocator and lent to the auctioneer one round at a time.
/// Session fields only change through the transitions below.
#[derive(Debug)]
pub struct AllocatorState {
    pub registry: TaskRegistry,
    pub sessions: SessionTable,
}

impl AllocatorState {
    pub fn new(default_reward: f64) -> Self {
        Self {
            registry: TaskRegistry::new(default_reward),
            sessions: SessionTable::new(),
        }
    }

    /// Hands an announced task to `agent` and takes the agent off the market.
    pub fn award(&mut self, task: TaskId, agent: &AgentId) -> Result<(), AuctionError> {
        // A refused award leaves both the task and the session untouched.
        let session = self
            .sessions
            .get(agent)
            .ok_or_else(|| SessionError::UnknownAgent(agent.clone()))?;
        if !session.available {
            return Err(SessionError::AlreadyBusy(agent.clone()).into());
        }
        self.registry.mark_awarded(task, agent)?;
        self.sessions.mark_busy(agent)?;
        Ok(())
    }

    /// Settles a successful task: pays the reward, records where the agent
    /// ended up and frees it. Returns the reward paid.
    pub fn complete(
        &mut self,
        task: TaskId,
        agent: &AgentId,
        position: GridPos,
    ) -> Result<f64, AuctionError> {
        self.registry.mark_completed(task)?;
        let reward = self
            .registry
            .get(task)
            .map(|t| t.reward)
            .ok_or(RegistryError::UnknownTask(task))?;
        self.sessions.credit(agent, reward)?;
        self.sessions.move_to(agent, position)?;
        self.sessions.release(agent)?;
        Ok(reward)
    }

    /// Settles a failed task. The agent is freed; its position only changes
    /// if it reported one.
    pub fn fail(
        &mut self,
        task: TaskId,
        agent: &AgentId,
        position: Option<GridPos>,
    ) -> Result<(), AuctionError> {
        self.registry.mark_failed(task)?;
        if let Some(position) = position {
            self.sessions.move_to(agent, position)?;
        }
        self.sessions.release(agent)?;
        Ok(())
    }
}
