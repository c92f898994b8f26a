use crate::error::SessionError;
use contract_net::{AgentId, AgentLink, GridPos};

/// Allocator-side record of one connected agent.
pub struct AgentSession {
    pub id: AgentId,
    pub position: GridPos,
    pub balance: f64,
    /// False while the agent executes an awarded task.
    pub available: bool,
    registration: u64,
    link: Box<dyn AgentLink>,
}

impl AgentSession {
    pub fn link(&self) -> &dyn AgentLink {
        self.link.as_ref()
    }

    /// Position in registration order. Lower registered earlier and wins ties.
    pub fn registration(&self) -> u64 {
        self.registration
    }
}

impl std::fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("balance", &self.balance)
            .field("available", &self.available)
            .field("registration", &self.registration)
            .finish_non_exhaustive()
    }
}

/// Every registered session, kept in registration order.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: Vec<AgentSession>,
    next_registration: u64,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        id: AgentId,
        position: GridPos,
        balance: f64,
        link: Box<dyn AgentLink>,
    ) -> Result<(), SessionError> {
        if self.get(&id).is_some() {
            return Err(SessionError::DuplicateAgent(id));
        }
        let registration = self.next_registration;
        self.next_registration += 1;
        tracing::info!(
            agent = %id,
            registration,
            position = %position,
            balance,
            "Agent session registered"
        );
        self.sessions.push(AgentSession {
            id,
            position,
            balance,
            available: true,
            registration,
            link,
        });
        Ok(())
    }

    /// Removes a session, dropping its link.
    pub fn deregister(&mut self, id: &AgentId) -> Result<AgentSession, SessionError> {
        let i = self.position_of(id)?;
        let session = self.sessions.remove(i);
        tracing::info!(agent = %id, balance = session.balance, "Agent session removed");
        Ok(session)
    }

    pub fn get(&self, id: &AgentId) -> Option<&AgentSession> {
        self.sessions.iter().find(|s| &s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentSession> {
        self.sessions.iter()
    }

    /// Sessions free to bid, earliest registered first.
    pub fn available(&self) -> impl Iterator<Item = &AgentSession> {
        self.sessions.iter().filter(|s| s.available)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn mark_busy(&mut self, id: &AgentId) -> Result<(), SessionError> {
        let session = self.get_mut(id)?;
        if !session.available {
            return Err(SessionError::AlreadyBusy(id.clone()));
        }
        session.available = false;
        Ok(())
    }

    pub fn release(&mut self, id: &AgentId) -> Result<(), SessionError> {
        self.get_mut(id)?.available = true;
        Ok(())
    }

    /// Adds a reward to the session balance and returns the new balance.
    pub fn credit(&mut self, id: &AgentId, amount: f64) -> Result<f64, SessionError> {
        debug_assert!(amount >= 0.0, "balances never decrease");
        let session = self.get_mut(id)?;
        session.balance += amount;
        Ok(session.balance)
    }

    pub fn move_to(&mut self, id: &AgentId, position: GridPos) -> Result<(), SessionError> {
        self.get_mut(id)?.position = position;
        Ok(())
    }

    fn get_mut(&mut self, id: &AgentId) -> Result<&mut AgentSession, SessionError> {
        self.sessions
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| SessionError::UnknownAgent(id.clone()))
    }

    fn position_of(&self, id: &AgentId) -> Result<usize, SessionError> {
        self.sessions
            .iter()
            .position(|s| &s.id == id)
            .ok_or_else(|| SessionError::UnknownAgent(id.clone()))
    }
}
