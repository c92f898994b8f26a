use crate::registry::TaskStatus;
use contract_net::{AgentId, TaskId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("task id {0} is already registered")]
    DuplicateTaskId(TaskId),
    #[error("task {0} is not registered")]
    UnknownTask(TaskId),
    #[error("task {task} cannot move from {from} to {to}")]
    InvalidTransition {
        task: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error("task {requested} cannot be announced while {active} is still announced")]
    AlreadyAnnounced { active: TaskId, requested: TaskId },
    #[error("task {task} has reward {reward}; rewards must be finite and non-negative")]
    InvalidReward { task: TaskId, reward: f64 },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("agent {0} already has a session")]
    DuplicateAgent(AgentId),
    #[error("agent {0} has no session")]
    UnknownAgent(AgentId),
    #[error("agent {0} is still executing an awarded task")]
    AlreadyBusy(AgentId),
}

/// Invariant violations that abort an auction round. Expected runtime
/// conditions such as missing bids or timeouts are reported as round
/// outcomes instead.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuctionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Session(#[from] SessionError),
}
