//! Simulated grid agents that bid for, travel to and execute tasks announced
//! by the allocator.

pub mod agent;
pub mod config;
pub mod cost;
pub mod motion;
pub mod policy;

pub use agent::{AgentMachine, Mode};
pub use config::{AgentSpec, ExecutionProfile, SpecError};
pub use cost::ManhattanCost;
pub use motion::AxisOrder;
pub use policy::MarkupPolicy;
