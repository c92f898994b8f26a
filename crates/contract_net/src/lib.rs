//! Shared vocabulary between the task allocator and the agents bidding for
//! its tasks: identifiers, grid positions, bids, the protocol messages, the
//! bidding contract and the request/response link that carries them.

pub mod bidding;
pub mod message;
pub mod transport;
pub mod types;

pub use bidding::{BiddingPolicy, CostModel};
pub use message::{Message, MessageKind, TaskAnnouncement};
pub use transport::{channel_link, AgentLink, ChannelLink, Envelope, LinkError};
pub use types::{AgentId, Bid, GridPos, TaskId};
