use crate::message::TaskAnnouncement;
use crate::types::{Bid, GridPos};

/// Movement cost between two grid cells. Must be deterministic.
pub trait CostModel: Send + Sync {
    fn cost(&self, from: GridPos, to: GridPos) -> f64;
}

/// How an agent prices an announced task.
///
/// Implementations must be pure in `(task, self_position)`, must return well
/// within the allocator's bid timeout, and must never offer a negative or
/// non-finite amount. The allocator only compares offers against each other,
/// so the absolute scale is up to the policy.
pub trait BiddingPolicy: Send + Sync {
    fn compute_bid(&self, task: &TaskAnnouncement, self_position: GridPos) -> Bid;
}

impl<C: CostModel + ?Sized> CostModel for Box<C> {
    fn cost(&self, from: GridPos, to: GridPos) -> f64 {
        (**self).cost(from, to)
    }
}

impl<P: BiddingPolicy + ?Sized> BiddingPolicy for Box<P> {
    fn compute_bid(&self, task: &TaskAnnouncement, self_position: GridPos) -> Bid {
        (**self).compute_bid(task, self_position)
    }
}
