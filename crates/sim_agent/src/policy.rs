use contract_net::{Bid, BiddingPolicy, CostModel, GridPos, TaskAnnouncement};

/// Bids the travel cost to the task plus a fixed markup.
#[derive(Debug, Clone)]
pub struct MarkupPolicy<C> {
    cost_model: C,
    markup: f64,
}

impl<C: CostModel> MarkupPolicy<C> {
    pub fn new(cost_model: C, markup: f64) -> Self {
        Self { cost_model, markup }
    }
}

impl<C: CostModel> BiddingPolicy for MarkupPolicy<C> {
    fn compute_bid(&self, task: &TaskAnnouncement, self_position: GridPos) -> Bid {
        let travel = self.cost_model.cost(self_position, task.position);
        let value = travel + self.markup;
        if value.is_finite() && value >= 0.0 {
            Bid::Offer(value)
        } else {
            Bid::Decline
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::ManhattanCost;
    use contract_net::TaskId;

    fn task_at(x: i32, y: i32) -> TaskAnnouncement {
        TaskAnnouncement {
            task_id: TaskId(1),
            position: GridPos::new(x, y),
            description: "Pick".into(),
            reward: 5.0,
        }
    }

    fn offer(bid: Bid) -> f64 {
        match bid {
            Bid::Offer(v) => v,
            Bid::Decline => panic!("expected an offer"),
        }
    }

    #[test]
    fn bid_is_travel_cost_plus_markup() {
        let r1 = MarkupPolicy::new(ManhattanCost::default(), 0.5);
        let r2 = MarkupPolicy::new(ManhattanCost::default(), 0.3);
        let task = task_at(2, 0);

        let r1_bid = offer(r1.compute_bid(&task, GridPos::new(0, 0)));
        let r2_bid = offer(r2.compute_bid(&task, GridPos::new(9, 0)));

        assert!((r1_bid - 0.7).abs() < 1e-9);
        assert!((r2_bid - 1.0).abs() < 1e-9);
        assert!(r1_bid < r2_bid);
    }

    #[test]
    fn bid_depends_only_on_task_and_position() {
        let policy = MarkupPolicy::new(ManhattanCost::default(), 0.5);
        let task = task_at(5, 5);
        let first = policy.compute_bid(&task, GridPos::new(1, 1));
        for _ in 0..10 {
            assert_eq!(policy.compute_bid(&task, GridPos::new(1, 1)), first);
        }
    }

    #[test]
    fn negative_markup_below_zero_declines() {
        let policy = MarkupPolicy::new(ManhattanCost::default(), -1.0);
        assert_eq!(policy.compute_bid(&task_at(1, 0), GridPos::ORIGIN), Bid::Decline);
    }
}
