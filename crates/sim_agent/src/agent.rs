use crate::config::{AgentSpec, ExecutionProfile};
use crate::cost::ManhattanCost;
use crate::motion::AxisOrder;
use crate::policy::MarkupPolicy;
use contract_net::{
    AgentId, Bid, BiddingPolicy, CostModel, Envelope, GridPos, Message, TaskAnnouncement, TaskId,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Moving,
    Executing,
}

/// One simulated agent: answers announcements with bids and walks to, then
/// executes, the tasks it is awarded.
pub struct AgentMachine {
    pub id: AgentId,
    pub position: GridPos,
    /// Private funds. Pays for movement, collects rewards.
    pub wallet: f64,
    pub mode: Mode,
    policy: Box<dyn BiddingPolicy>,
    cost_model: Box<dyn CostModel>,
    axis_order: AxisOrder,
    profile: ExecutionProfile,
    /// Announcements this agent bid on and has not yet heard back about.
    open_offers: HashMap<TaskId, TaskAnnouncement>,
    rng: StdRng,
}

impl AgentMachine {
    pub fn new(
        id: AgentId,
        position: GridPos,
        policy: Box<dyn BiddingPolicy>,
        cost_model: Box<dyn CostModel>,
        axis_order: AxisOrder,
        profile: ExecutionProfile,
    ) -> Self {
        let rng = match profile.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            id,
            position,
            wallet: profile.wallet,
            mode: Mode::Idle,
            policy,
            cost_model,
            axis_order,
            profile,
            open_offers: HashMap::new(),
            rng,
        }
    }

    /// Builds the stock markup-bidding agent described by `spec`.
    pub fn from_spec(spec: &AgentSpec, profile: ExecutionProfile) -> Self {
        let cost = ManhattanCost::new(profile.per_step_cost);
        Self::new(
            spec.id.clone(),
            spec.start,
            Box::new(MarkupPolicy::new(cost, spec.markup)),
            Box::new(cost),
            spec.axis_order,
            profile,
        )
    }

    /// Serves allocator requests until the link is dropped.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<Envelope>) {
        tracing::info!(
            agent = %self.id,
            position = %self.position,
            wallet = self.wallet,
            "Agent online"
        );

        while let Some(Envelope { message, reply }) = inbox.recv().await {
            let response = self.handle(message).await;
            match (response, reply) {
                (Some(response), Some(reply)) => {
                    if reply.send(response).is_err() {
                        tracing::debug!(agent = %self.id, "Allocator stopped waiting for reply");
                    }
                }
                (Some(response), None) => {
                    tracing::warn!(
                        agent = %self.id,
                        kind = %response.kind(),
                        "Reply produced for a notification; dropping"
                    );
                }
                (None, Some(_)) => {
                    tracing::warn!(agent = %self.id, "Request left unanswered");
                }
                (None, None) => {}
            }
        }

        tracing::info!(
            agent = %self.id,
            wallet = self.wallet,
            position = %self.position,
            "Agent link closed, shutting down"
        );
    }

    /// Reacts to one allocator message, returning the reply if the message
    /// calls for one.
    pub async fn handle(&mut self, message: Message) -> Option<Message> {
        if let Some(addressee) = message.agent().filter(|a| **a != self.id) {
            tracing::warn!(
                agent = %self.id,
                addressed_to = %addressee,
                kind = %message.kind(),
                "Message addressed to another agent"
            );
        }

        match message {
            Message::AnnounceTask(task) => {
                // Rounds never overlap, so offers from earlier rounds are dead.
                self.open_offers.clear();
                let bid = self.bid_for(&task);
                let task_id = task.task_id;
                tracing::info!(agent = %self.id, task_id = %task_id, bid = %bid, "Bidding");
                if matches!(bid, Bid::Offer(_)) {
                    self.open_offers.insert(task_id, task);
                }
                Some(Message::Bid {
                    task_id,
                    agent: self.id.clone(),
                    bid,
                })
            }
            Message::AwardTask { task_id, .. } => Some(self.execute(task_id).await),
            Message::RejectTask { task_id, .. } => {
                tracing::debug!(agent = %self.id, task_id = %task_id, "Bid rejected");
                self.open_offers.remove(&task_id);
                None
            }
            other @ (Message::Bid { .. } | Message::ReportCompletion { .. }) => {
                tracing::warn!(
                    agent = %self.id,
                    kind = %other.kind(),
                    "Unexpected message from allocator"
                );
                None
            }
        }
    }

    /// Prices a task with the agent's policy, declining what the wallet
    /// cannot cover.
    pub fn bid_for(&self, task: &TaskAnnouncement) -> Bid {
        match self.policy.compute_bid(task, self.position) {
            Bid::Offer(v) if v > self.wallet => Bid::Decline,
            bid => bid,
        }
    }

    async fn execute(&mut self, task_id: TaskId) -> Message {
        let Some(task) = self.open_offers.remove(&task_id) else {
            tracing::warn!(
                agent = %self.id,
                task_id = %task_id,
                "Awarded a task this agent never bid on"
            );
            return self.report(task_id, false);
        };

        self.mode = Mode::Moving;
        tracing::info!(
            agent = %self.id,
            task_id = %task_id,
            from = %self.position,
            to = %task.position,
            "Moving to task"
        );
        for step in self.axis_order.path(self.position, task.position) {
            sleep(self.profile.step_delay).await;
            self.wallet -= self.cost_model.cost(self.position, step);
            self.position = step;
            tracing::debug!(
                agent = %self.id,
                position = %self.position,
                wallet = self.wallet,
                "Step"
            );
        }

        self.mode = Mode::Executing;
        tracing::info!(
            agent = %self.id,
            task_id = %task_id,
            description = %task.description,
            "Executing task"
        );
        sleep(self.profile.execute_for).await;

        let success = self.rng.gen::<f64>() >= self.profile.failure_rate;
        if success {
            self.wallet += task.reward;
            tracing::info!(agent = %self.id, task_id = %task_id, wallet = self.wallet, "Task done");
        } else {
            tracing::warn!(agent = %self.id, task_id = %task_id, "Task execution failed");
        }
        self.mode = Mode::Idle;
        self.report(task_id, success)
    }

    fn report(&self, task_id: TaskId, success: bool) -> Message {
        Message::ReportCompletion {
            task_id,
            agent: self.id.clone(),
            success,
            position: self.position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract_net::{channel_link, AgentLink};
    use std::time::Duration;

    fn profile() -> ExecutionProfile {
        ExecutionProfile {
            step_delay: Duration::from_millis(100),
            execute_for: Duration::from_millis(500),
            failure_rate: 0.0,
            per_step_cost: 0.1,
            wallet: 10.0,
            seed: Some(7),
        }
    }

    fn announce(id: u64, x: i32, y: i32) -> Message {
        Message::AnnounceTask(TaskAnnouncement {
            task_id: TaskId(id),
            position: GridPos::new(x, y),
            description: "Inspect".into(),
            reward: 5.0,
        })
    }

    fn r1() -> AgentMachine {
        AgentMachine::from_spec(&AgentSpec::default_pair()[0], profile())
    }

    #[tokio::test(start_paused = true)]
    async fn bids_then_executes_award() {
        let mut agent = r1();

        let bid = agent.handle(announce(1, 2, 0)).await.unwrap();
        let Message::Bid { bid: Bid::Offer(v), .. } = bid else {
            panic!("expected an offer, got {bid:?}");
        };
        assert!((v - 0.7).abs() < 1e-9);

        let report = agent
            .handle(Message::AwardTask {
                task_id: TaskId(1),
                agent: AgentId::from("R1"),
            })
            .await
            .unwrap();
        assert_eq!(
            report,
            Message::ReportCompletion {
                task_id: TaskId(1),
                agent: AgentId::from("R1"),
                success: true,
                position: GridPos::new(2, 0),
            }
        );
        assert_eq!(agent.position, GridPos::new(2, 0));
        assert_eq!(agent.mode, Mode::Idle);
        assert!((agent.wallet - 14.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn declines_what_the_wallet_cannot_cover() {
        let mut p = profile();
        p.wallet = 0.5;
        let agent = AgentMachine::from_spec(&AgentSpec::default_pair()[0], p);
        let far = TaskAnnouncement {
            task_id: TaskId(1),
            position: GridPos::new(9, 9),
            description: "Nav".into(),
            reward: 5.0,
        };
        let near = TaskAnnouncement {
            position: GridPos::ORIGIN,
            ..far.clone()
        };
        assert_eq!(agent.bid_for(&far), Bid::Decline);
        assert_eq!(agent.bid_for(&near), Bid::Offer(0.5));
    }

    #[tokio::test(start_paused = true)]
    async fn certain_failure_reports_unsuccessful_without_reward() {
        let mut p = profile();
        p.failure_rate = 1.0;
        let mut agent = AgentMachine::from_spec(&AgentSpec::default_pair()[0], p);
        agent.handle(announce(3, 1, 0)).await;
        let report = agent
            .handle(Message::AwardTask {
                task_id: TaskId(3),
                agent: AgentId::from("R1"),
            })
            .await
            .unwrap();
        assert!(matches!(report, Message::ReportCompletion { success: false, .. }));
        assert!((agent.wallet - 9.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn award_for_unknown_task_fails_immediately() {
        let mut agent = r1();
        let report = agent
            .handle(Message::AwardTask {
                task_id: TaskId(42),
                agent: AgentId::from("R1"),
            })
            .await
            .unwrap();
        assert!(matches!(
            report,
            Message::ReportCompletion { success: false, position, .. }
                if position == GridPos::ORIGIN
        ));
    }

    #[tokio::test]
    async fn new_announcement_drops_offers_from_earlier_rounds() {
        let mut agent = r1();
        agent.handle(announce(1, 2, 0)).await;
        agent.handle(announce(2, 3, 0)).await;
        assert_eq!(agent.open_offers.len(), 1);
        assert!(agent.open_offers.contains_key(&TaskId(2)));

        let late_award = agent
            .handle(Message::AwardTask {
                task_id: TaskId(1),
                agent: AgentId::from("R1"),
            })
            .await
            .unwrap();
        assert!(matches!(
            late_award,
            Message::ReportCompletion { task_id: TaskId(1), success: false, .. }
        ));
        assert_eq!(agent.position, GridPos::ORIGIN);
    }

    #[tokio::test]
    async fn rejection_needs_no_reply() {
        let mut agent = r1();
        agent.handle(announce(5, 1, 1)).await;
        let reply = agent
            .handle(Message::RejectTask {
                task_id: TaskId(5),
                agent: AgentId::from("R1"),
            })
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_serves_link_until_dropped() {
        let (link, rx) = channel_link(8);
        let handle = tokio::spawn(r1().run(rx));

        let bid = link.request(announce(2, 0, 3)).await.unwrap();
        assert_eq!(bid.task_id(), TaskId(2));
        let report = link
            .request(Message::AwardTask {
                task_id: TaskId(2),
                agent: AgentId::from("R1"),
            })
            .await
            .unwrap();
        assert!(matches!(report, Message::ReportCompletion { success: true, .. }));

        drop(link);
        handle.await.unwrap();
    }
}
