use crate::auctioneer::{Auctioneer, RoundOutcome, RoundPhase};
use crate::error::AuctionError;
use crate::registry::TaskStatus;
use crate::state::AllocatorState;
use chrono::{DateTime, Utc};
use contract_net::{AgentId, GridPos, TaskId};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

/// Policy knobs of the allocation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Consecutive no-bidder rounds on one task before the loop gives up.
    pub max_no_bidder_rounds: u32,
    /// Pause before re-announcing a task that drew no bids.
    pub no_bidder_retry_delay: Duration,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_no_bidder_rounds: 3,
            no_bidder_retry_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// Every task reached a terminal state.
    Exhausted,
    /// A task kept drawing no bids; it and everything behind it stay pending.
    Stalled { task: TaskId },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSummary {
    pub id: AgentId,
    pub position: GridPos,
    pub balance: f64,
}

/// Final account of an allocation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationSummary {
    pub finished_at: DateTime<Utc>,
    pub stop: StopReason,
    pub rounds: u32,
    pub completed: Vec<TaskId>,
    pub failed: Vec<TaskId>,
    /// Tasks still pending when the loop stopped.
    pub unallocated: Vec<TaskId>,
    pub agents: Vec<AgentSummary>,
}

/// Drives auction rounds until no pending task is left.
pub struct Allocator {
    state: AllocatorState,
    auctioneer: Auctioneer,
    config: AllocatorConfig,
}

impl Allocator {
    pub fn new(state: AllocatorState, auctioneer: Auctioneer, config: AllocatorConfig) -> Self {
        Self {
            state,
            auctioneer,
            config,
        }
    }

    pub fn state_mut(&mut self) -> &mut AllocatorState {
        &mut self.state
    }

    /// Runs rounds back to back until the registry is drained, a task stalls,
    /// or `shutdown` fires. A round in progress is always finished first.
    ///
    /// Dropping the shutdown sender counts as a shutdown signal.
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<AllocationSummary, AuctionError> {
        let mut rounds = 0u32;
        let mut no_bidder_streak: Option<(TaskId, u32)> = None;

        tracing::info!(
            tasks = self.state.registry.len(),
            sessions = self.state.sessions.len(),
            "Starting allocation"
        );

        let stop = loop {
            if shutdown_requested(&shutdown) {
                break StopReason::Shutdown;
            }

            let outcome = self.auctioneer.run_round(&mut self.state).await?;
            debug_assert!(self.state.registry.announced().is_none());
            debug_assert_eq!(self.auctioneer.phase(), RoundPhase::Idle);
            if outcome != RoundOutcome::Empty {
                rounds += 1;
            }

            match outcome {
                RoundOutcome::Empty => {
                    debug_assert!(self.state.registry.is_settled());
                    break StopReason::Exhausted;
                }
                RoundOutcome::NoBidders { task, announced_to } => {
                    let streak = match no_bidder_streak {
                        Some((t, n)) if t == task => n + 1,
                        _ => 1,
                    };
                    no_bidder_streak = Some((task, streak));
                    tracing::warn!(
                        task_id = %task,
                        announced_to,
                        streak,
                        "Round ended without bidders"
                    );

                    if streak >= self.config.max_no_bidder_rounds {
                        tracing::error!(
                            task_id = %task,
                            streak,
                            "Task keeps drawing no bids; stopping allocation"
                        );
                        break StopReason::Stalled { task };
                    }
                    tokio::select! {
                        _ = sleep(self.config.no_bidder_retry_delay) => {}
                        _ = shutdown.changed() => break StopReason::Shutdown,
                    }
                }
                RoundOutcome::Completed { task, winner, bid, reward } => {
                    no_bidder_streak = None;
                    tracing::info!(
                        task_id = %task,
                        winner = %winner,
                        bid,
                        reward,
                        "Round closed: completed"
                    );
                }
                RoundOutcome::Failed { task, winner, bid, cause } => {
                    no_bidder_streak = None;
                    tracing::warn!(
                        task_id = %task,
                        winner = %winner,
                        bid,
                        cause = ?cause,
                        "Round closed: failed"
                    );
                }
            }
        };

        let summary = self.summary(stop, rounds);
        tracing::info!(
            stop = ?summary.stop,
            rounds,
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            unallocated = summary.unallocated.len(),
            finish_order = ?self.state.registry.archived(),
            "Allocation finished"
        );
        Ok(summary)
    }

    pub fn summary(&self, stop: StopReason, rounds: u32) -> AllocationSummary {
        let registry = &self.state.registry;
        let with_status = |status: TaskStatus| -> Vec<TaskId> {
            registry
                .tasks()
                .iter()
                .filter(|t| t.status == status)
                .map(|t| t.id)
                .collect()
        };
        AllocationSummary {
            finished_at: Utc::now(),
            stop,
            rounds,
            completed: with_status(TaskStatus::Completed),
            failed: with_status(TaskStatus::Failed),
            unallocated: with_status(TaskStatus::Pending),
            agents: self
                .state
                .sessions
                .iter()
                .map(|s| AgentSummary {
                    id: s.id.clone(),
                    position: s.position,
                    balance: s.balance,
                })
                .collect(),
        }
    }
}

fn shutdown_requested(shutdown: &watch::Receiver<()>) -> bool {
    // A closed channel means the sender was dropped.
    shutdown.has_changed().unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auctioneer::AuctionTimeouts;
    use crate::metrics::Metrics;
    use crate::registry::TaskSpec;
    use contract_net::channel_link;
    use sim_agent::{AgentMachine, AgentSpec, ExecutionProfile};
    use std::sync::Arc;
    use tokio::task::JoinHandle;

    fn profile() -> ExecutionProfile {
        ExecutionProfile {
            step_delay: Duration::from_millis(100),
            execute_for: Duration::from_millis(300),
            failure_rate: 0.0,
            per_step_cost: 0.1,
            wallet: 10.0,
            seed: Some(1),
        }
    }

    fn allocator_with(
        specs: Vec<TaskSpec>,
        agents: &[AgentSpec],
        profile: ExecutionProfile,
    ) -> (Allocator, Vec<JoinHandle<()>>) {
        let mut state = AllocatorState::new(5.0);
        state.registry.create_tasks(specs).unwrap();
        let mut handles = Vec::new();
        for spec in agents {
            let (link, rx) = channel_link(8);
            handles.push(tokio::spawn(
                AgentMachine::from_spec(spec, profile.clone()).run(rx),
            ));
            state
                .sessions
                .register(spec.id.clone(), spec.start, 10.0, Box::new(link))
                .unwrap();
        }
        let auctioneer = Auctioneer::new(
            AuctionTimeouts {
                bid: Duration::from_secs(1),
                completion: Duration::from_secs(30),
            },
            Arc::new(Metrics::new().unwrap()),
        );
        let config = AllocatorConfig {
            max_no_bidder_rounds: 2,
            no_bidder_retry_delay: Duration::from_millis(50),
        };
        (Allocator::new(state, auctioneer, config), handles)
    }

    fn grid_tasks() -> Vec<TaskSpec> {
        vec![
            TaskSpec::new(1, GridPos::new(2, 0), "Pick"),
            TaskSpec::new(2, GridPos::new(8, 3), "Nav"),
            TaskSpec::new(3, GridPos::new(4, 7), "Inspect"),
            TaskSpec::new(4, GridPos::new(1, 9), "Assembly"),
            TaskSpec::new(5, GridPos::new(9, 9), "Check"),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn reference_pair_allocates_every_task() {
        let (mut allocator, handles) =
            allocator_with(grid_tasks(), &AgentSpec::default_pair(), profile());
        let (_tx, rx) = watch::channel(());

        let summary = allocator.run(rx).await.unwrap();

        assert_eq!(summary.stop, StopReason::Exhausted);
        assert_eq!(summary.rounds, 5);
        assert_eq!(summary.completed.len(), 5);
        assert!(summary.failed.is_empty());
        assert!(summary.unallocated.is_empty());

        let registry = &allocator.state.registry;
        assert!(registry.tasks().iter().all(|t| t.status.is_terminal()));
        assert!(registry.is_settled());

        // Nearest robot takes the first task: R1 at (0,0) bids 0.7 against R2's 1.0.
        assert_eq!(
            registry.get(TaskId(1)).unwrap().awarded_to,
            Some(AgentId::from("R1"))
        );

        let total: f64 = summary.agents.iter().map(|a| a.balance).sum();
        assert!((total - (20.0 + 5.0 * 5.0)).abs() < 1e-9);

        drop(allocator);
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn balance_grows_by_reward_per_completed_task() {
        let mut p = profile();
        p.failure_rate = 0.5;
        p.seed = Some(99);
        let (mut allocator, _handles) =
            allocator_with(grid_tasks(), &AgentSpec::default_pair(), p);
        let (_tx, rx) = watch::channel(());

        let summary = allocator.run(rx).await.unwrap();
        assert_eq!(summary.completed.len() + summary.failed.len(), 5);

        let registry = &allocator.state.registry;
        for agent in &summary.agents {
            let won = registry
                .tasks()
                .iter()
                .filter(|t| {
                    t.status == TaskStatus::Completed && t.awarded_to.as_ref() == Some(&agent.id)
                })
                .count();
            assert!((agent.balance - (10.0 + 5.0 * won as f64)).abs() < 1e-9);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalls_without_sessions_and_keeps_tasks_pending() {
        let (mut allocator, _handles) = allocator_with(grid_tasks(), &[], profile());
        let (_tx, rx) = watch::channel(());

        let summary = allocator.run(rx).await.unwrap();

        assert_eq!(summary.stop, StopReason::Stalled { task: TaskId(1) });
        assert_eq!(summary.rounds, 2);
        let all: Vec<_> = (1..=5).map(TaskId).collect();
        assert_eq!(summary.unallocated, all);
        assert_eq!(
            allocator.state.registry.next_pending().map(|t| t.id),
            Some(TaskId(1))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_shutdown_sender_stops_before_first_round() {
        let (mut allocator, _handles) =
            allocator_with(grid_tasks(), &AgentSpec::default_pair(), profile());
        let (tx, rx) = watch::channel(());
        drop(tx);

        let summary = allocator.run(rx).await.unwrap();
        assert_eq!(summary.stop, StopReason::Shutdown);
        assert_eq!(summary.rounds, 0);
        assert_eq!(summary.unallocated.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_registry_finishes_immediately() {
        let (mut allocator, _handles) =
            allocator_with(Vec::new(), &AgentSpec::default_pair(), profile());
        let (_tx, rx) = watch::channel(());
        let summary = allocator.run(rx).await.unwrap();
        assert_eq!(summary.stop, StopReason::Exhausted);
        assert_eq!(summary.rounds, 0);
        assert_eq!(summary.agents.len(), 2);
    }

    #[test]
    fn summary_serializes_stop_reason_inline() {
        let summary = AllocationSummary {
            finished_at: Utc::now(),
            stop: StopReason::Stalled { task: TaskId(3) },
            rounds: 4,
            completed: vec![TaskId(1)],
            failed: vec![TaskId(2)],
            unallocated: vec![TaskId(3)],
            agents: vec![AgentSummary {
                id: AgentId::from("R1"),
                position: GridPos::new(2, 0),
                balance: 15.0,
            }],
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["stop"]["reason"], "stalled");
        assert_eq!(value["stop"]["task"], 3);
        assert_eq!(value["agents"][0]["id"], "R1");
        assert_eq!(value["unallocated"][0], 3);
    }
}
