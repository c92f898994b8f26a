//! One auction round per task: announce, collect bids, award, await the
//! winner's report.
//!
//! Rounds are strictly serialized. Within a round every available session is
//! asked for a bid concurrently and the round only moves on once every
//! request has answered or timed out. The lowest offer wins; equal offers go
//! to the session that registered first.

use crate::error::AuctionError;
use crate::metrics::Metrics;
use crate::state::AllocatorState;
use contract_net::{AgentId, AgentLink, GridPos, LinkError, Message, TaskAnnouncement, TaskId};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::timeout;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Idle,
    Announcing,
    CollectingBids,
    Awarding,
    AwaitingCompletion,
    Closed,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoundPhase::Idle => "idle",
            RoundPhase::Announcing => "announcing",
            RoundPhase::CollectingBids => "collecting_bids",
            RoundPhase::Awarding => "awarding",
            RoundPhase::AwaitingCompletion => "awaiting_completion",
            RoundPhase::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Upper bounds on every wait inside a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuctionTimeouts {
    /// Per agent, for answering an announcement. Also bounds rejection notices.
    pub bid: Duration,
    /// For the winner to execute and report.
    pub completion: Duration,
}

impl Default for AuctionTimeouts {
    fn default() -> Self {
        Self {
            bid: Duration::from_secs(2),
            completion: Duration::from_secs(60),
        }
    }
}

/// Why an agent's reply did not count.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResponseFault {
    #[error("declined")]
    Declined,
    #[error("no reply before the deadline")]
    Timeout,
    #[error("reply for {got} while {expected} is outstanding")]
    Stale { expected: TaskId, got: TaskId },
    #[error("malformed reply: {0}")]
    Malformed(String),
    #[error(transparent)]
    Link(#[from] LinkError),
}

impl ResponseFault {
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseFault::Declined => "declined",
            ResponseFault::Timeout => "timeout",
            ResponseFault::Stale { .. } => "stale",
            ResponseFault::Malformed(_) => "malformed",
            ResponseFault::Link(_) => "link",
        }
    }
}

/// One announced-to session's contribution to a round.
#[derive(Debug, Clone, PartialEq)]
pub struct BidRecord {
    pub agent: AgentId,
    pub outcome: Result<f64, ResponseFault>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureCause {
    /// The winner reported that it could not finish.
    Reported,
    /// No usable completion report arrived.
    Fault(ResponseFault),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoundOutcome {
    /// No pending task was left to auction.
    Empty,
    /// Nobody was available or every announced-to session failed to bid.
    /// The task is pending again.
    NoBidders { task: TaskId, announced_to: usize },
    Completed {
        task: TaskId,
        winner: AgentId,
        bid: f64,
        reward: f64,
    },
    Failed {
        task: TaskId,
        winner: AgentId,
        bid: f64,
        cause: FailureCause,
    },
}

impl RoundOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RoundOutcome::Empty => "empty",
            RoundOutcome::NoBidders { .. } => "no_bidders",
            RoundOutcome::Completed { .. } => "completed",
            RoundOutcome::Failed { .. } => "failed",
        }
    }
}

/// Lowest usable offer, earliest record first on ties. `records` must be in
/// session registration order.
pub fn select_winner(records: &[BidRecord]) -> Option<(&AgentId, f64)> {
    let mut best: Option<(&AgentId, f64)> = None;
    for record in records {
        if let Ok(value) = record.outcome {
            match best {
                Some((_, lowest)) if value >= lowest => {}
                _ => best = Some((&record.agent, value)),
            }
        }
    }
    best
}

pub struct Auctioneer {
    timeouts: AuctionTimeouts,
    metrics: Arc<Metrics>,
    phase: RoundPhase,
}

impl Auctioneer {
    pub fn new(timeouts: AuctionTimeouts, metrics: Arc<Metrics>) -> Self {
        Self {
            timeouts,
            metrics,
            phase: RoundPhase::Idle,
        }
    }

    /// Where the current round stands. `Idle` between rounds.
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Runs one full round on the oldest pending task.
    ///
    /// Only invariant violations are returned as errors; every expected
    /// runtime condition is a [`RoundOutcome`].
    pub async fn run_round(
        &mut self,
        state: &mut AllocatorState,
    ) -> Result<RoundOutcome, AuctionError> {
        let round_id = uuid::Uuid::new_v4();
        let started = Instant::now();
        let span = tracing::info_span!("round", %round_id);
        let result = self.round(state).instrument(span).await;

        self.phase = RoundPhase::Idle;
        if let Ok(outcome) = &result {
            if *outcome != RoundOutcome::Empty {
                self.metrics.record_round(outcome.label());
                self.metrics
                    .round_duration_seconds
                    .observe(started.elapsed().as_secs_f64());
            }
        }
        result
    }

    async fn round(&mut self, state: &mut AllocatorState) -> Result<RoundOutcome, AuctionError> {
        self.enter(RoundPhase::Announcing);
        let Some(task) = state.registry.next_pending() else {
            tracing::debug!("No pending task to announce");
            return Ok(RoundOutcome::Empty);
        };
        let announcement = task.announcement();
        let task_id = announcement.task_id;
        state.registry.mark_announced(task_id)?;

        let mut sessions: Vec<_> = state.sessions.available().collect();
        sessions.sort_by_key(|s| s.registration());
        let bidders: Vec<(&AgentId, &dyn AgentLink)> =
            sessions.iter().map(|s| (&s.id, s.link())).collect();
        tracing::info!(
            task_id = %task_id,
            position = %announcement.position,
            description = %announcement.description,
            reward = announcement.reward,
            bidders = bidders.len(),
            "Task announced"
        );

        if bidders.is_empty() {
            state.registry.return_to_pending(task_id)?;
            tracing::warn!(
                task_id = %task_id,
                "No available sessions; task returned to pending"
            );
            self.enter(RoundPhase::Closed);
            return Ok(RoundOutcome::NoBidders {
                task: task_id,
                announced_to: 0,
            });
        }

        self.enter(RoundPhase::CollectingBids);
        let records = self.collect_bids(&bidders, &announcement).await;

        self.enter(RoundPhase::Awarding);
        let Some((winner, bid)) = select_winner(&records).map(|(a, v)| (a.clone(), v)) else {
            state.registry.return_to_pending(task_id)?;
            tracing::warn!(
                task_id = %task_id,
                announced_to = records.len(),
                "No usable bids; task returned to pending"
            );
            self.enter(RoundPhase::Closed);
            return Ok(RoundOutcome::NoBidders {
                task: task_id,
                announced_to: records.len(),
            });
        };

        state.award(task_id, &winner)?;
        tracing::info!(task_id = %task_id, winner = %winner, bid, "Task awarded");
        let losers: Vec<&AgentId> = records
            .iter()
            .map(|r| &r.agent)
            .filter(|a| **a != winner)
            .collect();
        self.reject_losers(state, task_id, &losers).await;

        self.enter(RoundPhase::AwaitingCompletion);
        let report = match state.sessions.get(&winner) {
            Some(session) => self.await_completion(session.link(), task_id, &winner).await,
            None => Err(ResponseFault::Link(LinkError::Closed)),
        };

        let outcome = match report {
            Ok((true, position)) => {
                let reward = state.complete(task_id, &winner, position)?;
                self.metrics.tasks_completed_total.inc();
                self.metrics.rewards_paid_total.inc_by(reward);
                tracing::info!(
                    task_id = %task_id,
                    agent = %winner,
                    reward,
                    position = %position,
                    "Task completed"
                );
                RoundOutcome::Completed {
                    task: task_id,
                    winner,
                    bid,
                    reward,
                }
            }
            Ok((false, position)) => {
                state.fail(task_id, &winner, Some(position))?;
                self.metrics.tasks_failed_total.inc();
                tracing::warn!(
                    task_id = %task_id,
                    agent = %winner,
                    "Agent reported task failure"
                );
                RoundOutcome::Failed {
                    task: task_id,
                    winner,
                    bid,
                    cause: FailureCause::Reported,
                }
            }
            Err(fault) => {
                state.fail(task_id, &winner, None)?;
                self.metrics.tasks_failed_total.inc();
                tracing::warn!(
                    task_id = %task_id,
                    agent = %winner,
                    fault = %fault,
                    "No usable completion report; task failed"
                );
                RoundOutcome::Failed {
                    task: task_id,
                    winner,
                    bid,
                    cause: FailureCause::Fault(fault),
                }
            }
        };

        self.enter(RoundPhase::Closed);
        Ok(outcome)
    }

    fn enter(&mut self, phase: RoundPhase) {
        tracing::debug!(from = %self.phase, to = %phase, "Round phase");
        self.phase = phase;
    }

    /// Asks every bidder at once and waits for all of them.
    async fn collect_bids(
        &self,
        bidders: &[(&AgentId, &dyn AgentLink)],
        announcement: &TaskAnnouncement,
    ) -> Vec<BidRecord> {
        let deadline = self.timeouts.bid;
        let requests = bidders.iter().map(|&(agent, link)| {
            let message = Message::AnnounceTask(announcement.clone());
            async move {
                let reply = timeout(deadline, link.request(message)).await;
                let outcome = match reply {
                    Err(_) => Err(ResponseFault::Timeout),
                    Ok(Err(e)) => Err(ResponseFault::Link(e)),
                    Ok(Ok(message)) => interpret_bid(message, announcement.task_id, agent),
                };
                BidRecord {
                    agent: agent.clone(),
                    outcome,
                }
            }
        });
        let records = join_all(requests).await;

        for record in &records {
            match &record.outcome {
                Ok(value) => {
                    self.metrics.bids_received_total.inc();
                    tracing::info!(agent = %record.agent, bid = *value, "Bid received");
                }
                Err(ResponseFault::Declined) => {
                    self.metrics.record_fault("bid", "declined");
                    tracing::info!(agent = %record.agent, "Agent declined");
                }
                Err(fault) => {
                    self.metrics.record_fault("bid", fault.kind());
                    tracing::warn!(agent = %record.agent, fault = %fault, "Bid not counted");
                }
            }
        }
        records
    }

    async fn reject_losers(&self, state: &AllocatorState, task_id: TaskId, losers: &[&AgentId]) {
        let deadline = self.timeouts.bid;
        let notices = losers.iter().filter_map(|&agent| {
            let session = state.sessions.get(agent)?;
            let message = Message::RejectTask {
                task_id,
                agent: agent.clone(),
            };
            Some(async move {
                match timeout(deadline, session.link().notify(message)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!(
                            agent = %agent,
                            error = %e,
                            "Rejection notice not delivered"
                        )
                    }
                    Err(_) => tracing::debug!(agent = %agent, "Rejection notice timed out"),
                }
            })
        });
        join_all(notices).await;
    }

    async fn await_completion(
        &self,
        link: &dyn AgentLink,
        task_id: TaskId,
        winner: &AgentId,
    ) -> Result<(bool, GridPos), ResponseFault> {
        let award = Message::AwardTask {
            task_id,
            agent: winner.clone(),
        };
        let verdict = match timeout(self.timeouts.completion, link.request(award)).await {
            Err(_) => Err(ResponseFault::Timeout),
            Ok(Err(e)) => Err(ResponseFault::Link(e)),
            Ok(Ok(message)) => interpret_completion(message, task_id, winner),
        };
        if let Err(fault) = &verdict {
            self.metrics.record_fault("completion", fault.kind());
        }
        verdict
    }
}

fn interpret_bid(message: Message, expected: TaskId, from: &AgentId) -> Result<f64, ResponseFault> {
    match message {
        Message::Bid {
            task_id,
            agent,
            bid,
        } => {
            if task_id != expected {
                return Err(ResponseFault::Stale {
                    expected,
                    got: task_id,
                });
            }
            if &agent != from {
                return Err(ResponseFault::Malformed(format!(
                    "bid signed by {agent} on the link of {from}"
                )));
            }
            match bid.amount() {
                Ok(Some(value)) => Ok(value),
                Ok(None) => Err(ResponseFault::Declined),
                Err(value) => Err(ResponseFault::Malformed(format!(
                    "bid value {value} is not a non-negative number"
                ))),
            }
        }
        other => Err(ResponseFault::Malformed(format!(
            "expected bid, got {}",
            other.kind()
        ))),
    }
}

fn interpret_completion(
    message: Message,
    expected: TaskId,
    from: &AgentId,
) -> Result<(bool, GridPos), ResponseFault> {
    match message {
        Message::ReportCompletion {
            task_id,
            agent,
            success,
            position,
        } => {
            if task_id != expected {
                return Err(ResponseFault::Stale {
                    expected,
                    got: task_id,
                });
            }
            if &agent != from {
                return Err(ResponseFault::Malformed(format!(
                    "report signed by {agent} on the link of {from}"
                )));
            }
            Ok((success, position))
        }
        other => Err(ResponseFault::Malformed(format!(
            "expected completion report, got {}",
            other.kind()
        ))),
    }
}
