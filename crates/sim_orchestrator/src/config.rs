use crate::allocator::AllocatorConfig;
use crate::auctioneer::AuctionTimeouts;
use anyhow::{bail, ensure};
use clap::Parser;
use sim_agent::{AgentSpec, ExecutionProfile};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Holds all configuration for the task allocator.
#[derive(Debug, Clone, Parser)]
#[command(name = "sim_orchestrator", about = "Contract-net task allocation over simulated agents")]
pub struct Config {
    /// JSON task list. When absent, `--num-tasks` tasks are generated.
    #[arg(long, env = "ALLOCATOR_TASKS_FILE")]
    pub tasks_file: Option<PathBuf>,

    #[arg(long, env = "ALLOCATOR_NUM_TASKS", default_value_t = 5)]
    pub num_tasks: usize,

    /// Side length of the square grid.
    #[arg(long, env = "ALLOCATOR_GRID_SIZE", default_value_t = 10)]
    pub grid_size: i32,

    /// Seeds task placement and agent failure rolls.
    #[arg(long, env = "ALLOCATOR_SEED")]
    pub seed: Option<u64>,

    /// Reward of tasks that do not carry their own.
    #[arg(long, env = "ALLOCATOR_REWARD", default_value_t = 5.0)]
    pub reward: f64,

    #[arg(long, env = "ALLOCATOR_INITIAL_BALANCE", default_value_t = 10.0)]
    pub initial_balance: f64,

    #[arg(long, env = "ALLOCATOR_BID_TIMEOUT_MS", default_value_t = 2_000)]
    pub bid_timeout_ms: u64,

    #[arg(long, env = "ALLOCATOR_COMPLETION_TIMEOUT_MS", default_value_t = 60_000)]
    pub completion_timeout_ms: u64,

    /// Consecutive no-bidder rounds on one task before allocation stops.
    #[arg(long, env = "ALLOCATOR_MAX_NO_BIDDER_ROUNDS", default_value_t = 3)]
    pub max_no_bidder_rounds: u32,

    #[arg(long, env = "ALLOCATOR_NO_BIDDER_RETRY_MS", default_value_t = 500)]
    pub no_bidder_retry_ms: u64,

    /// Agent as `ID@X,Y/MARKUP[/xy|yx]`. Repeatable; defaults to the R1/R2 pair.
    #[arg(long = "agent", env = "ALLOCATOR_AGENTS", value_delimiter = ';')]
    pub agents: Vec<AgentSpec>,

    #[arg(long, env = "ALLOCATOR_STEP_DELAY_MS", default_value_t = 200)]
    pub step_delay_ms: u64,

    #[arg(long, env = "ALLOCATOR_EXECUTE_MS", default_value_t = 1_000)]
    pub execute_ms: u64,

    /// Probability that an agent fails a task it executes.
    #[arg(long, env = "ALLOCATOR_FAILURE_RATE", default_value_t = 0.0)]
    pub failure_rate: f64,

    /// Serves Prometheus metrics on `/metrics` when set.
    #[arg(long, env = "ALLOCATOR_METRICS_LISTEN_ADDR")]
    pub metrics_listen_addr: Option<SocketAddr>,
}

impl Config {
    /// Rejects values the allocator cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.grid_size > 0, "grid size must be positive, got {}", self.grid_size);
        ensure!(
            self.reward.is_finite() && self.reward >= 0.0,
            "reward must be a non-negative number, got {}",
            self.reward
        );
        ensure!(
            self.initial_balance.is_finite() && self.initial_balance >= 0.0,
            "initial balance must be a non-negative number, got {}",
            self.initial_balance
        );
        ensure!(
            (0.0..=1.0).contains(&self.failure_rate),
            "failure rate must lie in [0, 1], got {}",
            self.failure_rate
        );
        ensure!(self.bid_timeout_ms > 0, "bid timeout must be positive");
        ensure!(self.completion_timeout_ms > 0, "completion timeout must be positive");
        ensure!(self.max_no_bidder_rounds >= 1, "max no-bidder rounds must be at least 1");

        let specs = self.agent_specs();
        for (i, spec) in specs.iter().enumerate() {
            if specs[..i].iter().any(|other| other.id == spec.id) {
                bail!("agent id '{}' is configured twice", spec.id);
            }
        }
        Ok(())
    }

    pub fn auction_timeouts(&self) -> AuctionTimeouts {
        AuctionTimeouts {
            bid: Duration::from_millis(self.bid_timeout_ms),
            completion: Duration::from_millis(self.completion_timeout_ms),
        }
    }

    pub fn allocator_config(&self) -> AllocatorConfig {
        AllocatorConfig {
            max_no_bidder_rounds: self.max_no_bidder_rounds,
            no_bidder_retry_delay: Duration::from_millis(self.no_bidder_retry_ms),
        }
    }

    /// Agents start with a wallet equal to their session balance.
    pub fn execution_profile(&self) -> ExecutionProfile {
        ExecutionProfile {
            step_delay: Duration::from_millis(self.step_delay_ms),
            execute_for: Duration::from_millis(self.execute_ms),
            failure_rate: self.failure_rate,
            wallet: self.initial_balance,
            seed: self.seed,
            ..ExecutionProfile::default()
        }
    }

    pub fn agent_specs(&self) -> Vec<AgentSpec> {
        if self.agents.is_empty() {
            AgentSpec::default_pair()
        } else {
            self.agents.clone()
        }
    }
}
