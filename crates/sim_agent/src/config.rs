use crate::motion::AxisOrder;
use contract_net::{AgentId, GridPos};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SpecError {
    #[error("agent spec '{0}' must look like ID@X,Y/MARKUP[/xy|yx]")]
    Shape(String),
    #[error("agent spec '{spec}': {reason}")]
    Field { spec: String, reason: String },
}

/// Identity, starting cell and bidding temperament of one simulated agent.
///
/// Parsed from `ID@X,Y/MARKUP[/xy|yx]`, e.g. `R1@0,0/0.5/xy`.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSpec {
    pub id: AgentId,
    pub start: GridPos,
    pub markup: f64,
    pub axis_order: AxisOrder,
}

impl AgentSpec {
    /// The two robots of the reference scenario: R1 at the origin with a
    /// 0.5 markup walking x first, R2 in the opposite corner with a 0.3
    /// markup walking y first.
    pub fn default_pair() -> Vec<AgentSpec> {
        vec![
            AgentSpec {
                id: AgentId::from("R1"),
                start: GridPos::new(0, 0),
                markup: 0.5,
                axis_order: AxisOrder::HorizontalFirst,
            },
            AgentSpec {
                id: AgentId::from("R2"),
                start: GridPos::new(9, 0),
                markup: 0.3,
                axis_order: AxisOrder::VerticalFirst,
            },
        ]
    }
}

impl FromStr for AgentSpec {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let field = |reason: String| SpecError::Field {
            spec: s.to_owned(),
            reason,
        };

        let (id, rest) = s.split_once('@').ok_or_else(|| SpecError::Shape(s.to_owned()))?;
        if id.trim().is_empty() {
            return Err(field("empty agent id".into()));
        }

        let mut parts = rest.split('/');
        let coords = parts.next().ok_or_else(|| SpecError::Shape(s.to_owned()))?;
        let markup = parts.next().ok_or_else(|| SpecError::Shape(s.to_owned()))?;
        let axis = parts.next();
        if parts.next().is_some() {
            return Err(SpecError::Shape(s.to_owned()));
        }

        let (x, y) = coords
            .split_once(',')
            .ok_or_else(|| SpecError::Shape(s.to_owned()))?;
        let x: i32 = x.trim().parse().map_err(|e| field(format!("bad x: {e}")))?;
        let y: i32 = y.trim().parse().map_err(|e| field(format!("bad y: {e}")))?;

        let markup: f64 = markup
            .trim()
            .parse()
            .map_err(|e| field(format!("bad markup: {e}")))?;
        if !markup.is_finite() || markup < 0.0 {
            return Err(field(format!("markup must be a non-negative number, got {markup}")));
        }

        let axis_order = match axis {
            Some(a) => a.trim().parse().map_err(field)?,
            None => AxisOrder::default(),
        };

        Ok(AgentSpec {
            id: AgentId::new(id.trim()),
            start: GridPos::new(x, y),
            markup,
            axis_order,
        })
    }
}

/// How agents pace and pay for their work. Shared by every simulated agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionProfile {
    /// Pause between two unit grid steps.
    pub step_delay: Duration,
    /// Time spent at the task cell before reporting.
    pub execute_for: Duration,
    /// Probability in `[0, 1]` that an execution ends in failure.
    pub failure_rate: f64,
    /// Movement cost charged to the agent wallet per grid step.
    pub per_step_cost: f64,
    /// Starting funds of the agent's own wallet.
    pub wallet: f64,
    /// Fixes the failure roll sequence when set.
    pub seed: Option<u64>,
}

impl Default for ExecutionProfile {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(200),
            execute_for: Duration::from_secs(1),
            failure_rate: 0.0,
            per_step_cost: crate::cost::ManhattanCost::DEFAULT_PER_STEP,
            wallet: 10.0,
            seed: None,
        }
    }
}
