use contract_net::{CostModel, GridPos};

/// Charges a flat amount per unit grid step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManhattanCost {
    pub per_step: f64,
}

impl ManhattanCost {
    pub const DEFAULT_PER_STEP: f64 = 0.1;

    pub fn new(per_step: f64) -> Self {
        Self { per_step }
    }
}

impl Default for ManhattanCost {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PER_STEP)
    }
}

impl CostModel for ManhattanCost {
    fn cost(&self, from: GridPos, to: GridPos) -> f64 {
        f64::from(from.manhattan(to)) * self.per_step
    }
}
