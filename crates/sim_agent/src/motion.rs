use contract_net::GridPos;
use std::fmt;
use std::str::FromStr;

/// Which axis an agent closes first when walking to a target cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisOrder {
    /// Move along x until aligned, then along y.
    #[default]
    HorizontalFirst,
    /// Move along y until aligned, then along x.
    VerticalFirst,
}

impl AxisOrder {
    /// The neighbouring cell one unit step closer to `target`, or `current`
    /// when already there.
    pub fn next_step(self, current: GridPos, target: GridPos) -> GridPos {
        let dx = (target.x - current.x).signum();
        let dy = (target.y - current.y).signum();
        match self {
            AxisOrder::HorizontalFirst if dx != 0 => GridPos::new(current.x + dx, current.y),
            AxisOrder::HorizontalFirst => GridPos::new(current.x, current.y + dy),
            AxisOrder::VerticalFirst if dy != 0 => GridPos::new(current.x, current.y + dy),
            AxisOrder::VerticalFirst => GridPos::new(current.x + dx, current.y),
        }
    }

    /// Every cell visited on the way from `from` to `to`, excluding `from`.
    pub fn path(self, from: GridPos, to: GridPos) -> Vec<GridPos> {
        let mut steps = Vec::with_capacity(from.manhattan(to) as usize);
        let mut at = from;
        while at != to {
            at = self.next_step(at, to);
            steps.push(at);
        }
        steps
    }
}

impl fmt::Display for AxisOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisOrder::HorizontalFirst => f.write_str("xy"),
            AxisOrder::VerticalFirst => f.write_str("yx"),
        }
    }
}

impl FromStr for AxisOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xy" => Ok(AxisOrder::HorizontalFirst),
            "yx" => Ok(AxisOrder::VerticalFirst),
            other => Err(format!("unknown axis order '{other}', expected 'xy' or 'yx'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizontal_first_closes_x_before_y() {
        let path = AxisOrder::HorizontalFirst.path(GridPos::new(0, 0), GridPos::new(2, 1));
        assert_eq!(
            path,
            vec![GridPos::new(1, 0), GridPos::new(2, 0), GridPos::new(2, 1)]
        );
    }

    #[test]
    fn vertical_first_closes_y_before_x() {
        let path = AxisOrder::VerticalFirst.path(GridPos::new(9, 0), GridPos::new(7, 2));
        assert_eq!(
            path,
            vec![
                GridPos::new(9, 1),
                GridPos::new(9, 2),
                GridPos::new(8, 2),
                GridPos::new(7, 2)
            ]
        );
    }

    #[test]
    fn path_length_matches_manhattan_distance() {
        let from = GridPos::new(3, 8);
        let to = GridPos::new(0, 1);
        for order in [AxisOrder::HorizontalFirst, AxisOrder::VerticalFirst] {
            let path = order.path(from, to);
            assert_eq!(path.len() as u32, from.manhattan(to));
            assert_eq!(path.last(), Some(&to));
        }
        assert!(AxisOrder::HorizontalFirst.path(to, to).is_empty());
    }
}
