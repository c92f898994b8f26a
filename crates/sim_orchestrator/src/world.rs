use crate::registry::TaskSpec;
use anyhow::{bail, Context};
use contract_net::GridPos;
use rand::Rng;
use std::path::Path;

/// Descriptions handed out to generated tasks, in rotation.
pub const TASK_KINDS: [&str; 5] = ["Pick", "Nav", "Inspect", "Assembly", "Check"];

/// Places `count` tasks on distinct cells of a `grid_size` square grid,
/// never on the origin. Ids start at 1.
pub fn generate_tasks<R: Rng + ?Sized>(
    count: usize,
    grid_size: i32,
    rng: &mut R,
) -> anyhow::Result<Vec<TaskSpec>> {
    if grid_size <= 0 {
        bail!("grid size must be positive, got {grid_size}");
    }
    let side = grid_size as usize;
    let free_cells = side * side - 1;
    if count > free_cells {
        bail!(
            "cannot place {count} tasks on a {grid_size}x{grid_size} grid ({free_cells} free cells)"
        );
    }

    let cells = rand::seq::index::sample(rng, free_cells, count);
    Ok(cells
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            // Cell 0 is the origin and is never sampled.
            let cell = cell + 1;
            let position = GridPos::new((cell % side) as i32, (cell / side) as i32);
            TaskSpec::new(i as u64 + 1, position, TASK_KINDS[i % TASK_KINDS.len()])
        })
        .collect())
}

/// Reads a JSON array of `{ "id", "position": { "x", "y" }, "description" }`
/// objects, with an optional per-task `reward`.
pub fn load_tasks(path: &Path) -> anyhow::Result<Vec<TaskSpec>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read task file '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse task file '{}'", path.display()))
}

pub fn check_bounds(specs: &[TaskSpec], grid_size: i32) -> anyhow::Result<()> {
    let inside = |v: i32| (0..grid_size).contains(&v);
    for spec in specs {
        if !inside(spec.position.x) || !inside(spec.position.y) {
            bail!(
                "task {} at {} lies outside the {grid_size}x{grid_size} grid",
                spec.id,
                spec.position
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashSet;

    #[test]
    fn generated_tasks_are_distinct_and_off_origin() {
        let mut rng = StdRng::seed_from_u64(42);
        let specs = generate_tasks(5, 10, &mut rng).unwrap();
        assert_eq!(specs.len(), 5);

        let cells: HashSet<_> = specs.iter().map(|s| s.position).collect();
        assert_eq!(cells.len(), 5);
        assert!(!cells.contains(&GridPos::ORIGIN));
        check_bounds(&specs, 10).unwrap();

        let kinds: Vec<_> = specs.iter().map(|s| s.description.as_str()).collect();
        assert_eq!(kinds, TASK_KINDS);
        assert_eq!(specs[0].id.0, 1);
        assert_eq!(specs[4].id.0, 5);
    }

    #[test]
    fn same_seed_same_world() {
        let a = generate_tasks(8, 10, &mut StdRng::seed_from_u64(3)).unwrap();
        let b = generate_tasks(8, 10, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn full_grid_fits_exactly() {
        let specs = generate_tasks(8, 3, &mut StdRng::seed_from_u64(0)).unwrap();
        let cells: HashSet<_> = specs.iter().map(|s| s.position).collect();
        assert_eq!(cells.len(), 8);
        assert!(generate_tasks(9, 3, &mut StdRng::seed_from_u64(0)).is_err());
        assert!(generate_tasks(1, 0, &mut StdRng::seed_from_u64(0)).is_err());
    }

    #[test]
    fn out_of_grid_task_is_rejected() {
        let specs = vec![TaskSpec::new(1, GridPos::new(10, 2), "Pick")];
        assert!(check_bounds(&specs, 10).is_err());
    }

    #[test]
    fn task_file_round_trip_through_disk() {
        let path = std::env::temp_dir().join(format!("tasks-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"[
                {"id": 1, "position": {"x": 2, "y": 0}, "description": "Pick"},
                {"id": 2, "position": {"x": 5, "y": 5}, "description": "Nav", "reward": 7.5}
            ]"#,
        )
        .unwrap();

        let specs = load_tasks(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0], TaskSpec::new(1, GridPos::new(2, 0), "Pick"));
        assert_eq!(specs[1].reward, Some(7.5));
    }

    #[test]
    fn negative_reward_in_task_file_never_reaches_the_registry() {
        let path = std::env::temp_dir().join(format!("tasks-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"[{"id": 1, "position": {"x": 2, "y": 0}, "description": "Pick", "reward": -5.0}]"#,
        )
        .unwrap();
        let specs = load_tasks(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        check_bounds(&specs, 10).unwrap();
        let mut registry = crate::registry::TaskRegistry::new(5.0);
        assert!(matches!(
            registry.create_tasks(specs),
            Err(crate::error::RegistryError::InvalidReward { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn missing_task_file_names_the_path() {
        let err = load_tasks(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
