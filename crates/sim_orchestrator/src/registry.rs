use crate::error::RegistryError;
use contract_net::{AgentId, GridPos, TaskAnnouncement, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Announced,
    Awarded,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// The legal lifecycle edges. `Announced -> Pending` puts a task that
    /// drew no bids back in line.
    pub fn can_become(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Announced)
                | (Announced, Pending)
                | (Announced, Awarded)
                | (Awarded, Completed)
                | (Awarded, Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Announced => "announced",
            TaskStatus::Awarded => "awarded",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Input for creating a task, as generated at world start or read from a
/// task file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub position: GridPos,
    pub description: String,
    /// Overrides the registry-wide reward for this task.
    #[serde(default)]
    pub reward: Option<f64>,
}

impl TaskSpec {
    pub fn new(id: u64, position: GridPos, description: impl Into<String>) -> Self {
        Self {
            id: TaskId(id),
            position,
            description: description.into(),
            reward: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub position: GridPos,
    pub description: String,
    pub reward: f64,
    pub status: TaskStatus,
    pub awarded_to: Option<AgentId>,
}

impl Task {
    pub fn announcement(&self) -> TaskAnnouncement {
        TaskAnnouncement {
            task_id: self.id,
            position: self.position,
            description: self.description.clone(),
            reward: self.reward,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub announced: usize,
    pub awarded: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Canonical set of tasks and their lifecycle state.
///
/// Tasks are handed out in creation order. At most one task may be
/// announced at a time.
#[derive(Debug)]
pub struct TaskRegistry {
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
    announced: Option<TaskId>,
    archived: Vec<TaskId>,
    default_reward: f64,
}

impl TaskRegistry {
    pub fn new(default_reward: f64) -> Self {
        Self {
            tasks: Vec::new(),
            index: HashMap::new(),
            announced: None,
            archived: Vec::new(),
            default_reward,
        }
    }

    /// Adds every spec as a pending task. Nothing is added if any id collides
    /// with an existing task or another spec in the batch, or if any task
    /// would carry a negative or non-finite reward.
    pub fn create_tasks(
        &mut self,
        specs: impl IntoIterator<Item = TaskSpec>,
    ) -> Result<usize, RegistryError> {
        let specs: Vec<TaskSpec> = specs.into_iter().collect();
        let mut seen = HashSet::with_capacity(specs.len());
        for spec in &specs {
            if self.index.contains_key(&spec.id) || !seen.insert(spec.id) {
                return Err(RegistryError::DuplicateTaskId(spec.id));
            }
            let reward = spec.reward.unwrap_or(self.default_reward);
            if !reward.is_finite() || reward < 0.0 {
                return Err(RegistryError::InvalidReward {
                    task: spec.id,
                    reward,
                });
            }
        }

        let created = specs.len();
        for spec in specs {
            self.index.insert(spec.id, self.tasks.len());
            self.tasks.push(Task {
                id: spec.id,
                position: spec.position,
                description: spec.description,
                reward: spec.reward.unwrap_or(self.default_reward),
                status: TaskStatus::Pending,
                awarded_to: None,
            });
        }
        tracing::debug!(created, total = self.tasks.len(), "Tasks created");
        Ok(created)
    }

    /// The oldest task still waiting for an auction.
    pub fn next_pending(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.status == TaskStatus::Pending)
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.index.get(&id).map(|&i| &self.tasks[i])
    }

    /// All tasks in creation order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Ids of completed or failed tasks in the order they finished.
    pub fn archived(&self) -> &[TaskId] {
        &self.archived
    }

    pub fn announced(&self) -> Option<TaskId> {
        self.announced
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for task in &self.tasks {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Announced => counts.announced += 1,
                TaskStatus::Awarded => counts.awarded += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// True when no task is in the middle of an auction round.
    pub fn is_settled(&self) -> bool {
        let c = self.counts();
        c.announced == 0 && c.awarded == 0
    }

    pub fn mark_announced(&mut self, id: TaskId) -> Result<(), RegistryError> {
        if let Some(active) = self.announced {
            if active != id {
                return Err(RegistryError::AlreadyAnnounced {
                    active,
                    requested: id,
                });
            }
        }
        self.transition(id, TaskStatus::Announced)?;
        self.announced = Some(id);
        Ok(())
    }

    /// Puts an announced task that drew no bids back in line. It keeps its
    /// place in creation order.
    pub fn return_to_pending(&mut self, id: TaskId) -> Result<(), RegistryError> {
        self.transition(id, TaskStatus::Pending)?;
        self.announced = None;
        Ok(())
    }

    pub fn mark_awarded(&mut self, id: TaskId, agent: &AgentId) -> Result<(), RegistryError> {
        let task = self.transition(id, TaskStatus::Awarded)?;
        task.awarded_to = Some(agent.clone());
        self.announced = None;
        Ok(())
    }

    pub fn mark_completed(&mut self, id: TaskId) -> Result<(), RegistryError> {
        self.transition(id, TaskStatus::Completed).map(|_| ())
    }

    pub fn mark_failed(&mut self, id: TaskId) -> Result<(), RegistryError> {
        self.transition(id, TaskStatus::Failed).map(|_| ())
    }

    fn transition(&mut self, id: TaskId, to: TaskStatus) -> Result<&mut Task, RegistryError> {
        let i = *self.index.get(&id).ok_or(RegistryError::UnknownTask(id))?;
        let task = &mut self.tasks[i];
        if !task.status.can_become(to) {
            return Err(RegistryError::InvalidTransition {
                task: id,
                from: task.status,
                to,
            });
        }
        tracing::trace!(task_id = %id, from = %task.status, to = %to, "Task transition");
        task.status = to;
        if to.is_terminal() {
            self.archived.push(id);
        }
        Ok(task)
    }
}
