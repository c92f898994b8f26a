use crate::types::{AgentId, Bid, GridPos, TaskId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Public description of a task as broadcast to bidders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAnnouncement {
    pub task_id: TaskId,
    pub position: GridPos,
    pub description: String,
    pub reward: f64,
}

/// Every message exchanged between the allocator and an agent.
///
/// Each variant is one coordination step of an auction round. The `task_id`
/// doubles as the correlation id of the round the message belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "performative", rename_all = "snake_case")]
pub enum Message {
    /// Allocator to every available agent; answered with [`Message::Bid`].
    AnnounceTask(TaskAnnouncement),
    /// Agent to allocator.
    Bid {
        task_id: TaskId,
        agent: AgentId,
        bid: Bid,
    },
    /// Allocator to the winner; answered with [`Message::ReportCompletion`].
    AwardTask { task_id: TaskId, agent: AgentId },
    /// Allocator to every losing bidder. Informational.
    RejectTask { task_id: TaskId, agent: AgentId },
    /// Agent to allocator once the awarded task has been executed or abandoned.
    ReportCompletion {
        task_id: TaskId,
        agent: AgentId,
        success: bool,
        /// Where the agent stands after moving for the task.
        position: GridPos,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    AnnounceTask,
    Bid,
    AwardTask,
    RejectTask,
    ReportCompletion,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::AnnounceTask => "announce_task",
            MessageKind::Bid => "bid",
            MessageKind::AwardTask => "award_task",
            MessageKind::RejectTask => "reject_task",
            MessageKind::ReportCompletion => "report_completion",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::AnnounceTask(_) => MessageKind::AnnounceTask,
            Message::Bid { .. } => MessageKind::Bid,
            Message::AwardTask { .. } => MessageKind::AwardTask,
            Message::RejectTask { .. } => MessageKind::RejectTask,
            Message::ReportCompletion { .. } => MessageKind::ReportCompletion,
        }
    }

    /// The round this message belongs to.
    pub fn task_id(&self) -> TaskId {
        match self {
            Message::AnnounceTask(a) => a.task_id,
            Message::Bid { task_id, .. }
            | Message::AwardTask { task_id, .. }
            | Message::RejectTask { task_id, .. }
            | Message::ReportCompletion { task_id, .. } => *task_id,
        }
    }

    /// The agent a message is addressed to or sent by. Announcements are
    /// broadcast and carry none.
    pub fn agent(&self) -> Option<&AgentId> {
        match self {
            Message::AnnounceTask(_) => None,
            Message::Bid { agent, .. }
            | Message::AwardTask { agent, .. }
            | Message::RejectTask { agent, .. }
            | Message::ReportCompletion { agent, .. } => Some(agent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn messages_are_tagged_by_performative() {
        let msg = Message::Bid {
            task_id: TaskId(1),
            agent: AgentId::from("R1"),
            bid: Bid::Offer(0.7),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "performative": "bid",
                "task_id": 1,
                "agent": "R1",
                "bid": { "offer": 0.7 }
            })
        );
    }

    #[test]
    fn announcement_flattens_task_fields() {
        let msg = Message::AnnounceTask(TaskAnnouncement {
            task_id: TaskId(4),
            position: GridPos::new(2, 0),
            description: "Assembly".into(),
            reward: 5.0,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["performative"], "announce_task");
        assert_eq!(value["position"], json!({ "x": 2, "y": 0 }));
        assert_eq!(value["reward"], 5.0);
    }

    #[test]
    fn unknown_performative_fails_to_decode() {
        let raw = r#"{"performative":"negotiate","task_id":1,"agent":"R1"}"#;
        assert!(serde_json::from_str::<Message>(raw).is_err());
    }

    #[test]
    fn decline_decodes_as_unit_variant() {
        let raw = r#"{"performative":"bid","task_id":2,"agent":"R2","bid":"decline"}"#;
        let msg: Message = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.kind(), MessageKind::Bid);
        assert_eq!(msg.task_id(), TaskId(2));
        assert_eq!(msg.agent(), Some(&AgentId::from("R2")));
    }
}
