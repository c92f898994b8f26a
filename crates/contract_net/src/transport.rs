use crate::message::Message;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("agent link is closed")]
    Closed,
    #[error("agent dropped the request without replying")]
    NoReply,
}

/// Allocator-side handle to one remote agent.
///
/// Every call blocks the caller until the agent answers or the link fails.
/// Callers bound the wait themselves, e.g. with `tokio::time::timeout`.
#[async_trait]
pub trait AgentLink: Send + Sync {
    /// Sends a message and waits for the agent's reply.
    async fn request(&self, message: Message) -> Result<Message, LinkError>;

    /// Delivers a message that expects no reply.
    async fn notify(&self, message: Message) -> Result<(), LinkError>;
}

/// A message as seen by the agent, with the slot for its reply when the
/// sender is waiting for one.
#[derive(Debug)]
pub struct Envelope {
    pub message: Message,
    pub reply: Option<oneshot::Sender<Message>>,
}

/// In-process [`AgentLink`] backed by a tokio mpsc channel and one oneshot
/// per request.
#[derive(Debug, Clone)]
pub struct ChannelLink {
    tx: mpsc::Sender<Envelope>,
}

/// Creates a link and the receiving end the agent task reads from.
pub fn channel_link(buffer: usize) -> (ChannelLink, mpsc::Receiver<Envelope>) {
    let (tx, rx) = mpsc::channel(buffer);
    (ChannelLink { tx }, rx)
}

#[async_trait]
impl AgentLink for ChannelLink {
    async fn request(&self, message: Message) -> Result<Message, LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                message,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| LinkError::Closed)?;
        reply_rx.await.map_err(|_| LinkError::NoReply)
    }

    async fn notify(&self, message: Message) -> Result<(), LinkError> {
        self.tx
            .send(Envelope {
                message,
                reply: None,
            })
            .await
            .map_err(|_| LinkError::Closed)
    }
}
