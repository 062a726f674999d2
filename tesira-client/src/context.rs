//! Shared state handed to control points
//!
//! Control points never own the queue, the registry or the transport. Every
//! operation receives a `&mut ProtocolContext` for the duration of the call.

use std::sync::Arc;

use tesira_protocol::SubscriptionToken;
use tokio::sync::broadcast;

use crate::control_point::ControlPointId;
use crate::error::{RegistryError, TransportError};
use crate::event::Feedback;
use crate::queue::{CommandQueue, QueuedCommand};
use crate::registry::SubscriptionRegistry;
use crate::transport::LineSender;

pub struct ProtocolContext {
    queue: CommandQueue,
    registry: SubscriptionRegistry,
    sender: Arc<dyn LineSender>,
    feedback_tx: broadcast::Sender<Feedback>,
}

impl ProtocolContext {
    pub fn new(sender: Arc<dyn LineSender>, feedback_tx: broadcast::Sender<Feedback>) -> Self {
        Self {
            queue: CommandQueue::new(Arc::clone(&sender)),
            registry: SubscriptionRegistry::new(),
            sender,
            feedback_tx,
        }
    }

    /// Queue a command behind whatever is in flight
    pub fn enqueue(&mut self, command: QueuedCommand) {
        self.queue.enqueue(command);
    }

    /// Send a line immediately, bypassing the queue
    pub fn send_direct(&self, line: &str) -> Result<(), TransportError> {
        tracing::debug!("Sending direct: {}", line);
        self.sender.send_line(line)
    }

    pub fn register_token(
        &mut self,
        token: SubscriptionToken,
        id: ControlPointId,
        key: &str,
    ) -> Result<(), RegistryError> {
        self.registry.register(token, id, key)
    }

    pub fn unregister_token(&mut self, token: &str) -> Option<ControlPointId> {
        self.registry.unregister(token)
    }

    /// Publish a value to feedback subscribers; nobody listening is fine
    pub fn publish(&self, feedback: Feedback) {
        tracing::trace!(
            "{} {} = {:?}",
            feedback.control_point,
            feedback.attribute,
            feedback.value
        );
        let _ = self.feedback_tx.send(feedback);
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut CommandQueue {
        &mut self.queue
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn is_connected(&self) -> bool {
        self.sender.is_connected()
    }
}

impl std::fmt::Debug for ProtocolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolContext")
            .field("queue", &self.queue)
            .field("registry", &self.registry.stats())
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_context() -> (ProtocolContext, Arc<crate::test_support::RecordingSender>, broadcast::Receiver<Feedback>) {
    let sender = Arc::new(crate::test_support::RecordingSender::connected());
    let (feedback_tx, feedback_rx) = broadcast::channel(64);
    (ProtocolContext::new(sender.clone(), feedback_tx), sender, feedback_rx)
}
