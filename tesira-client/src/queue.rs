//! Single-outstanding-command correlation queue
//!
//! Replies from the device carry no transaction id. They arrive strictly in the
//! order commands were issued, so the only way to know which command a reply
//! answers is to never have more than one in flight. The queue holds commands
//! until the previous reply has been classified, then releases the next.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::control_point::ControlPointId;
use crate::transport::LineSender;

/// One entry in the command queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedCommand {
    /// A request whose reply is handed back to the control point that issued it
    Correlated {
        text: String,
        attribute: String,
        origin: ControlPointId,
    },
    /// A command whose reply only needs to be consumed
    FireAndForget { text: String },
}

impl QueuedCommand {
    pub fn correlated(text: impl Into<String>, attribute: impl Into<String>, origin: ControlPointId) -> Self {
        QueuedCommand::Correlated {
            text: text.into(),
            attribute: attribute.into(),
            origin,
        }
    }

    pub fn fire_and_forget(text: impl Into<String>) -> Self {
        QueuedCommand::FireAndForget { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            QueuedCommand::Correlated { text, .. } | QueuedCommand::FireAndForget { text } => text,
        }
    }
}

/// A reply matched to the control point waiting for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyDelivery {
    pub origin: ControlPointId,
    pub attribute: String,
    pub reply: String,
}

/// FIFO correlator between sent commands and their replies
pub struct CommandQueue {
    pending: VecDeque<QueuedCommand>,
    in_progress: bool,
    sender: Arc<dyn LineSender>,
}

impl CommandQueue {
    pub fn new(sender: Arc<dyn LineSender>) -> Self {
        Self {
            pending: VecDeque::new(),
            in_progress: false,
            sender,
        }
    }

    /// Append a command; sends it right away if nothing is in flight
    pub fn enqueue(&mut self, command: QueuedCommand) {
        tracing::trace!("Queueing {:?}", command.text());
        self.pending.push_back(command);
        if !self.in_progress {
            self.send_next();
        }
    }

    /// Send the head of the queue without removing it
    ///
    /// Does nothing unless the transport is connected, the queue is non-empty
    /// and no command is in flight. Returns whether a line was sent.
    pub fn send_next(&mut self) -> bool {
        if self.in_progress {
            return false;
        }

        let Some(head) = self.pending.front() else {
            return false;
        };

        if !self.sender.is_connected() {
            tracing::debug!("Holding {} queued command(s) until connected", self.pending.len());
            return false;
        }

        match self.sender.send_line(head.text()) {
            Ok(()) => {
                tracing::debug!("Sent queued command: {}", head.text());
                self.in_progress = true;
                true
            }
            Err(e) => {
                tracing::warn!("Failed to send queued command {}: {}", head.text(), e);
                false
            }
        }
    }

    /// Consume the reply to the command in flight
    ///
    /// Removes the head, releases the next command, and returns the delivery
    /// for the originating control point. Fire-and-forget entries and replies
    /// with nothing in flight yield `None`.
    pub fn advance(&mut self, reply: &str) -> Option<ReplyDelivery> {
        if !self.in_progress {
            tracing::debug!("Reply with no command in flight, ignoring: {}", reply);
            return None;
        }

        let head = self.pending.pop_front();
        self.in_progress = false;
        self.send_next();

        match head {
            Some(QueuedCommand::Correlated {
                attribute, origin, ..
            }) => Some(ReplyDelivery {
                origin,
                attribute,
                reply: reply.to_string(),
            }),
            Some(QueuedCommand::FireAndForget { text }) => {
                tracing::trace!("Reply consumed by fire-and-forget command {}", text);
                None
            }
            None => None,
        }
    }

    /// Drop everything and mark the queue idle without sending
    pub fn clear(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!("Clearing {} queued command(s)", self.pending.len());
        }
        self.pending.clear();
        self.in_progress = false;
    }

    /// The command whose reply is awaited
    pub fn in_flight(&self) -> Option<&QueuedCommand> {
        if self.in_progress {
            self.pending.front()
        } else {
            None
        }
    }

    /// Text of the in-flight command when it is fire-and-forget
    ///
    /// Used by the classifier to recognise the device echoing it back.
    pub fn pending_echo(&self) -> Option<&str> {
        match self.in_flight() {
            Some(QueuedCommand::FireAndForget { text }) => Some(text),
            _ => None,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    /// No command in flight and none waiting
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("pending", &self.pending)
            .field("in_progress", &self.in_progress)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingSender;
    use proptest::prelude::*;

    fn queue() -> (CommandQueue, Arc<RecordingSender>) {
        let sender = Arc::new(RecordingSender::connected());
        (CommandQueue::new(sender.clone()), sender)
    }

    #[test]
    fn test_level_then_mute_scenario() {
        let (mut queue, sender) = queue();
        let a = ControlPointId::new(1);
        let b = ControlPointId::new(2);

        queue.enqueue(QueuedCommand::correlated("\"Tag1\" get level 1", "level", a));
        queue.enqueue(QueuedCommand::correlated("\"Tag1\" get mute 1", "mute", b));
        assert_eq!(sender.sent(), vec!["\"Tag1\" get level 1"]);

        let first = queue.advance("+OK 0.5").unwrap();
        assert_eq!(first.origin, a);
        assert_eq!(first.attribute, "level");
        assert_eq!(first.reply, "+OK 0.5");
        assert_eq!(sender.sent().len(), 2);

        let second = queue.advance("+OK false").unwrap();
        assert_eq!(second.origin, b);
        assert_eq!(second.attribute, "mute");
        assert_eq!(second.reply, "+OK false");

        assert!(queue.is_empty());
        assert!(!queue.is_in_progress());
    }

    #[test]
    fn test_fire_and_forget_advances_without_delivery() {
        let (mut queue, sender) = queue();
        queue.enqueue(QueuedCommand::fire_and_forget("DEVICE recallPreset 1001"));
        queue.enqueue(QueuedCommand::correlated("\"L\" get mute 1", "mute", ControlPointId::new(0)));

        assert_eq!(queue.pending_echo(), Some("DEVICE recallPreset 1001"));
        assert!(queue.advance("+OK").is_none());
        assert_eq!(sender.sent().len(), 2);
        assert_eq!(queue.pending_echo(), None);
        assert!(queue.advance("+OK \"value\":true").is_some());
    }

    #[test]
    fn test_reply_with_empty_queue_is_ignored() {
        let (mut queue, sender) = queue();
        assert!(queue.advance("+OK").is_none());
        assert!(sender.sent().is_empty());
        assert!(!queue.is_in_progress());
    }

    #[test]
    fn test_clear_then_enqueue_sends_exactly_one() {
        let (mut queue, sender) = queue();
        queue.enqueue(QueuedCommand::fire_and_forget("a"));
        queue.enqueue(QueuedCommand::fire_and_forget("b"));
        queue.clear();
        assert!(queue.is_empty());
        assert!(!queue.is_in_progress());

        sender.take();
        queue.enqueue(QueuedCommand::fire_and_forget("c"));
        assert_eq!(sender.sent(), vec!["c"]);
        assert!(queue.advance("+OK").is_none());
        assert!(queue.is_empty());
        assert_eq!(sender.sent(), vec!["c"]);
    }

    #[test]
    fn test_holds_commands_while_disconnected() {
        let sender = Arc::new(RecordingSender::disconnected());
        let mut queue = CommandQueue::new(sender.clone());

        queue.enqueue(QueuedCommand::fire_and_forget("a"));
        assert!(sender.sent().is_empty());
        assert!(!queue.is_in_progress());
        assert!(queue.advance("+OK").is_none());
        assert_eq!(queue.len(), 1);

        sender.set_connected(true);
        assert!(queue.send_next());
        assert_eq!(sender.sent(), vec!["a"]);
        assert!(!queue.send_next());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Replies reach their origins in enqueue order, and the queue never
        /// has more sends outstanding than replies received plus one.
        #[test]
        fn prop_fifo_and_single_in_flight(entries in prop::collection::vec(prop::option::of(0usize..8), 1..40)) {
            let (mut queue, sender) = queue();

            for (i, entry) in entries.iter().enumerate() {
                let text = format!("cmd{i}");
                match entry {
                    Some(origin) => queue.enqueue(QueuedCommand::correlated(
                        text,
                        format!("attr{i}"),
                        ControlPointId::new(*origin),
                    )),
                    None => queue.enqueue(QueuedCommand::fire_and_forget(text)),
                }
                prop_assert_eq!(sender.sent().len(), 1);
            }

            let mut delivered = Vec::new();
            for i in 0..entries.len() {
                prop_assert!(sender.sent().len() <= i + 1);
                if let Some(delivery) = queue.advance(&format!("+OK {i}")) {
                    delivered.push((delivery.origin, delivery.attribute, delivery.reply));
                }
            }

            let expected: Vec<_> = entries
                .iter()
                .enumerate()
                .filter_map(|(i, entry)| {
                    entry.map(|origin| (ControlPointId::new(origin), format!("attr{i}"), format!("+OK {i}")))
                })
                .collect();

            prop_assert_eq!(delivered, expected);
            prop_assert_eq!(sender.sent().len(), entries.len());
            prop_assert!(queue.is_empty());
            prop_assert!(!queue.is_in_progress());
        }
    }
}
