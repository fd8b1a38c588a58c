//! Outgoing side of the message channel.

use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::{MessageEnvelope, ProcessMessage};

/// Sends a message to the host. Best effort: returns false when the
/// transport is gone, never fails the caller.
pub trait ProcessMessageSender: Send + Sync {
    fn send(&self, message: ProcessMessage, data: Option<Value>) -> bool;
}

/// Queues envelopes on an unbounded channel drained by the transport task.
#[derive(Clone)]
pub struct ChannelMessageSender {
    tx: mpsc::UnboundedSender<MessageEnvelope>,
}

impl ChannelMessageSender {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MessageEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProcessMessageSender for ChannelMessageSender {
    fn send(&self, message: ProcessMessage, data: Option<Value>) -> bool {
        self.tx
            .send(MessageEnvelope::outgoing(message, data))
            .is_ok()
    }
}

/// Discards every message.
#[derive(Clone, Default)]
pub struct NoOpMessageSender;

impl ProcessMessageSender for NoOpMessageSender {
    fn send(&self, _message: ProcessMessage, _data: Option<Value>) -> bool {
        true
    }
}

/// Collects sent messages for assertions.
#[derive(Clone, Default)]
pub struct MockMessageSender {
    sent: Arc<Mutex<Vec<(ProcessMessage, Option<Value>)>>>,
}

impl MockMessageSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(ProcessMessage, Option<Value>)> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn messages(&self) -> Vec<ProcessMessage> {
        self.sent().into_iter().map(|(m, _)| m).collect()
    }
}

impl ProcessMessageSender for MockMessageSender {
    fn send(&self, message: ProcessMessage, data: Option<Value>) -> bool {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((message, data));
        true
    }
}
