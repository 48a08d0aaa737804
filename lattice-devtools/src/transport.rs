//! Outgoing message sinks.

use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::OutputMessage;

/// Where the debugger sends its messages.
pub trait Transport {
    fn send(&mut self, message: OutputMessage);
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    messages: Vec<OutputMessage>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[OutputMessage] {
        &self.messages
    }

    /// Drain the recorded messages.
    pub fn take(&mut self) -> Vec<OutputMessage> {
        std::mem::take(&mut self.messages)
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, message: OutputMessage) {
        self.messages.push(message);
    }
}

/// Forwards messages to a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<OutputMessage>,
}

impl ChannelTransport {
    /// Create a transport and the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutputMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, message: OutputMessage) {
        if self.tx.send(message).is_err() {
            debug!("dropping message: receiver closed");
        }
    }
}
