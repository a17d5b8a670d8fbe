// THEORY:
// A `FeedbackSink` is where the blocking lifecycle sends human-readable progress:
// reps, set completions, rest announcements and tracking loss. The engine never
// decides how the message reaches the user. It could go to a speech engine, a log,
// a websocket or a test buffer.

use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

pub trait FeedbackSink {
    fn emit(&mut self, message: &str);
}

impl<S: FeedbackSink + ?Sized> FeedbackSink for &mut S {
    fn emit(&mut self, message: &str) {
        (**self).emit(message);
    }
}

/// Writes every message to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl FeedbackSink for LogSink {
    fn emit(&mut self, message: &str) {
        info!(target: "rep_vision::feedback", "{message}");
    }
}

/// Keeps every message in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    messages: Vec<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }
}

impl FeedbackSink for RecordingSink {
    fn emit(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }
}

/// Forwards messages to an async consumer. Messages are dropped once the receiver
/// is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl FeedbackSink for ChannelSink {
    fn emit(&mut self, message: &str) {
        let _ = self.tx.send(message.to_string());
    }
}
