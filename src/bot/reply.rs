//! Reply sinks: where handler output goes.
//!
//! Handlers never talk to the transport directly. They call
//! [`ReplySink::send`] with the text and the coordinates the text answers; the
//! sink decides how that becomes an [`OutgoingMessage`].

use anyhow::{anyhow, Result};
use log::debug;
use tokio::sync::mpsc;

use crate::logutil::escape_log;
use crate::mesh::{MessageCoordinates, OutgoingMessage};

pub trait ReplySink {
    /// Queue `message` as an answer to `coordinates`. Returns once queued;
    /// delivery is not awaited.
    fn send(&mut self, message: &str, coordinates: &MessageCoordinates) -> Result<()>;
}

/// Sink feeding the transport writer task.
pub struct ChannelSink {
    outgoing_tx: mpsc::UnboundedSender<OutgoingMessage>,
}

impl ChannelSink {
    pub fn new(outgoing_tx: mpsc::UnboundedSender<OutgoingMessage>) -> Self {
        Self { outgoing_tx }
    }
}

impl ReplySink for ChannelSink {
    fn send(&mut self, message: &str, coordinates: &MessageCoordinates) -> Result<()> {
        let outgoing = OutgoingMessage::reply(message, coordinates);
        debug!(
            "Queue reply to {} (dm={}, ch{}): {}",
            coordinates.from_id,
            coordinates.is_dm,
            coordinates.channel_index,
            escape_log(message)
        );
        self.outgoing_tx
            .send(outgoing)
            .map_err(|_| anyhow!("outgoing channel closed"))
    }
}

/// Sink that keeps every reply in memory; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub sent: Vec<(String, MessageCoordinates)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.sent.iter().map(|(text, _)| text.as_str()).collect()
    }

    /// Messages as the transport would see them.
    pub fn outgoing(&self) -> Vec<OutgoingMessage> {
        self.sent
            .iter()
            .map(|(text, coords)| OutgoingMessage::reply(text, coords))
            .collect()
    }
}

impl ReplySink for RecordingSink {
    fn send(&mut self, message: &str, coordinates: &MessageCoordinates) -> Result<()> {
        self.sent.push((message.to_string(), coordinates.clone()));
        Ok(())
    }
}
