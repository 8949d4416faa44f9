//! # Mesh Types Module
//!
//! Plain data exchanged with the radio side of the bot: node identifiers,
//! directory snapshots, inbound text events and outbound messages.
//!
//! The actual radio link (serial/TCP framing, encryption, node discovery) lives
//! outside this crate. The [`transport`] module speaks to it through a
//! newline-delimited JSON bridge and converts everything into the types below.
//!
//! ## Components
//!
//! - [`NodeId`] - 32-bit node number with the canonical `!xxxxxxxx` form
//! - [`directory`] - known nodes, keyed by id, persisted as a JSON cache
//! - [`coordinates`] - who sent a message, to whom, and how to answer
//! - [`transport`] - reader/writer tasks for the JSON bridge

pub mod coordinates;
pub mod directory;
pub mod transport;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use coordinates::MessageCoordinates;
pub use directory::NodeDirectory;

/// Destination number used by the mesh for channel broadcasts.
pub const BROADCAST_NUM: u32 = 0xFFFF_FFFF;

/// A mesh node number.
///
/// Displayed the way Meshtastic clients show ids: `!` followed by eight
/// lower-case hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const BROADCAST: NodeId = NodeId(BROADCAST_NUM);

    pub fn is_broadcast(&self) -> bool {
        self.0 == BROADCAST_NUM
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!{:08x}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(num: u32) -> Self {
        NodeId(num)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeIdError {
    #[error("node id must start with '!': {0}")]
    MissingBang(String),

    #[error("node id must have 1-8 hex digits after '!': {0}")]
    BadDigits(String),
}

impl FromStr for NodeId {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let Some(hex) = trimmed.strip_prefix('!') else {
            return Err(NodeIdError::MissingBang(s.to_string()));
        };
        if hex.is_empty() || hex.len() > 8 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(NodeIdError::BadDigits(s.to_string()));
        }
        u32::from_str_radix(hex, 16)
            .map(NodeId)
            .map_err(|_| NodeIdError::BadDigits(s.to_string()))
    }
}

/// Snapshot of what the mesh has told us about a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_name: Option<String>,
    /// Signal-to-noise ratio of the last packet heard from this node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snr: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hops_away: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u32>,
    #[serde(default = "Utc::now")]
    pub last_seen: DateTime<Utc>,
}

impl NodeInfo {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            short_name: None,
            long_name: None,
            snr: None,
            hops_away: None,
            battery_level: None,
            last_seen: Utc::now(),
        }
    }

    pub fn with_names(mut self, short_name: &str, long_name: &str) -> Self {
        self.short_name = Some(short_name.to_string());
        self.long_name = Some(long_name.to_string());
        self
    }

    /// True when `name` equals the short or long name, ignoring case.
    pub fn answers_to(&self, name: &str) -> bool {
        let wanted = name.to_lowercase();
        [&self.short_name, &self.long_name]
            .into_iter()
            .flatten()
            .any(|n| n.trim().to_lowercase() == wanted)
    }
}

/// A decoded text packet as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub from: NodeId,
    #[serde(default = "broadcast_id")]
    pub to: NodeId,
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub channel: Option<u32>,
    #[serde(default)]
    pub text: String,
}

fn broadcast_id() -> NodeId {
    NodeId::BROADCAST
}

/// Outgoing message handed to the writer task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// None for broadcast, Some(node) for a direct message
    pub to: Option<NodeId>,
    /// Channel index (0 = primary)
    pub channel: u32,
    pub text: String,
    /// Packet id this message answers, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_id: Option<u32>,
    /// Single-glyph replies are flagged so clients render them as reactions
    #[serde(default)]
    pub emoji: bool,
}

impl OutgoingMessage {
    /// Build the packet for `text` answering `coordinates`.
    ///
    /// Broadcast unless the coordinates are a DM, in which case the packet goes
    /// back to `from_id`. The inbound message id rides along as the reply id.
    pub fn reply(text: &str, coordinates: &MessageCoordinates) -> Self {
        let to = if coordinates.is_dm {
            Some(coordinates.from_id)
        } else {
            None
        };
        Self {
            to,
            channel: coordinates.channel_index,
            text: text.to_string(),
            reply_id: coordinates.message_id,
            emoji: is_single_glyph(text),
        }
    }
}

// Emoji with skin-tone modifiers are several chars; anything short and
// free of ASCII counts as one glyph for the emoji flag.
fn is_single_glyph(text: &str) -> bool {
    let count = text.chars().count();
    (1..=2).contains(&count) && !text.chars().any(|c| c.is_ascii())
}
