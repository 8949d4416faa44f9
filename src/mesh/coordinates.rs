//! Message coordinates: who sent an inbound message, where it was addressed,
//! and therefore where a reply has to go.

use super::{InboundEvent, NodeDirectory, NodeId, NodeInfo};

/// Immutable addressing facts for one inbound message.
///
/// Built once per event by [`MessageCoordinates::resolve`]. Re-targeting a
/// reply goes through the `with_*` / `without_*` builders, which return a new
/// value and leave the original untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageCoordinates {
    pub from_id: NodeId,
    pub from_node: Option<NodeInfo>,
    pub to_id: NodeId,
    pub to_node: Option<NodeInfo>,
    pub message_id: Option<u32>,
    pub channel_index: u32,
    pub is_dm: bool,
}

impl MessageCoordinates {
    /// Resolve an inbound event against the node directory.
    ///
    /// Unknown nodes simply have no snapshot. A message is a DM exactly when
    /// its destination is our own node id; until that id is known nothing is.
    pub fn resolve(event: &InboundEvent, directory: &NodeDirectory) -> Self {
        Self {
            from_id: event.from,
            from_node: directory.get(event.from).cloned(),
            to_id: event.to,
            to_node: directory.get(event.to).cloned(),
            message_id: event.id,
            channel_index: event.channel.unwrap_or(0),
            is_dm: directory.local_id() == Some(event.to),
        }
    }

    /// Coordinates for an unsolicited DM to `node_id` (e.g. a mail notice).
    ///
    /// Replies are addressed to `from_id`, so the target node sits there.
    pub fn direct_to(node_id: NodeId, node: Option<NodeInfo>, channel_index: u32) -> Self {
        Self {
            from_id: node_id,
            from_node: node,
            to_id: node_id,
            to_node: None,
            message_id: None,
            channel_index,
            is_dm: true,
        }
    }

    pub fn with_dm(&self, is_dm: bool) -> Self {
        Self {
            is_dm,
            ..self.clone()
        }
    }

    pub fn without_message_id(&self) -> Self {
        Self {
            message_id: None,
            ..self.clone()
        }
    }

    /// Private delivery to the sender, starting a fresh thread.
    pub fn as_forced_dm(&self) -> Self {
        self.with_dm(true).without_message_id()
    }

    pub fn from_short_name(&self) -> Option<&str> {
        self.from_node.as_ref().and_then(|n| n.short_name.as_deref())
    }

    pub fn from_long_name(&self) -> Option<&str> {
        self.from_node.as_ref().and_then(|n| n.long_name.as_deref())
    }
}
