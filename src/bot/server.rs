//! Server loop: one transport event at a time, start to finish.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::reply::ChannelSink;
use super::router::Router;
use crate::logutil::escape_log;
use crate::mesh::transport::TransportEvent;
use crate::mesh::{MessageCoordinates, NodeDirectory, OutgoingMessage};
use crate::storage::StorageError;

/// Nodes not heard from in this many days are dropped from the directory.
pub const NODE_STALE_DAYS: u32 = 30;
const HOUSEKEEPING_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ServerError {
    /// The bridge went away. There is no reconnect; the process exits.
    #[error("transport connection lost")]
    TransportLost,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct HopsServer {
    router: Router,
    directory: NodeDirectory,
    node_cache_path: Option<PathBuf>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    sink: ChannelSink,
}

impl HopsServer {
    pub fn new(
        router: Router,
        directory: NodeDirectory,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        outgoing: mpsc::UnboundedSender<OutgoingMessage>,
    ) -> Self {
        Self {
            router,
            directory,
            node_cache_path: None,
            events,
            sink: ChannelSink::new(outgoing),
        }
    }

    pub fn with_node_cache(mut self, path: PathBuf) -> Self {
        self.node_cache_path = Some(path);
        self
    }

    pub fn directory(&self) -> &NodeDirectory {
        &self.directory
    }

    /// Run until Ctrl-C (Ok) or until the transport is lost (Err).
    pub async fn run(&mut self) -> Result<(), ServerError> {
        info!("Hops server started");
        let mut housekeeping = interval(Duration::from_secs(HOUSEKEEPING_SECS));
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else {
                        warn!("Transport event channel closed");
                        break Err(ServerError::TransportLost);
                    };
                    if let Err(e) = self.handle_event(event) {
                        break Err(e);
                    }
                }
                _ = housekeeping.tick() => {
                    let removed = self.directory.remove_stale_nodes(NODE_STALE_DAYS);
                    if removed > 0 {
                        debug!("Dropped {} stale nodes", removed);
                    }
                    self.save_node_cache();
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break Ok(());
                }
            }
        };

        self.save_node_cache();
        if let Some(storage) = self.router.storage() {
            storage.flush()?;
        }
        outcome
    }

    /// Apply one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<(), ServerError> {
        match event {
            TransportEvent::Connected => info!("Connected to radio bridge"),
            TransportEvent::MyInfo { id } => {
                info!("Local node id is {}", id);
                self.directory.set_local_id(id);
            }
            TransportEvent::Node(node) => {
                debug!("Node update for {}", node.id);
                if let Some(storage) = self.router.storage() {
                    if let Err(e) = storage.log_node(&node) {
                        warn!("Failed to log node {}: {}", node.id, e);
                    }
                }
                self.directory.upsert(node);
            }
            TransportEvent::Text(text) => {
                let coordinates = MessageCoordinates::resolve(&text, &self.directory);
                debug!(
                    "Text from {} to {} (dm={}, ch{}): {}",
                    coordinates.from_id,
                    coordinates.to_id,
                    coordinates.is_dm,
                    coordinates.channel_index,
                    escape_log(&text.text)
                );
                if let Err(e) =
                    self.router
                        .route(&coordinates, &text.text, &self.directory, &mut self.sink)
                {
                    warn!("Command from {} failed: {e:?}", coordinates.from_id);
                }
            }
            TransportEvent::ConnectionLost => {
                warn!("Radio bridge connection lost");
                return Err(ServerError::TransportLost);
            }
        }
        Ok(())
    }

    fn save_node_cache(&self) {
        let Some(path) = &self.node_cache_path else {
            return;
        };
        if let Err(e) = self.directory.save_to_file(path) {
            warn!("Failed to save node cache {}: {}", path.display(), e);
        }
    }
}

/// Directory from the node cache at `path`, or an empty one.
pub fn load_directory(path: &Path) -> NodeDirectory {
    if !path.exists() {
        debug!("No node cache at {}, starting fresh", path.display());
        return NodeDirectory::new();
    }
    match NodeDirectory::load_from_file(path) {
        Ok(dir) => {
            debug!("Loaded {} cached nodes from {}", dir.len(), path.display());
            dir
        }
        Err(e) => {
            warn!("Failed to load node cache: {}", e);
            NodeDirectory::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::router::RouterSettings;
    use crate::mesh::{InboundEvent, NodeId, NodeInfo};

    fn server() -> (HopsServer, mpsc::UnboundedSender<TransportEvent>, mpsc::UnboundedReceiver<OutgoingMessage>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let server = HopsServer::new(
            Router::new(RouterSettings::default()),
            NodeDirectory::new(),
            event_rx,
            out_tx,
        );
        (server, event_tx, out_rx)
    }

    fn text(to: u32, body: &str) -> TransportEvent {
        TransportEvent::Text(InboundEvent {
            from: NodeId(7),
            to: NodeId(to),
            id: Some(1),
            channel: Some(0),
            text: body.into(),
        })
    }

    #[test]
    fn my_info_turns_on_dm_detection() {
        let (mut server, _tx, mut out) = server();
        server.handle_event(text(0x55, ".ping")).unwrap();
        assert_eq!(out.try_recv().unwrap().to, None);

        server.handle_event(TransportEvent::MyInfo { id: NodeId(0x55) }).unwrap();
        server.handle_event(text(0x55, ".ping")).unwrap();
        assert_eq!(out.try_recv().unwrap().to, Some(NodeId(7)));
    }

    #[test]
    fn node_events_feed_the_directory() {
        let (mut server, _tx, _out) = server();
        server
            .handle_event(TransportEvent::Node(NodeInfo::new(NodeId(7)).with_names("SEV", "Seven")))
            .unwrap();
        assert_eq!(server.directory().find_by_name("seven").map(|n| n.id), Some(NodeId(7)));
    }

    #[test]
    fn connection_lost_is_fatal() {
        let (mut server, _tx, _out) = server();
        assert!(matches!(
            server.handle_event(TransportEvent::ConnectionLost),
            Err(ServerError::TransportLost)
        ));
    }

    #[tokio::test]
    async fn run_stops_when_bridge_goes_away() {
        let (mut server, tx, mut out) = server();
        tx.send(TransportEvent::Connected).unwrap();
        tx.send(text(0xffff_ffff, ".hello")).unwrap();
        tx.send(TransportEvent::ConnectionLost).unwrap();
        let result = server.run().await;
        assert!(matches!(result, Err(ServerError::TransportLost)));
        assert_eq!(out.try_recv().unwrap().text, "👋");
    }

    #[test]
    fn missing_cache_gives_empty_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(load_directory(&dir.path().join("nope.json")).is_empty());
    }
}
