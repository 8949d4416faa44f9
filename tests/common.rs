//! Test utilities & fixtures shared by the integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use hops::bot::host::{HostControl, HostStatus};
use hops::bot::{RecordingSink, Router, RouterSettings};
use hops::mesh::{InboundEvent, MessageCoordinates, NodeDirectory, NodeId, NodeInfo};
use hops::storage::Storage;
use log::{Level, LevelFilter, Log, Metadata, Record};

pub const LOCAL: NodeId = NodeId(0x0a0a_0a0a);
pub const ALICE: NodeId = NodeId(0x0000_a11c);
pub const BOB: NodeId = NodeId(0x0000_0b0b);
pub const STRANGER: NodeId = NodeId(0x0000_5555);

/// Directory that knows our own id plus Alice and Bob.
pub fn directory() -> NodeDirectory {
    let mut dir = NodeDirectory::with_local_id(LOCAL);
    let mut alice = NodeInfo::new(ALICE).with_names("ALC", "Alice");
    alice.snr = Some(7.5);
    alice.hops_away = Some(1);
    dir.upsert(alice);
    dir.upsert(NodeInfo::new(BOB).with_names("BOB", "Bob Base"));
    dir
}

/// Coordinates of a message from `from`, sent to us directly.
pub fn dm_from(dir: &NodeDirectory, from: NodeId) -> MessageCoordinates {
    resolve(dir, from, LOCAL, 0)
}

/// Coordinates of a message from `from`, broadcast on `channel`.
pub fn broadcast_from(dir: &NodeDirectory, from: NodeId, channel: u32) -> MessageCoordinates {
    resolve(dir, from, NodeId::BROADCAST, channel)
}

pub fn resolve(dir: &NodeDirectory, from: NodeId, to: NodeId, channel: u32) -> MessageCoordinates {
    let event = InboundEvent {
        from,
        to,
        id: Some(4242),
        channel: Some(channel),
        text: String::new(),
    };
    MessageCoordinates::resolve(&event, dir)
}

pub fn temp_storage() -> (tempfile::TempDir, Arc<Storage>) {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let storage = Storage::open(dir.path().join("hops.db")).expect("storage");
    (dir, Arc::new(storage))
}

pub fn router_with_storage(storage: Arc<Storage>) -> Router {
    Router::new(RouterSettings::default()).with_storage(storage)
}

/// Route `text` and return everything the router sent.
pub fn route(
    router: &Router,
    coords: &MessageCoordinates,
    text: &str,
    dir: &NodeDirectory,
) -> RecordingSink {
    let mut sink = RecordingSink::new();
    router.route(coords, text, dir, &mut sink).expect("route");
    sink
}

/// Host stand-in for the admin commands.
#[derive(Default)]
pub struct MockHost {
    pub shutdowns: AtomicUsize,
}

impl MockHost {
    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl HostControl for MockHost {
    fn status(&self) -> HostStatus {
        HostStatus {
            uptime_secs: Some(3_720),
            primary_ip: Some("192.168.1.20".parse().expect("ip")),
            load_average: Some((0.1, 0.2, 0.3)),
            battery_percent: Some(64),
        }
    }

    fn shutdown(&self) -> anyhow::Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CapturedRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
}

thread_local! {
    static CAPTURED: RefCell<Vec<CapturedRecord>> = const { RefCell::new(Vec::new()) };
}

struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        CAPTURED.with(|c| {
            c.borrow_mut().push(CapturedRecord {
                level: record.level(),
                target: record.target().to_string(),
                message: record.args().to_string(),
            })
        });
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;
static INIT: Once = Once::new();

/// Start capturing log records emitted on the current test thread.
pub fn capture_logs() {
    INIT.call_once(|| {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Trace);
    });
    CAPTURED.with(|c| c.borrow_mut().clear());
}

pub fn captured_at(level: Level) -> Vec<CapturedRecord> {
    CAPTURED.with(|c| {
        c.borrow()
            .iter()
            .filter(|r| r.level == level)
            .cloned()
            .collect()
    })
}
