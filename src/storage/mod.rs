//! # Storage Module - Bulletin Board and Mailbox Persistence
//!
//! Sled-backed persistence for the two message features of the bot plus a raw
//! audit trail of everything it hears.
//!
//! ## Trees
//!
//! ```text
//! bbs                   ← board posts, keyed by creation time
//! mailbox               ← private messages, keyed by creation time
//! mailbox_by_recipient  ← "<to_id>:" + creation time → mailbox key
//! received              ← raw inbound text (audit)
//! nodes                 ← node snapshots as JSON, keyed by node id
//! ```
//!
//! ## Rules
//!
//! - Rows are append-only. Nothing here updates or deletes a row.
//! - Each row is stamped with its creation instant, which doubles as its key.
//!   Stamps handed out by this process are strictly increasing; inserting a
//!   stamp that is already taken fails with
//!   [`StorageError::TimestampCollision`] and writes nothing.
//! - Reads only see rows from the last [`RETENTION_DAYS`] days and return at
//!   most [`READ_LIMIT`] of them. Older rows stay on disk.
//! - Every insert runs in a single sled transaction; multi-tree inserts commit
//!   or abort together.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hops::mesh::NodeId;
//! use hops::storage::{SenderInfo, Storage};
//!
//! fn main() -> Result<(), hops::storage::StorageError> {
//!     let storage = Storage::open("./hops.db")?;
//!     let sender = SenderInfo::new(NodeId(0x1234abcd));
//!     storage.insert_bbs(&sender, None, "Net tonight at 8")?;
//!     for post in storage.read_bbs(None)? {
//!         println!("{}: {}", post.from.label(), post.message);
//!     }
//!     Ok(())
//! }
//! ```

pub mod errors;

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{abort, Transactional};

use crate::mesh::{MessageCoordinates, NodeId, NodeInfo};
pub use errors::StorageError;

/// Trailing window within which rows are visible to reads.
pub const RETENTION_DAYS: i64 = 28;
/// Maximum rows returned by one read.
pub const READ_LIMIT: usize = 5;

pub const ENTRY_SCHEMA_VERSION: u8 = 1;

const TREE_BBS: &str = "bbs";
const TREE_MAILBOX: &str = "mailbox";
const TREE_MAILBOX_INDEX: &str = "mailbox_by_recipient";
const TREE_RECEIVED: &str = "received";
const TREE_NODES: &str = "nodes";

/// Who wrote a row, as known when it was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    pub id: NodeId,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
}

impl SenderInfo {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            short_name: None,
            long_name: None,
        }
    }

    pub fn from_coordinates(coordinates: &MessageCoordinates) -> Self {
        Self {
            id: coordinates.from_id,
            short_name: coordinates.from_short_name().map(str::to_string),
            long_name: coordinates.from_long_name().map(str::to_string),
        }
    }

    /// Short name when known, otherwise the node id.
    pub fn label(&self) -> String {
        match &self.short_name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => self.id.to_string(),
        }
    }
}

/// A bulletin board post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BbsEntry {
    pub schema_version: u8,
    pub timestamp: DateTime<Utc>,
    pub from: SenderInfo,
    /// Set when the board is scoped per channel
    pub channel_index: Option<u32>,
    pub message: String,
}

/// A private message waiting for its recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailboxEntry {
    pub schema_version: u8,
    pub timestamp: DateTime<Utc>,
    pub from: SenderInfo,
    pub to_id: NodeId,
    pub channel_index: u32,
    pub message: String,
}

/// Raw inbound text, recorded before any command parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedEntry {
    pub timestamp: DateTime<Utc>,
    pub from_id: NodeId,
    pub channel_index: u32,
    pub message: String,
}

/// Row counts reported by `hops status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageStats {
    pub bbs_posts: usize,
    pub mailbox_messages: usize,
    pub received: usize,
    pub nodes: usize,
}

/// Sled-backed store for board posts, mailbox messages and the audit trail.
pub struct Storage {
    db: sled::Db,
    bbs: sled::Tree,
    mailbox: sled::Tree,
    mailbox_index: sled::Tree,
    received: sled::Tree,
    nodes: sled::Tree,
    last_stamp_nanos: AtomicI64,
}

fn time_key(ts: &DateTime<Utc>) -> Result<[u8; 8], StorageError> {
    let nanos = ts
        .timestamp_nanos_opt()
        .filter(|n| *n >= 0)
        .ok_or(StorageError::TimestampRange(*ts))?;
    Ok((nanos as u64).to_be_bytes())
}

fn recipient_prefix(to_id: NodeId) -> Vec<u8> {
    format!("{}:", to_id).into_bytes()
}

fn index_key(to_id: NodeId, key: &[u8; 8]) -> Vec<u8> {
    let mut out = recipient_prefix(to_id);
    out.extend_from_slice(key);
    out
}

fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(RETENTION_DAYS)
}

impl Storage {
    /// Open (or create) the database rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        let bbs = db.open_tree(TREE_BBS)?;
        let mailbox = db.open_tree(TREE_MAILBOX)?;
        let mailbox_index = db.open_tree(TREE_MAILBOX_INDEX)?;
        let received = db.open_tree(TREE_RECEIVED)?;
        let nodes = db.open_tree(TREE_NODES)?;
        Ok(Self {
            db,
            bbs,
            mailbox,
            mailbox_index,
            received,
            nodes,
            last_stamp_nanos: AtomicI64::new(0),
        })
    }

    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
        Ok(bincode::deserialize::<T>(bytes)?)
    }

    /// Next creation stamp: the current time, nudged forward so no two rows
    /// written by this process share an instant.
    fn next_stamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let wall = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros() * 1000);
        let mut last = self.last_stamp_nanos.load(Ordering::SeqCst);
        loop {
            let next = wall.max(last + 1);
            match self.last_stamp_nanos.compare_exchange(
                last,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Utc.timestamp_nanos(next),
                Err(actual) => last = actual,
            }
        }
    }

    /// Upper bound for default reads: the later of the wall clock and the
    /// last stamp handed out, so rows written while the clock stepped back
    /// stay visible.
    fn read_instant(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let last = self.last_stamp_nanos.load(Ordering::SeqCst);
        if last > 0 {
            now.max(Utc.timestamp_nanos(last))
        } else {
            now
        }
    }

    /// Make the next default stamp `at` (if the wall clock is behind it).
    #[cfg(test)]
    pub(crate) fn pin_next_stamp(&self, at: DateTime<Utc>) {
        if let Some(nanos) = at.timestamp_nanos_opt() {
            self.last_stamp_nanos.store(nanos - 1, Ordering::SeqCst);
        }
    }

    /// Write `value` under `key` unless the key is taken.
    fn insert_unique(
        tree: &sled::Tree,
        table: &'static str,
        timestamp: DateTime<Utc>,
        key: &[u8; 8],
        value: &[u8],
    ) -> Result<(), StorageError> {
        tree.transaction(|tx| {
            if tx.get(key)?.is_some() {
                return abort(StorageError::TimestampCollision { table, timestamp });
            }
            tx.insert(&key[..], value)?;
            Ok(())
        })?;
        Ok(())
    }

    /// Append a board post stamped with the current time.
    pub fn insert_bbs(
        &self,
        from: &SenderInfo,
        channel_index: Option<u32>,
        message: &str,
    ) -> Result<BbsEntry, StorageError> {
        self.insert_bbs_at(self.next_stamp(), from, channel_index, message)
    }

    /// Append a board post with an explicit creation instant.
    pub fn insert_bbs_at(
        &self,
        timestamp: DateTime<Utc>,
        from: &SenderInfo,
        channel_index: Option<u32>,
        message: &str,
    ) -> Result<BbsEntry, StorageError> {
        let entry = BbsEntry {
            schema_version: ENTRY_SCHEMA_VERSION,
            timestamp,
            from: from.clone(),
            channel_index,
            message: message.to_string(),
        };
        let key = time_key(&timestamp)?;
        let bytes = Self::serialize(&entry)?;
        Self::insert_unique(&self.bbs, TREE_BBS, timestamp, &key, &bytes)?;
        Ok(entry)
    }

    /// Newest-first board posts from the retention window.
    ///
    /// With `channel_index` set only posts made on that channel are returned.
    pub fn read_bbs(&self, channel_index: Option<u32>) -> Result<Vec<BbsEntry>, StorageError> {
        self.read_bbs_at(self.read_instant(), channel_index)
    }

    pub fn read_bbs_at(
        &self,
        now: DateTime<Utc>,
        channel_index: Option<u32>,
    ) -> Result<Vec<BbsEntry>, StorageError> {
        let start = time_key(&window_start(now))?;
        let end = time_key(&now)?;
        let mut out = Vec::new();
        for item in self.bbs.range(start..=end).rev() {
            let (_key, value) = item?;
            let entry: BbsEntry = Self::deserialize(&value)?;
            check_schema("bbs", entry.schema_version)?;
            if channel_index.is_some() && entry.channel_index != channel_index {
                continue;
            }
            out.push(entry);
            if out.len() == READ_LIMIT {
                break;
            }
        }
        Ok(out)
    }

    /// Append a mailbox message stamped with the current time.
    pub fn insert_mail(
        &self,
        from: &SenderInfo,
        to_id: NodeId,
        channel_index: u32,
        message: &str,
    ) -> Result<MailboxEntry, StorageError> {
        self.insert_mail_at(self.next_stamp(), from, to_id, channel_index, message)
    }

    /// Append a mailbox message with an explicit creation instant. The row and
    /// its recipient index entry are written in one transaction.
    pub fn insert_mail_at(
        &self,
        timestamp: DateTime<Utc>,
        from: &SenderInfo,
        to_id: NodeId,
        channel_index: u32,
        message: &str,
    ) -> Result<MailboxEntry, StorageError> {
        let entry = MailboxEntry {
            schema_version: ENTRY_SCHEMA_VERSION,
            timestamp,
            from: from.clone(),
            to_id,
            channel_index,
            message: message.to_string(),
        };
        let key = time_key(&timestamp)?;
        let idx = index_key(to_id, &key);
        let bytes = Self::serialize(&entry)?;

        (&self.mailbox, &self.mailbox_index).transaction(|(rows, index)| {
            if rows.get(key)?.is_some() {
                return abort(StorageError::TimestampCollision {
                    table: TREE_MAILBOX,
                    timestamp,
                });
            }
            rows.insert(&key[..], bytes.as_slice())?;
            index.insert(idx.as_slice(), &key[..])?;
            Ok(())
        })?;
        Ok(entry)
    }

    /// Oldest-first messages addressed to `to_id` from the retention window.
    pub fn read_mail(&self, to_id: NodeId) -> Result<Vec<MailboxEntry>, StorageError> {
        self.read_mail_at(self.read_instant(), to_id)
    }

    pub fn read_mail_at(
        &self,
        now: DateTime<Utc>,
        to_id: NodeId,
    ) -> Result<Vec<MailboxEntry>, StorageError> {
        let start = index_key(to_id, &time_key(&window_start(now))?);
        let end = index_key(to_id, &time_key(&now)?);
        let mut out = Vec::new();
        for item in self.mailbox_index.range(start..=end).take(READ_LIMIT) {
            let (_idx, row_key) = item?;
            let Some(value) = self.mailbox.get(&row_key)? else {
                continue;
            };
            let entry: MailboxEntry = Self::deserialize(&value)?;
            check_schema("mailbox", entry.schema_version)?;
            out.push(entry);
        }
        Ok(out)
    }

    /// Record raw inbound text before it is parsed.
    pub fn log_received(
        &self,
        from_id: NodeId,
        channel_index: u32,
        message: &str,
    ) -> Result<(), StorageError> {
        let entry = ReceivedEntry {
            timestamp: self.next_stamp(),
            from_id,
            channel_index,
            message: message.to_string(),
        };
        let key = time_key(&entry.timestamp)?;
        let bytes = Self::serialize(&entry)?;
        Self::insert_unique(&self.received, TREE_RECEIVED, entry.timestamp, &key, &bytes)
    }

    /// Most recent audit rows, newest first.
    pub fn recent_received(&self, limit: usize) -> Result<Vec<ReceivedEntry>, StorageError> {
        self.received
            .iter()
            .rev()
            .take(limit)
            .map(|item| {
                item.map_err(StorageError::from)
                    .and_then(|(_key, value)| Self::deserialize(&value))
            })
            .collect()
    }

    /// Keep the latest snapshot of a node as JSON.
    pub fn log_node(&self, node: &NodeInfo) -> Result<(), StorageError> {
        let json = serde_json::to_vec(node)?;
        self.nodes.insert(node.id.0.to_be_bytes(), json)?;
        Ok(())
    }

    pub fn get_logged_node(&self, id: NodeId) -> Result<Option<NodeInfo>, StorageError> {
        match self.nodes.get(id.0.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            bbs_posts: self.bbs.len(),
            mailbox_messages: self.mailbox.len(),
            received: self.received.len(),
            nodes: self.nodes.len(),
        }
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

fn check_schema(entity: &'static str, found: u8) -> Result<(), StorageError> {
    if found != ENTRY_SCHEMA_VERSION {
        return Err(StorageError::SchemaMismatch {
            entity,
            expected: ENTRY_SCHEMA_VERSION,
            found,
        });
    }
    Ok(())
}
