//! Directory of nodes the mesh has announced, keyed by node id.
//!
//! The directory is fed by the transport (node info packets, our own `my_info`)
//! and read by the coordinate resolver and the `message` command. It can be
//! persisted as JSON so names survive restarts before nodes re-announce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::{NodeId, NodeInfo};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NodeDirectory {
    /// Learned from the radio on every start, never cached
    #[serde(skip)]
    local_id: Option<NodeId>,
    nodes: HashMap<NodeId, NodeInfo>,
    #[serde(default = "Utc::now")]
    last_updated: DateTime<Utc>,
}

impl NodeDirectory {
    pub fn new() -> Self {
        Self {
            local_id: None,
            nodes: HashMap::new(),
            last_updated: Utc::now(),
        }
    }

    /// Directory for a bot whose own node id is already known.
    pub fn with_local_id(local_id: NodeId) -> Self {
        let mut dir = Self::new();
        dir.local_id = Some(local_id);
        dir
    }

    pub fn local_id(&self) -> Option<NodeId> {
        self.local_id
    }

    pub fn set_local_id(&mut self, id: NodeId) {
        self.local_id = Some(id);
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeInfo> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.values()
    }

    /// First node whose short or long name matches `name` (case-insensitive).
    ///
    /// Map iteration order is unspecified, so two nodes sharing a name resolve
    /// to whichever the scan meets first.
    pub fn find_by_name(&self, name: &str) -> Option<&NodeInfo> {
        self.nodes.values().find(|n| n.answers_to(name))
    }

    /// Insert or refresh a node. Names and metrics present in `info` replace
    /// the stored ones; absent fields keep what we already knew.
    pub fn upsert(&mut self, info: NodeInfo) {
        let now = Utc::now();
        self.nodes
            .entry(info.id)
            .and_modify(|n| {
                if info.short_name.is_some() {
                    n.short_name = info.short_name.clone();
                }
                if info.long_name.is_some() {
                    n.long_name = info.long_name.clone();
                }
                if info.snr.is_some() {
                    n.snr = info.snr;
                }
                if info.hops_away.is_some() {
                    n.hops_away = info.hops_away;
                }
                if info.battery_level.is_some() {
                    n.battery_level = info.battery_level;
                }
                n.last_seen = now;
            })
            .or_insert_with(|| NodeInfo {
                last_seen: now,
                ..info
            });
        self.last_updated = now;
    }

    pub fn remove_stale_nodes(&mut self, max_age_days: u32) -> usize {
        let cutoff = Utc::now() - chrono::Duration::days(max_age_days as i64);
        let initial_count = self.nodes.len();
        self.nodes.retain(|_, node| node.last_seen > cutoff);
        let removed = initial_count - self.nodes.len();
        if removed > 0 {
            self.last_updated = Utc::now();
        }
        removed
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        // Guard against accidental leading NULs from previous partial writes
        let cleaned = content.trim_start_matches('\0');
        let dir: NodeDirectory = serde_json::from_str(cleaned)?;
        Ok(dir)
    }

    /// Write the directory as JSON through a temp file and rename.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        use std::fs::{self as sfs, File};
        use std::io::Write;
        let path_ref = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;

        let dir = path_ref.parent().unwrap_or_else(|| Path::new("."));
        if !dir.as_os_str().is_empty() {
            sfs::create_dir_all(dir)?;
        }
        let base = path_ref
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("nodes.json");
        let tmp_path = dir.join(format!(".{}.tmp-{}", base, std::process::id()));
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(content.as_bytes())?;
            tmp.sync_all()?;
        }
        sfs::rename(&tmp_path, path_ref)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn upsert_keeps_known_fields() {
        let mut dir = NodeDirectory::new();
        let mut info = NodeInfo::new(NodeId(1)).with_names("A", "Alpha");
        info.snr = Some(6.5);
        dir.upsert(info);

        let mut update = NodeInfo::new(NodeId(1));
        update.hops_away = Some(2);
        dir.upsert(update);

        let node = dir.get(NodeId(1)).expect("node");
        assert_eq!(node.short_name.as_deref(), Some("A"));
        assert_eq!(node.snr, Some(6.5));
        assert_eq!(node.hops_away, Some(2));
    }

    #[test]
    fn find_by_name_misses_unknown() {
        let mut dir = NodeDirectory::new();
        dir.upsert(NodeInfo::new(NodeId(1)).with_names("A", "Alpha"));
        assert!(dir.find_by_name("beta").is_none());
        assert_eq!(dir.find_by_name("ALPHA").map(|n| n.id), Some(NodeId(1)));
    }

    #[test]
    fn save_and_load_round_trip() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("cache").join("nodes.json");
        let mut dir = NodeDirectory::with_local_id(NodeId(9));
        dir.upsert(NodeInfo::new(NodeId(1)).with_names("A", "Alpha"));
        dir.save_to_file(&path).expect("save");

        let loaded = NodeDirectory::load_from_file(&path).expect("load");
        assert_eq!(loaded.local_id(), None);
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn stale_nodes_are_dropped() {
        let mut dir = NodeDirectory::new();
        dir.upsert(NodeInfo::new(NodeId(1)));
        if let Some(n) = dir.nodes.get_mut(&NodeId(1)) {
            n.last_seen = Utc::now() - chrono::Duration::days(40);
        }
        dir.upsert(NodeInfo::new(NodeId(2)));
        assert_eq!(dir.remove_stale_nodes(30), 1);
        assert!(dir.get(NodeId(2)).is_some());
    }
}
