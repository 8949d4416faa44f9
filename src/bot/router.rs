//! Command router: prefix detection, synonym substitution and dispatch.
//!
//! ```text
//! ".👋🏼 there"  ─split─▶  token ".👋🏼", rest Some("there")
//!               ─strip─▶  "👋🏼"
//!            ─synonym─▶  "hello"
//!              ─lower─▶  handler table ─▶ handlers::hello
//! ```
//!
//! Anything without the prefix, or naming no known command, is dropped
//! without a reply.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use log::{debug, warn};

use super::batch::DEFAULT_REPLY_CAP;
use super::handlers;
use super::host::{HostControl, SystemHost};
use super::reply::ReplySink;
use crate::logutil::escape_log;
use crate::mesh::{MessageCoordinates, NodeDirectory, NodeId};
use crate::storage::Storage;

pub const DEFAULT_PREFIX: char = '.';
pub const DEFAULT_HELP_TEXT: &str = "http://w2asm.com/hops";

/// Everything a handler gets to look at for one command.
pub struct CommandContext<'a> {
    pub coordinates: &'a MessageCoordinates,
    /// Text after the first space, untouched
    pub argument: Option<&'a str>,
    pub directory: &'a NodeDirectory,
}

pub type Handler = fn(&Router, &CommandContext<'_>, &mut dyn ReplySink) -> Result<()>;

/// Tunables the handlers read.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub prefix: char,
    pub help_text: String,
    /// Reading the board or a mailbox only works in a DM
    pub bbs_require_dm: bool,
    /// Posts and reads are scoped to the channel they were made on
    pub bbs_per_channel: bool,
    pub reply_cap: usize,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX,
            help_text: DEFAULT_HELP_TEXT.to_string(),
            bbs_require_dm: true,
            bbs_per_channel: false,
            reply_cap: DEFAULT_REPLY_CAP,
        }
    }
}

/// Built-in synonyms. Keys are matched exactly against the token after the
/// prefix, before lowercasing.
pub fn default_synonyms() -> HashMap<String, String> {
    [
        ("👋", "hello"),
        ("👋🏻", "hello"),
        ("👋🏼", "hello"),
        ("👋🏽", "hello"),
        ("👋🏾", "hello"),
        ("👋🏿", "hello"),
        ("info", "help"),
        ("?", "help"),
        ("!", "help"),
        ("🤨", "help"),
        ("🏓", "ping"),
        (".", "ping"),
        ("mail", "messages"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_handlers() -> HashMap<&'static str, Handler> {
    let mut map: HashMap<&'static str, Handler> = HashMap::new();
    map.insert("hello", handlers::hello);
    map.insert("ping", handlers::ping);
    map.insert("help", handlers::help);
    map.insert("whoami", handlers::whoami);
    map.insert("status", handlers::status);
    map.insert("shutdown", handlers::shutdown);
    map.insert("post", handlers::post);
    map.insert("bbs", handlers::bbs);
    map.insert("message", handlers::message);
    map.insert("messages", handlers::messages);
    map
}

pub struct Router {
    settings: RouterSettings,
    synonyms: HashMap<String, String>,
    handlers: HashMap<&'static str, Handler>,
    storage: Option<Arc<Storage>>,
    admin: Option<NodeId>,
    host: Arc<dyn HostControl>,
}

impl Router {
    pub fn new(settings: RouterSettings) -> Self {
        Self {
            settings,
            synonyms: default_synonyms(),
            handlers: default_handlers(),
            storage: None,
            admin: None,
            host: Arc::new(SystemHost::new()),
        }
    }

    pub fn with_synonyms(mut self, synonyms: HashMap<String, String>) -> Self {
        self.synonyms = synonyms;
        self
    }

    pub fn with_storage(mut self, storage: Arc<Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// `None` leaves the admin commands permanently inert.
    pub fn with_admin(mut self, admin: Option<NodeId>) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_host(mut self, host: Arc<dyn HostControl>) -> Self {
        self.host = host;
        self
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    pub fn storage(&self) -> Option<&Storage> {
        self.storage.as_deref()
    }

    pub fn admin(&self) -> Option<NodeId> {
        self.admin
    }

    pub fn host(&self) -> &dyn HostControl {
        self.host.as_ref()
    }

    /// Canonical command name for a token, or `None` when the token does not
    /// carry the prefix.
    pub fn canonical_command(&self, token: &str) -> Option<String> {
        let stripped = token.strip_prefix(self.settings.prefix)?;
        let substituted = self
            .synonyms
            .get(stripped)
            .map(String::as_str)
            .unwrap_or(stripped);
        Some(substituted.to_lowercase())
    }

    /// Handle one inbound text message.
    ///
    /// Returns an error only when the invoked handler fails; the caller logs
    /// it and carries on with the next message.
    pub fn route(
        &self,
        coordinates: &MessageCoordinates,
        raw_text: &str,
        directory: &NodeDirectory,
        sink: &mut dyn ReplySink,
    ) -> Result<()> {
        if let Some(storage) = &self.storage {
            if let Err(e) =
                storage.log_received(coordinates.from_id, coordinates.channel_index, raw_text)
            {
                warn!("Failed to record inbound message from {}: {}", coordinates.from_id, e);
            }
        }

        let (token, argument) = match raw_text.split_once(' ') {
            Some((token, rest)) => (token, Some(rest)),
            None => (raw_text, None),
        };

        let Some(command) = self.canonical_command(token) else {
            return Ok(());
        };
        let Some(handler) = self.handlers.get(command.as_str()) else {
            debug!("Unknown command '{}' from {}", escape_log(&command), coordinates.from_id);
            return Ok(());
        };

        debug!("Received {} from {}", command, coordinates.from_id);
        let ctx = CommandContext {
            coordinates,
            argument,
            directory,
        };
        handler(self, &ctx, sink)
    }
}
