//! # Hops - Command Bot for Meshtastic Networks
//!
//! Hops listens to text traffic on a Meshtastic mesh and answers commands
//! that start with a prefix (`.` by default). Besides a few conversational
//! commands it keeps a small public bulletin board and a per-node mailbox.
//!
//! ## Features
//!
//! - **Commands**: `.hello`, `.ping`, `.help`, `.whoami`, emoji and shorthand synonyms
//! - **Bulletin Board**: `.post`, `.bbs`, `.bbs add`, with a 28-day window and 5-post reads
//! - **Mailbox**: `.message <name> <text>` and `.messages`, delivered by node name
//! - **Admin**: `.status` and `.shutdown` for one configured node, silent for everyone else
//! - **Radio Bridge**: newline-delimited JSON over stdin/stdout or TCP
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hops::bot::{HopsServer, Router};
//! use hops::config::Config;
//! use hops::mesh::transport::spawn_bridge;
//! use hops::mesh::NodeDirectory;
//! use hops::storage::Storage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let storage = Arc::new(Storage::open(&config.storage.db_path)?);
//!     let router = Router::new(config.router_settings())
//!         .with_storage(storage)
//!         .with_admin(config.admin_node());
//!
//!     let stdin = tokio::io::BufReader::new(tokio::io::stdin());
//!     let (events, outgoing) = spawn_bridge(stdin, tokio::io::stdout(), config.writer_tuning());
//!     HopsServer::new(router, NodeDirectory::new(), events, outgoing).run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`bot`] - router, handlers, reply batching and the server loop
//! - [`mesh`] - node ids, the node directory, message coordinates and the bridge transport
//! - [`storage`] - sled persistence for the board, the mailbox and the audit log
//! - [`config`] - TOML configuration
//! - [`logutil`] - helpers for logging user-supplied text

pub mod bot;
pub mod config;
pub mod logutil;
pub mod mesh;
pub mod storage;
