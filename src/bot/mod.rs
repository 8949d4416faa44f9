//! # Bot Module
//!
//! Everything between "a text message arrived" and "replies are queued".
//!
//! ## Components
//!
//! - [`router`] - prefix + synonym normalization and the handler table
//! - [`handlers`] - one function per command
//! - [`batch`] - greedy packing of reply lines under the radio size cap
//! - [`reply`] - the [`reply::ReplySink`] seam handlers write to
//! - [`host`] - host facts and power control for the admin commands
//! - [`server`] - the event loop tying transport, directory and router together
//!
//! ```text
//! TransportEvent ─▶ HopsServer ─resolve─▶ MessageCoordinates
//!                                   │
//!                                Router ─▶ handler ─▶ Storage
//!                                                 └─▶ ReplySink ─▶ writer task
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hops::bot::{HopsServer, Router, RouterSettings};
//! use hops::mesh::transport::{spawn_bridge, WriterTuning};
//! use hops::mesh::NodeDirectory;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let input = tokio::io::BufReader::new(tokio::io::stdin());
//!     let (events, outgoing) = spawn_bridge(input, tokio::io::stdout(), WriterTuning::default());
//!     let router = Router::new(RouterSettings::default());
//!     let mut server = HopsServer::new(router, NodeDirectory::new(), events, outgoing);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod handlers;
pub mod host;
pub mod reply;
pub mod router;
pub mod server;

pub use reply::{ChannelSink, RecordingSink, ReplySink};
pub use router::{Router, RouterSettings};
pub use server::{HopsServer, ServerError};
