//! Binary entrypoint for the Hops CLI.
//!
//! Commands:
//! - `start [--tcp <host:port>] [--db <path>]` - run the bot against the radio bridge
//! - `init` - write a starter `config.toml`
//! - `status` - print database counters
//!
//! See the library crate docs for module-level details: `hops::`.
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use tokio::io::BufReader;

use hops::bot::server::load_directory;
use hops::bot::{HopsServer, Router};
use hops::config::{Config, TransportMode};
use hops::mesh::transport::spawn_bridge;
use hops::storage::Storage;

#[derive(Parser)]
#[command(name = "hops")]
#[command(about = "Command responder bot for Meshtastic mesh networks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Start {
        /// Connect to a TCP radio bridge instead of stdin/stdout (host:port)
        #[arg(long)]
        tcp: Option<String>,

        /// Database directory (overrides storage.db_path)
        #[arg(long)]
        db: Option<String>,
    },
    /// Write a default configuration file
    Init,
    /// Show database statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Start { tcp, db } => {
            let mut config = match pre_config {
                Some(config) => config,
                None => {
                    warn!("No usable config at {}, using defaults", cli.config);
                    Config::default()
                }
            };
            if let Some(db) = db {
                config.storage.db_path = db;
                config.storage.enabled = true;
            }
            if let Some(addr) = tcp {
                config.transport.mode = TransportMode::Tcp;
                config.transport.address = Some(addr);
            }
            run_bot(config).await?;
        }
        Commands::Init => {
            if std::path::Path::new(&cli.config).exists() {
                println!("{} already exists, leaving it alone", cli.config);
                return Ok(());
            }
            Config::create_default(&cli.config).await?;
            println!("Created default configuration at {}", cli.config);
            println!("Set bot.admin_id (or HOPS_ADMIN_ID) to enable .status and .shutdown");
        }
        Commands::Status => {
            let config = pre_config.unwrap_or_default();
            let storage = Storage::open(&config.storage.db_path)
                .with_context(|| format!("opening {}", config.storage.db_path))?;
            let stats = storage.stats();
            println!("Hops v{}", env!("CARGO_PKG_VERSION"));
            println!("Database: {}", config.storage.db_path);
            println!("Board posts: {}", stats.bbs_posts);
            println!("Mailbox messages: {}", stats.mailbox_messages);
            println!("Received messages: {}", stats.received);
            println!("Known nodes: {}", stats.nodes);
            match config.admin_node() {
                Some(admin) => println!("Admin: {}", admin),
                None => println!("Admin: not configured"),
            }
        }
    }

    Ok(())
}

async fn run_bot(config: Config) -> Result<()> {
    info!("Starting Hops v{}", env!("CARGO_PKG_VERSION"));

    let mut router = Router::new(config.router_settings()).with_admin(config.admin_node());
    if config.storage.enabled {
        let storage = Storage::open(&config.storage.db_path)
            .with_context(|| format!("opening {}", config.storage.db_path))?;
        info!("Storage at {}", config.storage.db_path);
        router = router.with_storage(Arc::new(storage));
    } else {
        info!("Storage disabled; board and mailbox commands are inert");
    }

    let cache_path = config.transport.node_cache_path.as_ref().map(PathBuf::from);
    let directory = cache_path
        .as_deref()
        .map(load_directory)
        .unwrap_or_default();

    let tuning = config.writer_tuning();
    let (events, outgoing) = match config.transport.mode {
        TransportMode::Stdio => {
            info!("Using stdin/stdout radio bridge");
            spawn_bridge(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), tuning)
        }
        TransportMode::Tcp => {
            let addr = config
                .transport
                .address
                .clone()
                .context("transport.mode is tcp but no address is set")?;
            let stream = tokio::net::TcpStream::connect(&addr)
                .await
                .with_context(|| format!("connecting to radio bridge at {addr}"))?;
            info!("Connected to radio bridge at {}", addr);
            let (read_half, write_half) = stream.into_split();
            spawn_bridge(BufReader::new(read_half), write_half, tuning)
        }
    };

    let mut server = HopsServer::new(router, directory, events, outgoing);
    if let Some(path) = cache_path {
        server = server.with_node_cache(path);
    }
    if let Err(e) = server.run().await {
        error!("Hops stopped: {}", e);
        return Err(e.into());
    }
    info!("Hops stopped");
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // -v beats the configured level
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    // stdout may be the bridge pipe, so records only ever go to stderr
    builder.target(env_logger::Target::Stderr);

    let security_path = config.as_ref().and_then(|c| c.logging.security_file.clone());
    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        })
        .map(|f| std::sync::Arc::new(std::sync::Mutex::new(f)));
    let is_tty = atty::is(atty::Stream::Stderr);

    builder.format(move |fmt, record| {
        let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let line = format!("{} [{}] {}", ts, record.level(), record.args());

        if record.target() == "security" {
            if let Some(ref sec_path) = security_path {
                if let Ok(mut sf) = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(sec_path)
                {
                    let _ = writeln!(sf, "{}", line);
                }
            }
        }

        match &log_file {
            Some(file) => {
                if let Ok(mut guard) = file.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                // Mirror to the terminal only in the foreground
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            }
            None => writeln!(fmt, "{}", line),
        }
    });
    let _ = builder.try_init();
}
