//! Command handlers.
//!
//! Each handler answers exactly one canonical command. They are synchronous
//! and finish all storage work and reply queueing before returning.

use anyhow::Result;
use log::{info, warn};

use super::batch::pack_lines;
use super::reply::ReplySink;
use super::router::{CommandContext, Router};
use crate::mesh::MessageCoordinates;
use crate::storage::{SenderInfo, Storage};

pub const SAVED: &str = "💾";
pub const DM_ONLY: &str = "🚫 Only allowed in DM";
pub const EMPTY: &str = "📭";
pub const NOT_FOUND: &str = "❌";
pub const MAIL_SENT: &str = "📨";
pub const MAIL_WAITING: &str = "📬";

const POST_USAGE: &str = "Usage: .post <text>";
const BBS_HELP: &str = "BBS: .bbs reads latest posts (DM), .bbs add <text> or .post <text> writes, .message <name> <text> sends mail, .messages reads it (DM)";

const SHUTDOWN_ACK: &str = "🛑 Shutting down";

pub fn hello(_router: &Router, ctx: &CommandContext<'_>, sink: &mut dyn ReplySink) -> Result<()> {
    sink.send("👋", ctx.coordinates)
}

pub fn ping(_router: &Router, ctx: &CommandContext<'_>, sink: &mut dyn ReplySink) -> Result<()> {
    sink.send("🏓", ctx.coordinates)
}

pub fn help(router: &Router, ctx: &CommandContext<'_>, sink: &mut dyn ReplySink) -> Result<()> {
    sink.send(&router.settings().help_text, ctx.coordinates)
}

/// What the directory knew about the sender when the message arrived.
pub fn whoami(router: &Router, ctx: &CommandContext<'_>, sink: &mut dyn ReplySink) -> Result<()> {
    let coords = ctx.coordinates;
    let node = coords.from_node.as_ref();
    let short = coords.from_short_name().unwrap_or("Unknown short");
    let long = coords.from_long_name().unwrap_or("Unknown long");
    let snr = node
        .and_then(|n| n.snr)
        .map(|s| format!("{s}"))
        .unwrap_or_else(|| "unknown".into());
    let hops = node
        .and_then(|n| n.hops_away)
        .map(|h| h.to_string())
        .unwrap_or_else(|| "unknown".into());

    let lines = [
        format!("ID: {}", coords.from_id),
        format!("Short: {short}"),
        format!("Long: {long}"),
        format!("SNR: {snr}"),
        format!("Hops: {hops}"),
    ];
    send_batched(router, &lines, coords, sink)
}

pub fn status(router: &Router, ctx: &CommandContext<'_>, sink: &mut dyn ReplySink) -> Result<()> {
    if !admin_allowed(router, ctx.coordinates, "status") {
        return Ok(());
    }
    let lines = router.host().status().lines();
    send_batched(router, &lines, &ctx.coordinates.as_forced_dm(), sink)
}

pub fn shutdown(router: &Router, ctx: &CommandContext<'_>, sink: &mut dyn ReplySink) -> Result<()> {
    if !admin_allowed(router, ctx.coordinates, "shutdown") {
        return Ok(());
    }
    sink.send(SHUTDOWN_ACK, &ctx.coordinates.as_forced_dm())?;
    warn!(target: "security", "Shutdown requested by admin {}", ctx.coordinates.from_id);
    router.host().shutdown()
}

pub fn post(router: &Router, ctx: &CommandContext<'_>, sink: &mut dyn ReplySink) -> Result<()> {
    post_text(router, ctx.coordinates, ctx.argument, sink)
}

/// `.bbs`, `.bbs help` and `.bbs add <text>`.
pub fn bbs(router: &Router, ctx: &CommandContext<'_>, sink: &mut dyn ReplySink) -> Result<()> {
    let argument = ctx.argument.map(str::trim).filter(|a| !a.is_empty());
    let Some(argument) = argument else {
        return read_board(router, ctx.coordinates, sink);
    };
    let (sub, rest) = match argument.split_once(' ') {
        Some((sub, rest)) => (sub, Some(rest)),
        None => (argument, None),
    };
    if sub.eq_ignore_ascii_case("add") {
        post_text(router, ctx.coordinates, rest, sink)
    } else {
        sink.send(BBS_HELP, ctx.coordinates)
    }
}

/// `.message <name> <text>`: leave mail for a node known by name.
pub fn message(router: &Router, ctx: &CommandContext<'_>, sink: &mut dyn ReplySink) -> Result<()> {
    let Some(storage) = require_storage(router) else {
        return Ok(());
    };
    let coords = ctx.coordinates;
    let parsed = ctx
        .argument
        .map(str::trim)
        .and_then(|a| a.split_once(' '))
        .map(|(name, body)| (name, body.trim()))
        .filter(|(_, body)| !body.is_empty());
    let Some((name, body)) = parsed else {
        return sink.send(NOT_FOUND, coords);
    };
    let Some(recipient) = ctx.directory.find_by_name(name) else {
        return sink.send(NOT_FOUND, coords);
    };

    let sender = SenderInfo::from_coordinates(coords);
    storage.insert_mail(&sender, recipient.id, coords.channel_index, body)?;
    info!("Mail from {} to {}", coords.from_id, recipient.id);
    sink.send(MAIL_SENT, coords)?;

    let notice = MessageCoordinates::direct_to(recipient.id, Some(recipient.clone()), coords.channel_index);
    sink.send(MAIL_WAITING, &notice)
}

/// `.messages` / `.mail`: the sender's own mailbox.
pub fn messages(router: &Router, ctx: &CommandContext<'_>, sink: &mut dyn ReplySink) -> Result<()> {
    let Some(storage) = require_storage(router) else {
        return Ok(());
    };
    let coords = ctx.coordinates;
    if router.settings().bbs_require_dm && !coords.is_dm {
        return sink.send(DM_ONLY, coords);
    }
    let rows = storage.read_mail(coords.from_id)?;
    let lines: Vec<String> = rows
        .iter()
        .map(|m| format!("{}: {}", m.from.label(), m.message))
        .collect();
    send_listing(router, &lines, coords, sink)
}

fn post_text(
    router: &Router,
    coords: &MessageCoordinates,
    text: Option<&str>,
    sink: &mut dyn ReplySink,
) -> Result<()> {
    let Some(storage) = require_storage(router) else {
        return Ok(());
    };
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return sink.send(POST_USAGE, coords);
    };
    let channel = router
        .settings()
        .bbs_per_channel
        .then_some(coords.channel_index);
    storage.insert_bbs(&SenderInfo::from_coordinates(coords), channel, text)?;
    sink.send(SAVED, coords)
}

fn read_board(router: &Router, coords: &MessageCoordinates, sink: &mut dyn ReplySink) -> Result<()> {
    let Some(storage) = require_storage(router) else {
        return Ok(());
    };
    if router.settings().bbs_require_dm && !coords.is_dm {
        return sink.send(DM_ONLY, coords);
    }
    let channel = router
        .settings()
        .bbs_per_channel
        .then_some(coords.channel_index);
    let rows = storage.read_bbs(channel)?;
    let lines: Vec<String> = rows
        .iter()
        .map(|p| format!("{}: {}", p.from.label(), p.message))
        .collect();
    send_listing(router, &lines, coords, sink)
}

/// Listings always go to a fresh private thread with the sender.
fn send_listing(
    router: &Router,
    lines: &[String],
    coords: &MessageCoordinates,
    sink: &mut dyn ReplySink,
) -> Result<()> {
    let target = coords.as_forced_dm();
    if lines.is_empty() {
        return sink.send(EMPTY, &target);
    }
    send_batched(router, lines, &target, sink)
}

fn send_batched(
    router: &Router,
    lines: &[String],
    coords: &MessageCoordinates,
    sink: &mut dyn ReplySink,
) -> Result<()> {
    for chunk in pack_lines(lines, router.settings().reply_cap) {
        sink.send(&chunk, coords)?;
    }
    Ok(())
}

fn require_storage(router: &Router) -> Option<&Storage> {
    let storage = router.storage();
    if storage.is_none() {
        info!("Cannot use BBS without storage");
    }
    storage
}

fn admin_allowed(router: &Router, coords: &MessageCoordinates, command: &str) -> bool {
    match router.admin() {
        None => {
            info!("Ignoring .{} from {}: no admin configured", command, coords.from_id);
            false
        }
        Some(admin) if admin == coords.from_id => true,
        Some(_) => {
            warn!(target: "security", "Denied .{} from non-admin {}", command, coords.from_id);
            false
        }
    }
}
