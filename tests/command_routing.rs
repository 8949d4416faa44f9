//! Prefix handling, synonyms and the conversational commands.
mod common;

use common::*;
use hops::bot::{Router, RouterSettings};
use log::Level;

fn router() -> Router {
    Router::new(RouterSettings::default())
}

#[test]
fn hello_replies_with_wave_on_same_coordinates() {
    let dir = directory();
    let coords = broadcast_from(&dir, ALICE, 0);
    let sink = route(&router(), &coords, ".hello", &dir);
    assert_eq!(sink.sent.len(), 1);
    assert_eq!(sink.sent[0].0, "👋");
    assert_eq!(sink.sent[0].1, coords);
}

#[test]
fn wave_synonyms_answer_like_hello() {
    let dir = directory();
    let coords = broadcast_from(&dir, ALICE, 0);
    let canonical = route(&router(), &coords, ".hello", &dir).sent;
    for token in [".👋", ".👋🏻", ".👋🏼", ".👋🏽", ".👋🏾", ".👋🏿"] {
        assert_eq!(route(&router(), &coords, token, &dir).sent, canonical, "{token}");
    }
}

#[test]
fn help_synonyms_answer_like_help() {
    let dir = directory();
    let coords = broadcast_from(&dir, BOB, 0);
    let canonical = route(&router(), &coords, ".help", &dir).texts().join("|");
    assert_eq!(canonical, "http://w2asm.com/hops");
    for token in [".info", ".?", ".!", ".🤨", ".HELP"] {
        assert_eq!(route(&router(), &coords, token, &dir).texts().join("|"), canonical, "{token}");
    }
}

#[test]
fn ping_synonyms() {
    let dir = directory();
    let coords = broadcast_from(&dir, BOB, 0);
    for token in [".ping", ".🏓", "..", ".PING trailing words"] {
        assert_eq!(route(&router(), &coords, token, &dir).texts(), vec!["🏓"], "{token}");
    }
}

#[test]
fn text_without_prefix_is_ignored() {
    capture_logs();
    let dir = directory();
    let coords = dm_from(&dir, ALICE);
    for text in ["hello", "not a command", "", " .hello", "👋"] {
        assert!(route(&router(), &coords, text, &dir).sent.is_empty(), "{text:?}");
    }
    assert!(captured_at(Level::Warn).is_empty());
}

#[test]
fn unknown_commands_are_silent() {
    capture_logs();
    let dir = directory();
    let coords = dm_from(&dir, ALICE);
    assert!(route(&router(), &coords, ".unknown", &dir).sent.is_empty());
    assert!(route(&router(), &coords, ".", &dir).sent.is_empty());
    assert!(captured_at(Level::Warn).is_empty());
    assert!(captured_at(Level::Info).is_empty());
}

#[test]
fn dm_replies_go_back_to_sender_and_keep_reply_id() {
    let dir = directory();
    let coords = dm_from(&dir, ALICE);
    let out = route(&router(), &coords, ".ping", &dir).outgoing();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to, Some(ALICE));
    assert_eq!(out[0].reply_id, Some(4242));
    assert!(out[0].emoji);
}

#[test]
fn broadcast_replies_stay_on_channel() {
    let dir = directory();
    let coords = broadcast_from(&dir, ALICE, 2);
    let out = route(&router(), &coords, ".hello", &dir).outgoing();
    assert_eq!(out[0].to, None);
    assert_eq!(out[0].channel, 2);
}

#[test]
fn whoami_reports_sender_snapshot() {
    let dir = directory();
    let coords = broadcast_from(&dir, ALICE, 0);
    let sink = route(&router(), &coords, ".whoami", &dir);
    assert_eq!(
        sink.texts(),
        vec!["ID: !0000a11c\nShort: ALC\nLong: Alice\nSNR: 7.5\nHops: 1"]
    );
}

#[test]
fn audit_log_records_everything_heard() {
    let (_tmp, storage) = temp_storage();
    let router = router_with_storage(storage.clone());
    let dir = directory();
    let coords = broadcast_from(&dir, BOB, 1);
    route(&router, &coords, "just chatting", &dir);
    route(&router, &coords, ".ping", &dir);

    let heard = storage.recent_received(10).expect("audit");
    let bodies: Vec<_> = heard.iter().map(|r| r.message.as_str()).collect();
    assert_eq!(bodies, vec![".ping", "just chatting"]);
    assert!(heard.iter().all(|r| r.from_id == BOB && r.channel_index == 1));
}

#[test]
fn text_without_prefix_leaves_board_and_mailbox_alone() {
    let (_tmp, storage) = temp_storage();
    let router = router_with_storage(storage.clone());
    let dir = directory();
    for coords in [dm_from(&dir, ALICE), broadcast_from(&dir, ALICE, 0)] {
        for text in ["post hi", "bbs add x", "message bob hi", " .post x", "messages", "😀 .bbs"] {
            assert!(route(&router, &coords, text, &dir).sent.is_empty(), "{text:?}");
        }
    }
    let stats = storage.stats();
    assert_eq!(stats.bbs_posts, 0);
    assert_eq!(stats.mailbox_messages, 0);
    assert_eq!(stats.received, 12);
}
