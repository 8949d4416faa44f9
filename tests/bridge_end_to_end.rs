//! Full loop: JSON lines in, router, JSON lines out.
mod common;

use common::*;
use hops::bot::{HopsServer, Router, RouterSettings, ServerError};
use hops::mesh::transport::{spawn_bridge, WriterTuning};
use hops::mesh::{NodeDirectory, OutgoingMessage};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

async fn next_reply<R: tokio::io::AsyncBufRead + Unpin>(lines: &mut tokio::io::Lines<R>) -> OutgoingMessage {
    let line = tokio::time::timeout(std::time::Duration::from_secs(5), lines.next_line())
        .await
        .expect("reply in time")
        .expect("read")
        .expect("line");
    serde_json::from_str(&line).expect("json")
}

#[tokio::test]
async fn dm_and_broadcast_round_trip_over_the_bridge() {
    let (_tmp, storage) = temp_storage();
    let (mut radio_in, bot_in) = tokio::io::duplex(4096);
    let (bot_out, radio_out) = tokio::io::duplex(4096);

    let (events, outgoing) = spawn_bridge(
        BufReader::new(bot_in),
        bot_out,
        WriterTuning { min_send_gap_ms: 0 },
    );
    let router = Router::new(RouterSettings::default()).with_storage(storage.clone());
    let mut server = HopsServer::new(router, NodeDirectory::new(), events, outgoing);
    let handle = tokio::spawn(async move { server.run().await });

    let script = format!(
        concat!(
            "{{\"type\":\"connected\"}}\n",
            "{{\"type\":\"my_info\",\"id\":{local}}}\n",
            "{{\"type\":\"node\",\"id\":{bob},\"short_name\":\"BOB\",\"long_name\":\"Bob Base\"}}\n",
            "{{\"type\":\"text\",\"from\":{alice},\"id\":9,\"channel\":2,\"text\":\".ping\"}}\n",
            "{{\"type\":\"text\",\"from\":{alice},\"to\":{local},\"id\":10,\"text\":\".message bob hi\"}}\n",
        ),
        local = LOCAL.0,
        bob = BOB.0,
        alice = ALICE.0,
    );
    radio_in.write_all(script.as_bytes()).await.unwrap();

    let mut lines = BufReader::new(radio_out).lines();
    let pong = next_reply(&mut lines).await;
    assert_eq!(pong.text, "🏓");
    assert_eq!(pong.to, None);
    assert_eq!(pong.channel, 2);
    assert_eq!(pong.reply_id, Some(9));

    let sent = next_reply(&mut lines).await;
    assert_eq!(sent.text, "📨");
    assert_eq!(sent.to, Some(ALICE));

    let notice = next_reply(&mut lines).await;
    assert_eq!(notice.text, "📬");
    assert_eq!(notice.to, Some(BOB));

    drop(radio_in);
    let result = handle.await.expect("join");
    assert!(matches!(result, Err(ServerError::TransportLost)));
    assert_eq!(storage.read_mail(BOB).unwrap()[0].message, "hi");
    assert!(storage.get_logged_node(BOB).unwrap().is_some());
}
