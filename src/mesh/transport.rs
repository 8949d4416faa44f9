//! JSON bridge transport.
//!
//! The radio connection itself (serial/TCP framing, protobuf, encryption) is
//! handled by an external bridge process. It exchanges newline-delimited JSON
//! with the bot, either over stdin/stdout or a TCP socket:
//!
//! ```text
//! {"type":"connected"}
//! {"type":"my_info","id":305419896}
//! {"type":"node","id":1,"short_name":"AB","long_name":"Alice Base","snr":6.25,"hops_away":0}
//! {"type":"text","from":1,"to":305419896,"id":77,"channel":0,"text":".ping"}
//! ```
//!
//! Outbound messages are written back as one [`OutgoingMessage`] per line.
//! End of input is reported as [`TransportEvent::ConnectionLost`].

use anyhow::Result;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration, Instant};

use super::{InboundEvent, NodeId, NodeInfo, OutgoingMessage};
use crate::logutil::{escape_log, preview_bridge_line};

/// Everything the bridge can tell us.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    Connected,
    MyInfo { id: NodeId },
    Node(NodeInfo),
    Text(InboundEvent),
    /// Produced locally when the input stream ends or fails
    #[serde(skip)]
    ConnectionLost,
}

/// Writer tuning parameters, typically sourced from Config
#[derive(Debug, Clone)]
pub struct WriterTuning {
    /// Minimum gap between any two outbound messages (ms)
    pub min_send_gap_ms: u64,
}

impl Default for WriterTuning {
    fn default() -> Self {
        Self {
            min_send_gap_ms: 1000,
        }
    }
}

/// Reader task: parses bridge lines into [`TransportEvent`]s.
pub struct BridgeReader<R> {
    input: R,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl<R: AsyncBufRead + Unpin> BridgeReader<R> {
    pub fn new(input: R, event_tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { input, event_tx }
    }

    pub async fn run(mut self) -> Result<()> {
        info!("Starting bridge reader task");
        let mut line = String::new();
        loop {
            line.clear();
            match self.input.read_line(&mut line).await {
                Ok(0) => {
                    debug!("Bridge input closed");
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<TransportEvent>(trimmed) {
                        Ok(event) => {
                            trace!("Bridge event: {}", preview_bridge_line(trimmed));
                            if self.event_tx.send(event).is_err() {
                                debug!("Event receiver dropped; stopping reader");
                                return Ok(());
                            }
                        }
                        Err(e) => {
                            warn!("Ignoring malformed bridge line ({}): {}", e, preview_bridge_line(trimmed));
                        }
                    }
                }
                Err(e) => {
                    warn!("Bridge read error: {}", e);
                    break;
                }
            }
        }
        let _ = self.event_tx.send(TransportEvent::ConnectionLost);
        Ok(())
    }
}

/// Writer task: serializes outbound messages, one JSON object per line,
/// keeping at least `min_send_gap_ms` between sends.
pub struct BridgeWriter<W> {
    output: W,
    outgoing_rx: mpsc::UnboundedReceiver<OutgoingMessage>,
    tuning: WriterTuning,
    last_send: Option<Instant>,
}

impl<W: AsyncWrite + Unpin> BridgeWriter<W> {
    pub fn new(
        output: W,
        outgoing_rx: mpsc::UnboundedReceiver<OutgoingMessage>,
        tuning: WriterTuning,
    ) -> Self {
        Self {
            output,
            outgoing_rx,
            tuning,
            last_send: None,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        info!("Starting bridge writer task");
        let gap = Duration::from_millis(self.tuning.min_send_gap_ms);
        while let Some(msg) = self.outgoing_rx.recv().await {
            if let Some(last) = self.last_send {
                let elapsed = last.elapsed();
                if elapsed < gap {
                    sleep(gap - elapsed).await;
                }
            }
            let mut encoded = serde_json::to_string(&msg)?;
            encoded.push('\n');
            self.output.write_all(encoded.as_bytes()).await?;
            self.output.flush().await?;
            self.last_send = Some(Instant::now());
            debug!(
                "Sent to {} ch{}: {}",
                msg.to.map(|n| n.to_string()).unwrap_or_else(|| "^all".into()),
                msg.channel,
                escape_log(&msg.text)
            );
        }
        debug!("Outgoing channel closed; writer exiting");
        Ok(())
    }
}

/// Spawn reader and writer tasks over a bridge stream pair.
///
/// Returns the event receiver for the server loop and the sender replies are
/// queued on. Failure of either direction is reported as
/// [`TransportEvent::ConnectionLost`].
pub fn spawn_bridge<R, W>(
    input: R,
    output: W,
    tuning: WriterTuning,
) -> (
    mpsc::UnboundedReceiver<TransportEvent>,
    mpsc::UnboundedSender<OutgoingMessage>,
)
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (event_tx, event_rx) = mpsc::unbounded_channel::<TransportEvent>();
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel::<OutgoingMessage>();

    let lost_tx = event_tx.clone();
    let reader = BridgeReader::new(input, event_tx);
    let writer = BridgeWriter::new(output, outgoing_rx, tuning);
    tokio::spawn(async move {
        if let Err(e) = reader.run().await {
            warn!("Bridge reader stopped: {e}");
        }
    });
    tokio::spawn(async move {
        // A dead writer means nothing we say reaches the mesh any more.
        if let Err(e) = writer.run().await {
            warn!("Bridge writer stopped: {e}");
            let _ = lost_tx.send(TransportEvent::ConnectionLost);
        }
    });

    (event_rx, outgoing_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn reader_parses_events_and_reports_eof() {
        let input = concat!(
            "{\"type\":\"connected\"}\n",
            "{\"type\":\"my_info\",\"id\":16}\n",
            "not json\n",
            "\n",
            "{\"type\":\"text\",\"from\":1,\"to\":16,\"id\":5,\"text\":\".hello\"}\n",
        );
        let mock = tokio_test::io::Builder::new().read(input.as_bytes()).build();
        let (tx, mut rx) = mpsc::unbounded_channel();
        BridgeReader::new(BufReader::new(mock), tx)
            .run()
            .await
            .unwrap();

        assert_eq!(rx.recv().await, Some(TransportEvent::Connected));
        assert_eq!(rx.recv().await, Some(TransportEvent::MyInfo { id: NodeId(16) }));
        match rx.recv().await {
            Some(TransportEvent::Text(ev)) => {
                assert_eq!(ev.from, NodeId(1));
                assert_eq!(ev.to, NodeId(16));
                assert_eq!(ev.text, ".hello");
            }
            other => panic!("expected text event, got {:?}", other),
        }
        assert_eq!(rx.recv().await, Some(TransportEvent::ConnectionLost));
    }

    #[tokio::test]
    async fn writer_emits_one_json_line_per_message() {
        let msg = OutgoingMessage {
            to: Some(NodeId(1)),
            channel: 0,
            text: "hi".into(),
            reply_id: None,
            emoji: false,
        };
        let expected = format!("{}\n", serde_json::to_string(&msg).unwrap());
        let mock = tokio_test::io::Builder::new()
            .write(expected.as_bytes())
            .build();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(msg).unwrap();
        drop(tx);
        BridgeWriter::new(mock, rx, WriterTuning { min_send_gap_ms: 0 })
            .run()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn writer_failure_is_reported_as_connection_lost() {
        let (_radio_in, bot_in) = tokio::io::duplex(256);
        let (bot_out, radio_out) = tokio::io::duplex(256);
        drop(radio_out);

        let (mut events, outgoing) =
            spawn_bridge(BufReader::new(bot_in), bot_out, WriterTuning { min_send_gap_ms: 0 });
        outgoing
            .send(OutgoingMessage {
                to: None,
                channel: 0,
                text: "🏓".into(),
                reply_id: None,
                emoji: true,
            })
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event in time");
        assert_eq!(event, Some(TransportEvent::ConnectionLost));
    }
}
