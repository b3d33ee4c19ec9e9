//! Line-oriented stand-in for the pub/sub broker.
//!
//! Inbound lines look like `{"topic": "hands/position", "payload": {...}}` and are
//! routed to the consumer registered for that topic. Outbound events are written in the
//! same shape, one JSON document per line.

use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::observability::StationMetrics;
use crate::publish::OutboundMessage;

#[derive(Debug, Deserialize)]
struct InboundLine {
    topic: String,
    payload: JsonValue,
}

/// Topic to consumer channel map
#[derive(Debug, Clone)]
pub struct TopicRouter {
    routes: HashMap<String, mpsc::Sender<JsonValue>>,
    metrics: Arc<StationMetrics>,
}

impl TopicRouter {
    pub fn new(metrics: Arc<StationMetrics>) -> Self {
        Self {
            routes: HashMap::new(),
            metrics,
        }
    }

    pub fn add_route(&mut self, topic: impl Into<String>, tx: mpsc::Sender<JsonValue>) {
        self.routes.insert(topic.into(), tx);
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Hand a payload to the consumer of `topic`. A full consumer queue drops the payload.
    pub fn route(&self, topic: &str, payload: JsonValue) -> bool {
        let Some(tx) = self.routes.get(topic) else {
            debug!(topic, "No consumer for topic");
            return false;
        };
        match tx.try_send(payload) {
            Ok(()) => true,
            Err(e) => {
                self.metrics.record_dropped_message();
                warn!(topic, error = %e, "Consumer queue unavailable; payload dropped");
                false
            }
        }
    }

    /// Route one raw line; bytes that are not UTF-8 are dropped
    pub fn route_bytes(&self, raw: &[u8]) -> bool {
        match std::str::from_utf8(raw) {
            Ok(line) => self.route_line(line),
            Err(e) => {
                self.metrics.record_dropped_message();
                warn!(error = %e, "Undecodable bus line dropped");
                false
            }
        }
    }

    /// Decode one bus line and route it
    pub fn route_line(&self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return false;
        }
        match serde_json::from_str::<InboundLine>(line) {
            Ok(inbound) => self.route(&inbound.topic, inbound.payload),
            Err(e) => {
                self.metrics.record_dropped_message();
                warn!(error = %e, "Malformed bus line dropped");
                false
            }
        }
    }
}

/// Stdin/stdout transport
pub struct StdioBus;

impl StdioBus {
    /// Route lines from `reader` until it ends or shutdown is signalled
    pub async fn run_inbound<R>(
        reader: R,
        router: TopicRouter,
        mut shutdown: watch::Receiver<bool>,
    ) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.split(b'\n');
        info!(topics = ?router.topics().collect::<Vec<_>>(), "Bus reader started");
        loop {
            tokio::select! {
                line = lines.next_segment() => match line? {
                    Some(line) => {
                        router.route_bytes(&line);
                    }
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Bus reader stopped");
        Ok(())
    }

    /// Write outbound messages as JSON lines until every sender is dropped
    pub async fn run_outbound<W>(mut writer: W, mut rx: mpsc::Receiver<OutboundMessage>) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(message) = rx.recv().await {
            let mut line = serde_json::to_vec(&message)?;
            line.push(b'\n');
            writer.write_all(&line).await?;
            writer.flush().await?;
        }
        debug!("Bus writer stopped");
        Ok(())
    }

    pub async fn run_stdin(router: TopicRouter, shutdown: watch::Receiver<bool>) -> io::Result<()> {
        Self::run_inbound(tokio::io::BufReader::new(tokio::io::stdin()), router, shutdown).await
    }

    pub async fn run_stdout(rx: mpsc::Receiver<OutboundMessage>) -> io::Result<()> {
        Self::run_outbound(tokio::io::stdout(), rx).await
    }
}
