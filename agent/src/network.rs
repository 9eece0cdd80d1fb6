// ─────────────────────────────────────────────────────────────
// network.rs – WebSocket client, exponential backoff
// ─────────────────────────────────────────────────────────────
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::agent::AgentConfig;
use crate::protocol::*;

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Doubles `current`, capped at the maximum reconnect delay.
pub fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_RECONNECT_DELAY)
}

/// `ws_url` with the agent identity in the query string.
pub fn connect_url(ws_url: &str, agent_id: &str, machine_id: &str) -> Result<url::Url> {
    let mut url = url::Url::parse(ws_url).with_context(|| format!("invalid ws url {ws_url:?}"))?;
    url.query_pairs_mut()
        .append_pair("agent_id", agent_id)
        .append_pair("machine_id", machine_id);
    Ok(url)
}

// ═══════════════════════════════════════════════════════════════
//  WebSocket Client (real-time commands, auto-reconnect)
// ═══════════════════════════════════════════════════════════════
pub struct WsClient {
    config: AgentConfig,
    hello: HelloPayload,
    incoming_tx: mpsc::Sender<ServerMessage>,
    outgoing_rx: mpsc::Receiver<AgentMessage>,
    shutdown: broadcast::Receiver<()>,
    stopping: bool,
}

impl WsClient {
    pub fn new(
        config: AgentConfig,
        hello: HelloPayload,
        incoming_tx: mpsc::Sender<ServerMessage>,
        outgoing_rx: mpsc::Receiver<AgentMessage>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            hello,
            incoming_tx,
            outgoing_rx,
            shutdown,
            stopping: false,
        }
    }

    pub async fn run(mut self) {
        let mut reconnect_delay = INITIAL_RECONNECT_DELAY;

        loop {
            // Check shutdown before connecting
            tokio::select! {
                biased;
                _ = self.shutdown.recv() => {
                    info!("WebSocket client shutting down");
                    return;
                }
                _ = tokio::time::sleep(Duration::ZERO) => {}
            }

            let result = self.connect_and_run().await;
            if self.stopping {
                info!("WebSocket client shutting down");
                return;
            }
            match result {
                Ok(()) => {
                    info!("WebSocket disconnected normally");
                    reconnect_delay = INITIAL_RECONNECT_DELAY;
                }
                Err(e) => {
                    warn!(error = %e, "WebSocket error");
                    reconnect_delay = next_backoff(reconnect_delay);
                }
            }

            info!(delay = ?reconnect_delay, "Reconnecting WebSocket...");
            tokio::select! {
                _ = tokio::time::sleep(reconnect_delay) => {},
                _ = self.shutdown.recv() => return,
            }
        }
    }

    async fn connect_and_run(&mut self) -> Result<()> {
        let ws_url = connect_url(&self.config.server.ws_url, &self.hello.agent_id, &self.hello.machine_id)?;
        info!(url = %ws_url, "Connecting WebSocket");

        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url.as_str())
            .await
            .context("WebSocket connect")?;

        let (mut ws_write, mut ws_read) = ws_stream.split();
        info!("WebSocket connected");

        // Announce ourselves on every (re)connect
        let hello = serde_json::to_string(&AgentMessage::Hello(self.hello.clone()))?;
        ws_write.send(Message::Text(hello)).await.context("sending hello")?;

        loop {
            tokio::select! {
                msg = ws_read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ServerMessage>(&text) {
                                Ok(server_msg) => {
                                    if self.incoming_tx.send(server_msg).await.is_err() {
                                        return Ok(());
                                    }
                                }
                                Err(e) => {
                                    debug!(error = %e, "Unknown WS message");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            ws_write.send(Message::Pong(data)).await.ok();
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            return Err(e.into());
                        }
                        _ => {}
                    }
                }
                out = self.outgoing_rx.recv() => {
                    match out {
                        Some(agent_msg) => {
                            let json = serde_json::to_string(&agent_msg)?;
                            if ws_write.send(Message::Text(json)).await.is_err() {
                                return Ok(());
                            }
                        }
                        // Agent core is gone; nothing more to do on this link
                        None => return Ok(()),
                    }
                }
                _ = self.shutdown.recv() => {
                    self.stopping = true;
                    ws_write.send(Message::Close(None)).await.ok();
                    return Ok(());
                }
            }
        }
    }
}
