//! WebSocket transport for telemetry and commands.
//!
//! One task per connection: a telemetry pump driven by the watch channel
//! at the configured rate, and a receive loop that forwards parsed
//! commands into the control loop's channel.

use crate::{Telemetry, TeleopError};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use types::Command;

/// WebSocket server configuration.
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub port: u16,
    pub telemetry_interval: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            port: 8765,
            telemetry_interval: Duration::from_millis(200),
        }
    }
}

pub struct WsServer {
    config: WsConfig,
    command_tx: mpsc::Sender<Command>,
    telemetry_rx: watch::Receiver<Telemetry>,
}

impl WsServer {
    pub fn new(
        config: WsConfig,
        command_tx: mpsc::Sender<Command>,
        telemetry_rx: watch::Receiver<Telemetry>,
    ) -> Self {
        Self {
            config,
            command_tx,
            telemetry_rx,
        }
    }

    pub async fn run(self) -> Result<(), TeleopError> {
        let addr = format!("0.0.0.0:{}", self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(addr, "WebSocket server listening");

        let command_tx = Arc::new(self.command_tx);
        let telemetry_rx = self.telemetry_rx;
        let interval = self.config.telemetry_interval;

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    info!(%peer, "Client connected");
                    let cmd_tx = command_tx.clone();
                    let telem_rx = telemetry_rx.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, cmd_tx, telem_rx, interval).await
                        {
                            error!(?e, "Connection error");
                        }
                        info!(%peer, "Client disconnected");
                    });
                }
                Err(e) => {
                    error!(?e, "Accept failed");
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    command_tx: Arc<mpsc::Sender<Command>>,
    telemetry_rx: watch::Receiver<Telemetry>,
    telemetry_interval: Duration,
) -> Result<(), TeleopError> {
    let _ = stream.set_nodelay(true);
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| TeleopError::WebSocket(e.to_string()))?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Telemetry pump
    let pump = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(telemetry_interval);
        loop {
            ticker.tick().await;
            let snapshot = telemetry_rx.borrow().clone();
            match serde_json::to_string(&snapshot) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!(?e, "Telemetry serialization failed");
                    break;
                }
            }
        }
    });

    // Command intake
    while let Some(message) = ws_receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<Command>(&text) {
                Ok(command) => {
                    debug!(?command, "Command received");
                    if command_tx.send(command).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(?e, %text, "Unparseable command");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(?e, "WebSocket receive error");
                break;
            }
        }
    }

    pump.abort();
    Ok(())
}
