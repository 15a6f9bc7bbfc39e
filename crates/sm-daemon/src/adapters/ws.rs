// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `UpstreamTransport` over `tokio-tungstenite` (§4.8 step 1). The session
//! layer's `connect`/`recv`/`send` seam is synchronous by design (it is
//! called from inside `UpstreamClient`'s own async task without an
//! `.await`), so a dedicated OS thread owns a small single-threaded Tokio
//! runtime that drives the actual WebSocket connection and bridges it onto
//! blocking channels, splitting the socket into its read/write halves so
//! each side can be driven independently of the other.

use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sm_client::messages::{IncomingMessage, OutgoingMessage};
use sm_client::transport::{ChannelReader, ChannelWriter, Credentials, UpstreamChannel, UpstreamTransport};
use sm_core::{SmError, SmResult};
use tokio::net::TcpStream;
use tokio::sync::mpsc as tokio_mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        WsTransport
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamTransport for WsTransport {
    fn connect(&self, url: &str, credentials: &Credentials) -> SmResult<Box<dyn UpstreamChannel>> {
        let url = url.to_string();
        let credentials = credentials.clone();
        let (ready_tx, ready_rx) = std_mpsc::channel::<SmResult<()>>();
        let (write_tx, write_rx) = tokio_mpsc::unbounded_channel::<OutgoingMessage>();
        let (read_tx, read_rx) = std_mpsc::channel::<SmResult<IncomingMessage>>();

        std::thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    let _ = ready_tx.send(Err(SmError::failed(e)));
                    return;
                }
            };
            runtime.block_on(drive_connection(url, credentials, ready_tx, write_rx, read_tx));
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(WsChannel { write_tx, read_rx })),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SmError::Runtime("websocket connection thread exited before connecting".to_string())),
        }
    }
}

async fn connect_ws(url: &str, credentials: &Credentials) -> SmResult<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    match credentials {
        Credentials::Insecure => {
            let connect = tokio_tungstenite::connect_async(url);
            let (stream, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect)
                .await
                .map_err(|_| SmError::Timeout(format!("connecting to {url}")))?
                .map_err(SmError::failed)?;
            Ok(stream)
        }
        // No TLS crate sits in this workspace's dependency graph, so a real
        // mTLS/TLS upstream connection isn't wired up; `UpstreamClient`
        // treats this the same as any other connect failure and retries
        // after `cm_reconnect_timeout`.
        Credentials::Tls { .. } | Credentials::Mtls { .. } => {
            Err(SmError::NotSupported("tls upstream transport is not configured".to_string()))
        }
    }
}

/// Owns the live connection for as long as the channel lives: forwards
/// queued outgoing messages to the socket and incoming frames to the
/// blocking reader, in one `select!` loop so both halves share the same
/// stream ownership without extra synchronization.
async fn drive_connection(
    url: String,
    credentials: Credentials,
    ready_tx: std_mpsc::Sender<SmResult<()>>,
    mut write_rx: tokio_mpsc::UnboundedReceiver<OutgoingMessage>,
    read_tx: std_mpsc::Sender<SmResult<IncomingMessage>>,
) {
    let stream = match connect_ws(&url, &credentials).await {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            outgoing = write_rx.recv() => {
                let Some(message) = outgoing else { break };
                let payload = match serde_json::to_string(&message) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode outgoing upstream message");
                        continue;
                    }
                };
                if sink.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = source.next() => {
                let outcome = match incoming {
                    Some(Ok(Message::Text(text))) => serde_json::from_str::<IncomingMessage>(&text).map_err(SmError::from),
                    Some(Ok(Message::Close(_))) | None => Err(SmError::NotSupported("upstream closed the connection".to_string())),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => Err(SmError::failed(e)),
                };
                let stop = outcome.is_err();
                if read_tx.send(outcome).is_err() || stop {
                    break;
                }
            }
        }
    }
}

struct WsChannel {
    write_tx: tokio_mpsc::UnboundedSender<OutgoingMessage>,
    read_rx: std_mpsc::Receiver<SmResult<IncomingMessage>>,
}

impl UpstreamChannel for WsChannel {
    fn split(self: Box<Self>) -> (Box<dyn ChannelReader>, Box<dyn ChannelWriter>) {
        let this = *self;
        (Box::new(WsReader { rx: this.read_rx }), Box::new(WsWriter { tx: this.write_tx }))
    }
}

struct WsReader {
    rx: std_mpsc::Receiver<SmResult<IncomingMessage>>,
}

impl ChannelReader for WsReader {
    fn recv(&mut self) -> SmResult<IncomingMessage> {
        match self.rx.recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(SmError::NotSupported("upstream read channel closed".to_string())),
        }
    }
}

struct WsWriter {
    tx: tokio_mpsc::UnboundedSender<OutgoingMessage>,
}

impl ChannelWriter for WsWriter {
    fn send(&mut self, message: &OutgoingMessage) -> SmResult<()> {
        self.tx.send(message.clone()).map_err(|_| SmError::NotSupported("upstream write channel closed".to_string()))
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
