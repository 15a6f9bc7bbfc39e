// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle and reconnect loop (§4.8 "Session", "Reconnect",
//! "Outgoing multiplexing").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use sm_core::{SmError, SmResult};
use tokio::task::JoinHandle;

use crate::messages::{IncomingMessage, OutgoingMessage};
use crate::subscription::ObserverRegistry;
use crate::transport::{ChannelWriter, Credentials, UpstreamTransport};

/// Resolved by the caller (the orchestrator) on every connect; RM feeds the
/// version/error, IAM feeds node identity (§4.8 step 2).
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfigStatusInfo {
    pub version: String,
    pub error: Option<String>,
    pub node_id: String,
    pub node_type: String,
}

pub trait NodeInfoSource: Send + Sync {
    fn node_config_status(&self) -> NodeConfigStatusInfo;
}

/// Current instance statuses, seeded from UL on every (re)connect
/// (§4.8 step 3).
pub trait RunInstancesSnapshotSource: Send + Sync {
    fn run_instances_status(&self) -> Vec<Value>;
}

pub trait MessageHandler: Send + Sync {
    fn handle(&self, message: IncomingMessage);
}

/// The multiplexed write half; cloned freely since all it owns is the
/// shared mutex (§4.8 "Outgoing multiplexing": "all outgoing messages
/// serialize through one mutex").
#[derive(Clone)]
pub struct OutgoingSink {
    writer: Arc<Mutex<Box<dyn ChannelWriter>>>,
}

impl OutgoingSink {
    pub fn send(&self, message: OutgoingMessage) -> SmResult<()> {
        self.writer.lock().send(&message)
    }
}

pub struct UpstreamClient {
    transport: Arc<dyn UpstreamTransport>,
    url: String,
    credentials: Mutex<Credentials>,
    reconnect_timeout: Duration,
    node_info: Arc<dyn NodeInfoSource>,
    run_status: Arc<dyn RunInstancesSnapshotSource>,
    handler: Arc<dyn MessageHandler>,
    observers: Arc<ObserverRegistry>,
    rotate: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// The active session's write half, if any. Lets the orchestrator push
    /// unsolicited outgoing messages (alerts, monitoring, status updates)
    /// without being handed a sink through `MessageHandler` (§4.8
    /// "Outgoing multiplexing").
    current: Arc<Mutex<Option<OutgoingSink>>>,
}

/// Clears the active sink when a session ends, regardless of how
/// `run_one_session` returns.
struct ClearCurrentOnDrop<'a>(&'a Mutex<Option<OutgoingSink>>);

impl Drop for ClearCurrentOnDrop<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

impl UpstreamClient {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<dyn UpstreamTransport>,
        url: String,
        credentials: Credentials,
        reconnect_timeout: Duration,
        node_info: Arc<dyn NodeInfoSource>,
        run_status: Arc<dyn RunInstancesSnapshotSource>,
        handler: Arc<dyn MessageHandler>,
        observers: Arc<ObserverRegistry>,
    ) -> Self {
        UpstreamClient {
            transport,
            url,
            credentials: Mutex::new(credentials),
            reconnect_timeout,
            node_info,
            run_status,
            handler,
            observers,
            rotate: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Sends an unsolicited outgoing message on the current session, if
    /// one is connected. Callers (RM, TM, JLAP) are expected to drop the
    /// message on `NotSupported` rather than buffer it across reconnects.
    pub fn send(&self, message: OutgoingMessage) -> SmResult<()> {
        match self.current.lock().as_ref() {
            Some(sink) => sink.send(message),
            None => Err(SmError::NotSupported("no active upstream session".to_string())),
        }
    }

    /// New credentials from the cert handler trigger a reconnect at the
    /// next read-loop boundary (§4.8 "Reconnect").
    pub fn rotate_credentials(&self, credentials: Credentials) {
        *self.credentials.lock() = credentials;
        self.rotate.store(true, Ordering::SeqCst);
    }

    pub fn start(self: &Arc<Self>) {
        self.stopped.store(false, Ordering::SeqCst);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.session_loop().await });
        *self.worker.lock() = Some(handle);
    }

    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn session_loop(self: Arc<Self>) {
        while !self.stopped.load(Ordering::SeqCst) {
            if let Err(e) = self.run_one_session().await {
                tracing::warn!(error = %e, "upstream session ended, reconnecting");
            }
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(self.reconnect_timeout).await;
        }
    }

    /// One full connect → greet → read-loop cycle (§4.8 "Session" steps
    /// 1-4). Returns on any read error, stream close, or credential
    /// rotation, so the caller can sleep and retry.
    async fn run_one_session(&self) -> SmResult<()> {
        let credentials = self.credentials.lock().clone();
        let channel = self.transport.connect(&self.url, &credentials)?;
        let (mut reader, writer) = channel.split();
        let sink = OutgoingSink { writer: Arc::new(Mutex::new(writer)) };
        *self.current.lock() = Some(sink.clone());
        let _clear = ClearCurrentOnDrop(&self.current);

        let info = self.node_info.node_config_status();
        sink.send(OutgoingMessage::NodeConfigStatus {
            version: info.version,
            error: info.error,
            node_id: info.node_id,
            node_type: info.node_type,
        })?;
        sink.send(OutgoingMessage::RunInstancesStatus { instances: self.run_status.run_instances_status() })?;

        self.rotate.store(false, Ordering::SeqCst);

        loop {
            if self.should_end_session() {
                return Ok(());
            }

            let message = reader.recv()?;
            if let IncomingMessage::ConnectionStatus { state } = &message {
                self.observers.notify(*state);
            }
            self.handler.handle(message);
        }
    }

    /// §4.8 "Reconnect": a pending credential rotation or an explicit
    /// `stop()` both end the current read loop at the next boundary.
    fn should_end_session(&self) -> bool {
        self.rotate.load(Ordering::SeqCst) || self.stopped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
