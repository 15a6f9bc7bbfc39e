// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::messages::ConnectionState;
use crate::subscription::ConnectionObserver;
use crate::transport::{ChannelReader, UpstreamChannel};
use sm_core::SmError;
use std::sync::Mutex as StdMutex;

struct ScriptedReader {
    messages: std::vec::IntoIter<IncomingMessage>,
}

impl ChannelReader for ScriptedReader {
    fn recv(&mut self) -> SmResult<IncomingMessage> {
        self.messages.next().ok_or_else(|| SmError::Runtime("stream closed".to_string()))
    }
}

struct RecordingWriter {
    sent: Arc<StdMutex<Vec<OutgoingMessage>>>,
}

impl ChannelWriter for RecordingWriter {
    fn send(&mut self, message: &OutgoingMessage) -> SmResult<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct ScriptedChannel {
    messages: Vec<IncomingMessage>,
    sent: Arc<StdMutex<Vec<OutgoingMessage>>>,
}

impl UpstreamChannel for ScriptedChannel {
    fn split(self: Box<Self>) -> (Box<dyn ChannelReader>, Box<dyn ChannelWriter>) {
        (Box::new(ScriptedReader { messages: self.messages.into_iter() }), Box::new(RecordingWriter { sent: self.sent }))
    }
}

struct ScriptedTransport {
    sent: Arc<StdMutex<Vec<OutgoingMessage>>>,
    messages: Mutex<Vec<IncomingMessage>>,
}

impl UpstreamTransport for ScriptedTransport {
    fn connect(&self, _url: &str, _credentials: &Credentials) -> SmResult<Box<dyn UpstreamChannel>> {
        Ok(Box::new(ScriptedChannel { messages: self.messages.lock().clone(), sent: self.sent.clone() }))
    }
}

struct FixedNodeInfo;
impl NodeInfoSource for FixedNodeInfo {
    fn node_config_status(&self) -> NodeConfigStatusInfo {
        NodeConfigStatusInfo { version: "1".into(), error: None, node_id: "node0".into(), node_type: "sm".into() }
    }
}

struct EmptyRunStatus;
impl RunInstancesSnapshotSource for EmptyRunStatus {
    fn run_instances_status(&self) -> Vec<Value> {
        vec![]
    }
}

struct RecordingHandler {
    handled: StdMutex<Vec<IncomingMessage>>,
}
impl MessageHandler for RecordingHandler {
    fn handle(&self, message: IncomingMessage) {
        self.handled.lock().unwrap().push(message);
    }
}

fn client(messages: Vec<IncomingMessage>) -> (Arc<UpstreamClient>, Arc<StdMutex<Vec<OutgoingMessage>>>, Arc<RecordingHandler>) {
    let sent = Arc::new(StdMutex::new(vec![]));
    let transport = Arc::new(ScriptedTransport { sent: sent.clone(), messages: Mutex::new(messages) });
    let handler = Arc::new(RecordingHandler { handled: StdMutex::new(vec![]) });
    let client = Arc::new(UpstreamClient::new(
        transport,
        "https://cm.example".to_string(),
        Credentials::Insecure,
        Duration::from_millis(1),
        Arc::new(FixedNodeInfo),
        Arc::new(EmptyRunStatus),
        handler.clone(),
        Arc::new(ObserverRegistry::new()),
    ));
    (client, sent, handler)
}

#[tokio::test]
async fn run_one_session_greets_before_dispatching_incoming_messages() {
    let (client, sent, handler) = client(vec![IncomingMessage::GetAverageMonitoring]);
    let err = client.run_one_session().await.unwrap_err();
    assert!(matches!(err, SmError::Runtime(_)));

    let sent = sent.lock().unwrap();
    assert!(matches!(sent[0], OutgoingMessage::NodeConfigStatus { .. }));
    assert!(matches!(sent[1], OutgoingMessage::RunInstancesStatus { .. }));

    let handled = handler.handled.lock().unwrap();
    assert_eq!(handled.len(), 1);
    assert!(matches!(handled[0], IncomingMessage::GetAverageMonitoring));
}

#[tokio::test]
async fn connection_status_message_notifies_observers() {
    struct Observer {
        connected: std::sync::atomic::AtomicUsize,
    }
    impl ConnectionObserver for Observer {
        fn on_connected(&self) {
            self.connected.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
        fn on_disconnected(&self) {}
    }

    let observers = Arc::new(ObserverRegistry::new());
    let observer = Arc::new(Observer { connected: std::sync::atomic::AtomicUsize::new(0) });
    observers.subscribe(observer.clone());

    let sent = Arc::new(StdMutex::new(vec![]));
    let transport = Arc::new(ScriptedTransport {
        sent: sent.clone(),
        messages: Mutex::new(vec![IncomingMessage::ConnectionStatus { state: ConnectionState::Connected }]),
    });
    let handler = Arc::new(RecordingHandler { handled: StdMutex::new(vec![]) });
    let client = UpstreamClient::new(
        transport,
        "https://cm.example".to_string(),
        Credentials::Insecure,
        Duration::from_millis(1),
        Arc::new(FixedNodeInfo),
        Arc::new(EmptyRunStatus),
        handler,
        observers,
    );

    let _ = client.run_one_session().await;
    assert_eq!(observer.connected.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn rotate_credentials_updates_credentials_and_requests_a_session_end() {
    let (client, _sent, _handler) = client(vec![]);
    assert!(!client.should_end_session());

    client.rotate_credentials(Credentials::Tls { ca_cert: std::path::PathBuf::from("/ca.pem") });
    assert!(client.should_end_session());
    assert_eq!(*client.credentials.lock(), Credentials::Tls { ca_cert: std::path::PathBuf::from("/ca.pem") });
}

#[test]
fn send_fails_with_no_active_session() {
    let (client, _sent, _handler) = client(vec![]);
    let err = client.send(OutgoingMessage::RunInstancesStatus { instances: vec![] }).unwrap_err();
    assert!(matches!(err, SmError::NotSupported(_)));
}

#[test]
fn send_reaches_the_channel_of_a_manually_installed_sink() {
    let (client, sent, _handler) = client(vec![]);
    let writer = RecordingWriter { sent: sent.clone() };
    let sink = OutgoingSink { writer: Arc::new(Mutex::new(Box::new(writer))) };
    *client.current.lock() = Some(sink);

    client.send(OutgoingMessage::Alert { alert: serde_json::json!({"msg": "hi"}) }).unwrap();

    let sent = sent.lock().unwrap();
    assert!(sent.iter().any(|m| matches!(m, OutgoingMessage::Alert { .. })));
}

#[tokio::test]
async fn session_end_clears_the_active_sink() {
    let (client, _sent, _handler) = client(vec![IncomingMessage::GetAverageMonitoring]);
    let _ = client.run_one_session().await;
    assert!(client.current.lock().is_none());
}

#[tokio::test]
async fn a_fresh_connect_clears_a_pending_rotation() {
    let (client, _sent, handler) = client(vec![IncomingMessage::GetAverageMonitoring]);
    client.rotate.store(true, std::sync::atomic::Ordering::SeqCst);

    let err = client.run_one_session().await.unwrap_err();
    assert!(matches!(err, SmError::Runtime(_)));
    assert_eq!(handler.handled.lock().unwrap().len(), 1);
}
