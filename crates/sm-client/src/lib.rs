// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upstream Client (§4.8): the single bidirectional session to CM, with
//! reconnect-with-fixed-backoff, multiplexed outgoing writes, and a
//! cloud-connection observer surface.

pub mod messages;
pub mod session;
pub mod subscription;
pub mod transport;

pub use messages::{ConnectionState, IncomingMessage, OutgoingMessage};
pub use session::{MessageHandler, NodeConfigStatusInfo, NodeInfoSource, OutgoingSink, RunInstancesSnapshotSource, UpstreamClient};
pub use subscription::{ConnectionObserver, ObserverRegistry};
pub use transport::{ChannelReader, ChannelWriter, Credentials, UpstreamChannel, UpstreamTransport};
