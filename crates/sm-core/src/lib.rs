// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sm-core: shared data model and error kinds for the service manager.

pub mod digest;
pub mod error;
pub mod ident;
pub mod instance;
pub mod layer;
pub mod network;
pub mod service;
pub mod traffic;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use digest::Digest;
pub use error::{SmError, SmResult};
pub use ident::InstanceIdent;
pub use instance::Instance;
pub use layer::Layer;
pub use network::{FirewallRule, NetworkParameters};
pub use service::{Service, ServiceState};
pub use traffic::TrafficCounter;
