// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production implementations of the trait seams the component crates
//! leave open (`sm_monitor::NetworkTrafficProvider`, `sm_launcher::SystemBus`,
//! `sm_network::tm::PacketFilterEngine`, `sm_journal::JournalFactory`,
//! `sm_client`'s transport traits). Nothing in the component crates depends
//! on this module; `main.rs` is the only caller.

mod bus;
mod iptables;
mod journal;
mod traffic;
mod ws;

pub use bus::SystemdBus;
pub use iptables::IptablesEngine;
pub use journal::JournalctlFactory;
pub use traffic::TrafficMonitorAdapter;
pub use ws::WsTransport;
