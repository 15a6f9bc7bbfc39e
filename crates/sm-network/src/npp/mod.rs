// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Network plugin pipeline: composes a fixed-order chain of four CNI-style
//! plugins (bridge → DNS → firewall → bandwidth) and caches attachments for
//! idempotent teardown (§4.2).

pub mod cache;
pub mod controller;
pub mod exec;
pub mod pipeline;
pub mod plugin;
pub mod result;

pub use cache::{CacheEntry, CacheStore};
pub use controller::NetworkPluginPipeline;
pub use exec::{PluginError, PluginExecutor, PluginRunner};
pub use pipeline::{NetworkList, Pipeline, RuntimeConf};
pub use plugin::{PluginConfig, PluginKind};
pub use result::CniResult;
