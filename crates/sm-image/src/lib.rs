// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sm-image: the image handler (IH, §4.4), layer and service install
//! pipelines, OCI-whiteout conversion, and content-digest validation.

pub mod archive;
pub mod digest;
pub mod fsutil;
pub mod handler;
pub mod manifest;
pub mod space;
pub mod whiteout;

pub use handler::{ImageHandler, LayerInfo, ServiceInfo};
pub use manifest::{Descriptor, ImageManifest};
pub use space::{SpaceAllocator, SpaceHandle};
