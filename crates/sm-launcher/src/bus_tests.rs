// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    active = { "active", InstanceRunState::Active },
    reloading = { "reloading", InstanceRunState::Failed },
    inactive = { "inactive", InstanceRunState::Failed },
    failed = { "failed", InstanceRunState::Failed },
    activating = { "activating", InstanceRunState::Failed },
    deactivating = { "deactivating", InstanceRunState::Failed },
)]
fn maps_active_state_string(active_state: &str, expected: InstanceRunState) {
    assert_eq!(run_state_from_active_state(active_state), expected);
}
