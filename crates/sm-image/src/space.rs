// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Space accounting for layer/service installs (§4.4). Each install reserves
//! a [`SpaceHandle`] sized to its final on-disk footprint; the handle
//! releases its reservation when dropped, mirroring the caller-owned
//! allocation lifetime the install operations document.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use sm_core::{SmError, SmResult};

pub struct SpaceAllocator {
    used: AtomicU64,
    limit: u64,
}

impl SpaceAllocator {
    pub fn new(limit: u64) -> Arc<Self> {
        Arc::new(SpaceAllocator { used: AtomicU64::new(0), limit })
    }

    pub fn allocate(self: &Arc<Self>, size: u64) -> SmResult<SpaceHandle> {
        self.reserve(size)?;
        Ok(SpaceHandle { allocator: self.clone(), size: AtomicU64::new(size), released: AtomicBool::new(false) })
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    fn reserve(&self, delta: u64) -> SmResult<()> {
        loop {
            let current = self.used.load(Ordering::SeqCst);
            let updated = current
                .checked_add(delta)
                .ok_or_else(|| SmError::NoMemory("space allocator counter overflow".to_string()))?;
            if self.limit > 0 && updated > self.limit {
                return Err(SmError::NoMemory(format!("space allocator limit {} exceeded ({updated} requested)", self.limit)));
            }
            if self.used.compare_exchange(current, updated, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
                return Ok(());
            }
        }
    }

    fn release(&self, amount: u64) {
        loop {
            let current = self.used.load(Ordering::SeqCst);
            let updated = current.saturating_sub(amount);
            if self.used.compare_exchange(current, updated, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
                return;
            }
        }
    }
}

#[derive(Debug)]
pub struct SpaceHandle {
    allocator: Arc<SpaceAllocator>,
    size: AtomicU64,
    released: AtomicBool,
}

impl SpaceHandle {
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::SeqCst)
    }

    pub fn resize(&self, new_size: u64) -> SmResult<()> {
        let current = self.size.load(Ordering::SeqCst);
        if new_size > current {
            self.allocator.reserve(new_size - current)?;
        } else {
            self.allocator.release(current - new_size);
        }
        self.size.store(new_size, Ordering::SeqCst);
        Ok(())
    }

    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.allocator.release(self.size.load(Ordering::SeqCst));
        }
    }
}

impl Drop for SpaceHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[path = "space_tests.rs"]
mod tests;
