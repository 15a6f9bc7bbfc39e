// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud-connection observer registry (§4.8 "Subscription surface").

use std::sync::Arc;

use parking_lot::Mutex;

use crate::messages::ConnectionState;

pub trait ConnectionObserver: Send + Sync {
    fn on_connected(&self);
    fn on_disconnected(&self);
}

#[derive(Default)]
pub struct ObserverRegistry {
    observers: Mutex<Vec<Arc<dyn ConnectionObserver>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        ObserverRegistry::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn ConnectionObserver>) {
        self.observers.lock().push(observer);
    }

    /// Removes the first observer pointer-equal to `observer`, if present.
    pub fn unsubscribe(&self, observer: &Arc<dyn ConnectionObserver>) {
        let mut observers = self.observers.lock();
        if let Some(pos) = observers.iter().position(|o| Arc::ptr_eq(o, observer)) {
            observers.remove(pos);
        }
    }

    /// Notifies every observer, in registration order, of an incoming
    /// `ConnectionStatus` (§4.8 "Subscription surface").
    pub fn notify(&self, state: ConnectionState) {
        let observers = self.observers.lock().clone();
        for observer in observers {
            match state {
                ConnectionState::Connected => observer.on_connected(),
                ConnectionState::Disconnected => observer.on_disconnected(),
            }
        }
    }
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
