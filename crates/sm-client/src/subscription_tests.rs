// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct CountingObserver {
    connected: AtomicUsize,
    disconnected: AtomicUsize,
}

impl ConnectionObserver for CountingObserver {
    fn on_connected(&self) {
        self.connected.fetch_add(1, Ordering::SeqCst);
    }
    fn on_disconnected(&self) {
        self.disconnected.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn notify_calls_matching_method_on_every_observer_in_order() {
    let registry = ObserverRegistry::new();
    let a = Arc::new(CountingObserver::default());
    let b = Arc::new(CountingObserver::default());
    registry.subscribe(a.clone());
    registry.subscribe(b.clone());

    registry.notify(ConnectionState::Connected);
    assert_eq!(a.connected.load(Ordering::SeqCst), 1);
    assert_eq!(b.connected.load(Ordering::SeqCst), 1);

    registry.notify(ConnectionState::Disconnected);
    assert_eq!(a.disconnected.load(Ordering::SeqCst), 1);
    assert_eq!(b.disconnected.load(Ordering::SeqCst), 1);
}

#[test]
fn unsubscribe_stops_future_notifications() {
    let registry = ObserverRegistry::new();
    let a = Arc::new(CountingObserver::default());
    registry.subscribe(a.clone());
    registry.unsubscribe(&a);

    registry.notify(ConnectionState::Connected);
    assert_eq!(a.connected.load(Ordering::SeqCst), 0);
}
