// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Online/offline tracking with edge-triggered transition events.
//!
//! The host feeds the platform's reachability signal into
//! [`ConnectivityMonitor::set_online`]. Repeated signals for the state the
//! monitor is already in are collapsed, so subscribers see exactly one
//! [`ConnectivityEvent::BecameOnline`] per offline→online transition.
//!
//! # Example
//!
//! ```
//! use plant_cache::{ConnectivityEvent, ConnectivityMonitor};
//!
//! let monitor = ConnectivityMonitor::new(false);
//! let mut events = monitor.subscribe();
//!
//! assert_eq!(monitor.set_online(true), Some(ConnectivityEvent::BecameOnline));
//! assert_eq!(monitor.set_online(true), None); // already online
//! assert_eq!(events.try_recv(), Some(ConnectivityEvent::BecameOnline));
//! assert_eq!(events.try_recv(), None);
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::remote::RemoteSink;

const EVENT_CAPACITY: usize = 16;

/// A connectivity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    BecameOnline,
    BecameOffline,
}

impl std::fmt::Display for ConnectivityEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BecameOnline => write!(f, "online"),
            Self::BecameOffline => write!(f, "offline"),
        }
    }
}

/// Current online state plus a stream of transitions.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<bool>>,
    events: broadcast::Sender<ConnectivityEvent>,
}

impl ConnectivityMonitor {
    /// Create a monitor seeded from the runtime's current reachability.
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(initially_online);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        crate::metrics::set_online(initially_online);
        Self {
            state: Arc::new(state),
            events,
        }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Record the platform's latest signal.
    ///
    /// Returns the event emitted, or `None` when the state did not change.
    pub fn set_online(&self, online: bool) -> Option<ConnectivityEvent> {
        // Compare-and-set under the watch lock so racing signals emit one edge
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if !changed {
            debug!(online, "Connectivity signal unchanged");
            return None;
        }

        let event = if online {
            ConnectivityEvent::BecameOnline
        } else {
            ConnectivityEvent::BecameOffline
        };

        info!(%event, "Connectivity changed");
        crate::metrics::set_online(online);
        // No subscribers is fine
        let _ = self.events.send(event);
        Some(event)
    }

    /// Subscribe to transitions. Dropping the subscription unsubscribes.
    pub fn subscribe(&self) -> ConnectivitySubscription {
        ConnectivitySubscription {
            rx: self.events.subscribe(),
        }
    }

    /// Level view of the online state, for UI binding.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

/// Receiving end of [`ConnectivityMonitor::subscribe`].
pub struct ConnectivitySubscription {
    rx: broadcast::Receiver<ConnectivityEvent>,
}

impl ConnectivitySubscription {
    /// Wait for the next transition. `None` once the monitor is gone.
    ///
    /// A subscriber that fell behind skips to the oldest retained event.
    pub async fn recv(&mut self) -> Option<ConnectivityEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Connectivity subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll.
    pub fn try_recv(&mut self) -> Option<ConnectivityEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Consecutive-failure health tracking for the remote endpoint.
///
/// One failed probe is not enough to call the device offline; `threshold`
/// consecutive failures are. A single success resets the count.
pub struct ReachabilityChecker {
    healthy: AtomicBool,
    failures: AtomicU64,
    threshold: u64,
}

impl ReachabilityChecker {
    pub fn new(threshold: u64) -> Self {
        Self {
            healthy: AtomicBool::new(true),
            failures: AtomicU64::new(0),
            threshold: threshold.max(1),
        }
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Release);
        self.healthy.store(true, Ordering::Release);
    }

    pub fn record_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.threshold {
            self.healthy.store(false, Ordering::Release);
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }
}

/// Poll `remote.health_check()` every `interval` and feed the result into
/// `monitor`. Abort the returned handle to stop probing.
pub fn spawn_health_probe(
    monitor: ConnectivityMonitor,
    remote: Arc<dyn RemoteSink>,
    interval: Duration,
    failure_threshold: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let checker = ReachabilityChecker::new(failure_threshold);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if remote.health_check().await {
                checker.record_success();
            } else {
                checker.record_failure();
                debug!(failures = checker.failure_count(), "Health probe failed");
            }
            monitor.set_online(checker.is_healthy());
        }
    })
}
