// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connectivity monitor.
//!
//! A pure relay for the host's network-status signal. The host calls
//! [`ConnectivityMonitor::set_online`]; the engine reads the current state
//! through a [`Connectivity`] handle to short-circuit remote calls, and the
//! relay task fires a callback on every offline → online transition. No
//! polling, no retries of its own.
//!
//! # Example
//!
//! ```
//! use leads_sync::ConnectivityMonitor;
//!
//! let monitor = ConnectivityMonitor::new(false);
//! let handle = monitor.handle();
//! assert!(!handle.is_online());
//!
//! monitor.set_online(true);
//! assert!(handle.is_online());
//! ```

use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Owner of the connectivity signal.
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

/// Read-only view handed to the engine.
#[derive(Clone, Debug)]
pub struct Connectivity {
    rx: watch::Receiver<bool>,
}

impl Connectivity {
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.rx.borrow()
    }
}

impl ConnectivityMonitor {
    #[must_use]
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        crate::metrics::set_online(initially_online);
        Self { tx }
    }

    /// Feed a host network event. Repeating the current state is a no-op.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "Connectivity changed");
            crate::metrics::set_online(online);
        }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn handle(&self) -> Connectivity {
        Connectivity { rx: self.tx.subscribe() }
    }

    /// Raw receiver for hosts that want to watch transitions themselves.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Spawn the relay: `on_online` runs once per transition to online.
    ///
    /// Transitions that happen while `on_online` is still running are
    /// coalesced into the latest state. The task ends when the monitor is
    /// dropped.
    pub fn spawn_relay<F, Fut>(&self, on_online: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        rx.mark_unchanged();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                if online {
                    debug!("Back online, triggering outbox drain");
                    on_online().await;
                }
            }
            debug!("Connectivity relay stopped");
        })
    }
}
