// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connectivity monitor: the single source of truth for online/offline.
//!
//! The platform adapter (browser shell, mobile bridge, test) calls
//! [`ConnectivityMonitor::set_online`] when the environment reports a
//! transition. Consumers either read [`ConnectivityMonitor::is_online`],
//! register a handler with [`ConnectivityMonitor::on_status_change`], or
//! await changes on [`ConnectivityMonitor::subscribe`]. Nothing polls.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use opendoor_sync::{ConnectivityMonitor, ConnectivityEvent};
//!
//! let monitor = ConnectivityMonitor::new(true);
//! let seen = Arc::new(AtomicUsize::new(0));
//! let seen_clone = seen.clone();
//! let sub = monitor.on_status_change(move |event| {
//!     if event == ConnectivityEvent::Offline {
//!         seen_clone.fetch_add(1, Ordering::SeqCst);
//!     }
//! });
//!
//! monitor.set_online(false);
//! assert!(!monitor.is_online());
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//!
//! sub.unsubscribe();
//! monitor.set_online(true);
//! monitor.set_online(false);
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

impl ConnectivityEvent {
    #[must_use]
    pub fn from_online(online: bool) -> Self {
        if online { Self::Online } else { Self::Offline }
    }
}

type Handler = Arc<dyn Fn(ConnectivityEvent) + Send + Sync>;
type HandlerList = Mutex<Vec<(u64, Handler)>>;

pub struct ConnectivityMonitor {
    status: watch::Sender<bool>,
    handlers: Arc<HandlerList>,
    next_handler_id: AtomicU64,
}

impl ConnectivityMonitor {
    /// Seed from the runtime's current connectivity flag.
    #[must_use]
    pub fn new(initially_online: bool) -> Self {
        let (status, _) = watch::channel(initially_online);
        Self {
            status,
            handlers: Arc::new(Mutex::new(Vec::new())),
            next_handler_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.status.borrow()
    }

    /// Deliver an environment transition. Returns `false` when the state did
    /// not change (duplicate events are dropped).
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.status.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if !changed {
            return false;
        }

        let event = ConnectivityEvent::from_online(online);
        if online {
            info!("Network: online");
        } else {
            warn!("Network: offline");
        }

        // Call handlers outside the lock so they may (un)subscribe
        let handlers: Vec<Handler> = self.handlers.lock().iter().map(|(_, h)| h.clone()).collect();
        for handler in handlers {
            handler(event);
        }
        true
    }

    /// Register a handler for transitions. Dropping the returned
    /// [`Subscription`] unregisters it.
    pub fn on_status_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(ConnectivityEvent) + Send + Sync + 'static,
    {
        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().push((id, Arc::new(handler)));
        Subscription {
            id,
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    /// Receiver that observes every status change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.status.subscribe()
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }
}

/// Handle for a registered status handler.
#[must_use = "dropping a Subscription unregisters its handler"]
pub struct Subscription {
    id: u64,
    handlers: Weak<HandlerList>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handlers) = self.handlers.upgrade() {
            handlers.lock().retain(|(id, _)| *id != self.id);
        }
    }
}
