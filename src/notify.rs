//! Transient user-facing notices (toasts).
//!
//! The core never renders anything; it hands [`Notice`] values to a
//! [`Notifier`] supplied by the UI layer.

use std::fmt;
use parking_lot::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    BackOnline,
    WentOffline,
    SyncStarted { pending: usize },
    SyncCompleted { replayed: usize },
    /// Some operations failed and stay queued
    SyncIncomplete { failed: usize },
    /// The pass could not run at all (queue unreadable)
    SyncFailed,
    /// Manual sync requested while offline
    OfflineForceSync,
    OfflineDataCleared,
    ClearFailed,
}

impl Notice {
    /// Warnings and errors, as opposed to informational notices.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::WentOffline | Self::SyncIncomplete { .. } | Self::SyncFailed | Self::OfflineForceSync | Self::ClearFailed
        )
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackOnline => write!(f, "You're back online!"),
            Self::WentOffline => write!(f, "You're offline. Changes will be saved locally."),
            Self::SyncStarted { pending } => write!(f, "Syncing {} pending items...", pending),
            Self::SyncCompleted { .. } => write!(f, "Sync completed successfully!"),
            Self::SyncIncomplete { failed } => {
                write!(f, "{} item{} could not be synced. Will try again later.", failed, plural(*failed))
            }
            Self::SyncFailed => write!(f, "Error syncing data. Will try again later."),
            Self::OfflineForceSync => write!(f, "You're offline. Please connect to the internet to sync."),
            Self::OfflineDataCleared => write!(f, "Offline data cleared successfully"),
            Self::ClearFailed => write!(f, "Error clearing offline data"),
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// Banner text for a pending count, as shown next to "Sync Now".
#[must_use]
pub fn pending_label(pending: usize) -> String {
    format!("{} item{} pending sync", pending, plural(pending))
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Default notifier: notices go to the log.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        if notice.is_warning() {
            warn!(notice = %notice, "User notice");
        } else {
            info!(notice = %notice, "User notice");
        }
    }
}

/// Keeps every notice in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    #[must_use]
    pub fn contains(&self, notice: &Notice) -> bool {
        self.notices.lock().contains(notice)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_label_pluralizes() {
        assert_eq!(pending_label(1), "1 item pending sync");
        assert_eq!(pending_label(3), "3 items pending sync");
    }

    #[test]
    fn test_warning_classification() {
        assert!(Notice::WentOffline.is_warning());
        assert!(Notice::SyncFailed.is_warning());
        assert!(!Notice::BackOnline.is_warning());
        assert!(!Notice::SyncCompleted { replayed: 2 }.is_warning());
    }

    #[test]
    fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier.notify(Notice::BackOnline);
        notifier.notify(Notice::SyncStarted { pending: 2 });
        assert!(notifier.contains(&Notice::BackOnline));
        assert_eq!(notifier.notices().len(), 2);
        assert_eq!(Notice::SyncStarted { pending: 2 }.to_string(), "Syncing 2 pending items...");
    }
}
