// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the offline sync core.
//!
//! # Example
//!
//! ```
//! use opendoor_sync::OfflineSyncConfig;
//!
//! // Minimal config (uses defaults)
//! let config = OfflineSyncConfig::default();
//! assert_eq!(config.batch_size, 10);
//! assert_eq!(config.max_attempts, 5);
//!
//! // Custom database location, smaller batches
//! let config = OfflineSyncConfig {
//!     db_path: "/var/lib/opendoor/OpenDoorReliefDB.sqlite".into(),
//!     batch_size: 4,
//!     ..Default::default()
//! };
//! assert_eq!(config.max_attempts, 5);
//! ```

use serde::Deserialize;

/// Configuration for the offline sync core.
///
/// All fields have defaults matching the app's shipped behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct OfflineSyncConfig {
    /// SQLite file backing the local store
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Pending operations replayed concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Failed replays before an operation is quarantined
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// SQLite pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a connection waits on a locked database
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Emit notices on online/offline transitions
    #[serde(default = "default_notify_on_connectivity")]
    pub notify_on_connectivity: bool,
}

fn default_db_path() -> String { "./OpenDoorReliefDB.sqlite".to_string() }
fn default_batch_size() -> usize { 10 }
fn default_max_attempts() -> u32 { 5 }
fn default_max_connections() -> u32 { 4 }
fn default_busy_timeout_ms() -> u64 { 5_000 }
fn default_notify_on_connectivity() -> bool { true }

impl Default for OfflineSyncConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
            notify_on_connectivity: default_notify_on_connectivity(),
        }
    }
}
