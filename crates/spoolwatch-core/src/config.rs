// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service and application configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning for the status monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Pause after a failed native query before waiting again.
    pub backoff_delay_ms: u64,
    /// Capacity of the watcher-to-router event channel.
    pub event_channel_capacity: usize,
    /// Watch the host for printers being added or removed.
    pub watch_configuration_changes: bool,
    /// Only keep watchers for printers some connection listens to.
    pub watch_interested_only: bool,
}

impl MonitorConfig {
    pub fn backoff_delay(&self) -> Duration {
        Duration::from_millis(self.backoff_delay_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            backoff_delay_ms: 1000,
            event_channel_capacity: 256,
            watch_configuration_changes: true,
            watch_interested_only: false,
        }
    }
}

/// Settings for the `spoolwatch` binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Printers to listen to. Empty means all of them.
    pub printers: Vec<String>,
    /// Print the current status of every watched printer at startup.
    pub snapshot_on_start: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            log_filter: "info".into(),
            printers: Vec::new(),
            snapshot_on_start: true,
        }
    }
}
