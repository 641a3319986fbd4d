// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: loads configuration, builds the status monitor over
// the platform bridge, and attaches client listeners to it.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use spoolwatch_bridge::{PrinterSystem, StatusBackend, platform_backend, platform_system};
use spoolwatch_core::error::{Result, SpoolwatchError};
use spoolwatch_core::types::SubscriptionTarget;
use spoolwatch_core::AppConfig;
use spoolwatch_monitor::{ClientConnection, StatusListener, StatusMonitor};
use tracing::{info, warn};

/// Shared application services.
///
/// Cheaply cloneable so the monitor can be handed to blocking tasks.
#[derive(Clone)]
pub struct AppServices {
    monitor: Arc<StatusMonitor>,
    config: AppConfig,
}

impl AppServices {
    /// Initialise against the host's printer binding. Call once at startup.
    pub fn init(config: AppConfig) -> Result<Self> {
        Self::with_platform(config, platform_system(), platform_backend())
    }

    pub fn with_platform(
        config: AppConfig,
        system: Arc<dyn PrinterSystem>,
        backend: Arc<dyn StatusBackend>,
    ) -> Result<Self> {
        info!(platform = system.platform_name(), "initialising app services");
        let monitor = StatusMonitor::new(system, backend, config.monitor.clone())?;
        Ok(Self {
            monitor: Arc::new(monitor),
            config,
        })
    }

    pub fn monitor(&self) -> &StatusMonitor {
        &self.monitor
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Subscribe `listener` to the configured printers and, if enabled, send
    /// it the current status of each.
    ///
    /// A failed snapshot is logged, not returned: live events still flow.
    pub fn attach(&self, listener: Arc<dyn StatusListener>) -> Result<ClientConnection> {
        let connection = ClientConnection::new(listener);
        let target = SubscriptionTarget::from_names(Some(self.config.printers.clone()));
        self.monitor.subscribe(&connection, target)?;

        if self.config.snapshot_on_start {
            match self.monitor.deliver_snapshot(&connection) {
                Ok(count) => info!(events = count, "initial snapshot sent"),
                Err(e) => warn!(error = %e, "initial snapshot unavailable"),
            }
        }

        for entry in self.monitor.degraded_printers() {
            match &entry.printer {
                Some(printer) => warn!(%printer, reason = %entry.reason, "printer is not monitored"),
                None => warn!(reason = %entry.reason, "status backend is not running"),
            }
        }
        Ok(connection)
    }

    /// Tear down all watchers and wait for their threads.
    pub fn shutdown(&self) {
        self.monitor.shutdown();
    }
}

/// Load settings from `path`.
///
/// A missing file yields the defaults; an unreadable or malformed one is an
/// error.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(AppConfig::default()),
        Err(e) => return Err(SpoolwatchError::Io(e)),
    };
    serde_json::from_str(&data)
        .map_err(|e| SpoolwatchError::Config(format!("{}: {e}", path.display())))
}
