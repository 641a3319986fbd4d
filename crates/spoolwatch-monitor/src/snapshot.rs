// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Point-in-time status of every printer, for the initial sync of a new
// subscriber.

use std::sync::Arc;

use tracing::{debug, warn};

use spoolwatch_bridge::PrinterSystem;
use spoolwatch_core::error::{Result, SpoolwatchError};
use spoolwatch_core::types::{PrinterId, StatusEvent};

/// Runs the same status queries the watchers use, across all printers.
#[derive(Clone)]
pub struct SnapshotProvider {
    system: Arc<dyn PrinterSystem>,
}

impl SnapshotProvider {
    pub fn new(system: Arc<dyn PrinterSystem>) -> Self {
        Self { system }
    }

    /// Current status and queued jobs of every enumerated printer.
    ///
    /// Each printer contributes its status event followed by its job events.
    /// A printer that cannot be queried contributes a single UNKNOWN status.
    /// Only a failed enumeration fails the snapshot.
    pub fn capture(&self) -> Result<Vec<StatusEvent>> {
        let printers = self
            .system
            .enumerate_printers()
            .map_err(|e| SpoolwatchError::Enumeration(e.to_string()))?;

        let mut events = Vec::new();
        for info in printers {
            self.capture_printer(info.id, &mut events);
        }
        debug!(events = events.len(), "status snapshot captured");
        Ok(events)
    }

    fn capture_printer(&self, printer: PrinterId, out: &mut Vec<StatusEvent>) {
        let queried = self
            .system
            .query_printer_status(&printer)
            .and_then(|code| Ok((code, self.system.query_jobs(&printer)?)));

        match queried {
            Ok((code, jobs)) => {
                let severity = self.system.classify_status(code);
                out.push(StatusEvent::printer_status(printer.clone(), code, severity));
                out.extend(
                    jobs.into_iter()
                        .map(|job| StatusEvent::job_status(printer.clone(), job)),
                );
            }
            Err(e) => {
                warn!(%printer, error = %e, "snapshot query failed; reporting unknown");
                out.push(StatusEvent::unknown(printer));
            }
        }
    }
}

impl std::fmt::Debug for SnapshotProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotProvider")
            .field("platform", &self.system.platform_name())
            .finish()
    }
}
