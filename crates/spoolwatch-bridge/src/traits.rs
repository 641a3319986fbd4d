// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic trait definitions for the native printer binding.
//
// The binding layer is split by capability. A platform implements all of them
// and exposes the bundle as a `PrinterSystem`.

use std::sync::Arc;

use spoolwatch_core::error::Result;
use spoolwatch_core::types::{JobInfo, PrinterId, PrinterInfo, Severity, StatusCode, StatusEvent};

/// Unified binding that groups every native capability the monitor consumes.
pub trait PrinterSystem:
    NativeEnumeration
    + NativeChangeNotification
    + NativeStatusQuery
    + NativeNameResolution
    + Send
    + Sync
{
    /// Human-readable platform name (e.g. "Windows spooler", "CUPS").
    fn platform_name(&self) -> &str;
}

/// Why a blocking [`ChangeNotification::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The printer reported a change and a valid change record is available.
    Changed,
    /// The handle was closed; no further changes will be reported.
    Closed,
}

/// An open native change-notification handle.
///
/// `wait` and `close` are called from different threads: closing the handle
/// must make a pending or future `wait` return promptly.
pub trait ChangeNotification: Send + Sync {
    /// Block until the printer changes or the handle is closed.
    ///
    /// An `Err` means the wake carried no valid change record.
    fn wait(&self) -> Result<Wake>;

    /// Release the native handle.
    fn close(&self);
}

/// List the printers installed on the host.
pub trait NativeEnumeration {
    fn enumerate_printers(&self) -> Result<Vec<PrinterInfo>>;
}

/// Open change-notification handles.
pub trait NativeChangeNotification {
    /// Whether per-printer change notifications exist on this platform.
    ///
    /// When `false` the monitor relies on the [`StatusBackend`] instead.
    fn supports_change_notification(&self) -> bool;

    /// Open a handle that wakes on every change class of `printer`.
    fn open_change_notification(&self, printer: &PrinterId) -> Result<Box<dyn ChangeNotification>>;

    /// Open a handle that wakes when printers are added to or removed from
    /// the host.
    fn open_configuration_notification(&self) -> Result<Box<dyn ChangeNotification>>;
}

/// Point-in-time status queries.
pub trait NativeStatusQuery {
    fn query_printer_status(&self, printer: &PrinterId) -> Result<StatusCode>;

    fn query_jobs(&self, printer: &PrinterId) -> Result<Vec<JobInfo>>;

    /// Severity of a raw printer status code.
    fn classify_status(&self, code: StatusCode) -> Severity {
        if code == StatusCode::OK {
            Severity::Info
        } else {
            Severity::Warning
        }
    }
}

/// Map user-facing printer names to system identifiers.
pub trait NativeNameResolution: NativeEnumeration {
    /// Resolve `display_name` to a printer id, or `None` if nothing matches.
    ///
    /// Platforms whose display names equal their ids can rely on this
    /// default, which matches against a fresh enumeration.
    fn resolve_printer_name(&self, display_name: &str) -> Option<PrinterId> {
        self.enumerate_printers()
            .ok()?
            .into_iter()
            .find(|p| p.display_name == display_name || p.id.as_str() == display_name)
            .map(|p| p.id)
    }
}

/// Destination for events produced outside the per-printer watchers.
pub trait EventPublisher: Send + Sync {
    /// Hand a batch of events to the router. Returns `false` once the
    /// monitor has shut down.
    fn publish(&self, events: Vec<StatusEvent>) -> bool;
}

/// The shared status service used where per-printer notifications are
/// unavailable.
pub trait StatusBackend: Send + Sync {
    fn is_running(&self) -> bool;

    /// Start the service; it reports status changes through `publisher`.
    ///
    /// May publish an initial batch before returning. `publish` waits while
    /// the router is behind, so callers must not hold anything the router
    /// needs.
    fn start(&self, publisher: Arc<dyn EventPublisher>) -> Result<()>;

    fn stop(&self);
}
