// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Native printer binding abstractions.
//!
//! The monitor never talks to the spooler directly. Everything it needs from
//! the host (enumeration, change-notification handles, point-in-time status
//! queries, and the alternate status backend) goes through the traits in
//! [`traits`]. Hosts without a native binding get the [`stub`] versions.

pub mod stub;
pub mod traits;

pub use traits::{
    ChangeNotification, EventPublisher, NativeChangeNotification, NativeEnumeration,
    NativeNameResolution, NativeStatusQuery, PrinterSystem, StatusBackend, Wake,
};

use std::sync::Arc;

/// Retrieves the printer system binding for the target operating system.
///
/// No native binding ships with this crate; every target currently gets the
/// stub, which reports no printers and no change-notification support.
pub fn platform_system() -> Arc<dyn PrinterSystem> {
    Arc::new(stub::StubPrinterSystem)
}

/// Retrieves the alternate status backend for the target operating system.
pub fn platform_backend() -> Arc<dyn StatusBackend> {
    Arc::new(stub::StubBackend::default())
}
