// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub binding for hosts without a native printer binding.
//
// Enumeration succeeds with no printers; everything that would touch the
// spooler returns `PlatformUnavailable`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use spoolwatch_core::error::{Result, SpoolwatchError};
use spoolwatch_core::types::{JobInfo, PrinterId, PrinterInfo, StatusCode};

use crate::traits::*;

/// No-op printer system.
pub struct StubPrinterSystem;

impl PrinterSystem for StubPrinterSystem {
    fn platform_name(&self) -> &str {
        "stub"
    }
}

impl NativeEnumeration for StubPrinterSystem {
    fn enumerate_printers(&self) -> Result<Vec<PrinterInfo>> {
        Ok(Vec::new())
    }
}

impl NativeChangeNotification for StubPrinterSystem {
    fn supports_change_notification(&self) -> bool {
        false
    }

    fn open_change_notification(&self, printer: &PrinterId) -> Result<Box<dyn ChangeNotification>> {
        tracing::warn!(%printer, "change notification requested on stub binding");
        Err(SpoolwatchError::PlatformUnavailable)
    }

    fn open_configuration_notification(&self) -> Result<Box<dyn ChangeNotification>> {
        Err(SpoolwatchError::PlatformUnavailable)
    }
}

impl NativeStatusQuery for StubPrinterSystem {
    fn query_printer_status(&self, _printer: &PrinterId) -> Result<StatusCode> {
        Err(SpoolwatchError::PlatformUnavailable)
    }

    fn query_jobs(&self, _printer: &PrinterId) -> Result<Vec<JobInfo>> {
        Err(SpoolwatchError::PlatformUnavailable)
    }
}

impl NativeNameResolution for StubPrinterSystem {}

/// Status backend that can never be started.
#[derive(Default)]
pub struct StubBackend {
    running: AtomicBool,
}

impl StatusBackend for StubBackend {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn start(&self, _publisher: Arc<dyn EventPublisher>) -> Result<()> {
        tracing::warn!("StatusBackend::start called on stub backend");
        Err(SpoolwatchError::PlatformUnavailable)
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}
