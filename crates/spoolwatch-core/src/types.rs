// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the spoolwatch event hub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Host-unique printer identifier, as resolved by the platform.
///
/// Opaque: the string carries no meaning beyond identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrinterId(String);

impl PrinterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PrinterId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for PrinterId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PrinterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a connection is subscribed to.
///
/// `All` matches every printer; `Printer` matches only events for that id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionKey {
    All,
    Printer(PrinterId),
}

impl SubscriptionKey {
    /// Whether an event for `printer` falls under this key.
    pub fn matches(&self, printer: &PrinterId) -> bool {
        match self {
            Self::All => true,
            Self::Printer(id) => id == printer,
        }
    }
}

/// A client's subscribe request before name resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionTarget {
    /// Listen to every printer on the host.
    All,
    /// Listen to these printers, by the name the client knows them by.
    Printers(Vec<String>),
}

impl SubscriptionTarget {
    /// Build a target from an optional list of names.
    ///
    /// No list, or an empty one, means every printer.
    pub fn from_names(names: Option<Vec<String>>) -> Self {
        match names {
            Some(names) if !names.is_empty() => Self::Printers(names),
            _ => Self::All,
        }
    }
}

/// Raw status code reported by the native binding layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Printer idle / job has no flags set.
    pub const OK: Self = Self(0);
    /// Synthetic code reported when the native layer could not be queried.
    pub const UNKNOWN: Self = Self(u32::MAX);

    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_unknown() {
            f.write_str("unknown")
        } else {
            write!(f, "{:#x}", self.0)
        }
    }
}

/// How urgently a printer status needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

/// One queued job as reported by the native layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub job_id: u32,
    pub status_code: StatusCode,
}

/// A printer as returned by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterInfo {
    pub id: PrinterId,
    /// Name shown to users; may differ from `id` on some platforms.
    pub display_name: String,
}

impl PrinterInfo {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id: PrinterId(id),
        }
    }
}

/// Printer-level or job-level payload of a [`StatusEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusKind {
    Printer { code: StatusCode, severity: Severity },
    Job { job_id: u32, code: StatusCode },
}

/// An immutable status change, routed by its printer id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub printer: PrinterId,
    #[serde(flatten)]
    pub kind: StatusKind,
    pub observed_at: DateTime<Utc>,
}

impl StatusEvent {
    pub fn printer_status(printer: PrinterId, code: StatusCode, severity: Severity) -> Self {
        Self {
            printer,
            kind: StatusKind::Printer { code, severity },
            observed_at: Utc::now(),
        }
    }

    pub fn job_status(printer: PrinterId, job: JobInfo) -> Self {
        Self {
            printer,
            kind: StatusKind::Job {
                job_id: job.job_id,
                code: job.status_code,
            },
            observed_at: Utc::now(),
        }
    }

    /// The synthetic event emitted when the native layer cannot be queried.
    pub fn unknown(printer: PrinterId) -> Self {
        Self::printer_status(printer, StatusCode::UNKNOWN, Severity::Warning)
    }

    pub fn is_printer_status(&self) -> bool {
        matches!(self.kind, StatusKind::Printer { .. })
    }

    pub fn is_job_status(&self) -> bool {
        matches!(self.kind, StatusKind::Job { .. })
    }
}

/// Identity of a client connection.
///
/// Two handles to the same connection compare equal; nothing else does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
