// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for spoolwatch.

use thiserror::Error;

/// Top-level error type for all spoolwatch operations.
#[derive(Debug, Error)]
pub enum SpoolwatchError {
    // -- Subscription errors --
    #[error("no printer matches {0:?}")]
    InvalidTarget(String),

    // -- Native binding errors --
    #[error("cannot attach change notification to {printer}: {reason}")]
    NativeAttach { printer: String, reason: String },

    #[error("native query for {printer} failed: {reason}")]
    NativeQuery { printer: String, reason: String },

    #[error("printer enumeration failed: {0}")]
    Enumeration(String),

    // -- Alternate status backend --
    #[error("status backend error: {0}")]
    Backend(String),

    // -- Service lifecycle --
    #[error("status monitor has been shut down")]
    MonitorStopped,

    // -- Configuration / persistence --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Platform bridge --
    #[error("feature not available on this platform")]
    PlatformUnavailable,
}

impl SpoolwatchError {
    /// Whether the failure is expected to clear up on its own.
    ///
    /// Query and enumeration failures come from a spooler that is busy or
    /// restarting; attach failures and bad targets will not fix themselves.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NativeQuery { .. } | Self::Enumeration(_) | Self::Backend(_) | Self::Io(_)
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SpoolwatchError>;
