// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolwatch Monitor: per-printer watchers, the subscription registry, and
// event routing.  This crate turns the native change notifications exposed
// by `spoolwatch-bridge` into `StatusEvent`s delivered to client connections.

pub mod listener;
pub mod monitor;
pub mod registry;
pub mod router;
pub mod sink;
pub mod snapshot;
pub mod supervisor;
pub mod watcher;

#[cfg(test)]
mod fake;

pub use listener::{ChannelListener, ClientConnection, StatusListener};
pub use monitor::StatusMonitor;
pub use registry::SubscriptionRegistry;
pub use router::DispatchRouter;
pub use sink::EventSink;
pub use snapshot::SnapshotProvider;
pub use supervisor::{DegradedMonitoring, ReconcileReport, WatcherSupervisor};
pub use watcher::{CancelToken, PrinterWatcher, TaskHandle, WatcherPhase};
