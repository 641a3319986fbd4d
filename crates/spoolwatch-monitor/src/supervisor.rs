// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Watcher supervision.
//
// Keeps exactly one running watcher per printer in the host's enumeration.
// On hosts without per-printer change notification the same entry points
// ensure the shared status backend is running instead.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use spoolwatch_bridge::{EventPublisher, PrinterSystem, StatusBackend};
use spoolwatch_core::config::MonitorConfig;
use spoolwatch_core::error::Result;
use spoolwatch_core::types::PrinterId;

use crate::registry::SubscriptionRegistry;
use crate::sink::EventSink;
use crate::watcher::{PrinterWatcher, TaskHandle, spawn_configuration_watcher};

/// What a single reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub started: Vec<PrinterId>,
    pub cancelled: Vec<PrinterId>,
    /// Printers whose watcher could not attach.
    pub failed: Vec<PrinterId>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.started.is_empty() && self.cancelled.is_empty() && self.failed.is_empty()
    }
}

/// A printer (or the shared backend, when `printer` is `None`) that is not
/// being monitored because its native resources could not be set up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedMonitoring {
    pub printer: Option<PrinterId>,
    pub reason: String,
}

/// A claimed start of the shared backend.
///
/// `StatusBackend::start` may publish before it returns, and publishing can
/// wait on the router, which needs the monitor lock. Run this with the lock
/// released.
#[must_use]
pub(crate) struct BackendStart {
    backend: Arc<dyn StatusBackend>,
    publisher: Arc<dyn EventPublisher>,
}

impl BackendStart {
    pub(crate) fn run(self) -> Result<()> {
        self.backend.start(self.publisher)
    }
}

/// Owns the running watcher tasks and the shared backend lifecycle.
pub struct WatcherSupervisor {
    system: Arc<dyn PrinterSystem>,
    backend: Arc<dyn StatusBackend>,
    sink: EventSink,
    config: MonitorConfig,
    watchers: HashMap<PrinterId, TaskHandle>,
    /// Printers that failed to attach, with the reason. Not retried until
    /// the printer leaves the enumeration or the supervisor is torn down.
    degraded: HashMap<PrinterId, String>,
    backend_fault: Option<String>,
    /// Set while subscribers need the shared backend.
    backend_wanted: bool,
    /// Set while a [`BackendStart`] is outstanding.
    backend_starting: bool,
    config_watcher: Option<TaskHandle>,
    /// Cancelled tasks that may still be unwinding.
    retired: Vec<TaskHandle>,
}

impl WatcherSupervisor {
    pub(crate) fn new(
        system: Arc<dyn PrinterSystem>,
        backend: Arc<dyn StatusBackend>,
        sink: EventSink,
        config: MonitorConfig,
    ) -> Self {
        Self {
            system,
            backend,
            sink,
            config,
            watchers: HashMap::new(),
            degraded: HashMap::new(),
            backend_fault: None,
            backend_wanted: false,
            backend_starting: false,
            config_watcher: None,
            retired: Vec::new(),
        }
    }

    /// Make sure everything `registry` needs is running.
    ///
    /// Enumerates the host and reconciles against it. On hosts without
    /// per-printer notification it only marks the shared backend as wanted;
    /// the caller starts it through [`Self::take_backend_start`] once the
    /// monitor lock is released. An enumeration failure leaves the current
    /// watchers untouched.
    pub fn launch(&mut self, registry: &SubscriptionRegistry) -> ReconcileReport {
        if !self.system.supports_change_notification() {
            self.backend_wanted = true;
            return ReconcileReport::default();
        }

        self.ensure_configuration_watcher();

        let printers = match self.system.enumerate_printers() {
            Ok(printers) => printers,
            Err(e) => {
                warn!(error = %e, "printer enumeration failed; keeping current watchers");
                return ReconcileReport::default();
            }
        };

        let wanted: Vec<PrinterId> = printers
            .into_iter()
            .map(|info| info.id)
            .filter(|id| !self.config.watch_interested_only || registry.has_any_interest(id))
            .collect();
        self.reconcile(&wanted)
    }

    /// Align the running watchers with `printers`.
    ///
    /// Calling this again with the same list starts and cancels nothing.
    pub fn reconcile(&mut self, printers: &[PrinterId]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let present: HashSet<&PrinterId> = printers.iter().collect();

        self.retired.retain(|task| !task.is_finished());
        self.degraded.retain(|printer, _| present.contains(printer));

        let gone: Vec<PrinterId> = self
            .watchers
            .keys()
            .filter(|printer| !present.contains(printer))
            .cloned()
            .collect();
        for printer in gone {
            if let Some(task) = self.watchers.remove(&printer) {
                debug!(%printer, "printer left enumeration; cancelling watcher");
                task.cancel();
                self.retired.push(task);
                report.cancelled.push(printer);
            }
        }

        // A watcher whose native handle was closed underneath it has exited
        // on its own; attach a fresh one.
        let exited: Vec<PrinterId> = self
            .watchers
            .iter()
            .filter(|(_, task)| !task.is_alive())
            .map(|(printer, _)| printer.clone())
            .collect();
        for printer in exited {
            if let Some(task) = self.watchers.remove(&printer) {
                debug!(%printer, "watcher exited; reattaching");
                task.cancel();
                self.retired.push(task);
            }
        }

        for printer in printers {
            if self.watchers.contains_key(printer) || self.degraded.contains_key(printer) {
                continue;
            }
            let watcher = PrinterWatcher::new(
                printer.clone(),
                Arc::clone(&self.system),
                self.sink.clone(),
                self.config.backoff_delay(),
            );
            match watcher.spawn() {
                Ok(task) => {
                    self.watchers.insert(printer.clone(), task);
                    report.started.push(printer.clone());
                }
                Err(e) => {
                    warn!(%printer, error = %e, "watcher could not attach; printer is not monitored");
                    self.degraded.insert(printer.clone(), e.to_string());
                    report.failed.push(printer.clone());
                }
            }
        }

        if !report.is_noop() {
            info!(
                started = report.started.len(),
                cancelled = report.cancelled.len(),
                failed = report.failed.len(),
                running = self.watchers.len(),
                "watchers reconciled"
            );
        }
        report
    }

    /// Cancel every watcher and stop the shared backend.
    pub fn teardown(&mut self) {
        let cancelled = self.watchers.len();
        for (_, task) in self.watchers.drain() {
            task.cancel();
            self.retired.push(task);
        }
        if let Some(task) = self.config_watcher.take() {
            task.cancel();
            self.retired.push(task);
        }
        self.backend_wanted = false;
        if self.backend.is_running() {
            self.backend.stop();
        }
        self.degraded.clear();
        self.backend_fault = None;
        info!(cancelled, "status monitoring torn down");
    }

    /// Printers with a live watcher, sorted.
    pub fn watched_printers(&self) -> Vec<PrinterId> {
        let mut printers: Vec<PrinterId> = self
            .watchers
            .iter()
            .filter(|(_, task)| task.is_alive())
            .map(|(printer, _)| printer.clone())
            .collect();
        printers.sort();
        printers
    }

    pub fn degraded(&self) -> Vec<DegradedMonitoring> {
        let mut entries: Vec<DegradedMonitoring> = self
            .degraded
            .iter()
            .map(|(printer, reason)| DegradedMonitoring {
                printer: Some(printer.clone()),
                reason: reason.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.printer.cmp(&b.printer));
        if let Some(reason) = &self.backend_fault {
            entries.push(DegradedMonitoring {
                printer: None,
                reason: reason.clone(),
            });
        }
        entries
    }

    pub fn is_backend_running(&self) -> bool {
        self.backend.is_running()
    }

    /// Whether watchers follow subscriptions rather than the whole host.
    pub(crate) fn interested_only(&self) -> bool {
        self.config.watch_interested_only
    }

    /// Hand over cancelled tasks so the caller can join them outside any lock.
    pub(crate) fn take_retired(&mut self) -> Vec<TaskHandle> {
        std::mem::take(&mut self.retired)
    }

    /// Claim the pending start of the shared backend, if one is needed.
    ///
    /// At most one start is outstanding at a time. Run it without holding
    /// the monitor lock, then pass the result to [`Self::finish_backend_start`].
    pub(crate) fn take_backend_start(&mut self) -> Option<BackendStart> {
        if !self.backend_wanted || self.backend_starting || self.backend.is_running() {
            return None;
        }
        self.backend_starting = true;
        Some(BackendStart {
            backend: Arc::clone(&self.backend),
            publisher: Arc::new(self.sink.clone()),
        })
    }

    /// Record the outcome of a [`BackendStart`].
    ///
    /// A backend that came up after the last subscriber left is stopped again.
    pub(crate) fn finish_backend_start(&mut self, result: Result<()>) {
        self.backend_starting = false;
        match result {
            Ok(()) if !self.backend_wanted => {
                debug!("status backend started after teardown; stopping it");
                self.backend.stop();
            }
            Ok(()) => {
                info!(platform = self.system.platform_name(), "status backend started");
                self.backend_fault = None;
            }
            Err(e) if !self.backend_wanted => {
                debug!(error = %e, "status backend start failed after teardown");
            }
            Err(e) => {
                warn!(error = %e, "status backend could not be started");
                self.backend_fault = Some(e.to_string());
            }
        }
    }

    fn ensure_configuration_watcher(&mut self) {
        if !self.config.watch_configuration_changes {
            return;
        }
        if self.config_watcher.as_ref().is_some_and(TaskHandle::is_alive) {
            return;
        }
        if let Some(task) = self.config_watcher.take() {
            debug!("configuration watcher exited; reattaching");
            task.cancel();
            self.retired.push(task);
        }
        match spawn_configuration_watcher(
            self.system.as_ref(),
            self.sink.clone(),
            self.config.backoff_delay(),
        ) {
            Ok(task) => self.config_watcher = Some(task),
            Err(e) => warn!(error = %e, "printer configuration changes will not be tracked"),
        }
    }
}

impl std::fmt::Debug for WatcherSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherSupervisor")
            .field("platform", &self.system.platform_name())
            .field("watchers", &self.watchers.len())
            .field("degraded", &self.degraded.len())
            .field("retired", &self.retired.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeBackend, FakeSystem, eventually, recorder};
    use crate::sink::Dispatch;
    use std::sync::mpsc::Receiver;

    fn ids(names: &[&str]) -> Vec<PrinterId> {
        names.iter().map(|&n| PrinterId::from(n)).collect()
    }

    fn supervisor(
        system: Arc<FakeSystem>,
        backend: Arc<FakeBackend>,
        config: MonitorConfig,
    ) -> (WatcherSupervisor, Receiver<Dispatch>) {
        let (sink, rx) = EventSink::channel(16);
        (WatcherSupervisor::new(system, backend, sink, config), rx)
    }

    fn start_backend(supervisor: &mut WatcherSupervisor) {
        if let Some(start) = supervisor.take_backend_start() {
            let result = start.run();
            supervisor.finish_backend_start(result);
        }
    }

    fn join_all(supervisor: &mut WatcherSupervisor) {
        for task in supervisor.take_retired() {
            task.join();
        }
    }

    #[test]
    fn reconcile_is_idempotent() {
        let system = FakeSystem::native(&["HP1", "HP2"]);
        let (mut sup, _rx) = supervisor(system.clone(), Arc::default(), MonitorConfig::default());

        let first = sup.reconcile(&ids(&["HP1", "HP2"]));
        assert_eq!(first.started, ids(&["HP1", "HP2"]));

        let second = sup.reconcile(&ids(&["HP1", "HP2"]));
        assert!(second.is_noop());
        assert_eq!(system.opened(), 2);
        assert_eq!(sup.watched_printers(), ids(&["HP1", "HP2"]));

        sup.teardown();
        join_all(&mut sup);
    }

    #[test]
    fn missing_printer_is_cancelled() {
        let system = FakeSystem::native(&["HP1", "HP2"]);
        let (mut sup, _rx) = supervisor(system.clone(), Arc::default(), MonitorConfig::default());
        sup.reconcile(&ids(&["HP1", "HP2"]));

        let report = sup.reconcile(&ids(&["HP1"]));
        assert_eq!(report.cancelled, ids(&["HP2"]));
        assert!(report.started.is_empty());
        assert_eq!(sup.watched_printers(), ids(&["HP1"]));
        assert_eq!(system.closed(), 1);

        sup.teardown();
        join_all(&mut sup);
        assert_eq!(system.closed(), 2);
    }

    #[test]
    fn attach_failure_is_reported_once_and_cleared_on_removal() {
        let system = FakeSystem::native(&["HP1", "HP2"]);
        system.fail_attach("HP2");
        let (mut sup, _rx) = supervisor(system.clone(), Arc::default(), MonitorConfig::default());

        let report = sup.reconcile(&ids(&["HP1", "HP2"]));
        assert_eq!(report.started, ids(&["HP1"]));
        assert_eq!(report.failed, ids(&["HP2"]));

        let degraded = sup.degraded();
        assert_eq!(degraded.len(), 1);
        assert_eq!(degraded[0].printer, Some("HP2".into()));
        assert!(degraded[0].reason.contains("HP2"));

        assert!(sup.reconcile(&ids(&["HP1", "HP2"])).is_noop());

        sup.reconcile(&ids(&["HP1"]));
        assert!(sup.degraded().is_empty());

        sup.teardown();
        join_all(&mut sup);
    }

    #[test]
    fn exited_watcher_is_reattached() {
        let system = FakeSystem::native(&["HP1"]);
        let (mut sup, _rx) = supervisor(system.clone(), Arc::default(), MonitorConfig::default());
        sup.reconcile(&ids(&["HP1"]));

        assert!(system.wait_until_waiting("HP1"));
        system.close_externally("HP1");
        assert!(eventually(|| sup.watched_printers().is_empty()));

        let report = sup.reconcile(&ids(&["HP1"]));
        assert_eq!(report.started, ids(&["HP1"]));
        assert_eq!(system.opened(), 2);

        sup.teardown();
        join_all(&mut sup);
    }

    #[test]
    fn closed_configuration_watcher_is_reattached() {
        let system = FakeSystem::native(&[]);
        let config = MonitorConfig {
            backoff_delay_ms: 10,
            ..MonitorConfig::default()
        };
        let (mut sup, rx) = supervisor(system.clone(), Arc::default(), config);
        let registry = SubscriptionRegistry::new();

        sup.launch(&registry);
        assert_eq!(system.opened(), 1);

        system.close_configuration_externally();
        assert!(matches!(
            rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap(),
            Dispatch::Relaunch
        ));
        sup.launch(&registry);
        assert_eq!(system.opened(), 2);

        system.fire_configuration_change();
        assert!(matches!(
            rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap(),
            Dispatch::Relaunch
        ));

        sup.teardown();
        join_all(&mut sup);
    }

    #[test]
    fn launch_starts_configuration_watcher_once() {
        let system = FakeSystem::native(&["HP1"]);
        let (mut sup, rx) = supervisor(system.clone(), Arc::default(), MonitorConfig::default());
        let registry = SubscriptionRegistry::new();

        let report = sup.launch(&registry);
        assert_eq!(report.started, ids(&["HP1"]));
        assert_eq!(system.opened(), 2);

        assert!(sup.launch(&registry).is_noop());
        assert_eq!(system.opened(), 2);

        system.fire_configuration_change();
        assert!(matches!(
            rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap(),
            Dispatch::Relaunch
        ));

        sup.teardown();
        join_all(&mut sup);
        assert_eq!(system.closed(), 2);
    }

    #[test]
    fn launch_follows_enumeration_changes() {
        let system = FakeSystem::native(&["HP1"]);
        let config = MonitorConfig {
            watch_configuration_changes: false,
            ..MonitorConfig::default()
        };
        let (mut sup, _rx) = supervisor(system.clone(), Arc::default(), config);
        let registry = SubscriptionRegistry::new();

        sup.launch(&registry);
        system.add_printer("HP2");
        system.remove_printer("HP1");

        let report = sup.launch(&registry);
        assert_eq!(report.started, ids(&["HP2"]));
        assert_eq!(report.cancelled, ids(&["HP1"]));

        sup.teardown();
        join_all(&mut sup);
    }

    #[test]
    fn interested_only_policy_filters_printers() {
        let system = FakeSystem::native(&["HP1", "HP2"]);
        let config = MonitorConfig {
            watch_configuration_changes: false,
            watch_interested_only: true,
            ..MonitorConfig::default()
        };
        let (mut sup, _rx) = supervisor(system.clone(), Arc::default(), config);
        let mut registry = SubscriptionRegistry::new();
        let (c1, _events) = recorder();
        registry.subscribe(&c1, spoolwatch_core::SubscriptionKey::Printer("HP1".into()));

        sup.launch(&registry);
        assert_eq!(sup.watched_printers(), ids(&["HP1"]));

        registry.subscribe_all(&c1);
        sup.launch(&registry);
        assert_eq!(sup.watched_printers(), ids(&["HP1", "HP2"]));

        sup.teardown();
        join_all(&mut sup);
    }

    #[test]
    fn backend_platform_starts_shared_service_once() {
        let system = FakeSystem::without_notifications(&["HP1"]);
        let backend = Arc::new(FakeBackend::default());
        let (mut sup, _rx) = supervisor(system.clone(), backend.clone(), MonitorConfig::default());
        let registry = SubscriptionRegistry::new();

        assert!(sup.launch(&registry).is_noop());
        assert_eq!(backend.starts(), 0);
        start_backend(&mut sup);
        assert!(sup.launch(&registry).is_noop());
        start_backend(&mut sup);
        assert_eq!(backend.starts(), 1);
        assert!(sup.is_backend_running());
        assert!(sup.watched_printers().is_empty());
        assert_eq!(system.opened(), 0);

        sup.teardown();
        assert_eq!(backend.stops(), 1);
        assert!(!sup.is_backend_running());
    }

    #[test]
    fn only_one_backend_start_is_outstanding() {
        let system = FakeSystem::without_notifications(&["HP1"]);
        let backend = Arc::new(FakeBackend::default());
        let (mut sup, _rx) = supervisor(system, backend.clone(), MonitorConfig::default());
        let registry = SubscriptionRegistry::new();

        sup.launch(&registry);
        let start = sup.take_backend_start().expect("backend start claimed");
        sup.launch(&registry);
        assert!(sup.take_backend_start().is_none());

        let result = start.run();
        sup.finish_backend_start(result);
        assert_eq!(backend.starts(), 1);
        assert!(sup.is_backend_running());

        sup.teardown();
    }

    #[test]
    fn backend_started_after_teardown_is_stopped() {
        let system = FakeSystem::without_notifications(&["HP1"]);
        let backend = Arc::new(FakeBackend::default());
        let (mut sup, _rx) = supervisor(system, backend.clone(), MonitorConfig::default());

        sup.launch(&SubscriptionRegistry::new());
        let start = sup.take_backend_start().expect("backend start claimed");
        sup.teardown();

        let result = start.run();
        sup.finish_backend_start(result);
        assert_eq!(backend.starts(), 1);
        assert_eq!(backend.stops(), 1);
        assert!(!sup.is_backend_running());
    }

    #[test]
    fn backend_start_failure_is_degraded() {
        let system = FakeSystem::without_notifications(&[]);
        let backend = Arc::new(spoolwatch_bridge::stub::StubBackend::default());
        let (sink, _rx) = EventSink::channel(4);
        let mut sup = WatcherSupervisor::new(system, backend, sink, MonitorConfig::default());

        sup.launch(&SubscriptionRegistry::new());
        start_backend(&mut sup);
        let degraded = sup.degraded();
        assert_eq!(degraded.len(), 1);
        assert_eq!(degraded[0].printer, None);

        sup.teardown();
        assert!(sup.degraded().is_empty());
    }
}
