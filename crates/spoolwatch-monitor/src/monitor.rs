// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The status monitor service.
//
// One lock guards the subscription registry and the watcher map together, so
// an add-then-launch can never interleave with a remove-then-teardown.
// Watchers and the shared backend feed a bounded channel drained by a single
// router thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, info, instrument, warn};

use spoolwatch_bridge::{PrinterSystem, StatusBackend};
use spoolwatch_core::config::MonitorConfig;
use spoolwatch_core::error::{Result, SpoolwatchError};
use spoolwatch_core::types::{ConnectionId, PrinterId, SubscriptionKey, SubscriptionTarget};

use crate::listener::ClientConnection;
use crate::registry::SubscriptionRegistry;
use crate::router::DispatchRouter;
use crate::sink::EventSink;
use crate::snapshot::SnapshotProvider;
use crate::supervisor::{BackendStart, DegradedMonitoring, WatcherSupervisor};

/// Everything behind the monitor lock.
#[derive(Debug)]
pub(crate) struct MonitorState {
    pub(crate) registry: SubscriptionRegistry,
    pub(crate) supervisor: WatcherSupervisor,
}

impl MonitorState {
    pub(crate) fn new(supervisor: WatcherSupervisor) -> Self {
        Self {
            registry: SubscriptionRegistry::new(),
            supervisor,
        }
    }
}

/// Printer status notification hub.
///
/// Clients subscribe a [`ClientConnection`] to specific printers or to all
/// of them; the monitor keeps watchers running while anyone is subscribed
/// and delivers each status change to every interested connection once.
pub struct StatusMonitor {
    state: Arc<Mutex<MonitorState>>,
    system: Arc<dyn PrinterSystem>,
    router: DispatchRouter,
    snapshots: SnapshotProvider,
    sink: EventSink,
    router_thread: Mutex<Option<JoinHandle<()>>>,
    stopped: Arc<AtomicBool>,
}

impl StatusMonitor {
    /// Build the monitor and start its router thread.
    ///
    /// No watcher runs until the first subscription.
    pub fn new(
        system: Arc<dyn PrinterSystem>,
        backend: Arc<dyn StatusBackend>,
        config: MonitorConfig,
    ) -> Result<Self> {
        let (sink, rx) = EventSink::channel(config.event_channel_capacity);
        let supervisor =
            WatcherSupervisor::new(Arc::clone(&system), backend, sink.clone(), config);
        let state = Arc::new(Mutex::new(MonitorState::new(supervisor)));
        let router = DispatchRouter::new(Arc::clone(&state));

        let stopped = Arc::new(AtomicBool::new(false));

        let thread_router = router.clone();
        let thread_stopped = Arc::clone(&stopped);
        let router_thread = std::thread::Builder::new()
            .name("spoolwatch-router".into())
            .spawn(move || thread_router.run(rx, &thread_stopped))?;

        info!(platform = system.platform_name(), "status monitor started");
        Ok(Self {
            state,
            snapshots: SnapshotProvider::new(Arc::clone(&system)),
            system,
            router,
            sink,
            router_thread: Mutex::new(Some(router_thread)),
            stopped,
        })
    }

    /// Subscribe `connection` and make sure the needed watchers are running.
    ///
    /// Every printer name is resolved before the registry changes, so an
    /// unknown name leaves the monitor exactly as it was.
    #[instrument(skip(self, connection), fields(connection = %connection.id()))]
    pub fn subscribe(&self, connection: &ClientConnection, target: SubscriptionTarget) -> Result<()> {
        self.ensure_running()?;
        let keys = self.resolve_target(target)?;

        let backend_start = {
            let mut state = self.lock_state();
            let MonitorState {
                registry,
                supervisor,
            } = &mut *state;
            for key in keys {
                registry.subscribe(connection, key);
            }
            supervisor.launch(registry);
            debug!(keys = registry.key_count(), "connection subscribed");
            supervisor.take_backend_start()
        };
        self.start_backend(backend_start);
        Ok(())
    }

    /// Remove `connection` from every subscription.
    ///
    /// Tears everything down when it was the last subscriber and returns
    /// whether that happened.
    #[instrument(skip(self))]
    pub fn unsubscribe(&self, connection: ConnectionId) -> bool {
        let mut state = self.lock_state();
        let MonitorState {
            registry,
            supervisor,
        } = &mut *state;

        let now_empty = registry.unsubscribe_all(connection);
        if now_empty {
            supervisor.teardown();
        } else if supervisor.interested_only() {
            supervisor.launch(registry);
        }
        now_empty
    }

    /// Whether any connection listens to `printer`, directly or through ALL.
    pub fn is_listening_to(&self, printer: &PrinterId) -> bool {
        self.lock_state().registry.has_any_interest(printer)
    }

    /// Send `connection` the current status of everything it subscribes to.
    ///
    /// Native queries run without the monitor lock held. Returns the number
    /// of events delivered.
    #[instrument(skip(self, connection), fields(connection = %connection.id()))]
    pub fn deliver_snapshot(&self, connection: &ClientConnection) -> Result<usize> {
        self.ensure_running()?;
        let events = self.snapshots.capture()?;
        Ok(self.router.deliver_snapshot(connection, &events))
    }

    /// Router for events produced outside the watchers.
    pub fn router(&self) -> &DispatchRouter {
        &self.router
    }

    /// Printers (and the shared backend) that are not being monitored.
    pub fn degraded_printers(&self) -> Vec<DegradedMonitoring> {
        self.lock_state().supervisor.degraded()
    }

    /// Printers with a live watcher.
    pub fn watched_printers(&self) -> Vec<PrinterId> {
        self.lock_state().supervisor.watched_printers()
    }

    pub fn is_backend_running(&self) -> bool {
        self.lock_state().supervisor.is_backend_running()
    }

    /// Re-enumerate and reconcile, as after a host configuration change.
    pub fn relaunch(&self) -> Result<()> {
        self.ensure_running()?;
        if !self.sink.request_relaunch() {
            return Err(SpoolwatchError::MonitorStopped);
        }
        // Retries a shared backend that failed to start.
        let backend_start = self.lock_state().supervisor.take_backend_start();
        self.start_backend(backend_start);
        Ok(())
    }

    /// Tear down every watcher, stop the router, and wait for them to exit.
    ///
    /// Idempotent. When called from inside a listener callback the threads
    /// are cancelled but not joined.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        let retired = {
            let mut state = self.lock_state();
            state.registry = SubscriptionRegistry::new();
            state.supervisor.teardown();
            state.supervisor.take_retired()
        };

        let router_thread = self
            .router_thread
            .lock()
            .expect("router thread lock poisoned")
            .take();
        let Some(router_thread) = router_thread else {
            return;
        };
        if router_thread.thread().id() == std::thread::current().id() {
            // The router sees the stop flag once this callback returns.
            debug!("shutdown requested from the router thread; not joining");
            return;
        }
        self.sink.shutdown();
        if router_thread.join().is_err() {
            warn!("router thread panicked");
        }
        for task in retired {
            task.join();
        }
        info!("status monitor stopped");
    }

    /// Run a claimed backend start with the monitor lock released.
    fn start_backend(&self, start: Option<BackendStart>) {
        let Some(start) = start else {
            return;
        };
        let result = start.run();
        self.lock_state().supervisor.finish_backend_start(result);
    }

    fn ensure_running(&self) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(SpoolwatchError::MonitorStopped);
        }
        Ok(())
    }

    fn resolve_target(&self, target: SubscriptionTarget) -> Result<Vec<SubscriptionKey>> {
        match target {
            SubscriptionTarget::All => Ok(vec![SubscriptionKey::All]),
            SubscriptionTarget::Printers(names) => names
                .iter()
                .map(|name| self.resolve_name(name).map(SubscriptionKey::Printer))
                .collect(),
        }
    }

    /// Map a client-facing name to a printer id, refreshing the platform's
    /// printer list once on a miss.
    fn resolve_name(&self, name: &str) -> Result<PrinterId> {
        if name.trim().is_empty() {
            return Err(SpoolwatchError::InvalidTarget(name.to_owned()));
        }
        if let Some(id) = self.system.resolve_printer_name(name) {
            return Ok(id);
        }

        debug!(name, "printer name not found; refreshing printer list");
        if let Err(e) = self.system.enumerate_printers() {
            warn!(error = %e, "printer enumeration failed during name lookup");
        }
        self.system
            .resolve_printer_name(name)
            .ok_or_else(|| SpoolwatchError::InvalidTarget(name.to_owned()))
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        self.state.lock().expect("monitor state lock poisoned")
    }
}

impl Drop for StatusMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for StatusMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusMonitor")
            .field("platform", &self.system.platform_name())
            .field("stopped", &self.stopped.load(Ordering::Acquire))
            .finish()
    }
}
