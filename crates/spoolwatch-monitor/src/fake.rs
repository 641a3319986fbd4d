// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scriptable in-memory printer system for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use spoolwatch_bridge::{
    ChangeNotification, EventPublisher, NativeChangeNotification, NativeEnumeration,
    NativeNameResolution, NativeStatusQuery, PrinterSystem, StatusBackend, Wake,
};
use spoolwatch_core::error::{Result, SpoolwatchError};
use spoolwatch_core::types::{JobInfo, PrinterId, PrinterInfo, StatusCode, StatusEvent};

use crate::listener::{ClientConnection, StatusListener};

const POLL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Copy)]
enum FakeWake {
    Changed,
    Failed,
}

#[derive(Default)]
struct HandleState {
    pending: VecDeque<FakeWake>,
    closed: bool,
    waiting: bool,
}

/// One open notification handle.
struct FakeHandle {
    state: Mutex<HandleState>,
    cvar: Condvar,
    closes: Arc<AtomicUsize>,
}

impl FakeHandle {
    fn push(&self, wake: FakeWake) {
        self.state.lock().unwrap().pending.push_back(wake);
        self.cvar.notify_all();
    }

    fn is_waiting(&self) -> bool {
        self.state.lock().unwrap().waiting
    }
}

struct SharedHandle(Arc<FakeHandle>);

impl ChangeNotification for SharedHandle {
    fn wait(&self) -> Result<Wake> {
        let mut state = self.0.state.lock().unwrap();
        loop {
            if state.closed {
                state.waiting = false;
                return Ok(Wake::Closed);
            }
            if let Some(wake) = state.pending.pop_front() {
                state.waiting = false;
                return match wake {
                    FakeWake::Changed => Ok(Wake::Changed),
                    FakeWake::Failed => Err(SpoolwatchError::NativeQuery {
                        printer: "fake".into(),
                        reason: "no change record".into(),
                    }),
                };
            }
            state.waiting = true;
            state = self.0.cvar.wait(state).unwrap();
        }
    }

    fn close(&self) {
        self.0.state.lock().unwrap().closed = true;
        self.0.closes.fetch_add(1, Ordering::SeqCst);
        self.0.cvar.notify_all();
    }
}

#[derive(Default)]
struct GateState {
    entered: bool,
    open: bool,
}

/// Latch that holds a printer's job query until it is opened.
#[derive(Default)]
pub(crate) struct QueryGate {
    state: Mutex<GateState>,
    cvar: Condvar,
}

impl QueryGate {
    fn pass(&self) {
        let mut state = self.state.lock().unwrap();
        state.entered = true;
        self.cvar.notify_all();
        while !state.open {
            state = self.cvar.wait(state).unwrap();
        }
    }

    /// Block until a query is held at the gate.
    pub(crate) fn wait_until_entered(&self) -> bool {
        let state = self.state.lock().unwrap();
        let (state, _) = self
            .cvar
            .wait_timeout_while(state, POLL_TIMEOUT, |s| !s.entered)
            .unwrap();
        state.entered
    }

    pub(crate) fn open(&self) {
        self.state.lock().unwrap().open = true;
        self.cvar.notify_all();
    }
}

#[derive(Default)]
struct FakeState {
    printers: Vec<PrinterInfo>,
    statuses: HashMap<PrinterId, StatusCode>,
    jobs: HashMap<PrinterId, Vec<JobInfo>>,
    failing_queries: HashSet<PrinterId>,
    failing_attach: HashSet<PrinterId>,
    handles: HashMap<PrinterId, Arc<FakeHandle>>,
    config_handle: Option<Arc<FakeHandle>>,
    aliases: HashMap<String, PrinterId>,
    aliases_after_refresh: HashMap<String, PrinterId>,
    gates: HashMap<PrinterId, Arc<QueryGate>>,
}

/// In-memory printer system that counts native handle opens and closes.
pub(crate) struct FakeSystem {
    native: bool,
    state: Mutex<FakeState>,
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
    enumerations: AtomicUsize,
}

impl FakeSystem {
    /// A host with per-printer change notifications.
    pub(crate) fn native(printers: &[&str]) -> Arc<Self> {
        Self::build(true, printers)
    }

    /// A host that relies on the shared status backend.
    pub(crate) fn without_notifications(printers: &[&str]) -> Arc<Self> {
        Self::build(false, printers)
    }

    fn build(native: bool, printers: &[&str]) -> Arc<Self> {
        let system = Self {
            native,
            state: Mutex::new(FakeState::default()),
            opens: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            enumerations: AtomicUsize::new(0),
        };
        for printer in printers {
            system.add_printer(printer);
        }
        Arc::new(system)
    }

    pub(crate) fn add_printer(&self, printer: &str) {
        self.state
            .lock()
            .unwrap()
            .printers
            .push(PrinterInfo::new(printer));
    }

    pub(crate) fn remove_printer(&self, printer: &str) {
        self.state
            .lock()
            .unwrap()
            .printers
            .retain(|p| p.id.as_str() != printer);
    }

    pub(crate) fn set_status(&self, printer: &str, code: u32) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(printer.into(), StatusCode(code));
    }

    pub(crate) fn set_jobs(&self, printer: &str, jobs: &[(u32, u32)]) {
        let jobs = jobs
            .iter()
            .map(|&(job_id, code)| JobInfo {
                job_id,
                status_code: StatusCode(code),
            })
            .collect();
        self.state.lock().unwrap().jobs.insert(printer.into(), jobs);
    }

    pub(crate) fn fail_queries(&self, printer: &str, failing: bool) {
        let mut state = self.state.lock().unwrap();
        if failing {
            state.failing_queries.insert(printer.into());
        } else {
            state.failing_queries.remove(&PrinterId::from(printer));
        }
    }

    pub(crate) fn fail_attach(&self, printer: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_attach
            .insert(printer.into());
    }

    /// Hold every job query for `printer` until the returned gate opens.
    pub(crate) fn hold_jobs(&self, printer: &str) -> Arc<QueryGate> {
        let gate = Arc::new(QueryGate::default());
        self.state
            .lock()
            .unwrap()
            .gates
            .insert(printer.into(), Arc::clone(&gate));
        gate
    }

    /// Map a display name to an id; visible only after the next enumeration.
    pub(crate) fn alias_after_refresh(&self, display_name: &str, printer: &str) {
        self.state
            .lock()
            .unwrap()
            .aliases_after_refresh
            .insert(display_name.into(), printer.into());
    }

    fn handle(&self, printer: &str) -> Arc<FakeHandle> {
        self.state
            .lock()
            .unwrap()
            .handles
            .get(&PrinterId::from(printer))
            .cloned()
            .unwrap_or_else(|| panic!("no notification handle open for {printer}"))
    }

    /// Signal a change on the printer's most recent handle.
    pub(crate) fn fire(&self, printer: &str) {
        self.handle(printer).push(FakeWake::Changed);
    }

    /// Wake the printer's handle without a valid change record.
    pub(crate) fn fire_failure(&self, printer: &str) {
        self.handle(printer).push(FakeWake::Failed);
    }

    /// Close the handle from the native side, as a spooler restart would.
    pub(crate) fn close_externally(&self, printer: &str) {
        SharedHandle(self.handle(printer)).close();
    }

    pub(crate) fn close_configuration_externally(&self) {
        let handle = self
            .state
            .lock()
            .unwrap()
            .config_handle
            .clone()
            .expect("configuration handle open");
        SharedHandle(handle).close();
    }

    pub(crate) fn fire_configuration_change(&self) {
        let handle = self
            .state
            .lock()
            .unwrap()
            .config_handle
            .clone()
            .expect("configuration handle open");
        handle.push(FakeWake::Changed);
    }

    /// Poll until the printer's watcher is blocked in its wait.
    pub(crate) fn wait_until_waiting(&self, printer: &str) -> bool {
        eventually(|| {
            self.state
                .lock()
                .unwrap()
                .handles
                .get(&PrinterId::from(printer))
                .is_some_and(|h| h.is_waiting())
        })
    }

    pub(crate) fn opened(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    fn open_handle(&self) -> Arc<FakeHandle> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Arc::new(FakeHandle {
            state: Mutex::new(HandleState::default()),
            cvar: Condvar::new(),
            closes: Arc::clone(&self.closes),
        })
    }
}

impl PrinterSystem for FakeSystem {
    fn platform_name(&self) -> &str {
        "fake"
    }
}

impl NativeEnumeration for FakeSystem {
    fn enumerate_printers(&self) -> Result<Vec<PrinterInfo>> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let refreshed: Vec<_> = state.aliases_after_refresh.drain().collect();
        state.aliases.extend(refreshed);
        Ok(state.printers.clone())
    }
}

impl NativeChangeNotification for FakeSystem {
    fn supports_change_notification(&self) -> bool {
        self.native
    }

    fn open_change_notification(&self, printer: &PrinterId) -> Result<Box<dyn ChangeNotification>> {
        if self.state.lock().unwrap().failing_attach.contains(printer) {
            return Err(SpoolwatchError::PlatformUnavailable);
        }
        let handle = self.open_handle();
        self.state
            .lock()
            .unwrap()
            .handles
            .insert(printer.clone(), Arc::clone(&handle));
        Ok(Box::new(SharedHandle(handle)))
    }

    fn open_configuration_notification(&self) -> Result<Box<dyn ChangeNotification>> {
        let handle = self.open_handle();
        self.state.lock().unwrap().config_handle = Some(Arc::clone(&handle));
        Ok(Box::new(SharedHandle(handle)))
    }
}

impl NativeStatusQuery for FakeSystem {
    fn query_printer_status(&self, printer: &PrinterId) -> Result<StatusCode> {
        let state = self.state.lock().unwrap();
        if state.failing_queries.contains(printer) {
            return Err(SpoolwatchError::NativeQuery {
                printer: printer.to_string(),
                reason: "status unavailable".into(),
            });
        }
        Ok(state.statuses.get(printer).copied().unwrap_or(StatusCode::OK))
    }

    fn query_jobs(&self, printer: &PrinterId) -> Result<Vec<JobInfo>> {
        let gate = self.state.lock().unwrap().gates.get(printer).cloned();
        if let Some(gate) = gate {
            gate.pass();
        }
        let state = self.state.lock().unwrap();
        if state.failing_queries.contains(printer) {
            return Err(SpoolwatchError::NativeQuery {
                printer: printer.to_string(),
                reason: "job list unavailable".into(),
            });
        }
        Ok(state.jobs.get(printer).cloned().unwrap_or_default())
    }
}

impl NativeNameResolution for FakeSystem {
    fn resolve_printer_name(&self, display_name: &str) -> Option<PrinterId> {
        let state = self.state.lock().unwrap();
        if let Some(id) = state.aliases.get(display_name) {
            return Some(id.clone());
        }
        state
            .printers
            .iter()
            .find(|p| p.id.as_str() == display_name)
            .map(|p| p.id.clone())
    }
}

/// Backend double that records start/stop calls.
#[derive(Default)]
pub(crate) struct FakeBackend {
    running: Mutex<Option<Arc<dyn EventPublisher>>>,
    /// Batches published from inside `start`, before it returns.
    initial: Vec<Vec<StatusEvent>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl FakeBackend {
    pub(crate) fn publishing_on_start(initial: Vec<Vec<StatusEvent>>) -> Self {
        Self {
            initial,
            ..Self::default()
        }
    }

    pub(crate) fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub(crate) fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Publish as the running service would.
    pub(crate) fn emit(&self, events: Vec<StatusEvent>) -> bool {
        let publisher = self.running.lock().unwrap().clone();
        publisher.expect("backend running").publish(events)
    }
}

impl StatusBackend for FakeBackend {
    fn is_running(&self) -> bool {
        self.running.lock().unwrap().is_some()
    }

    fn start(&self, publisher: Arc<dyn EventPublisher>) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        for batch in &self.initial {
            if !publisher.publish(batch.clone()) {
                return Err(SpoolwatchError::MonitorStopped);
            }
        }
        *self.running.lock().unwrap() = Some(publisher);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.running.lock().unwrap() = None;
    }
}

/// Listener that forwards every event into a std channel.
struct Recorder {
    tx: mpsc::Sender<StatusEvent>,
}

impl StatusListener for Recorder {
    fn on_status_event(&self, event: &StatusEvent) {
        let _ = self.tx.send(event.clone());
    }
}

pub(crate) fn recorder() -> (ClientConnection, mpsc::Receiver<StatusEvent>) {
    let (tx, rx) = mpsc::channel();
    (ClientConnection::new(Arc::new(Recorder { tx })), rx)
}

/// Poll `condition` until it holds or the timeout passes.
pub(crate) fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < POLL_TIMEOUT {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
