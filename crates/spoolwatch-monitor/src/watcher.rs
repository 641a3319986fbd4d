// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-printer watcher tasks.
//
// Each watcher owns one native change-notification handle and runs on its
// own OS thread, because the only suspension point is a blocking native
// wait:
//
//   Attaching -> Waiting -> Ingesting -> Waiting -> ... -> Closed
//                Waiting -> ErrorBackoff -> Waiting
//
// Cancellation sets the task's token and closes the native handle, which
// releases the blocked wait. The handle is released exactly once no matter
// whether the canceller or the exiting thread gets there first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, trace, warn};

use spoolwatch_bridge::{ChangeNotification, PrinterSystem, Wake};
use spoolwatch_core::error::{Result, SpoolwatchError};
use spoolwatch_core::types::{PrinterId, StatusCode, StatusEvent};

use crate::sink::EventSink;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag shared between a task and its handle.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().expect("cancel flag lock poisoned") = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().expect("cancel flag lock poisoned")
    }

    /// Sleep for `delay`, waking early on cancellation.
    ///
    /// Returns `true` if the token was cancelled.
    pub fn sleep(&self, delay: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = flag.lock().expect("cancel flag lock poisoned");
        let (guard, _) = cvar
            .wait_timeout_while(guard, delay, |cancelled| !*cancelled)
            .expect("cancel flag lock poisoned");
        *guard
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Native handle ownership
// ---------------------------------------------------------------------------

/// A change-notification handle that is closed at most once.
struct NotificationGuard {
    handle: Box<dyn ChangeNotification>,
    released: AtomicBool,
}

impl NotificationGuard {
    fn new(handle: Box<dyn ChangeNotification>) -> Self {
        Self {
            handle,
            released: AtomicBool::new(false),
        }
    }

    fn wait(&self) -> Result<Wake> {
        if self.is_released() {
            return Ok(Wake::Closed);
        }
        self.handle.wait()
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Close the native handle. Returns `true` for the call that closed it.
    fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.handle.close();
        true
    }
}

/// Owner's side of a running watcher thread.
///
/// Dropping the handle cancels the task without waiting for it.
pub struct TaskHandle {
    name: String,
    token: CancelToken,
    notification: Arc<NotificationGuard>,
    thread: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal the task to stop and release its native handle.
    ///
    /// Safe to call in any state and any number of times.
    pub fn cancel(&self) {
        self.token.cancel();
        if self.notification.release() {
            debug!(task = %self.name, "change notification released by cancel");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Whether the task still holds its native handle.
    ///
    /// A task that lost its handle is on its way out even if the thread
    /// has not returned yet.
    pub fn is_alive(&self) -> bool {
        !self.notification.is_released() && !self.is_finished()
    }

    /// Cancel and wait for the thread to exit.
    pub fn join(mut self) {
        self.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(task = %self.name, "watcher thread panicked");
            }
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Spawn `body` on a named thread that owns `notification`.
///
/// The handle is released when the body returns, and also if the thread
/// cannot be spawned at all.
fn spawn_task<F>(name: String, handle: Box<dyn ChangeNotification>, body: F) -> Result<TaskHandle>
where
    F: FnOnce(&NotificationGuard, &CancelToken) + Send + 'static,
{
    let token = CancelToken::new();
    let notification = Arc::new(NotificationGuard::new(handle));

    let thread_token = token.clone();
    let thread_notification = Arc::clone(&notification);
    let spawned = std::thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            body(&thread_notification, &thread_token);
            thread_notification.release();
        });

    match spawned {
        Ok(thread) => Ok(TaskHandle {
            name,
            token,
            notification,
            thread: Some(thread),
        }),
        Err(e) => {
            notification.release();
            Err(SpoolwatchError::Io(e))
        }
    }
}

/// Hand a task whose handle the host closed back to the supervisor.
///
/// The handle is released first so the supervisor sees the task as exited
/// when it handles the relaunch.
fn request_relaunch(
    notification: &NotificationGuard,
    token: &CancelToken,
    sink: &EventSink,
    backoff: Duration,
) {
    notification.release();
    if token.sleep(backoff) {
        return;
    }
    if !sink.request_relaunch_from(token) {
        debug!("router gone; relaunch not requested");
    }
}

// ---------------------------------------------------------------------------
// PrinterWatcher
// ---------------------------------------------------------------------------

/// Lifecycle phase of a [`PrinterWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherPhase {
    Attaching,
    Waiting,
    Ingesting,
    ErrorBackoff,
    Closed,
}

/// Watches one printer and emits its status and job events.
pub struct PrinterWatcher {
    printer: PrinterId,
    system: Arc<dyn PrinterSystem>,
    sink: EventSink,
    backoff: Duration,
    last_observed: Option<StatusCode>,
    phase: WatcherPhase,
}

impl PrinterWatcher {
    pub(crate) fn new(
        printer: PrinterId,
        system: Arc<dyn PrinterSystem>,
        sink: EventSink,
        backoff: Duration,
    ) -> Self {
        Self {
            printer,
            system,
            sink,
            backoff,
            last_observed: None,
            phase: WatcherPhase::Attaching,
        }
    }

    pub fn phase(&self) -> WatcherPhase {
        self.phase
    }

    /// Attach to the printer and start the watch loop on its own thread.
    ///
    /// Fails with `NativeAttach` if no change-notification handle can be
    /// opened; the watcher then never runs.
    pub(crate) fn spawn(self) -> Result<TaskHandle> {
        let handle = self
            .system
            .open_change_notification(&self.printer)
            .map_err(|e| SpoolwatchError::NativeAttach {
                printer: self.printer.to_string(),
                reason: e.to_string(),
            })?;

        let name = format!("spoolwatch-printer-{}", self.printer);
        let mut watcher = self;
        spawn_task(name, handle, move |notification, token| {
            watcher.run(notification, token);
        })
    }

    fn run(&mut self, notification: &NotificationGuard, token: &CancelToken) {
        debug!(printer = %self.printer, "printer watcher attached");

        while !token.is_cancelled() {
            self.transition(WatcherPhase::Waiting);
            let wake = notification.wait();
            if token.is_cancelled() {
                break;
            }

            let keep_running = match wake {
                Ok(Wake::Closed) => {
                    warn!(printer = %self.printer, "change notification closed by the host; requesting relaunch");
                    request_relaunch(notification, token, &self.sink, self.backoff);
                    false
                }
                Ok(Wake::Changed) => {
                    self.transition(WatcherPhase::Ingesting);
                    let ingested = self.ingest();
                    if token.is_cancelled() {
                        trace!(printer = %self.printer, "cancelled while ingesting; discarding batch");
                        break;
                    }
                    match ingested {
                        Ok(events) if events.is_empty() => true,
                        Ok(events) => self.sink.send_events(events, token),
                        Err(e) => self.back_off(&e, token),
                    }
                }
                Err(e) => self.back_off(&e, token),
            };

            if !keep_running {
                break;
            }
        }

        self.transition(WatcherPhase::Closed);
        debug!(printer = %self.printer, "printer watcher closed");
    }

    /// Re-read the printer and its queue after a wake.
    ///
    /// A printer event is produced only when the status code differs from
    /// the last one observed. Every queued job is reported on every wake.
    pub(crate) fn ingest(&mut self) -> Result<Vec<StatusEvent>> {
        let code = self.system.query_printer_status(&self.printer)?;
        let jobs = self.system.query_jobs(&self.printer)?;

        let mut events = Vec::with_capacity(jobs.len() + 1);
        if self.last_observed != Some(code) {
            trace!(printer = %self.printer, %code, "printer status changed");
            self.last_observed = Some(code);
            let severity = self.system.classify_status(code);
            events.push(StatusEvent::printer_status(
                self.printer.clone(),
                code,
                severity,
            ));
        }
        events.extend(
            jobs.into_iter()
                .map(|job| StatusEvent::job_status(self.printer.clone(), job)),
        );
        Ok(events)
    }

    /// Report UNKNOWN and pause before the next wait.
    ///
    /// Returns `false` if the watcher should stop.
    fn back_off(&mut self, err: &SpoolwatchError, token: &CancelToken) -> bool {
        self.transition(WatcherPhase::ErrorBackoff);
        error!(printer = %self.printer, error = %err, "native status query failed");

        self.last_observed = Some(StatusCode::UNKNOWN);
        if !self
            .sink
            .send_events(vec![StatusEvent::unknown(self.printer.clone())], token)
        {
            return false;
        }
        !token.sleep(self.backoff)
    }

    fn transition(&mut self, next: WatcherPhase) {
        if self.phase != next {
            trace!(printer = %self.printer, from = ?self.phase, to = ?next, "watcher transition");
            self.phase = next;
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration watcher
// ---------------------------------------------------------------------------

/// Start the task that watches for printers being added or removed.
///
/// Every wake asks the router to re-enumerate and reconcile.
pub(crate) fn spawn_configuration_watcher(
    system: &dyn PrinterSystem,
    sink: EventSink,
    backoff: Duration,
) -> Result<TaskHandle> {
    let handle = system
        .open_configuration_notification()
        .map_err(|e| SpoolwatchError::NativeAttach {
            printer: "<configuration>".into(),
            reason: e.to_string(),
        })?;

    spawn_task(
        "spoolwatch-configuration".into(),
        handle,
        move |notification, token| {
            while !token.is_cancelled() {
                let wake = notification.wait();
                if token.is_cancelled() {
                    break;
                }
                match wake {
                    Ok(Wake::Changed) => {
                        debug!("printer configuration changed; requesting relaunch");
                        if !sink.request_relaunch() {
                            break;
                        }
                    }
                    Ok(Wake::Closed) => {
                        warn!("configuration notification closed by the host; requesting relaunch");
                        request_relaunch(notification, token, &sink, backoff);
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "configuration notification failed");
                        if token.sleep(backoff) {
                            break;
                        }
                    }
                }
            }
            debug!("configuration watcher closed");
        },
    )
}
