// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Event routing.
//
// Listener resolution happens under the monitor lock; delivery happens after
// it is released, so a slow listener never holds up subscription changes or
// reconciliation. A listener that panics loses that event; the router
// thread and every other connection carry on.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, trace};

use spoolwatch_core::types::StatusEvent;

use crate::listener::ClientConnection;
use crate::monitor::MonitorState;
use crate::sink::Dispatch;
use crate::watcher::CancelToken;

/// Resolves each event's listeners and delivers it to each of them once.
#[derive(Clone)]
pub struct DispatchRouter {
    state: Arc<Mutex<MonitorState>>,
}

impl DispatchRouter {
    pub(crate) fn new(state: Arc<Mutex<MonitorState>>) -> Self {
        Self { state }
    }

    /// Deliver `events` in order to every interested connection.
    ///
    /// Returns the number of deliveries that completed.
    pub fn route(&self, events: Vec<StatusEvent>) -> usize {
        self.route_from(events, None)
    }

    fn route_from(&self, events: Vec<StatusEvent>, origin: Option<&CancelToken>) -> usize {
        let resolved: Vec<(StatusEvent, Vec<ClientConnection>)> = {
            let state = self.state.lock().expect("monitor state lock poisoned");
            // Checked under the lock: once a watcher's cancellation has been
            // made under this lock, none of its queued batches resolve.
            if origin.is_some_and(CancelToken::is_cancelled) {
                trace!(events = events.len(), "dropping batch from cancelled watcher");
                return 0;
            }
            events
                .into_iter()
                .filter_map(|event| {
                    let listeners = state.registry.listeners(&event.printer);
                    (!listeners.is_empty()).then_some((event, listeners))
                })
                .collect()
        };

        let mut delivered = 0;
        for (event, listeners) in &resolved {
            for connection in listeners {
                if deliver_guarded(connection, event) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Deliver the part of a snapshot that `connection` is subscribed to.
    ///
    /// Returns the number of events delivered.
    pub fn deliver_snapshot(&self, connection: &ClientConnection, events: &[StatusEvent]) -> usize {
        let accepted: Vec<&StatusEvent> = {
            let state = self.state.lock().expect("monitor state lock poisoned");
            events
                .iter()
                .filter(|event| state.registry.accepts(connection.id(), &event.printer))
                .collect()
        };
        let delivered = accepted
            .iter()
            .filter(|event| deliver_guarded(connection, event))
            .count();
        debug!(connection = %connection.id(), events = delivered, "snapshot delivered");
        delivered
    }

    /// Process one item from the producer channel.
    ///
    /// Returns `false` when the router should stop.
    pub(crate) fn handle(&self, dispatch: Dispatch) -> bool {
        match dispatch {
            Dispatch::Events { events, origin } => {
                self.route_from(events, origin.as_ref());
                true
            }
            Dispatch::Relaunch => {
                let mut state = self.state.lock().expect("monitor state lock poisoned");
                let MonitorState {
                    registry,
                    supervisor,
                } = &mut *state;
                if registry.is_empty() {
                    debug!("relaunch requested with no subscribers; ignoring");
                } else {
                    supervisor.launch(registry);
                }
                true
            }
            Dispatch::Shutdown => false,
        }
    }

    /// Drain the producer channel until shutdown, until `stopped` is set, or
    /// until every sender is gone.
    pub(crate) fn run(self, rx: Receiver<Dispatch>, stopped: &AtomicBool) {
        debug!("router started");
        while let Ok(dispatch) = rx.recv() {
            if !self.handle(dispatch) || stopped.load(Ordering::Acquire) {
                break;
            }
        }
        debug!("router stopped");
    }
}

/// Deliver one event, containing a panic raised by the listener.
fn deliver_guarded(connection: &ClientConnection, event: &StatusEvent) -> bool {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| connection.deliver(event)));
    if outcome.is_err() {
        error!(
            connection = %connection.id(),
            printer = %event.printer,
            "listener panicked; event dropped"
        );
    }
    outcome.is_ok()
}

impl std::fmt::Debug for DispatchRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchRouter").finish_non_exhaustive()
    }
}
