// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded channel from producers (watchers, backend, configuration watcher)
// to the router thread.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::time::Duration;

use spoolwatch_bridge::EventPublisher;
use spoolwatch_core::types::StatusEvent;

use crate::watcher::CancelToken;

/// How long a watcher waits on a full channel before trying again.
const FULL_RETRY: Duration = Duration::from_millis(10);

/// Work item for the router thread.
pub(crate) enum Dispatch {
    /// A batch from one producer, routed in order.
    ///
    /// `origin` is the producing watcher's token; batches from a cancelled
    /// watcher are dropped.
    Events {
        events: Vec<StatusEvent>,
        origin: Option<CancelToken>,
    },
    /// The host's printer set changed; re-enumerate and reconcile.
    Relaunch,
    Shutdown,
}

/// Producer side of the router channel.
///
/// Sends wait while the channel is full, so a flooded router slows the
/// producers down instead of dropping events. A watcher's wait ends as soon
/// as its token is cancelled.
#[derive(Clone)]
pub struct EventSink {
    tx: SyncSender<Dispatch>,
}

impl EventSink {
    pub(crate) fn channel(capacity: usize) -> (Self, Receiver<Dispatch>) {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Send a watcher's batch.
    ///
    /// Returns `false` once the router is gone or `origin` is cancelled
    /// while the channel is full.
    pub(crate) fn send_events(&self, events: Vec<StatusEvent>, origin: &CancelToken) -> bool {
        let dispatch = Dispatch::Events {
            events,
            origin: Some(origin.clone()),
        };
        self.send_unless_cancelled(dispatch, origin)
    }

    pub(crate) fn request_relaunch(&self) -> bool {
        self.tx.send(Dispatch::Relaunch).is_ok()
    }

    /// Ask for a relaunch from a task that may be cancelled meanwhile.
    pub(crate) fn request_relaunch_from(&self, origin: &CancelToken) -> bool {
        self.send_unless_cancelled(Dispatch::Relaunch, origin)
    }

    fn send_unless_cancelled(&self, mut dispatch: Dispatch, token: &CancelToken) -> bool {
        loop {
            match self.tx.try_send(dispatch) {
                Ok(()) => return true,
                Err(TrySendError::Disconnected(_)) => return false,
                Err(TrySendError::Full(pending)) => {
                    if token.sleep(FULL_RETRY) {
                        return false;
                    }
                    dispatch = pending;
                }
            }
        }
    }

    pub(crate) fn shutdown(&self) -> bool {
        self.tx.send(Dispatch::Shutdown).is_ok()
    }
}

impl EventPublisher for EventSink {
    fn publish(&self, events: Vec<StatusEvent>) -> bool {
        self.tx
            .send(Dispatch::Events {
                events,
                origin: None,
            })
            .is_ok()
    }
}
