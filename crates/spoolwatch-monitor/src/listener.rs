// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client connection contract.
//
// The transport owns the actual channel to the client. The monitor only holds
// a `ClientConnection`: an identity plus a callback it invokes once per
// event the client is interested in.

use std::sync::Arc;

use tokio::sync::mpsc;

use spoolwatch_core::types::{ConnectionId, StatusEvent};

/// Callback a transport implements to receive events.
///
/// Called from the router thread. Implementations must not block: queue the
/// event and return.
pub trait StatusListener: Send + Sync {
    fn on_status_event(&self, event: &StatusEvent);
}

/// Non-owning handle to a client channel, compared by identity.
#[derive(Clone)]
pub struct ClientConnection {
    id: ConnectionId,
    listener: Arc<dyn StatusListener>,
}

impl ClientConnection {
    pub fn new(listener: Arc<dyn StatusListener>) -> Self {
        Self {
            id: ConnectionId::new(),
            listener,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn deliver(&self, event: &StatusEvent) {
        self.listener.on_status_event(event);
    }
}

impl PartialEq for ClientConnection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClientConnection {}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection").field("id", &self.id).finish()
    }
}

/// Listener that forwards into a tokio channel.
///
/// The unbounded sender never blocks, so a slow consumer on the receiving
/// side cannot stall the router.
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelListener {
    /// Create a listener and the receiver its events arrive on.
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl StatusListener for ChannelListener {
    fn on_status_event(&self, event: &StatusEvent) {
        if self.tx.send(event.clone()).is_err() {
            tracing::debug!(printer = %event.printer, "listener receiver dropped; event discarded");
        }
    }
}
