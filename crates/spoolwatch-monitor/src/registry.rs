// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Subscription registry: which connections want events for which printers.
//
// Keys with no connections are removed eagerly, so "does anyone still care"
// is a plain emptiness check over the whole map.

use std::collections::HashMap;

use spoolwatch_core::types::{ConnectionId, PrinterId, SubscriptionKey};

use crate::listener::ClientConnection;

/// Mapping of subscription key to the set of interested connections.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<SubscriptionKey, HashMap<ConnectionId, ClientConnection>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `connection` under `key`. Subscribing twice is a no-op.
    pub fn subscribe(&mut self, connection: &ClientConnection, key: SubscriptionKey) {
        self.entries
            .entry(key)
            .or_default()
            .entry(connection.id())
            .or_insert_with(|| connection.clone());
    }

    /// Add `connection` under the wildcard key.
    pub fn subscribe_all(&mut self, connection: &ClientConnection) {
        self.subscribe(connection, SubscriptionKey::All);
    }

    /// Remove `connection` from every key.
    ///
    /// Returns whether the registry is now empty.
    pub fn unsubscribe_all(&mut self, connection: ConnectionId) -> bool {
        self.entries.retain(|_, members| {
            members.remove(&connection);
            !members.is_empty()
        });
        self.entries.is_empty()
    }

    /// Connections subscribed to `printer` or to the wildcard, each once.
    pub fn listeners(&self, printer: &PrinterId) -> Vec<ClientConnection> {
        let specific = self
            .entries
            .get(&SubscriptionKey::Printer(printer.clone()))
            .into_iter()
            .flat_map(|members| members.values());
        let wildcard = self
            .entries
            .get(&SubscriptionKey::All)
            .into_iter()
            .flat_map(|members| members.values());

        let mut resolved: HashMap<ConnectionId, ClientConnection> = HashMap::new();
        for conn in specific.chain(wildcard) {
            resolved.entry(conn.id()).or_insert_with(|| conn.clone());
        }
        resolved.into_values().collect()
    }

    /// Whether anyone listens to `printer`, directly or through the wildcard.
    pub fn has_any_interest(&self, printer: &PrinterId) -> bool {
        self.entries.contains_key(&SubscriptionKey::All)
            || self
                .entries
                .contains_key(&SubscriptionKey::Printer(printer.clone()))
    }

    /// Whether `connection` should see events for `printer`.
    pub fn accepts(&self, connection: ConnectionId, printer: &PrinterId) -> bool {
        let holds = |key: &SubscriptionKey| {
            self.entries
                .get(key)
                .is_some_and(|members| members.contains_key(&connection))
        };
        holds(&SubscriptionKey::All) || holds(&SubscriptionKey::Printer(printer.clone()))
    }

    /// Whether `connection` holds any subscription at all.
    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.entries
            .values()
            .any(|members| members.contains_key(&connection))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct keys with at least one connection.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }
}
