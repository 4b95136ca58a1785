// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic-based dispatch of inbound messages to caller-supplied handlers.
//!
//! The [`SubscriptionRegistry`] maps topic strings to handler closures. It
//! is mutated from application tasks (`subscribe`) while the notification
//! task delivers messages (`dispatch`), so both sides run under short
//! critical sections.
//!
//! Dispatch is serialized per registry instance: a slow handler delays
//! subsequent dispatches but never blocks `subscribe`, because the handler
//! body runs outside the map lock. For the same reason a handler may
//! register further subscriptions on the registry that invoked it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// Handler invoked with the payload of each message on a subscribed topic.
pub type MessageHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Routes inbound messages to handlers by exact topic match.
///
/// Topics are unique keys; subscribing a topic twice replaces the previous
/// handler. Messages for topics with no handler are dropped silently.
#[derive(Default)]
pub struct SubscriptionRegistry {
    /// Topic → handler map, shared between subscribe and dispatch.
    handlers: RwLock<HashMap<String, MessageHandler>>,
    /// Serializes handler invocation without holding the map lock.
    dispatch_lock: Mutex<()>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces the handler for `topic`.
    ///
    /// Callable concurrently with [`dispatch`](Self::dispatch); a dispatch
    /// racing this call observes either the previous handler or the new
    /// one, never a half-registered state.
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F)
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        let topic = topic.into();
        tracing::debug!(topic = %topic, "Registering message handler");
        self.handlers.write().insert(topic, Arc::new(handler));
    }

    /// Removes the handler for `topic`.
    ///
    /// Returns `true` if a handler was registered.
    pub fn unsubscribe(&self, topic: &str) -> bool {
        tracing::debug!(topic = %topic, "Removing message handler");
        self.handlers.write().remove(topic).is_some()
    }

    /// Delivers `payload` to the handler registered for `topic`.
    ///
    /// Returns `true` if a handler was invoked. Unmatched topics are
    /// dropped with no error.
    ///
    /// Dispatches on the same registry are serialized; handlers run on the
    /// notification task and must not perform long blocking work or call
    /// `dispatch` on the registry that invoked them.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> bool {
        let _serialized = self.dispatch_lock.lock();

        // Clone the handler out so the map stays unlocked while it runs.
        let handler = self.handlers.read().get(topic).map(Arc::clone);

        let Some(handler) = handler else {
            tracing::trace!(topic = %topic, "Dropping message with no handler");
            return false;
        };

        tracing::trace!(topic = %topic, len = payload.len(), "Dispatching message");
        handler(payload);
        true
    }

    /// Returns the number of registered topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Returns whether no topics are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &self.len())
            .finish()
    }
}
