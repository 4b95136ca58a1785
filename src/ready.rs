// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One-shot, multi-waiter completion signal.
//!
//! A [`ReadySignal`] turns a "became ready" notification into something a
//! caller can await exactly once. The signaling side may fire any number of
//! times (connection events tend to repeat); only the first firing has
//! effect. Any number of waiters unblock on that first firing, and every
//! later `wait()` returns immediately.
//!
//! Handles are cheap clones over shared state, so a notification in flight
//! can never observe a freed signal; the notification source simply holds
//! its own clone.
//!
//! # Examples
//!
//! ```
//! use moorlink::ReadySignal;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let ready = ReadySignal::new();
//!
//! let waiter = ready.clone();
//! let task = tokio::spawn(async move { waiter.wait().await });
//!
//! ready.signal();
//! task.await.unwrap();
//! assert!(ready.is_signaled());
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A single-fire rendezvous between one notification source and any number
/// of waiters.
///
/// There is no timeout variant; callers needing a bounded wait wrap
/// [`wait`](Self::wait) in `tokio::time::timeout`.
#[derive(Clone, Debug, Default)]
pub struct ReadySignal {
    inner: Arc<ReadyInner>,
}

#[derive(Debug, Default)]
struct ReadyInner {
    signaled: AtomicBool,
    notify: Notify,
}

impl ReadySignal {
    /// Creates a signal in the pending state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the signal as ready, waking all current waiters.
    ///
    /// Idempotent: every invocation after the first is a no-op.
    pub fn signal(&self) {
        if !self.inner.signaled.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns whether [`signal`](Self::signal) has been invoked.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.inner.signaled.load(Ordering::Acquire)
    }

    /// Waits until the signal has fired at least once.
    ///
    /// Returns immediately if it already has.
    pub async fn wait(&self) {
        if self.is_signaled() {
            return;
        }

        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register with the notifier before re-checking the flag, so a
        // signal landing between the check and the await still wakes us.
        notified.as_mut().enable();
        if self.is_signaled() {
            return;
        }
        notified.await;
    }
}
