// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Forwarding of log output to a broker topic.
//!
//! A headless device has no console worth reading; republishing its log
//! lines over the session makes them visible wherever the broker is. The
//! relay has two halves: a `tracing` layer that captures formatted events
//! into a bounded channel, and a drain that publishes them through a ready
//! [`SessionClient`] at at-least-once delivery.
//!
//! The capture side never blocks and never allocates unboundedly: when the
//! channel is full, lines are dropped. Events originating from this crate
//! are not captured, so a failing publish cannot feed its own error back
//! into the relay.
//!
//! # Examples
//!
//! ```no_run
//! use moorlink::log_relay;
//! use tracing_subscriber::prelude::*;
//!
//! # async fn example(session: moorlink::SessionClient<impl moorlink::SessionDriver>) {
//! let (layer, drain) = log_relay("vessel/log", 64);
//! tracing_subscriber::registry().with(layer).init();
//!
//! // After the session is ready:
//! tokio::spawn(async move { drain.forward(&session).await });
//! # }
//! ```

use std::fmt::Write;

use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::session::{DeliveryGuarantee, SessionClient, SessionDriver};

/// Creates a connected capture layer and drain.
///
/// `capacity` bounds the number of lines buffered between capture and
/// publish; a line arriving at a full buffer is dropped.
#[must_use]
pub fn log_relay(topic: impl Into<String>, capacity: usize) -> (LogRelayLayer, LogRelayDrain) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        LogRelayLayer { tx },
        LogRelayDrain {
            rx,
            topic: topic.into(),
        },
    )
}

/// `tracing` layer that captures formatted events for the relay.
#[derive(Debug)]
pub struct LogRelayLayer {
    tx: mpsc::Sender<String>,
}

impl<S: Subscriber> Layer<S> for LogRelayLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // Capturing this crate's own diagnostics would let a failing
        // publish generate the next line to publish.
        if metadata.target().starts_with(env!("CARGO_CRATE_NAME")) {
            return;
        }

        let mut line = format!("{} {}: ", metadata.level(), metadata.target());
        event.record(&mut LineVisitor(&mut line));

        // Full or closed channel: drop the line, never block logging.
        let _ = self.tx.try_send(line);
    }
}

/// Visitor rendering an event's fields onto one line.
struct LineVisitor<'a>(&'a mut String);

impl Visit for LineVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.0.push_str(value);
        } else {
            let _ = write!(self.0, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.0, "{value:?}");
        } else {
            let _ = write!(self.0, " {}={value:?}", field.name());
        }
    }
}

/// Receiving half of the relay; publishes captured lines.
#[derive(Debug)]
pub struct LogRelayDrain {
    rx: mpsc::Receiver<String>,
    topic: String,
}

impl LogRelayDrain {
    /// Publishes captured lines through `session` until every capture
    /// layer has been dropped.
    ///
    /// Lines the session rejects are lost; the relay does not retry.
    pub async fn forward<D: SessionDriver>(mut self, session: &SessionClient<D>) {
        while let Some(line) = self.rx.recv().await {
            session
                .publish(
                    &self.topic,
                    line.as_bytes(),
                    DeliveryGuarantee::AtLeastOnce,
                    false,
                )
                .await;
        }
    }

    /// Returns the topic lines are published to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tracing_subscriber::prelude::*;

    use super::*;
    use crate::error::SessionError;
    use crate::session::SessionEvent;

    /// Session driver that records published payloads.
    #[derive(Clone, Default)]
    struct CapturingDriver {
        publishes: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl SessionDriver for CapturingDriver {
        async fn open(&self) -> Result<(), SessionError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), SessionError> {
            Ok(())
        }

        async fn publish(
            &self,
            topic: &str,
            payload: &[u8],
            _qos: DeliveryGuarantee,
            _retain: bool,
        ) -> bool {
            self.publishes
                .lock()
                .push((topic.to_string(), String::from_utf8_lossy(payload).into_owned()));
            true
        }

        async fn subscribe(&self, _topic: &str, _qos: DeliveryGuarantee) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn captured_lines_are_published_to_topic() {
        let (layer, drain) = log_relay("vessel/log", 64);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "app", "sensor window complete");
        });
        // Subscriber dropped: the capture side is closed.

        let driver = CapturingDriver::default();
        let handle = driver.clone();
        let (_tx, rx) = mpsc::channel::<SessionEvent>(8);
        let session = SessionClient::new(driver, rx);

        drain.forward(&session).await;

        let publishes = handle.publishes.lock();
        assert_eq!(publishes.len(), 1);
        assert_eq!(publishes[0].0, "vessel/log");
        assert!(publishes[0].1.contains("sensor window complete"));
        assert!(publishes[0].1.contains("INFO"));

        session.stop().await;
    }

    #[tokio::test]
    async fn own_crate_events_are_not_captured() {
        let (layer, drain) = log_relay("vessel/log", 64);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(target: "moorlink::session", "Failed to publish");
            tracing::info!(target: "app", "kept");
        });

        let driver = CapturingDriver::default();
        let handle = driver.clone();
        let (_tx, rx) = mpsc::channel::<SessionEvent>(8);
        let session = SessionClient::new(driver, rx);

        drain.forward(&session).await;

        let publishes = handle.publishes.lock();
        assert_eq!(publishes.len(), 1);
        assert!(publishes[0].1.contains("kept"));

        session.stop().await;
    }

    #[tokio::test]
    async fn full_channel_drops_lines_without_blocking() {
        let (layer, drain) = log_relay("vessel/log", 1);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            for i in 0..10 {
                tracing::info!(target: "app", line = i, "burst");
            }
        });

        let driver = CapturingDriver::default();
        let handle = driver.clone();
        let (_tx, rx) = mpsc::channel::<SessionEvent>(8);
        let session = SessionClient::new(driver, rx);

        drain.forward(&session).await;

        // Only what fit in the channel survives.
        assert_eq!(handle.publishes.lock().len(), 1);

        session.stop().await;
    }

    #[tokio::test]
    async fn fields_are_rendered_on_the_line() {
        let (layer, drain) = log_relay("vessel/log", 8);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "app", voltage = 11.8, "battery low");
        });

        let driver = CapturingDriver::default();
        let handle = driver.clone();
        let (_tx, rx) = mpsc::channel::<SessionEvent>(8);
        let session = SessionClient::new(driver, rx);

        drain.forward(&session).await;

        let publishes = handle.publishes.lock();
        assert!(publishes[0].1.contains("battery low"));
        assert!(publishes[0].1.contains("voltage=11.8"));

        session.stop().await;
    }
}
