// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broker-session lifecycle management.
//!
//! The [`SessionClient`] wraps a [`SessionDriver`], the underlying
//! publish/subscribe broker client, and exposes the narrow surface the
//! application needs: publish with a selectable delivery guarantee,
//! subscribe with a message handler, and a ready signal for the first
//! "connected" notification.
//!
//! The session stack is assumed to reconnect on its own; this layer only
//! observes connectivity changes. Transport failures and refused
//! connections are logged distinctly but treated identically: as transient.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::SessionError;
use crate::ready::ReadySignal;
use crate::routing::SubscriptionRegistry;

/// Delivery guarantee for published and subscribed messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryGuarantee {
    /// Fire and forget; resolves on local hand-off.
    AtMostOnce,
    /// Redelivered until acknowledged; may arrive more than once.
    AtLeastOnce,
    /// Delivered exactly once.
    ExactlyOnce,
}

/// Coarse classification of a session error notification.
///
/// Used for logging only; neither kind changes recovery behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    /// The transport under the session failed.
    Transport,
    /// The broker refused the connection.
    ConnectionRefused,
}

/// Notification delivered by a session driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session reached the broker.
    Connected,
    /// The session lost the broker; the driver keeps reconnecting.
    Disconnected,
    /// The session reported an error, classified coarsely.
    Error(SessionErrorKind),
    /// An inbound message on a subscribed topic.
    Message {
        /// Topic the message arrived on.
        topic: String,
        /// Opaque payload bytes.
        payload: Vec<u8>,
    },
}

/// Lifecycle state of a [`SessionClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not started yet.
    Idle,
    /// The session is connected to the broker.
    Connected,
    /// The session lost the broker.
    Disconnected,
    /// The last notification was an error.
    Error(SessionErrorKind),
}

/// Capability the underlying broker client exposes to the session client.
///
/// `publish` and `subscribe` report acceptance as a boolean: `false` means
/// the request never left the device. With
/// [`DeliveryGuarantee::AtLeastOnce`] or stronger, `publish` resolves once
/// the driver considers delivery handled; with
/// [`DeliveryGuarantee::AtMostOnce`] it resolves on hand-off.
#[allow(async_fn_in_trait)]
pub trait SessionDriver: Send + Sync + 'static {
    /// Opens the session. Non-blocking: connectivity is reported through
    /// [`SessionEvent::Connected`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the session cannot be opened at all.
    async fn open(&self) -> Result<(), SessionError>;

    /// Closes the session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the session cannot be closed cleanly.
    async fn close(&self) -> Result<(), SessionError>;

    /// Hands a message to the session for delivery.
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: DeliveryGuarantee,
        retain: bool,
    ) -> bool;

    /// Requests a topic subscription from the session.
    async fn subscribe(&self, topic: &str, qos: DeliveryGuarantee) -> bool;
}

/// State shared between the client handle and its event task.
struct SessionShared {
    state: Mutex<SessionState>,
    ready: ReadySignal,
}

/// Publish/subscribe client over a broker session.
///
/// Inbound messages are routed to handlers through a
/// [`SubscriptionRegistry`] on the client's event task.
///
/// # Examples
///
/// ```no_run
/// use moorlink::{DeliveryGuarantee, MqttSessionConfig, MqttSessionDriver, SessionClient};
///
/// # #[tokio::main]
/// # async fn main() -> moorlink::Result<()> {
/// let config = MqttSessionConfig::builder()
///     .host("broker.local")
///     .credentials("user", "password")
///     .build()?;
/// let (driver, events) = MqttSessionDriver::new(config);
/// let session = SessionClient::new(driver, events);
///
/// let ready = session.ready_signal();
/// session.start().await?;
/// ready.wait().await;
///
/// session
///     .subscribe("homeassistant/status", DeliveryGuarantee::AtLeastOnce, |payload| {
///         tracing::info!(len = payload.len(), "Status update");
///     })
///     .await;
/// session
///     .publish("vessel/online", b"1", DeliveryGuarantee::AtLeastOnce, false)
///     .await;
///
/// session.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct SessionClient<D: SessionDriver> {
    driver: Arc<D>,
    registry: Arc<SubscriptionRegistry>,
    shared: Arc<SessionShared>,
    started: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl<D: SessionDriver> SessionClient<D> {
    /// Creates a client over `driver`, consuming `events` on a spawned
    /// task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(driver: D, events: mpsc::Receiver<SessionEvent>) -> Self {
        let driver = Arc::new(driver);
        let registry = Arc::new(SubscriptionRegistry::new());
        let shared = Arc::new(SessionShared {
            state: Mutex::new(SessionState::Idle),
            ready: ReadySignal::new(),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_session_events(
            Arc::clone(&registry),
            Arc::clone(&shared),
            events,
            shutdown_rx,
        ));

        Self {
            driver,
            registry,
            shared,
            started: AtomicBool::new(false),
            task: Mutex::new(Some(task)),
            shutdown: Mutex::new(Some(shutdown_tx)),
        }
    }

    /// Begins the session lifecycle.
    ///
    /// The first "connected" notification completes the signal returned by
    /// [`ready_signal`](Self::ready_signal).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the session cannot be opened, or on a
    /// second call.
    pub async fn start(&self) -> Result<(), SessionError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SessionError::AlreadyStarted);
        }
        tracing::info!("Starting session");
        self.driver.open().await
    }

    /// Returns a signal that completes on the first "connected"
    /// notification.
    #[must_use]
    pub fn ready_signal(&self) -> ReadySignal {
        self.shared.ready.clone()
    }

    /// Returns a snapshot of the session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.shared.state.lock()
    }

    /// Returns the registry routing inbound messages.
    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Hands a message to the session for delivery.
    ///
    /// Returns whether the underlying session accepted it. A `false`
    /// return is a local submission failure (e.g. not connected), never an
    /// error value.
    pub async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: DeliveryGuarantee,
        retain: bool,
    ) -> bool {
        let accepted = self.driver.publish(topic, payload, qos, retain).await;
        if !accepted {
            tracing::error!(topic = %topic, "Failed to publish");
        }
        accepted
    }

    /// Subscribes `topic` and routes its messages to `handler`.
    ///
    /// The handler is registered only after the underlying session accepts
    /// the subscription; on rejection nothing is registered and `false` is
    /// returned.
    pub async fn subscribe<F>(&self, topic: &str, qos: DeliveryGuarantee, handler: F) -> bool
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        if self.driver.subscribe(topic, qos).await {
            self.registry.subscribe(topic, handler);
            true
        } else {
            tracing::error!(topic = %topic, "Failed to subscribe");
            false
        }
    }

    /// Stops the session and resolves once teardown is safe.
    ///
    /// The event task is joined before the session is closed; after this
    /// returns no handler can be invoked. Idempotent.
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            tracing::info!("Stopping session");
            let _ = tx.send(());
        }

        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
            if let Err(e) = self.driver.close().await {
                tracing::warn!(error = %e, "Failed to close session cleanly");
            }
            tracing::info!("Session stopped");
        }
    }
}

impl<D: SessionDriver> Drop for SessionClient<D> {
    fn drop(&mut self) {
        // Last resort for a client leaked without stop(): kill the event
        // task so no handler can be invoked afterward.
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl<D: SessionDriver> std::fmt::Debug for SessionClient<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("state", &self.state())
            .field("topics", &self.registry.len())
            .finish()
    }
}

/// Consumes driver notifications and feeds the registry.
async fn run_session_events(
    registry: Arc<SubscriptionRegistry>,
    shared: Arc<SessionShared>,
    mut events: mpsc::Receiver<SessionEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::Connected => {
                        tracing::info!("Session connected");
                        *shared.state.lock() = SessionState::Connected;
                        shared.ready.signal();
                    }
                    SessionEvent::Disconnected => {
                        tracing::info!("Session disconnected");
                        *shared.state.lock() = SessionState::Disconnected;
                    }
                    SessionEvent::Error(kind) => {
                        *shared.state.lock() = SessionState::Error(kind);
                        match kind {
                            SessionErrorKind::Transport => {
                                tracing::error!("Session transport error");
                            }
                            SessionErrorKind::ConnectionRefused => {
                                tracing::error!("Session connection refused");
                            }
                        }
                    }
                    SessionEvent::Message { topic, payload } => {
                        registry.dispatch(&topic, &payload);
                    }
                }
            }
            _ = &mut shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use super::*;

    /// Driver double that records calls and accepts or rejects on demand.
    #[derive(Clone)]
    struct ScriptedDriver {
        accept_publish: Arc<AtomicBool>,
        accept_subscribe: Arc<AtomicBool>,
        publishes: Arc<Mutex<Vec<(String, Vec<u8>, DeliveryGuarantee, bool)>>>,
        subscriptions: Arc<Mutex<Vec<(String, DeliveryGuarantee)>>>,
        open_calls: Arc<AtomicU32>,
        close_calls: Arc<AtomicU32>,
    }

    impl Default for ScriptedDriver {
        fn default() -> Self {
            Self {
                accept_publish: Arc::new(AtomicBool::new(true)),
                accept_subscribe: Arc::new(AtomicBool::new(true)),
                publishes: Arc::default(),
                subscriptions: Arc::default(),
                open_calls: Arc::default(),
                close_calls: Arc::default(),
            }
        }
    }

    impl SessionDriver for ScriptedDriver {
        async fn open(&self) -> Result<(), SessionError> {
            self.open_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) -> Result<(), SessionError> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn publish(
            &self,
            topic: &str,
            payload: &[u8],
            qos: DeliveryGuarantee,
            retain: bool,
        ) -> bool {
            self.publishes
                .lock()
                .push((topic.to_string(), payload.to_vec(), qos, retain));
            self.accept_publish.load(Ordering::SeqCst)
        }

        async fn subscribe(&self, topic: &str, qos: DeliveryGuarantee) -> bool {
            self.subscriptions.lock().push((topic.to_string(), qos));
            self.accept_subscribe.load(Ordering::SeqCst)
        }
    }

    fn client_with_events() -> (
        SessionClient<ScriptedDriver>,
        ScriptedDriver,
        mpsc::Sender<SessionEvent>,
    ) {
        let driver = ScriptedDriver::default();
        let handle = driver.clone();
        let (tx, rx) = mpsc::channel(32);
        (SessionClient::new(driver, rx), handle, tx)
    }

    #[tokio::test]
    async fn connected_completes_ready_signal() {
        let (session, _driver, tx) = client_with_events();

        let ready = session.ready_signal();
        session.start().await.unwrap();
        tx.send(SessionEvent::Connected).await.unwrap();

        ready.wait().await;
        assert_eq!(session.state(), SessionState::Connected);

        session.stop().await;
    }

    #[tokio::test]
    async fn publish_forwards_to_driver() {
        let (session, driver, _tx) = client_with_events();

        let accepted = session
            .publish("vessel/online", b"1", DeliveryGuarantee::AtLeastOnce, true)
            .await;

        assert!(accepted);
        let publishes = driver.publishes.lock();
        assert_eq!(
            publishes.as_slice(),
            &[(
                "vessel/online".to_string(),
                b"1".to_vec(),
                DeliveryGuarantee::AtLeastOnce,
                true,
            )]
        );
    }

    #[tokio::test]
    async fn rejected_publish_returns_false() {
        let (session, driver, _tx) = client_with_events();
        driver.accept_publish.store(false, Ordering::SeqCst);

        let accepted = session
            .publish("vessel/online", b"1", DeliveryGuarantee::AtMostOnce, false)
            .await;

        assert!(!accepted);
    }

    #[tokio::test]
    async fn subscribe_registers_handler_and_routes_messages() {
        let (session, _driver, tx) = client_with_events();

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let accepted = session
            .subscribe("status", DeliveryGuarantee::AtLeastOnce, move |payload| {
                assert_eq!(payload, b"online");
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert!(accepted);

        tx.send(SessionEvent::Message {
            topic: "status".to_string(),
            payload: b"online".to_vec(),
        })
        .await
        .unwrap();
        tx.send(SessionEvent::Message {
            topic: "other".to_string(),
            payload: b"x".to_vec(),
        })
        .await
        .unwrap();

        // Let the event task drain the channel.
        tokio::time::timeout(Duration::from_secs(1), async {
            while calls.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("handler never invoked");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        session.stop().await;
    }

    #[tokio::test]
    async fn rejected_subscribe_registers_nothing() {
        let (session, driver, _tx) = client_with_events();
        driver.accept_subscribe.store(false, Ordering::SeqCst);

        let accepted = session
            .subscribe("status", DeliveryGuarantee::AtMostOnce, |_| {})
            .await;

        assert!(!accepted);
        assert!(session.registry().is_empty());
    }

    #[tokio::test]
    async fn error_notifications_update_state() {
        let (session, _driver, tx) = client_with_events();

        tx.send(SessionEvent::Error(SessionErrorKind::ConnectionRefused))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while session.state() == SessionState::Idle {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("state never updated");
        assert_eq!(
            session.state(),
            SessionState::Error(SessionErrorKind::ConnectionRefused)
        );

        session.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_closes_once() {
        let (session, driver, _tx) = client_with_events();

        session.start().await.unwrap();
        session.stop().await;
        session.stop().await;

        assert_eq!(driver.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_twice_is_an_error() {
        let (session, driver, _tx) = client_with_events();

        session.start().await.unwrap();
        assert!(matches!(
            session.start().await,
            Err(SessionError::AlreadyStarted)
        ));
        assert_eq!(driver.open_calls.load(Ordering::SeqCst), 1);

        session.stop().await;
    }
}
