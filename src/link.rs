// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wireless-link lifecycle management.
//!
//! The [`LinkConnector`] drives a [`LinkDriver`] through association and
//! keeps the link alive: every unsolicited disconnect arms a one-shot timer
//! and the association is retried after a fixed interval, for any
//! disconnect reason, indefinitely. An explicit [`stop`](LinkConnector::stop)
//! is the only thing that ends the retry cycle; a disconnect notification
//! delivered while shutdown is in progress is suppressed, not retried.
//!
//! Disconnect reasons are classified into human-readable labels for the
//! log; the label never changes retry behavior.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::ready::ReadySignal;

/// Capability the underlying wireless stack exposes to the connector.
///
/// Implementations translate these calls onto the actual radio stack and
/// deliver [`LinkEvent`]s on the channel handed to
/// [`LinkConnector::new`]. The connector never holds a raw callback into
/// the driver, so there is no unregister-before-free ordering to get wrong.
pub trait LinkDriver: Send + Sync + 'static {
    /// Brings the link stack up. The driver reports [`LinkEvent::StackUp`]
    /// once the stack is ready to associate.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError`] if the stack cannot be started at all; this is
    /// an irrecoverable setup failure.
    fn bring_up(&self) -> Result<(), LinkError>;

    /// Starts one association attempt.
    ///
    /// A failed attempt surfaces later as [`LinkEvent::Disconnected`];
    /// an immediate error here is logged by the connector and nothing else.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError`] if the attempt could not even be initiated.
    fn associate(&self) -> Result<(), LinkError>;

    /// Forces the link down during teardown.
    fn bring_down(&self);
}

/// Notification delivered by a link driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The link stack finished starting and can associate.
    StackUp,
    /// Association succeeded and the link is usable.
    Connected,
    /// The link dropped, with the stack's reason code.
    Disconnected(DisconnectReason),
}

/// Lifecycle state of a [`LinkConnector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Not started yet.
    Idle,
    /// An association attempt is in flight.
    Connecting,
    /// The link is up.
    Connected,
    /// The link dropped; a retry is pending.
    Disconnected,
    /// Shutdown has begun; no further attempts will be made.
    Stopping,
}

impl LinkState {
    /// Returns true if the link is currently usable.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Reason code attached to a link disconnect notification.
///
/// Purely observational: every reason is retried identically. The label
/// exists so the log tells an operator *why* the link dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectReason(pub u16);

impl DisconnectReason {
    /// Returns the raw reason code.
    #[must_use]
    pub fn code(&self) -> u16 {
        self.0
    }

    /// Returns a human-readable label for the reason code.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self.0 {
            1 => "unspecified",
            2 => "auth_expire",
            3 => "auth_leave",
            4 => "assoc_expire",
            5 => "assoc_toomany",
            6 => "not_authed",
            7 => "not_assoced",
            8 => "assoc_leave",
            9 => "assoc_not_authed",
            13 => "ie_invalid",
            14 => "mic_failure",
            15 => "4way_handshake_timeout",
            16 => "group_key_update_timeout",
            23 => "802_1x_auth_failed",
            39 => "timeout",
            200 => "beacon_timeout",
            201 => "no_ap_found",
            202 => "auth_fail",
            203 => "assoc_fail",
            204 => "handshake_timeout",
            205 => "connection_fail",
            _ => "unknown",
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label(), self.0)
    }
}

/// State shared between the connector handle and its event task.
struct LinkShared {
    state: Mutex<LinkState>,
    stopping: AtomicBool,
    ready: ReadySignal,
}

/// Keeps a wireless link associated.
///
/// The connector consumes its driver's event channel on a dedicated task.
/// [`start`](Self::start) is non-blocking; readiness is observed through
/// [`ready_signal`](Self::ready_signal).
///
/// # Examples
///
/// ```no_run
/// use moorlink::{LinkConfig, LinkConnector, LinkDriver, LinkError, LinkEvent};
/// use tokio::sync::mpsc;
///
/// # struct RadioDriver;
/// # impl LinkDriver for RadioDriver {
/// #     fn bring_up(&self) -> Result<(), LinkError> { Ok(()) }
/// #     fn associate(&self) -> Result<(), LinkError> { Ok(()) }
/// #     fn bring_down(&self) {}
/// # }
/// # #[tokio::main]
/// # async fn main() -> moorlink::Result<()> {
/// let (events_tx, events_rx) = mpsc::channel::<LinkEvent>(32);
/// let link = LinkConnector::new(RadioDriver, events_rx, LinkConfig::default());
///
/// let ready = link.ready_signal();
/// link.start()?;
/// ready.wait().await;
///
/// // ... bring up the session stack ...
///
/// link.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct LinkConnector<D: LinkDriver> {
    driver: Arc<D>,
    shared: Arc<LinkShared>,
    started: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl<D: LinkDriver> LinkConnector<D> {
    /// Creates a connector over `driver`, consuming `events` on a spawned
    /// task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(driver: D, events: mpsc::Receiver<LinkEvent>, config: LinkConfig) -> Self {
        let driver = Arc::new(driver);
        let shared = Arc::new(LinkShared {
            state: Mutex::new(LinkState::Idle),
            stopping: AtomicBool::new(false),
            ready: ReadySignal::new(),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_link_events(
            Arc::clone(&driver),
            Arc::clone(&shared),
            events,
            shutdown_rx,
            config.retry_interval,
        ));

        Self {
            driver,
            shared,
            started: AtomicBool::new(false),
            task: Mutex::new(Some(task)),
            shutdown: Mutex::new(Some(shutdown_tx)),
        }
    }

    /// Begins the link lifecycle and returns immediately.
    ///
    /// The first successful association completes the signal returned by
    /// [`ready_signal`](Self::ready_signal).
    ///
    /// # Errors
    ///
    /// Returns [`LinkError`] if the stack cannot be brought up, or on a
    /// second call.
    pub fn start(&self) -> Result<(), LinkError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(LinkError::AlreadyStarted);
        }
        tracing::info!("Starting link");
        self.driver.bring_up()?;
        Ok(())
    }

    /// Returns a signal that completes on the first successful association.
    #[must_use]
    pub fn ready_signal(&self) -> ReadySignal {
        self.shared.ready.clone()
    }

    /// Returns a snapshot of the connector state.
    #[must_use]
    pub fn state(&self) -> LinkState {
        *self.shared.state.lock()
    }

    /// Stops the link and resolves once teardown is safe.
    ///
    /// Sets the stopping flag before anything else, so a disconnect
    /// notification racing this call is suppressed rather than re-armed.
    /// The event task is joined before the driver is forced down; after
    /// this returns no notification handler can run. Idempotent.
    pub async fn stop(&self) {
        self.shared.stopping.store(true, Ordering::Release);
        *self.shared.state.lock() = LinkState::Stopping;

        if let Some(tx) = self.shutdown.lock().take() {
            tracing::info!("Stopping link");
            let _ = tx.send(());
        }

        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
            self.driver.bring_down();
            tracing::info!("Link stopped");
        }
    }
}

impl<D: LinkDriver> Drop for LinkConnector<D> {
    fn drop(&mut self) {
        // Last resort for a connector leaked without stop(): kill the event
        // task so nothing can fire after the handle is gone.
        self.shared.stopping.store(true, Ordering::Release);
        if let Some(task) = self.task.lock().take() {
            task.abort();
            self.driver.bring_down();
        }
    }
}

impl<D: LinkDriver> std::fmt::Debug for LinkConnector<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkConnector")
            .field("state", &self.state())
            .finish()
    }
}

/// Consumes driver notifications and drives the retry timer.
async fn run_link_events<D: LinkDriver>(
    driver: Arc<D>,
    shared: Arc<LinkShared>,
    mut events: mpsc::Receiver<LinkEvent>,
    mut shutdown: oneshot::Receiver<()>,
    retry_interval: Duration,
) {
    let retry = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(retry);
    let mut retry_armed = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    LinkEvent::StackUp => {
                        tracing::info!("Link stack up, associating");
                        *shared.state.lock() = LinkState::Connecting;
                        if let Err(e) = driver.associate() {
                            tracing::error!(error = %e, "Failed to associate");
                        }
                    }
                    LinkEvent::Connected => {
                        tracing::info!("Link connected");
                        *shared.state.lock() = LinkState::Connected;
                        shared.ready.signal();
                    }
                    LinkEvent::Disconnected(reason) => {
                        // The driver can still deliver a disconnect fired by
                        // the stop call itself; it must not re-arm the timer.
                        if shared.stopping.load(Ordering::Acquire) {
                            tracing::debug!(reason = %reason, "Ignoring disconnect during shutdown");
                            continue;
                        }
                        tracing::info!(reason = %reason, "Link disconnected");
                        tracing::info!(
                            seconds = retry_interval.as_secs(),
                            "Attempting to reconnect after retry interval"
                        );
                        *shared.state.lock() = LinkState::Disconnected;
                        retry.as_mut().reset(Instant::now() + retry_interval);
                        retry_armed = true;
                    }
                }
            }
            () = &mut retry, if retry_armed => {
                retry_armed = false;
                if shared.stopping.load(Ordering::Acquire) {
                    continue;
                }
                tracing::info!("Retrying association");
                *shared.state.lock() = LinkState::Connecting;
                if let Err(e) = driver.associate() {
                    tracing::error!(error = %e, "Failed to associate");
                }
            }
            _ = &mut shutdown => break,
        }
    }
}
