// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `moorlink` - connection keeping for small networked devices.
//!
//! This library owns the two connections a headless sensor bridge depends
//! on, a wireless link and an MQTT broker session, and keeps both alive
//! through the instability of the real world: link drops, broker restarts,
//! flaky radios. Application code gets a narrow surface on top: wait until
//! ready, publish, subscribe. What the messages mean is not this crate's
//! business.
//!
//! # Components
//!
//! - [`ReadySignal`]: one-shot, multi-waiter "became ready" rendezvous
//! - [`SubscriptionRegistry`]: routes inbound messages to handlers by topic
//! - [`LinkConnector`]: keeps the wireless link associated, retrying every
//!   unsolicited disconnect on a fixed interval until stopped
//! - [`SessionClient`]: broker-session lifecycle with publish/subscribe and
//!   selectable delivery guarantees
//! - [`Supervisor`]: brings the link up before the session, hands the ready
//!   session to the application
//!
//! The underlying stacks are reached through the [`LinkDriver`] and
//! [`SessionDriver`] traits. A production MQTT driver backed by `rumqttc`
//! ships behind the `mqtt` feature (on by default); link drivers are
//! platform-specific and come from the embedding application.
//!
//! # Quick Start
//!
//! ```no_run
//! use moorlink::{
//!     DeliveryGuarantee, LinkConfig, LinkConnector, LinkDriver, LinkError, LinkEvent,
//!     MqttSessionConfig, MqttSessionDriver, SessionClient, Supervisor,
//! };
//! use tokio::sync::mpsc;
//!
//! # struct RadioDriver;
//! # impl LinkDriver for RadioDriver {
//! #     fn bring_up(&self) -> Result<(), LinkError> { Ok(()) }
//! #     fn associate(&self) -> Result<(), LinkError> { Ok(()) }
//! #     fn bring_down(&self) {}
//! # }
//! # fn radio_driver() -> (RadioDriver, mpsc::Receiver<LinkEvent>) {
//! #     (RadioDriver, mpsc::channel(32).1)
//! # }
//! #[tokio::main]
//! async fn main() -> moorlink::Result<()> {
//!     // The link driver wraps the platform's wireless stack.
//!     let (radio, link_events) = radio_driver();
//!     let link = LinkConnector::new(radio, link_events, LinkConfig::default());
//!
//!     let config = MqttSessionConfig::builder()
//!         .url("mqtts://broker.example.com:8883")?
//!         .credentials("vessel", "secret")
//!         .build()?;
//!     let (driver, session_events) = MqttSessionDriver::new(config);
//!     let session = SessionClient::new(driver, session_events);
//!
//!     let supervisor = Supervisor::new(link, session);
//!     supervisor.bring_up().await?;
//!
//!     let session = supervisor.session();
//!     session
//!         .subscribe("homeassistant/status", DeliveryGuarantee::AtLeastOnce, |payload| {
//!             if payload == b"online" {
//!                 // Re-announce state to the returning consumer.
//!             }
//!         })
//!         .await;
//!     session
//!         .publish("vessel/online", b"1", DeliveryGuarantee::AtLeastOnce, false)
//!         .await;
//!
//!     supervisor.shut_down().await;
//!     Ok(())
//! }
//! ```
//!
//! # Failure Model
//!
//! Transient connectivity loss never surfaces as an error: the link layer
//! retries on its fixed interval, the session layer trusts the broker
//! client's own reconnection, and callers observe only "not yet ready" or
//! a `false` return from publish/subscribe. Error values are reserved for
//! setup failures that need operator attention: invalid configuration or
//! a stack that will not start.

mod config;
mod driver;
pub mod error;
mod link;
#[cfg(feature = "log-relay")]
mod log_relay;
mod ready;
mod routing;
mod session;
mod supervisor;

pub use config::{LinkConfig, MAX_PASSPHRASE_LEN, MAX_SSID_LEN, StationConfig};
#[cfg(feature = "mqtt")]
pub use driver::{MqttSessionConfig, MqttSessionConfigBuilder, MqttSessionDriver};
pub use error::{ConfigError, Error, LinkError, Result, SessionError};
pub use link::{DisconnectReason, LinkConnector, LinkDriver, LinkEvent, LinkState};
#[cfg(feature = "log-relay")]
pub use log_relay::{LogRelayDrain, LogRelayLayer, log_relay};
pub use ready::ReadySignal;
pub use routing::{MessageHandler, SubscriptionRegistry};
pub use session::{
    DeliveryGuarantee, SessionClient, SessionDriver, SessionErrorKind, SessionEvent, SessionState,
};
pub use supervisor::Supervisor;
