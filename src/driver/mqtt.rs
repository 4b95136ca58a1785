// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT session driver backed by `rumqttc`.
//!
//! Translates the rumqttc event loop into [`SessionEvent`]s and maps the
//! session primitives onto the rumqttc async client. rumqttc reconnects by
//! itself as long as the event loop keeps being polled, so the pump never
//! stops on an error; it reports the error and polls on, pausing briefly
//! to avoid a hot loop while the broker is unreachable.

use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{ConfigError, SessionError};
use crate::session::{DeliveryGuarantee, SessionDriver, SessionErrorKind, SessionEvent};

/// Capacity of the session event channel.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Pause between polls while the event loop keeps erroring.
const ERROR_POLL_PAUSE: Duration = Duration::from_secs(1);

/// Configuration for an MQTT broker session.
///
/// Validated when built; the driver never re-checks it.
///
/// # Examples
///
/// ```
/// use moorlink::MqttSessionConfig;
///
/// let config = MqttSessionConfig::builder()
///     .url("mqtts://broker.example.com:8883")?
///     .credentials("vessel", "secret")
///     .ca_certificate("-----BEGIN CERTIFICATE-----\n...")
///     .build()?;
/// assert_eq!(config.host(), "broker.example.com");
/// assert_eq!(config.port(), 8883);
/// # Ok::<(), moorlink::ConfigError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MqttSessionConfig {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    ca_certificate: Option<String>,
    keep_alive: Duration,
    client_id: Option<String>,
}

impl MqttSessionConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> MqttSessionConfigBuilder {
        MqttSessionConfigBuilder::default()
    }

    /// Returns the broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the broker port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Builder for [`MqttSessionConfig`].
#[derive(Debug)]
pub struct MqttSessionConfigBuilder {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    ca_certificate: Option<String>,
    keep_alive: Duration,
    client_id: Option<String>,
}

impl Default for MqttSessionConfigBuilder {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            credentials: None,
            ca_certificate: None,
            keep_alive: Duration::from_secs(30),
            client_id: None,
        }
    }
}

impl MqttSessionConfigBuilder {
    /// Sets the broker host address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the broker port (default: 1883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets host and port from a broker URL.
    ///
    /// Accepts `mqtt://`, `mqtts://` and `tcp://` schemes; `mqtts://`
    /// defaults the port to 8883, everything else to 1883.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the URL cannot be parsed.
    pub fn url(mut self, url: &str) -> Result<Self, ConfigError> {
        let (host, port) = parse_broker_url(url)?;
        self.host = host;
        self.port = port;
        Ok(self)
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the PEM trust material for a TLS broker connection.
    #[must_use]
    pub fn ca_certificate(mut self, pem: impl Into<String>) -> Self {
        self.ca_certificate = Some(pem.into());
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.keep_alive = duration;
        self
    }

    /// Sets a custom client ID. Generated when not set.
    #[must_use]
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the host is missing.
    pub fn build(self) -> Result<MqttSessionConfig, ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::EmptyField("host"));
        }

        Ok(MqttSessionConfig {
            host: self.host,
            port: self.port,
            credentials: self.credentials,
            ca_certificate: self.ca_certificate,
            keep_alive: self.keep_alive,
            client_id: self.client_id,
        })
    }
}

/// Parses a broker URL into host and port.
fn parse_broker_url(url: &str) -> Result<(String, u16), ConfigError> {
    let (stripped, default_port) = if let Some(rest) = url.strip_prefix("mqtts://") {
        (rest, 8883)
    } else if let Some(rest) = url.strip_prefix("mqtt://") {
        (rest, 1883)
    } else if let Some(rest) = url.strip_prefix("tcp://") {
        (rest, 1883)
    } else {
        (url, 1883)
    };

    if stripped.is_empty() {
        return Err(ConfigError::InvalidAddress(url.to_string()));
    }

    let (host, port) = if let Some((h, p)) = stripped.rsplit_once(':') {
        let port = p
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(format!("invalid port: {p}")))?;
        (h.to_string(), port)
    } else {
        (stripped.to_string(), default_port)
    };

    Ok((host, port))
}

/// Broker session driver over rumqttc.
///
/// Construction yields the driver plus the event receiver to hand to
/// [`SessionClient`](crate::SessionClient). The session connects once
/// `open` spawns the event pump.
pub struct MqttSessionDriver {
    client: AsyncClient,
    event_loop: Mutex<Option<EventLoop>>,
    events_tx: mpsc::Sender<SessionEvent>,
}

impl MqttSessionDriver {
    /// Creates a driver from a validated configuration.
    #[must_use]
    pub fn new(config: MqttSessionConfig) -> (Self, mpsc::Receiver<SessionEvent>) {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("moorlink-{}", Uuid::new_v4().simple()));

        let mut options = MqttOptions::new(client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);

        if let Some((ref username, ref password)) = config.credentials {
            options.set_credentials(username, password);
        }

        if let Some(ref pem) = config.ca_certificate {
            options.set_transport(rumqttc::Transport::Tls(
                rumqttc::TlsConfiguration::Simple {
                    ca: pem.clone().into_bytes(),
                    alpn: None,
                    client_auth: None,
                },
            ));
        }

        let (client, event_loop) = AsyncClient::new(options, 10);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        (
            Self {
                client,
                event_loop: Mutex::new(Some(event_loop)),
                events_tx,
            },
            events_rx,
        )
    }
}

impl SessionDriver for MqttSessionDriver {
    async fn open(&self) -> Result<(), SessionError> {
        let Some(event_loop) = self.event_loop.lock().take() else {
            return Err(SessionError::AlreadyStarted);
        };

        tokio::spawn(pump_session_events(event_loop, self.events_tx.clone()));
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.client
            .disconnect()
            .await
            .map_err(|e| SessionError::Close(e.to_string()))
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: DeliveryGuarantee,
        retain: bool,
    ) -> bool {
        match self
            .client
            .publish(topic, map_qos(qos), retain, payload.to_vec())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "MQTT publish rejected");
                false
            }
        }
    }

    async fn subscribe(&self, topic: &str, qos: DeliveryGuarantee) -> bool {
        match self.client.subscribe(topic, map_qos(qos)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "MQTT subscribe rejected");
                false
            }
        }
    }
}

impl std::fmt::Debug for MqttSessionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttSessionDriver").finish_non_exhaustive()
    }
}

/// Maps the session delivery guarantee onto rumqttc QoS.
fn map_qos(qos: DeliveryGuarantee) -> QoS {
    match qos {
        DeliveryGuarantee::AtMostOnce => QoS::AtMostOnce,
        DeliveryGuarantee::AtLeastOnce => QoS::AtLeastOnce,
        DeliveryGuarantee::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// Classifies a rumqttc event-loop error for the session layer.
fn classify_error(error: &ConnectionError) -> SessionErrorKind {
    match error {
        ConnectionError::ConnectionRefused(_) => SessionErrorKind::ConnectionRefused,
        _ => SessionErrorKind::Transport,
    }
}

/// Polls the rumqttc event loop and forwards session notifications.
///
/// Exits once the event receiver is gone; an event-loop error is reported
/// and polling continues so rumqttc can reconnect.
async fn pump_session_events(mut event_loop: EventLoop, tx: mpsc::Sender<SessionEvent>) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT session connected");
                if tx.send(SessionEvent::Connected).await.is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::debug!(
                    topic = %publish.topic,
                    len = publish.payload.len(),
                    "MQTT message received"
                );
                let event = SessionEvent::Message {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("MQTT session disconnected");
                if tx.send(SessionEvent::Disconnected).await.is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "MQTT event loop error");
                if tx.send(SessionEvent::Error(classify_error(&e))).await.is_err() {
                    break;
                }
                // rumqttc reconnects on the next poll; don't spin while the
                // broker stays unreachable.
                tokio::time::sleep(ERROR_POLL_PAUSE).await;
            }
        }
    }
}
