// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration for the link lifecycle.
//!
//! All validation happens here, once, when the configuration is built.
//! The lifecycle code never re-checks field sizes: a [`StationConfig`]
//! that exists is a valid one.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Maximum SSID length in bytes, fixed by the station stack's frame format.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum passphrase length in bytes (WPA2/WPA3 limit).
pub const MAX_PASSPHRASE_LEN: usize = 64;

/// Credentials for the wireless network the link driver associates with.
///
/// Opaque to the lifecycle core; a link driver consumes it when bringing
/// the stack up.
///
/// # Examples
///
/// ```
/// use moorlink::StationConfig;
///
/// let station = StationConfig::new("boat-net", "anchor-chain")?;
/// assert_eq!(station.ssid(), "boat-net");
/// # Ok::<(), moorlink::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationConfig {
    ssid: String,
    passphrase: String,
}

impl StationConfig {
    /// Creates a validated station configuration.
    ///
    /// An empty passphrase selects an open network.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the SSID is empty or either field exceeds
    /// the stack's fixed-size storage.
    pub fn new(
        ssid: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let ssid = ssid.into();
        let passphrase = passphrase.into();

        if ssid.is_empty() {
            return Err(ConfigError::EmptyField("ssid"));
        }
        if ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::FieldTooLong {
                field: "ssid",
                max: MAX_SSID_LEN,
                actual: ssid.len(),
            });
        }
        if passphrase.len() > MAX_PASSPHRASE_LEN {
            return Err(ConfigError::FieldTooLong {
                field: "passphrase",
                max: MAX_PASSPHRASE_LEN,
                actual: passphrase.len(),
            });
        }

        Ok(Self { ssid, passphrase })
    }

    /// Returns the network name.
    #[must_use]
    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// Returns the passphrase, empty for open networks.
    #[must_use]
    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }
}

/// Tuning for the link connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Fixed interval between reconnection attempts.
    pub retry_interval: Duration,
}

impl LinkConfig {
    /// Creates a configuration with the default retry interval.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the interval between reconnection attempts.
    ///
    /// The interval is fixed: it does not grow between attempts, and
    /// retries continue until success or stop.
    #[must_use]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(10),
        }
    }
}
