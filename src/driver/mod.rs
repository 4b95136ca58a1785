// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Production driver implementations.
//!
//! The lifecycle core only talks to the [`LinkDriver`](crate::LinkDriver)
//! and [`SessionDriver`](crate::SessionDriver) traits; this module holds
//! the concrete drivers shipped with the crate.
//!
//! - [`MqttSessionDriver`]: broker sessions over MQTT via `rumqttc`
//!   (feature `mqtt`, on by default)
//!
//! A wireless link driver is inherently platform-specific and is expected
//! to come from the embedding application.

#[cfg(feature = "mqtt")]
mod mqtt;

#[cfg(feature = "mqtt")]
pub use mqtt::{MqttSessionConfig, MqttSessionConfigBuilder, MqttSessionDriver};
