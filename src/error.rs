// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `moorlink` library.
//!
//! Only irrecoverable setup failures surface as error values: bad
//! configuration caught at load time, or a stack that cannot be brought up.
//! Rejected publishes and subscribes are reported as `false` returns, and
//! transient connectivity loss is logged and retried without ever becoming
//! an error; callers observe it only as "not yet ready".

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration was rejected during validation.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The wireless link stack failed irrecoverably.
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    /// The broker session failed irrecoverably.
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

/// Errors raised while validating configuration at load time.
///
/// The underlying link stack stores credentials in fixed-size fields;
/// instead of discovering an overflow deep inside the connection path,
/// these checks run once when the configuration is constructed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A field exceeds the size the underlying stack can store.
    #[error("{field} is {actual} bytes, limit is {max}")]
    FieldTooLong {
        /// Name of the offending field.
        field: &'static str,
        /// Maximum size in bytes.
        max: usize,
        /// The size that was provided.
        actual: usize,
    },

    /// A required field is empty.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// An address could not be used as given.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Errors raised by the wireless-link lifecycle.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The link stack could not be brought up.
    #[error("link stack failed to start: {0}")]
    StackStart(String),

    /// An association attempt could not be initiated.
    #[error("association attempt failed: {0}")]
    Associate(String),

    /// The connector was started a second time.
    #[error("link connector already started")]
    AlreadyStarted,
}

/// Errors raised by the broker-session lifecycle.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session could not be opened.
    #[error("session failed to open: {0}")]
    Open(String),

    /// The session could not be closed cleanly.
    #[error("session failed to close: {0}")]
    Close(String),

    /// The session was started a second time.
    #[error("session already started")]
    AlreadyStarted,
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
