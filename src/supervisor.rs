// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Startup sequencing for the two connectors.
//!
//! The session stack depends on a working link, and no ordering holds
//! between the two event streams, so the [`Supervisor`] waits for the link
//! to be ready before the session stack is started at all. Once both are
//! up it hands the session to the application; everything after that,
//! including restarting the process after an irrecoverable failure, is
//! application policy.

use crate::error::Result;
use crate::link::{LinkConnector, LinkDriver};
use crate::session::{SessionClient, SessionDriver};

/// Brings up the link, then the session, and hands out the result.
///
/// # Examples
///
/// ```no_run
/// # use moorlink::{LinkConfig, LinkConnector, LinkDriver, LinkError, LinkEvent,
/// #     MqttSessionConfig, MqttSessionDriver, SessionClient, Supervisor};
/// # use tokio::sync::mpsc;
/// # struct RadioDriver;
/// # impl LinkDriver for RadioDriver {
/// #     fn bring_up(&self) -> Result<(), LinkError> { Ok(()) }
/// #     fn associate(&self) -> Result<(), LinkError> { Ok(()) }
/// #     fn bring_down(&self) {}
/// # }
/// # #[tokio::main]
/// # async fn main() -> moorlink::Result<()> {
/// # let (_link_tx, link_events) = mpsc::channel::<LinkEvent>(32);
/// let link = LinkConnector::new(RadioDriver, link_events, LinkConfig::default());
///
/// let config = MqttSessionConfig::builder().host("broker.local").build()?;
/// let (driver, session_events) = MqttSessionDriver::new(config);
/// let session = SessionClient::new(driver, session_events);
///
/// let supervisor = Supervisor::new(link, session);
/// supervisor.bring_up().await?;
///
/// // The session is ready for the application layer.
/// let session = supervisor.session();
/// # supervisor.shut_down().await;
/// # Ok(())
/// # }
/// ```
pub struct Supervisor<L: LinkDriver, S: SessionDriver> {
    link: LinkConnector<L>,
    session: SessionClient<S>,
}

impl<L: LinkDriver, S: SessionDriver> Supervisor<L, S> {
    /// Creates a supervisor over an unstarted link and session.
    #[must_use]
    pub fn new(link: LinkConnector<L>, session: SessionClient<S>) -> Self {
        Self { link, session }
    }

    /// Runs the startup sequence to completion.
    ///
    /// Waits are unbounded by design; a caller wanting a deadline wraps
    /// this future in `tokio::time::timeout`.
    ///
    /// # Errors
    ///
    /// Returns the irrecoverable setup failure of whichever stack could
    /// not be started. Transient connectivity loss never surfaces here.
    pub async fn bring_up(&self) -> Result<()> {
        self.link.start()?;
        self.link.ready_signal().wait().await;
        tracing::info!("Link ready");

        self.session.start().await?;
        self.session.ready_signal().wait().await;
        tracing::info!("Session ready");

        Ok(())
    }

    /// Returns the link connector.
    #[must_use]
    pub fn link(&self) -> &LinkConnector<L> {
        &self.link
    }

    /// Returns the session client, ready after
    /// [`bring_up`](Self::bring_up) resolves.
    #[must_use]
    pub fn session(&self) -> &SessionClient<S> {
        &self.session
    }

    /// Stops the session, then the link.
    pub async fn shut_down(&self) {
        self.session.stop().await;
        self.link.stop().await;
    }
}
