// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lifecycle tests with scripted drivers.
//!
//! The link tests run on tokio's paused clock so the fixed retry interval
//! can be observed exactly instead of slept through.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use moorlink::{
    DeliveryGuarantee, DisconnectReason, LinkConfig, LinkConnector, LinkDriver, LinkError,
    LinkEvent, LinkState, SessionClient, SessionDriver, SessionError, SessionEvent, Supervisor,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Link driver that reports each association attempt to the test.
#[derive(Clone)]
struct ScriptedLink {
    associations: mpsc::UnboundedSender<()>,
}

impl LinkDriver for ScriptedLink {
    fn bring_up(&self) -> Result<(), LinkError> {
        Ok(())
    }

    fn associate(&self) -> Result<(), LinkError> {
        let _ = self.associations.send(());
        Ok(())
    }

    fn bring_down(&self) {}
}

fn scripted_link() -> (ScriptedLink, mpsc::UnboundedReceiver<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ScriptedLink { associations: tx }, rx)
}

/// Session driver that connects when opened and records subscriptions.
#[derive(Clone)]
struct ScriptedSession {
    events: mpsc::Sender<SessionEvent>,
    subscriptions: Arc<AtomicU32>,
}

impl SessionDriver for ScriptedSession {
    async fn open(&self) -> Result<(), SessionError> {
        let _ = self.events.try_send(SessionEvent::Connected);
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        Ok(())
    }

    async fn publish(
        &self,
        _topic: &str,
        _payload: &[u8],
        _qos: DeliveryGuarantee,
        _retain: bool,
    ) -> bool {
        true
    }

    async fn subscribe(&self, _topic: &str, _qos: DeliveryGuarantee) -> bool {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        true
    }
}

mod link_reconnection {
    use super::*;

    const RETRY: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn stack_up_triggers_exactly_one_association() {
        let (driver, mut associations) = scripted_link();
        let (tx, rx) = mpsc::channel(32);
        let link = LinkConnector::new(
            driver,
            rx,
            LinkConfig::new().with_retry_interval(RETRY),
        );

        link.start().unwrap();
        tx.send(LinkEvent::StackUp).await.unwrap();

        associations.recv().await.unwrap();
        // No further attempt without a disconnect.
        let extra = tokio::time::timeout(Duration::from_secs(60), associations.recv()).await;
        assert!(extra.is_err());

        link.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_schedules_retry_after_fixed_interval() {
        let (driver, mut associations) = scripted_link();
        let (tx, rx) = mpsc::channel(32);
        let link = LinkConnector::new(
            driver,
            rx,
            LinkConfig::new().with_retry_interval(RETRY),
        );

        link.start().unwrap();
        tx.send(LinkEvent::StackUp).await.unwrap();
        associations.recv().await.unwrap();

        let before = Instant::now();
        tx.send(LinkEvent::Disconnected(DisconnectReason(201)))
            .await
            .unwrap();

        // Nothing fires before the interval has elapsed.
        let early = tokio::time::timeout(RETRY - Duration::from_secs(1), associations.recv()).await;
        assert!(early.is_err());

        associations.recv().await.unwrap();
        assert!(before.elapsed() >= RETRY);
        assert_eq!(link.state(), LinkState::Connecting);

        link.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn retries_repeat_until_success() {
        let (driver, mut associations) = scripted_link();
        let (tx, rx) = mpsc::channel(32);
        let link = LinkConnector::new(
            driver,
            rx,
            LinkConfig::new().with_retry_interval(RETRY),
        );

        link.start().unwrap();
        tx.send(LinkEvent::StackUp).await.unwrap();
        associations.recv().await.unwrap();

        // Three failures in a row, one retry each.
        for reason in [1, 202, 999] {
            tx.send(LinkEvent::Disconnected(DisconnectReason(reason)))
                .await
                .unwrap();
            associations.recv().await.unwrap();
        }

        tx.send(LinkEvent::Connected).await.unwrap();
        link.ready_signal().wait().await;
        assert!(link.state().is_connected());

        link.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_suppresses_pending_retry() {
        let (driver, mut associations) = scripted_link();
        let (tx, rx) = mpsc::channel(32);
        let link = LinkConnector::new(
            driver,
            rx,
            LinkConfig::new().with_retry_interval(RETRY),
        );

        link.start().unwrap();
        tx.send(LinkEvent::StackUp).await.unwrap();
        associations.recv().await.unwrap();

        // Disconnect and stop immediately: whether the notification lands
        // before or during teardown, no re-attempt may follow.
        tx.send(LinkEvent::Disconnected(DisconnectReason(200)))
            .await
            .unwrap();
        link.stop().await;

        let after = tokio::time::timeout(RETRY * 3, associations.recv()).await;
        assert!(after.is_err(), "association attempted after stop");
    }

    #[tokio::test(start_paused = true)]
    async fn ready_signal_unblocks_multiple_waiters() {
        let (driver, mut associations) = scripted_link();
        let (tx, rx) = mpsc::channel(32);
        let link = LinkConnector::new(driver, rx, LinkConfig::default());

        let first = link.ready_signal();
        let second = link.ready_signal();
        let a = tokio::spawn(async move { first.wait().await });
        let b = tokio::spawn(async move { second.wait().await });

        link.start().unwrap();
        tx.send(LinkEvent::StackUp).await.unwrap();
        associations.recv().await.unwrap();
        tx.send(LinkEvent::Connected).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            a.await.unwrap();
            b.await.unwrap();
        })
        .await
        .expect("waiters did not unblock");

        link.stop().await;
    }
}

mod end_to_end {
    use super::*;

    #[tokio::test]
    async fn bring_up_subscribe_and_dispatch() {
        let (link_driver, mut associations) = scripted_link();
        let (link_tx, link_rx) = mpsc::channel(32);
        let link = LinkConnector::new(link_driver, link_rx, LinkConfig::default());

        let (session_tx, session_rx) = mpsc::channel(32);
        let session_driver = ScriptedSession {
            events: session_tx.clone(),
            subscriptions: Arc::new(AtomicU32::new(0)),
        };
        let session = SessionClient::new(session_driver, session_rx);

        let supervisor = Supervisor::new(link, session);

        // Feed the link to completion while bring_up is waiting on it.
        let feeder = tokio::spawn(async move {
            link_tx.send(LinkEvent::StackUp).await.unwrap();
            associations.recv().await.unwrap();
            link_tx.send(LinkEvent::Connected).await.unwrap();
            link_tx
        });

        tokio::time::timeout(Duration::from_secs(5), supervisor.bring_up())
            .await
            .expect("bring-up stalled")
            .unwrap();
        let _link_tx = feeder.await.unwrap();

        // Application-level subscription, then an inbound message.
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let accepted = supervisor
            .session()
            .subscribe("status", DeliveryGuarantee::AtLeastOnce, move |payload| {
                let _ = seen_tx.send(payload.to_vec());
            })
            .await;
        assert!(accepted);

        session_tx
            .send(SessionEvent::Message {
                topic: "status".to_string(),
                payload: b"online".to_vec(),
            })
            .await
            .unwrap();

        let payload = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .expect("message never dispatched")
            .unwrap();
        assert_eq!(payload, b"online");

        supervisor.shut_down().await;
    }

    #[tokio::test]
    async fn handlers_do_not_fire_after_shutdown() {
        let (session_tx, session_rx) = mpsc::channel(32);
        let session_driver = ScriptedSession {
            events: session_tx.clone(),
            subscriptions: Arc::new(AtomicU32::new(0)),
        };
        let session = SessionClient::new(session_driver, session_rx);

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        session
            .subscribe("status", DeliveryGuarantee::AtMostOnce, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        session.stop().await;

        // Events delivered after stop go nowhere.
        let _ = session_tx
            .send(SessionEvent::Message {
                topic: "status".to_string(),
                payload: b"late".to_vec(),
            })
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
