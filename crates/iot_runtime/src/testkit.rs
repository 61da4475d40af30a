//! Test Inboxes
//!
//! Stand-ins for actors and reply destinations that hand every message they
//! receive to the test.

use std::convert::Infallible;
use std::ops::ControlFlow;
use std::time::Duration;

use kameo::Actor;
use kameo::actor::{ActorId, ActorRef, Spawn, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use tokio::sync::mpsc;

use crate::reply::ReplyTo;

/// Default wait for an expected message
pub const DEFAULT_EXPECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Actor behind a [`TestInbox`]; forwards every message to the test
pub struct Forwarder<M> {
    tx: mpsc::UnboundedSender<M>,
}

impl<M: Send + 'static> Actor for Forwarder<M> {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        Ok(state)
    }

    // Links are made by the code under test; an inbox outlives them
    async fn on_link_died(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        _id: ActorId,
        _reason: ActorStopReason,
    ) -> Result<ControlFlow<ActorStopReason>, Self::Error> {
        Ok(ControlFlow::Continue(()))
    }
}

impl<M: Send + 'static> Message<M> for Forwarder<M> {
    type Reply = ();

    async fn handle(&mut self, msg: M, _ctx: &mut Context<Self, Self::Reply>) {
        let _ = self.tx.send(msg);
    }
}

/// A real actor whose mailbox is read by the test
pub struct TestInbox<M: Send + 'static> {
    actor: ActorRef<Forwarder<M>>,
    rx: mpsc::UnboundedReceiver<M>,
}

impl<M: Send + 'static> TestInbox<M> {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = Forwarder::spawn(Forwarder { tx });
        Self { actor, rx }
    }

    /// Handle to the inbox actor
    pub fn actor_ref(&self) -> &ActorRef<Forwarder<M>> {
        &self.actor
    }

    /// Wait for the next message, panicking after the default timeout
    pub async fn expect_message(&mut self) -> M {
        self.expect_message_within(DEFAULT_EXPECT_TIMEOUT).await
    }

    /// Wait for the next message, panicking after `timeout`
    pub async fn expect_message_within(&mut self, timeout: Duration) -> M {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(msg)) => msg,
            Ok(None) => panic!("inbox {} closed", self.actor.id()),
            Err(_) => panic!("inbox {} got no message within {:?}", self.actor.id(), timeout),
        }
    }

    /// Assert that nothing arrives for `duration`
    pub async fn expect_no_message(&mut self, duration: Duration) {
        if let Ok(Some(_)) = tokio::time::timeout(duration, self.rx.recv()).await {
            panic!("inbox {} received an unexpected message", self.actor.id());
        }
    }

    /// Stop the inbox actor and wait until linked actors are notified
    pub async fn stop(&self) {
        let _ = self.actor.stop_gracefully().await;
        self.actor.wait_for_shutdown().await;
    }
}

/// Reply destinations read by the test
pub struct ReplyInbox<R: Send + 'static> {
    tx: mpsc::UnboundedSender<R>,
    rx: mpsc::UnboundedReceiver<R>,
}

impl<R: Send + 'static> ReplyInbox<R> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// A fresh destination delivering into this inbox
    pub fn reply_to(&self) -> ReplyTo<R> {
        ReplyTo::channel(self.tx.clone())
    }

    /// Wait for the next reply, panicking after the default timeout
    pub async fn expect_reply(&mut self) -> R {
        self.expect_reply_within(DEFAULT_EXPECT_TIMEOUT).await
    }

    /// Wait for the next reply, panicking after `timeout`
    pub async fn expect_reply_within(&mut self, timeout: Duration) -> R {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(reply)) => reply,
            Ok(None) => panic!("reply inbox closed"),
            Err(_) => panic!("no reply within {:?}", timeout),
        }
    }

    /// Assert that no reply arrives for `duration`
    pub async fn expect_no_reply(&mut self, duration: Duration) {
        if let Ok(Some(_)) = tokio::time::timeout(duration, self.rx.recv()).await {
            panic!("received an unexpected reply");
        }
    }
}

impl<R: Send + 'static> Default for ReplyInbox<R> {
    fn default() -> Self {
        Self::new()
    }
}
