//! Reply Destinations
//!
//! Registry requests carry the place their single reply goes to. The caller
//! picks it: a oneshot awaited by [`request`], a channel, or another actor's
//! mailbox through a message adapter.
//!
//! Delivering to an actor awaits the enqueue, so a reply sent before the
//! sender stops is always ahead of the sender's link-died notice.

use std::time::Duration;

use futures::future::BoxFuture;
use kameo::Actor;
use kameo::actor::{ActorId, ActorRef};
use kameo::message::Message;
use tokio::sync::{mpsc, oneshot};

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from waiting on a reply
#[derive(Debug, Clone, thiserror::Error)]
pub enum ActorError {
    #[error("Actor not running: {0:?}")]
    NotRunning(ActorId),

    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Request dropped without reply: {0:?}")]
    NoReply(ActorId),
}

/// Result type for requests
pub type ActorResult<T> = Result<T, ActorError>;

// ─────────────────────────────────────────────────────────────────────────────
// Reply Destination
// ─────────────────────────────────────────────────────────────────────────────

type Deliver<R> = Box<dyn FnOnce(R) -> BoxFuture<'static, bool> + Send>;

/// Capability to deliver exactly one reply of type `R`
pub struct ReplyTo<R> {
    deliver: Deliver<R>,
}

impl<R: Send + 'static> ReplyTo<R> {
    /// Create a destination from an async delivery function returning success
    pub fn new<F>(deliver: F) -> Self
    where
        F: FnOnce(R) -> BoxFuture<'static, bool> + Send + 'static,
    {
        Self {
            deliver: Box::new(deliver),
        }
    }

    /// Destination that completes a oneshot
    pub fn oneshot() -> (Self, oneshot::Receiver<R>) {
        let (tx, rx) = oneshot::channel();
        let reply_to = Self::new(move |reply| Box::pin(async move { tx.send(reply).is_ok() }));
        (reply_to, rx)
    }

    /// Destination feeding an unbounded channel
    pub fn channel(tx: mpsc::UnboundedSender<R>) -> Self {
        Self::new(move |reply| Box::pin(async move { tx.send(reply).is_ok() }))
    }

    /// Destination that hands the reply to `actor`, wrapped by `adapt`
    pub fn actor<A, M, F>(actor: ActorRef<A>, adapt: F) -> Self
    where
        A: Actor + Message<M>,
        M: Send + 'static,
        F: FnOnce(R) -> M + Send + 'static,
    {
        Self::new(move |reply| Box::pin(async move { actor.tell(adapt(reply)).await.is_ok() }))
    }

    /// Deliver the reply; false if the destination is gone
    pub async fn send(self, reply: R) -> bool {
        (self.deliver)(reply).await
    }
}

impl<R> std::fmt::Debug for ReplyTo<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyTo").finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// Tell `actor` a request built around a fresh reply destination and wait
/// for the reply
///
/// Fails with [`ActorError::NoReply`] if the request is dropped without an
/// answer, and with [`ActorError::Timeout`] if nothing arrives in time.
pub async fn request<A, M, R, F>(actor: &ActorRef<A>, build: F, timeout: Duration) -> ActorResult<R>
where
    A: Actor + Message<M>,
    M: Send + 'static,
    R: Send + 'static,
    F: FnOnce(ReplyTo<R>) -> M,
{
    let (reply_to, reply_rx) = ReplyTo::oneshot();
    if actor.tell(build(reply_to)).await.is_err() {
        return Err(ActorError::NotRunning(actor.id()));
    }

    match tokio::time::timeout(timeout, reply_rx).await {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(_)) => Err(ActorError::NoReply(actor.id())),
        Err(_) => Err(ActorError::Timeout(timeout)),
    }
}
