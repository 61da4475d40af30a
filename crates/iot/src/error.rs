use std::time::Duration;

use iot_runtime::ActorError;
use kameo::actor::ActorId;

use crate::messages::RequestId;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Actor error: {0}")]
    Actor(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("No reply from {0:?}")]
    NoReply(ActorId),

    #[error("Reply for request {received} does not match request {sent}")]
    RequestMismatch { sent: RequestId, received: RequestId },
}

impl From<ActorError> for Error {
    fn from(err: ActorError) -> Self {
        match err {
            ActorError::Timeout(after) => Error::Timeout(after),
            ActorError::NoReply(id) => Error::NoReply(id),
            other => Error::Actor(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iot_runtime::testkit::TestInbox;

    #[tokio::test]
    async fn test_actor_errors_map_to_specific_variants() {
        let inbox = TestInbox::<u32>::spawn();
        let id = inbox.actor_ref().id();

        let err: Error = ActorError::Timeout(Duration::from_millis(5)).into();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_millis(5)));

        let err: Error = ActorError::NoReply(id).into();
        assert!(matches!(err, Error::NoReply(from) if from == id));

        let err: Error = ActorError::NotRunning(id).into();
        assert!(matches!(err, Error::Actor(message) if message.starts_with("Actor not running")));
    }
}
