//! IoT Runtime - Helpers on top of kameo
//!
//! kameo supplies the actors, mailboxes and links. This crate adds what the
//! registry protocol needs beyond that:
//! - [`ReplyTo`]: a one-shot reply destination carried inside a message
//! - [`request`]: tell-and-wait for such a reply from outside the actors
//! - [`testkit`]: inboxes standing in for actors and reply destinations

pub mod reply;
pub mod testkit;

pub use reply::*;
