//! Inter-agent communication bus.
//!
//! Models each agent as the owner of a mailbox with explicit opt-in message
//! handlers: a push-based local pub/sub with direct send and
//! broadcast-to-subscribers, no persistence or delivery guarantees.
//!
//! # Main types
//!
//! - [`CommunicationBus`] — mailbox registry, send and broadcast.
//! - [`Message`] — an immutable typed message between two agents.
//! - [`MessageHandler`] — handler invoked synchronously on delivery.

/// Bus, mailboxes, and handler dispatch.
pub mod bus;
/// The message envelope.
pub mod message;

pub use bus::{CommunicationBus, MessageHandler};
pub use message::Message;
