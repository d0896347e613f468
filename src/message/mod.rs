//! This module exports a minimal message-passing API, which is encapsulated
//! by a `Communicator` trait. Implementors only need to write `send` and
//! `recv` operations for a given transport layer (an in-process channel group
//! is included). The trait then provides default implementations for
//! broadcast, reduce, and reduce-all operations.
//!

pub mod channel;
pub mod comm;
pub mod util;

pub use channel::ChannelCommunicator;
pub use comm::{Communicator, SerialCommunicator};
