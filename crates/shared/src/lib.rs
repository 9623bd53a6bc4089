//! Shared types for the market dashboard real-time feed.
//!
//! Everything here is transport independent: the closed set of channels,
//! subscription keys, the message shape each channel carries and the JSON
//! frames exchanged with the analytics server.

pub mod channel;
pub mod error;
pub mod market;
pub mod protocol;

pub use channel::*;
pub use error::*;
pub use market::*;
pub use protocol::*;
