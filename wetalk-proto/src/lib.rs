//! Shared protocol definitions for the `WeTalk` wire format.

pub mod codec;
pub mod envelope;
pub mod message;
pub mod presence;
pub mod room;
