//! `WeTalk`: ephemeral encrypted group chat over a public MQTT broker.
//!
//! Everyone who knows a room key shares one broker topic. The [`chat`]
//! module rebuilds a consistent chat session on top of that bare channel:
//! membership, deduplication, typing state and reconnect handling.

pub mod avatar;
pub mod chat;
pub mod config;
pub mod crypto;
pub mod net;
pub mod transport;
