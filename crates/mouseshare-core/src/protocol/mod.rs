//! Wire protocol: framed event codec and the UDP discovery datagram.

pub mod announce;
pub mod codec;
pub mod events;
