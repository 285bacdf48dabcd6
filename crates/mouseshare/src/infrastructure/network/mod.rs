//! Network infrastructure: session transport, the serve/join session loops,
//! and the discovery beacon.

pub mod discovery;
pub mod join;
pub mod serve;
pub mod transport;
