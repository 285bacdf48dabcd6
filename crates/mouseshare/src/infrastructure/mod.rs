//! Infrastructure: sockets, the discovery thread, and the platform
//! capability ports with their mock implementations.

pub mod capture;
pub mod network;
pub mod screen;
pub mod synthesize;
