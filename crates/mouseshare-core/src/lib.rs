//! # mouseshare-core
//!
//! Shared library for MouseShare containing the wire codec, the discovery
//! datagram format, and the peer/layout domain model.
//!
//! MouseShare lets one computer (the controller) drive the mouse and keyboard
//! of another (the target) over a LAN: when the controller's cursor crosses a
//! screen edge that a known peer abuts, local input is intercepted and
//! forwarded; when the cursor returns to the entry edge on the target, local
//! control resumes.
//!
//! This crate is used by both roles of the `mouseshare` application. It has
//! zero dependencies on OS APIs, sockets, or the async runtime:
//!
//! - **`protocol`** – how bytes travel over the wire. Events are encoded into
//!   a compact binary format (9-byte header + fixed payload) and decoded back
//!   into typed Rust structs on the other end. Also defines the 80-byte UDP
//!   discovery datagram.
//!
//! - **`domain`** – pure business logic: the peer table maintained by the
//!   discovery beacon and the layout geometry that resolves which neighbor
//!   owns which screen edge.

pub mod domain;
pub mod protocol;

pub use domain::layout::{clamp_to, edge_hit, entry_position, scale_position, LayoutRect};
pub use domain::peer::{Peer, PeerTable};
pub use protocol::announce::{AnnouncePacket, AnnounceError, ANNOUNCE_PACKET_SIZE};
pub use protocol::codec::{decode_frame, decode_payload, encode_event, CodecError, FrameHeader};
pub use protocol::events::{
    Event, EventType, KeyEvent, MouseButton, MouseButtonEvent, MouseMoveEvent, MouseScrollEvent,
    ScreenEdge, ScreenInfoEvent, SwitchScreenEvent, DEFAULT_DISCOVERY_PORT, DEFAULT_PORT,
    HEADER_SIZE, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION,
};
