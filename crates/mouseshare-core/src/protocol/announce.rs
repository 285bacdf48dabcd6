//! The UDP discovery datagram.
//!
//! Every endpoint broadcasts an 80-byte ANNOUNCE on the discovery port every
//! few seconds so peers can populate their tables without configuration:
//!
//! ```text
//! [magic:4 = "MSHR"][kind:1][port:2][screen_w:4][screen_h:4][is_server:1][name:64]
//! ```
//!
//! Integers are little-endian; `name` is NUL-padded ASCII. A QUERY datagram
//! (kind 2) asks receivers to answer with an immediate ANNOUNCE.

use thiserror::Error;

/// Magic prefix identifying MouseShare discovery traffic.
pub const DISCOVERY_MAGIC: [u8; 4] = *b"MSHR";

/// Total packed size of a discovery datagram; also the minimum a receiver
/// accepts. Longer datagrams are valid with the tail ignored.
pub const ANNOUNCE_PACKET_SIZE: usize = 80;

/// Size of the NUL-padded name field.
pub const NAME_FIELD_SIZE: usize = 64;

/// Datagram kind: periodic presence announcement.
pub const KIND_ANNOUNCE: u8 = 1;

/// Datagram kind: request for an immediate announcement.
pub const KIND_QUERY: u8 = 2;

/// Errors produced while decoding a discovery datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnnounceError {
    #[error("datagram too short: need {ANNOUNCE_PACKET_SIZE} bytes, got {0}")]
    TooShort(usize),
    #[error("bad discovery magic")]
    BadMagic,
}

/// A decoded discovery datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncePacket {
    /// [`KIND_ANNOUNCE`] or [`KIND_QUERY`]; other values are preserved so the
    /// beacon can log and skip them.
    pub kind: u8,
    /// TCP service port the sender accepts sessions on.
    pub port: u16,
    pub screen_w: i32,
    pub screen_h: i32,
    /// Whether the sender is advertising the controller role.
    pub is_server: bool,
    /// Host name; unique key in the peer table.
    pub name: String,
}

impl AnnouncePacket {
    /// Builds an ANNOUNCE for the local endpoint.
    pub fn announce(name: &str, port: u16, screen_w: i32, screen_h: i32, is_server: bool) -> Self {
        Self {
            kind: KIND_ANNOUNCE,
            port,
            screen_w,
            screen_h,
            is_server,
            name: name.to_string(),
        }
    }

    /// Encodes the datagram into its fixed 80-byte wire form.
    ///
    /// Names longer than 63 bytes are truncated so the field always keeps a
    /// NUL terminator.
    pub fn encode(&self) -> [u8; ANNOUNCE_PACKET_SIZE] {
        let mut buf = [0u8; ANNOUNCE_PACKET_SIZE];
        buf[0..4].copy_from_slice(&DISCOVERY_MAGIC);
        buf[4] = self.kind;
        buf[5..7].copy_from_slice(&self.port.to_le_bytes());
        buf[7..11].copy_from_slice(&self.screen_w.to_le_bytes());
        buf[11..15].copy_from_slice(&self.screen_h.to_le_bytes());
        buf[15] = u8::from(self.is_server);

        let name_bytes = self.name.as_bytes();
        let len = name_bytes.len().min(NAME_FIELD_SIZE - 1);
        buf[16..16 + len].copy_from_slice(&name_bytes[..len]);
        buf
    }

    /// Decodes a datagram received from the discovery socket.
    ///
    /// # Errors
    ///
    /// Returns [`AnnounceError::TooShort`] for datagrams below the packed
    /// size and [`AnnounceError::BadMagic`] for foreign traffic on the port.
    pub fn decode(bytes: &[u8]) -> Result<Self, AnnounceError> {
        if bytes.len() < ANNOUNCE_PACKET_SIZE {
            return Err(AnnounceError::TooShort(bytes.len()));
        }
        if bytes[0..4] != DISCOVERY_MAGIC {
            return Err(AnnounceError::BadMagic);
        }

        let name_field = &bytes[16..16 + NAME_FIELD_SIZE];
        let name_len = name_field.iter().position(|&b| b == 0).unwrap_or(NAME_FIELD_SIZE);
        let name = String::from_utf8_lossy(&name_field[..name_len]).into_owned();

        Ok(Self {
            kind: bytes[4],
            port: u16::from_le_bytes([bytes[5], bytes[6]]),
            screen_w: i32::from_le_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]),
            screen_h: i32::from_le_bytes([bytes[11], bytes[12], bytes[13], bytes[14]]),
            is_server: bytes[15] != 0,
            name,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
