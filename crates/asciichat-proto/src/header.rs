use crc::{Crc, CRC_32_ISCSI};

use crate::error::FrameError;
use crate::types::{ClientId, PacketType};

/// Wire magic, "ASCH" in ASCII.
pub const MAGIC: u32 = 0x4153_4348;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 20;

/// Default cap on `payload_length`. Configurable per server; generous
/// enough for an uncompressed 1080p RGB image frame is deliberately NOT the
/// goal — clients are expected to downscale before shipping pixels.
pub const DEFAULT_MAX_PAYLOAD: u32 = 2 * 1024 * 1024;

/// Set when the payload is `nonce || ciphertext || tag` of a READY session.
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// CRC-32C (Castagnoli). Chosen once, fixed across peers.
const CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

pub fn payload_crc(payload: &[u8]) -> u32 {
    CRC32C.checksum(payload)
}

/// The fixed packet header, network byte order on the wire:
///
/// ```text
/// [magic: u32] [type: u16] [payload_length: u32] [crc32: u32] [sender_id: u32] [flags: u16]
/// ```
///
/// `payload_length` is authoritative for how many payload bytes follow;
/// `crc32` covers the payload only (the ciphertext when encrypted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: PacketType,
    pub payload_length: u32,
    pub crc32: u32,
    pub sender_id: ClientId,
    pub flags: u16,
}

impl PacketHeader {
    /// Serialize into the 20-byte wire form.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC.to_be_bytes());
        buf[4..6].copy_from_slice(&(self.packet_type as u16).to_be_bytes());
        buf[6..10].copy_from_slice(&self.payload_length.to_be_bytes());
        buf[10..14].copy_from_slice(&self.crc32.to_be_bytes());
        buf[14..18].copy_from_slice(&self.sender_id.to_be_bytes());
        buf[18..20].copy_from_slice(&self.flags.to_be_bytes());
        buf
    }

    /// Parse and validate a header. Magic, type and length bounds are
    /// checked here, before any payload byte has been read — an oversize
    /// announcement never causes a payload allocation.
    pub fn parse(bytes: &[u8], max_payload: u32) -> Result<Self, FrameError> {
        debug_assert!(bytes.len() >= HEADER_SIZE);
        let magic = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != MAGIC {
            return Err(FrameError::BadMagic(magic));
        }

        let packet_type = PacketType::from_u16(u16::from_be_bytes([bytes[4], bytes[5]]))?;

        let payload_length = u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        if payload_length > max_payload {
            return Err(FrameError::TooLarge {
                length: payload_length,
                max: max_payload,
            });
        }

        let crc32 = u32::from_be_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);
        let sender_id = u32::from_be_bytes([bytes[14], bytes[15], bytes[16], bytes[17]]);
        let flags = u16::from_be_bytes([bytes[18], bytes[19]]);

        Ok(Self {
            packet_type,
            payload_length,
            crc32,
            sender_id,
            flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let h = PacketHeader {
            packet_type: PacketType::AudioFrame,
            payload_length: 1234,
            crc32: 0xCAFEBABE,
            sender_id: 7,
            flags: FLAG_ENCRYPTED,
        };
        let bytes = h.to_bytes();
        let parsed = PacketHeader::parse(&bytes, DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes = PacketHeader {
            packet_type: PacketType::Ping,
            payload_length: 0,
            crc32: 0,
            sender_id: 0,
            flags: 0,
        }
        .to_bytes();
        bytes[0] ^= 0xFF;
        assert!(matches!(
            PacketHeader::parse(&bytes, DEFAULT_MAX_PAYLOAD),
            Err(FrameError::BadMagic(_))
        ));
    }

    #[test]
    fn oversize_rejected_at_header() {
        let h = PacketHeader {
            packet_type: PacketType::ImageFrame,
            payload_length: DEFAULT_MAX_PAYLOAD + 1,
            crc32: 0,
            sender_id: 1,
            flags: 0,
        };
        let err = PacketHeader::parse(&h.to_bytes(), DEFAULT_MAX_PAYLOAD).unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { .. }));
    }

    #[test]
    fn crc_is_castagnoli() {
        // Known CRC-32C vector: "123456789" -> 0xE3069283
        assert_eq!(payload_crc(b"123456789"), 0xE306_9283);
    }
}
