use bytes::{Buf, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::header::{payload_crc, PacketHeader, HEADER_SIZE};
use crate::types::{ClientId, PacketType};

/// One decoded frame: validated header plus the exact payload bytes the
/// header's length field announced. Payload is still ciphertext when the
/// encrypted flag is set; the transport layer opens it.
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

/// Encode one packet into its wire form, computing the CRC over `payload`.
pub fn encode_packet(
    packet_type: PacketType,
    sender_id: ClientId,
    flags: u16,
    payload: &[u8],
) -> Vec<u8> {
    let header = PacketHeader {
        packet_type,
        payload_length: payload.len() as u32,
        crc32: payload_crc(payload),
        sender_id,
        flags,
    };
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Attempt to extract one complete packet from the accumulation buffer.
///
/// Returns `Ok(Some(packet))` when a full frame was consumed,
/// `Ok(None)` when more bytes are needed, and `Err` on a bad frame.
/// Header validation (magic, type, length bound) happens as soon as the
/// 20 header bytes are present — before the payload has been buffered.
pub fn try_decode(buf: &mut BytesMut, max_payload: u32) -> Result<Option<Packet>, ProtocolError> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }

    let header = PacketHeader::parse(&buf[..HEADER_SIZE], max_payload)?;

    let total = HEADER_SIZE + header.payload_length as usize;
    if buf.len() < total {
        return Ok(None);
    }

    buf.advance(HEADER_SIZE);
    let payload = buf.split_to(header.payload_length as usize).freeze();

    let computed = payload_crc(&payload);
    if computed != header.crc32 {
        return Err(crate::error::FrameError::CrcMismatch {
            expected: header.crc32,
            computed,
        }
        .into());
    }

    Ok(Some(Packet { header, payload }))
}
