use thiserror::Error;

use crate::types::PacketType;

/// A malformed frame header or integrity failure.
///
/// Everything here means the byte stream can no longer be trusted; the
/// connection carrying it is torn down rather than resynchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("bad magic: 0x{0:08x}")]
    BadMagic(u32),

    #[error("unknown packet type: 0x{0:04x}")]
    UnknownType(u16),

    #[error("payload length {length} exceeds maximum {max}")]
    TooLarge { length: u32, max: u32 },

    #[error("crc mismatch: header says 0x{expected:08x}, payload is 0x{computed:08x}")]
    CrcMismatch { expected: u32, computed: u32 },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("bad frame: {0}")]
    BadFrame(#[from] FrameError),

    /// A structurally valid packet whose body bytes do not parse.
    #[error("malformed {packet_type:?} body: {detail}")]
    BadBody {
        packet_type: PacketType,
        detail: &'static str,
    },

    #[error("display name too long: {0} bytes (max 32)")]
    NameTooLong(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub(crate) fn body(packet_type: PacketType, detail: &'static str) -> Self {
        Self::BadBody {
            packet_type,
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_error_display() {
        let e = FrameError::CrcMismatch {
            expected: 0xDEADBEEF,
            computed: 0x12345678,
        };
        let msg = e.to_string();
        assert!(msg.contains("deadbeef"));
        assert!(msg.contains("12345678"));
    }

    #[test]
    fn too_large_display() {
        let e = FrameError::TooLarge {
            length: 5_000_000,
            max: 2_097_152,
        };
        assert!(e.to_string().contains("5000000"));
    }

    #[test]
    fn bad_frame_wraps_frame_error() {
        let e: ProtocolError = FrameError::BadMagic(0x41414141).into();
        assert!(matches!(e, ProtocolError::BadFrame(FrameError::BadMagic(_))));
    }
}
