use crate::error::FrameError;

/// Unique client identifier assigned by the server at admission.
/// Zero is reserved: a slot whose id is 0 is empty.
pub type ClientId = u32;

/// Packet type codes. Values are part of the wire contract and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PacketType {
    // Handshake (plaintext, pre-session)
    KxInit = 0x01,
    KxResp = 0x02,
    AuthChallenge = 0x03,
    AuthResponse = 0x04,
    ServerAuthResponse = 0x05,
    AuthFailed = 0x06,
    HandshakeComplete = 0x07,

    // Session control
    ClientJoin = 0x10,
    ClientLeave = 0x11,
    Capabilities = 0x12,
    DisplayName = 0x13,
    TerminalCaps = 0x14,
    StreamStart = 0x15,
    StreamStop = 0x16,

    // Media
    ImageFrame = 0x20,
    AudioFrame = 0x21,
    AsciiFrame = 0x22,
    ClearConsole = 0x23,
    ServerState = 0x24,

    // Liveness
    Ping = 0x30,
    Pong = 0x31,
}

impl PacketType {
    pub fn from_u16(v: u16) -> Result<Self, FrameError> {
        match v {
            0x01 => Ok(Self::KxInit),
            0x02 => Ok(Self::KxResp),
            0x03 => Ok(Self::AuthChallenge),
            0x04 => Ok(Self::AuthResponse),
            0x05 => Ok(Self::ServerAuthResponse),
            0x06 => Ok(Self::AuthFailed),
            0x07 => Ok(Self::HandshakeComplete),
            0x10 => Ok(Self::ClientJoin),
            0x11 => Ok(Self::ClientLeave),
            0x12 => Ok(Self::Capabilities),
            0x13 => Ok(Self::DisplayName),
            0x14 => Ok(Self::TerminalCaps),
            0x15 => Ok(Self::StreamStart),
            0x16 => Ok(Self::StreamStop),
            0x20 => Ok(Self::ImageFrame),
            0x21 => Ok(Self::AudioFrame),
            0x22 => Ok(Self::AsciiFrame),
            0x23 => Ok(Self::ClearConsole),
            0x24 => Ok(Self::ServerState),
            0x30 => Ok(Self::Ping),
            0x31 => Ok(Self::Pong),
            other => Err(FrameError::UnknownType(other)),
        }
    }

    /// True for the packet types that drive the key exchange. Only these
    /// are legal before a session reaches READY.
    pub fn is_handshake(self) -> bool {
        (self as u16) < 0x10
    }
}

/// Client capability bits carried in `Capabilities`.
pub mod caps {
    pub const VIDEO: u32 = 1 << 0;
    pub const AUDIO: u32 = 1 << 1;
    pub const STRETCH: u32 = 1 << 2;
    pub const TERMINAL_CAPS: u32 = 1 << 3;
}

/// Protocol feature bits carried in `ClientJoin`.
pub mod features {
    pub const RLE: u32 = 1 << 0;
    pub const DELTA_FRAMES: u32 = 1 << 1;
}

/// Image frame flags.
pub mod image_flags {
    pub const HAS_COLOR: u16 = 1 << 0;
    pub const COMPRESSED: u16 = 1 << 1;
    pub const RLE: u16 = 1 << 2;
    pub const STRETCHED: u16 = 1 << 3;
}

/// ASCII frame flags.
pub mod ascii_flags {
    pub const COLOR: u16 = 1 << 0;
    pub const UNICODE: u16 = 1 << 1;
}

/// Payload compression negotiated in `ClientJoin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Compression {
    #[default]
    None = 0,
    Zlib = 1,
    Lz4 = 2,
    Zstd = 3,
}

impl Compression {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::None),
            1 => Some(Self::Zlib),
            2 => Some(Self::Lz4),
            3 => Some(Self::Zstd),
            _ => None,
        }
    }
}

/// Pixel layout of an `ImageFrame` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PixelFormat {
    Rgb = 0,
    Rgba = 1,
    Bgr = 2,
    Bgra = 3,
}

impl PixelFormat {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Rgb),
            1 => Some(Self::Rgba),
            2 => Some(Self::Bgr),
            3 => Some(Self::Bgra),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb | Self::Bgr => 3,
            Self::Rgba | Self::Bgra => 4,
        }
    }
}

/// Media kind for `StreamStart`/`StreamStop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MediaKind {
    Video = 0,
    Audio = 1,
}

impl MediaKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Video),
            1 => Some(Self::Audio),
            _ => None,
        }
    }
}

/// Terminal color support reported in `TerminalCaps`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ColorDepth {
    #[default]
    Mono = 0,
    Ansi16 = 1,
    Ansi256 = 2,
    TrueColor = 3,
}

impl ColorDepth {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Mono),
            1 => Some(Self::Ansi16),
            2 => Some(Self::Ansi256),
            3 => Some(Self::TrueColor),
            _ => None,
        }
    }
}

/// Authentication method byte in `AuthResponse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthMethod {
    Password = 1,
    SignedKey = 2,
}

impl AuthMethod {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Password),
            2 => Some(Self::SignedKey),
            _ => None,
        }
    }
}

/// Reason codes carried in `AuthFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthFailReason {
    VersionMismatch = 1,
    NotAuthorized = 2,
    BadProof = 3,
    ServerFull = 4,
    Internal = 5,
}

impl AuthFailReason {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::VersionMismatch),
            2 => Some(Self::NotAuthorized),
            3 => Some(Self::BadProof),
            4 => Some(Self::ServerFull),
            5 => Some(Self::Internal),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_type_roundtrip_all() {
        for code in [
            0x01u16, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15,
            0x16, 0x20, 0x21, 0x22, 0x23, 0x24, 0x30, 0x31,
        ] {
            let t = PacketType::from_u16(code).unwrap();
            assert_eq!(t as u16, code);
        }
    }

    #[test]
    fn packet_type_unknown() {
        assert!(matches!(
            PacketType::from_u16(0xFFFF),
            Err(FrameError::UnknownType(0xFFFF))
        ));
    }

    #[test]
    fn handshake_classification() {
        assert!(PacketType::KxInit.is_handshake());
        assert!(PacketType::AuthFailed.is_handshake());
        assert!(!PacketType::Ping.is_handshake());
        assert!(!PacketType::ClientJoin.is_handshake());
    }

    #[test]
    fn pixel_format_sizes() {
        assert_eq!(PixelFormat::Rgb.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Bgra.bytes_per_pixel(), 4);
        assert!(PixelFormat::from_byte(9).is_none());
    }
}
