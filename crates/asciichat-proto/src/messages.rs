//! Typed packet bodies and their wire encodings.
//!
//! All multi-byte fields are big-endian. Variable-length trailing data
//! (image pixels, PCM samples, glyph streams) is bounded by the outer
//! packet's `payload_length`, which the codec has already validated.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::types::{
    AuthFailReason, AuthMethod, ColorDepth, Compression, MediaKind, PacketType, PixelFormat,
};

/// Maximum display name length in bytes (UTF-8).
pub const MAX_DISPLAY_NAME: usize = 32;

/// X25519 public key length.
pub const KX_PUB_LEN: usize = 32;
/// Ed25519 public key length.
pub const IDENTITY_PUB_LEN: usize = 32;
/// Ed25519 signature length.
pub const SIGNATURE_LEN: usize = 64;
/// Server challenge nonce length.
pub const CHALLENGE_LEN: usize = 32;
/// HMAC-SHA256 proof length.
pub const HMAC_LEN: usize = 32;

// ── Handshake bodies ──────────────────────────────────────────────────

/// First packet of the exchange, server → client.
///
/// Wire: `eph_pub(32) ‖ has_identity(1) ‖ [identity_pub(32) ‖ signature(64)]`
/// where the signature covers the ephemeral public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KxInit {
    pub ephemeral_pub: [u8; KX_PUB_LEN],
    pub identity: Option<KxIdentity>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KxIdentity {
    pub identity_pub: [u8; IDENTITY_PUB_LEN],
    pub signature: [u8; SIGNATURE_LEN],
}

/// Client's half of the key exchange. Wire: `eph_pub(32)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KxResp {
    pub ephemeral_pub: [u8; KX_PUB_LEN],
}

/// Server-issued challenge. Wire: `nonce(32)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub nonce: [u8; CHALLENGE_LEN],
}

/// Client proof. Wire: `method(1) ‖ [identity_pub(32)] ‖ proof`.
/// The proof is a 32-byte HMAC for `Password`, a 64-byte signature for
/// `SignedKey`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub method: AuthMethod,
    pub identity_pub: Option<[u8; IDENTITY_PUB_LEN]>,
    pub proof: Vec<u8>,
}

/// Server's confirmation MAC over the transcript. Wire: `confirm(32)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAuthResponse {
    pub confirm: [u8; HMAC_LEN],
}

/// Terminal handshake failure. Wire: `code(1) ‖ reason_len(2) ‖ reason`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailed {
    pub code: AuthFailReason,
    pub reason: String,
}

// ── Session bodies ────────────────────────────────────────────────────

/// Sent by a client right after the handshake (or connection, when
/// encryption is disabled). A major version mismatch is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientJoin {
    pub major: u16,
    pub minor: u16,
    pub features: u32,
    pub compression: Compression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub bits: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayName {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalCaps {
    pub color: ColorDepth,
    pub utf8: bool,
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub flags: u16,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub sample_rate: u32,
    pub channels: u8,
    pub samples: Vec<i16>,
}

impl AudioFrame {
    /// Samples per channel.
    pub fn frame_count(&self) -> u32 {
        (self.samples.len() / self.channels.max(1) as usize) as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsciiFrame {
    pub width: u32,
    pub height: u32,
    pub flags: u16,
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerState {
    pub connected: u32,
    pub video_sources: u32,
    pub audio_sources: u32,
}

// ── Unified message ───────────────────────────────────────────────────

/// Every body the protocol knows, tagged by its packet type.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    KxInit(KxInit),
    KxResp(KxResp),
    AuthChallenge(AuthChallenge),
    AuthResponse(AuthResponse),
    ServerAuthResponse(ServerAuthResponse),
    AuthFailed(AuthFailed),
    HandshakeComplete,
    ClientJoin(ClientJoin),
    ClientLeave,
    Capabilities(Capabilities),
    DisplayName(DisplayName),
    TerminalCaps(TerminalCaps),
    StreamStart(MediaKind),
    StreamStop(MediaKind),
    ImageFrame(ImageFrame),
    AudioFrame(AudioFrame),
    AsciiFrame(AsciiFrame),
    ClearConsole,
    ServerState(ServerState),
    Ping(u64),
    Pong(u64),
}

impl WireMessage {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::KxInit(_) => PacketType::KxInit,
            Self::KxResp(_) => PacketType::KxResp,
            Self::AuthChallenge(_) => PacketType::AuthChallenge,
            Self::AuthResponse(_) => PacketType::AuthResponse,
            Self::ServerAuthResponse(_) => PacketType::ServerAuthResponse,
            Self::AuthFailed(_) => PacketType::AuthFailed,
            Self::HandshakeComplete => PacketType::HandshakeComplete,
            Self::ClientJoin(_) => PacketType::ClientJoin,
            Self::ClientLeave => PacketType::ClientLeave,
            Self::Capabilities(_) => PacketType::Capabilities,
            Self::DisplayName(_) => PacketType::DisplayName,
            Self::TerminalCaps(_) => PacketType::TerminalCaps,
            Self::StreamStart(_) => PacketType::StreamStart,
            Self::StreamStop(_) => PacketType::StreamStop,
            Self::ImageFrame(_) => PacketType::ImageFrame,
            Self::AudioFrame(_) => PacketType::AudioFrame,
            Self::AsciiFrame(_) => PacketType::AsciiFrame,
            Self::ClearConsole => PacketType::ClearConsole,
            Self::ServerState(_) => PacketType::ServerState,
            Self::Ping(_) => PacketType::Ping,
            Self::Pong(_) => PacketType::Pong,
        }
    }

    /// Serialize the body (header not included).
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::KxInit(m) => {
                let mut buf = Vec::with_capacity(KX_PUB_LEN + 1 + 96);
                buf.extend_from_slice(&m.ephemeral_pub);
                match &m.identity {
                    Some(id) => {
                        buf.push(1);
                        buf.extend_from_slice(&id.identity_pub);
                        buf.extend_from_slice(&id.signature);
                    }
                    None => buf.push(0),
                }
                buf
            }
            Self::KxResp(m) => m.ephemeral_pub.to_vec(),
            Self::AuthChallenge(m) => m.nonce.to_vec(),
            Self::AuthResponse(m) => {
                let mut buf = Vec::with_capacity(1 + 32 + m.proof.len());
                buf.push(m.method as u8);
                if let Some(pk) = &m.identity_pub {
                    buf.extend_from_slice(pk);
                }
                buf.extend_from_slice(&m.proof);
                buf
            }
            Self::ServerAuthResponse(m) => m.confirm.to_vec(),
            Self::AuthFailed(m) => {
                let reason = m.reason.as_bytes();
                let mut buf = Vec::with_capacity(3 + reason.len());
                buf.push(m.code as u8);
                buf.extend_from_slice(&(reason.len() as u16).to_be_bytes());
                buf.extend_from_slice(reason);
                buf
            }
            Self::HandshakeComplete | Self::ClientLeave | Self::ClearConsole => Vec::new(),
            Self::ClientJoin(m) => {
                let mut buf = Vec::with_capacity(9);
                buf.extend_from_slice(&m.major.to_be_bytes());
                buf.extend_from_slice(&m.minor.to_be_bytes());
                buf.extend_from_slice(&m.features.to_be_bytes());
                buf.push(m.compression as u8);
                buf
            }
            Self::Capabilities(m) => m.bits.to_be_bytes().to_vec(),
            Self::DisplayName(m) => {
                let name = m.name.as_bytes();
                let mut buf = Vec::with_capacity(1 + name.len());
                buf.push(name.len() as u8);
                buf.extend_from_slice(name);
                buf
            }
            Self::TerminalCaps(m) => {
                let mut buf = Vec::with_capacity(6);
                buf.push(m.color as u8);
                buf.push(m.utf8 as u8);
                buf.extend_from_slice(&m.width.to_be_bytes());
                buf.extend_from_slice(&m.height.to_be_bytes());
                buf
            }
            Self::StreamStart(kind) | Self::StreamStop(kind) => vec![*kind as u8],
            Self::ImageFrame(m) => {
                let mut buf = Vec::with_capacity(11 + m.data.len());
                buf.extend_from_slice(&m.width.to_be_bytes());
                buf.extend_from_slice(&m.height.to_be_bytes());
                buf.push(m.format as u8);
                buf.extend_from_slice(&m.flags.to_be_bytes());
                buf.extend_from_slice(&m.data);
                buf
            }
            Self::AudioFrame(m) => {
                let mut buf = Vec::with_capacity(9 + m.samples.len() * 2);
                buf.extend_from_slice(&m.sample_rate.to_be_bytes());
                buf.push(m.channels);
                buf.extend_from_slice(&m.frame_count().to_be_bytes());
                for s in &m.samples {
                    buf.extend_from_slice(&s.to_be_bytes());
                }
                buf
            }
            Self::AsciiFrame(m) => {
                let mut buf = Vec::with_capacity(10 + m.data.len());
                buf.extend_from_slice(&m.width.to_be_bytes());
                buf.extend_from_slice(&m.height.to_be_bytes());
                buf.extend_from_slice(&m.flags.to_be_bytes());
                buf.extend_from_slice(&m.data);
                buf
            }
            Self::ServerState(m) => {
                let mut buf = Vec::with_capacity(12);
                buf.extend_from_slice(&m.connected.to_be_bytes());
                buf.extend_from_slice(&m.video_sources.to_be_bytes());
                buf.extend_from_slice(&m.audio_sources.to_be_bytes());
                buf
            }
            Self::Ping(ts) | Self::Pong(ts) => ts.to_be_bytes().to_vec(),
        }
    }

    /// Parse a body for the given packet type.
    pub fn decode(packet_type: PacketType, payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = Reader::new(packet_type, payload);
        let msg = match packet_type {
            PacketType::KxInit => {
                let ephemeral_pub = r.array::<KX_PUB_LEN>()?;
                let identity = match r.u8()? {
                    0 => None,
                    1 => Some(KxIdentity {
                        identity_pub: r.array::<IDENTITY_PUB_LEN>()?,
                        signature: r.array::<SIGNATURE_LEN>()?,
                    }),
                    _ => return Err(ProtocolError::body(packet_type, "bad identity tag")),
                };
                Self::KxInit(KxInit {
                    ephemeral_pub,
                    identity,
                })
            }
            PacketType::KxResp => Self::KxResp(KxResp {
                ephemeral_pub: r.array::<KX_PUB_LEN>()?,
            }),
            PacketType::AuthChallenge => Self::AuthChallenge(AuthChallenge {
                nonce: r.array::<CHALLENGE_LEN>()?,
            }),
            PacketType::AuthResponse => {
                let method = AuthMethod::from_byte(r.u8()?)
                    .ok_or(ProtocolError::body(packet_type, "bad auth method"))?;
                let identity_pub = match method {
                    AuthMethod::Password => None,
                    AuthMethod::SignedKey => Some(r.array::<IDENTITY_PUB_LEN>()?),
                };
                let expected = match method {
                    AuthMethod::Password => HMAC_LEN,
                    AuthMethod::SignedKey => SIGNATURE_LEN,
                };
                let proof = r.take(expected)?.to_vec();
                Self::AuthResponse(AuthResponse {
                    method,
                    identity_pub,
                    proof,
                })
            }
            PacketType::ServerAuthResponse => Self::ServerAuthResponse(ServerAuthResponse {
                confirm: r.array::<HMAC_LEN>()?,
            }),
            PacketType::AuthFailed => {
                let code = AuthFailReason::from_byte(r.u8()?)
                    .ok_or(ProtocolError::body(packet_type, "bad reason code"))?;
                let len = r.u16()? as usize;
                let reason = String::from_utf8(r.take(len)?.to_vec())
                    .map_err(|_| ProtocolError::body(packet_type, "reason not utf-8"))?;
                Self::AuthFailed(AuthFailed { code, reason })
            }
            PacketType::HandshakeComplete => Self::HandshakeComplete,
            PacketType::ClientJoin => {
                let major = r.u16()?;
                let minor = r.u16()?;
                let features = r.u32()?;
                let compression = Compression::from_byte(r.u8()?)
                    .ok_or(ProtocolError::body(packet_type, "bad compression mode"))?;
                Self::ClientJoin(ClientJoin {
                    major,
                    minor,
                    features,
                    compression,
                })
            }
            PacketType::ClientLeave => Self::ClientLeave,
            PacketType::Capabilities => Self::Capabilities(Capabilities { bits: r.u32()? }),
            PacketType::DisplayName => {
                let len = r.u8()? as usize;
                if len > MAX_DISPLAY_NAME {
                    return Err(ProtocolError::NameTooLong(len));
                }
                let name = String::from_utf8(r.take(len)?.to_vec())
                    .map_err(|_| ProtocolError::body(packet_type, "name not utf-8"))?;
                Self::DisplayName(DisplayName { name })
            }
            PacketType::TerminalCaps => {
                let color = ColorDepth::from_byte(r.u8()?)
                    .ok_or(ProtocolError::body(packet_type, "bad color depth"))?;
                let utf8 = r.u8()? != 0;
                Self::TerminalCaps(TerminalCaps {
                    color,
                    utf8,
                    width: r.u16()?,
                    height: r.u16()?,
                })
            }
            PacketType::StreamStart | PacketType::StreamStop => {
                let kind = MediaKind::from_byte(r.u8()?)
                    .ok_or(ProtocolError::body(packet_type, "bad media kind"))?;
                if packet_type == PacketType::StreamStart {
                    Self::StreamStart(kind)
                } else {
                    Self::StreamStop(kind)
                }
            }
            PacketType::ImageFrame => {
                let width = r.u32()?;
                let height = r.u32()?;
                let format = PixelFormat::from_byte(r.u8()?)
                    .ok_or(ProtocolError::body(packet_type, "bad pixel format"))?;
                let flags = r.u16()?;
                let data = Bytes::copy_from_slice(r.rest());
                // Uncompressed frames must carry exactly width*height pixels.
                if flags & crate::types::image_flags::COMPRESSED == 0 {
                    let expected =
                        width as u64 * height as u64 * format.bytes_per_pixel() as u64;
                    if data.len() as u64 != expected {
                        return Err(ProtocolError::body(packet_type, "pixel data size mismatch"));
                    }
                }
                Self::ImageFrame(ImageFrame {
                    width,
                    height,
                    format,
                    flags,
                    data,
                })
            }
            PacketType::AudioFrame => {
                let sample_rate = r.u32()?;
                let channels = r.u8()?;
                if channels == 0 {
                    return Err(ProtocolError::body(packet_type, "zero channels"));
                }
                let frame_count = r.u32()? as usize;
                let total = frame_count
                    .checked_mul(channels as usize)
                    .ok_or(ProtocolError::body(packet_type, "sample count overflow"))?;
                let raw = r.take(total * 2)?;
                let samples = raw
                    .chunks_exact(2)
                    .map(|c| i16::from_be_bytes([c[0], c[1]]))
                    .collect();
                Self::AudioFrame(AudioFrame {
                    sample_rate,
                    channels,
                    samples,
                })
            }
            PacketType::AsciiFrame => {
                let width = r.u32()?;
                let height = r.u32()?;
                let flags = r.u16()?;
                let data = Bytes::copy_from_slice(r.rest());
                Self::AsciiFrame(AsciiFrame {
                    width,
                    height,
                    flags,
                    data,
                })
            }
            PacketType::ClearConsole => Self::ClearConsole,
            PacketType::ServerState => Self::ServerState(ServerState {
                connected: r.u32()?,
                video_sources: r.u32()?,
                audio_sources: r.u32()?,
            }),
            PacketType::Ping => Self::Ping(r.u64()?),
            PacketType::Pong => Self::Pong(r.u64()?),
        };
        Ok(msg)
    }
}

/// Bounds-checked cursor over a body slice.
struct Reader<'a> {
    packet_type: PacketType,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(packet_type: PacketType, buf: &'a [u8]) -> Self {
        Self {
            packet_type,
            buf,
            pos: 0,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.buf.len() - self.pos < n {
            return Err(ProtocolError::body(self.packet_type, "truncated body"));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ProtocolError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, ProtocolError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::caps;

    fn roundtrip(msg: WireMessage) -> WireMessage {
        let encoded = msg.encode();
        WireMessage::decode(msg.packet_type(), &encoded).unwrap()
    }

    #[test]
    fn client_join_roundtrip() {
        let msg = WireMessage::ClientJoin(ClientJoin {
            major: 1,
            minor: 0,
            features: crate::types::features::RLE,
            compression: Compression::None,
        });
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn display_name_limit() {
        let long = "x".repeat(40);
        let mut payload = vec![long.len() as u8];
        payload.extend_from_slice(long.as_bytes());
        let err = WireMessage::decode(PacketType::DisplayName, &payload).unwrap_err();
        assert!(matches!(err, ProtocolError::NameTooLong(40)));
    }

    #[test]
    fn audio_frame_roundtrip() {
        let msg = WireMessage::AudioFrame(AudioFrame {
            sample_rate: 44_100,
            channels: 1,
            samples: vec![0, 100, -100, i16::MAX, i16::MIN],
        });
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn audio_frame_truncated_samples() {
        // Header claims 4 frames but only 2 samples of data follow.
        let mut payload = Vec::new();
        payload.extend_from_slice(&44_100u32.to_be_bytes());
        payload.push(1);
        payload.extend_from_slice(&4u32.to_be_bytes());
        payload.extend_from_slice(&[0, 1, 0, 2]);
        let err = WireMessage::decode(PacketType::AudioFrame, &payload).unwrap_err();
        assert!(matches!(err, ProtocolError::BadBody { .. }));
    }

    #[test]
    fn image_frame_size_enforced() {
        let msg = WireMessage::ImageFrame(ImageFrame {
            width: 2,
            height: 2,
            format: PixelFormat::Rgb,
            flags: 0,
            data: Bytes::from_static(&[0u8; 12]),
        });
        assert_eq!(roundtrip(msg.clone()), msg);

        let mut bad = msg.encode();
        bad.pop();
        let err = WireMessage::decode(PacketType::ImageFrame, &bad).unwrap_err();
        assert!(matches!(err, ProtocolError::BadBody { .. }));
    }

    #[test]
    fn capabilities_roundtrip() {
        let msg = WireMessage::Capabilities(Capabilities {
            bits: caps::VIDEO | caps::AUDIO,
        });
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn terminal_caps_roundtrip() {
        let msg = WireMessage::TerminalCaps(TerminalCaps {
            color: ColorDepth::TrueColor,
            utf8: true,
            width: 120,
            height: 40,
        });
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn auth_failed_roundtrip() {
        let msg = WireMessage::AuthFailed(AuthFailed {
            code: AuthFailReason::NotAuthorized,
            reason: "key not in whitelist".into(),
        });
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn empty_bodies() {
        for msg in [
            WireMessage::ClientLeave,
            WireMessage::ClearConsole,
            WireMessage::HandshakeComplete,
        ] {
            assert!(msg.encode().is_empty());
            assert_eq!(roundtrip(msg.clone()), msg);
        }
    }

    // Pins the handshake wire layout. If one of these breaks, the protocol
    // changed and every peer has to change with it.
    #[test]
    fn handshake_golden_vectors() {
        let eph = [0x11u8; 32];
        let msg = WireMessage::KxInit(KxInit {
            ephemeral_pub: eph,
            identity: None,
        });
        let mut expected = vec![0x11u8; 32];
        expected.push(0);
        assert_eq!(msg.encode(), expected);

        let msg = WireMessage::KxInit(KxInit {
            ephemeral_pub: eph,
            identity: Some(KxIdentity {
                identity_pub: [0x22; 32],
                signature: [0x33; 64],
            }),
        });
        let mut expected = vec![0x11u8; 32];
        expected.push(1);
        expected.extend_from_slice(&[0x22; 32]);
        expected.extend_from_slice(&[0x33; 64]);
        assert_eq!(msg.encode(), expected);

        let msg = WireMessage::AuthResponse(AuthResponse {
            method: AuthMethod::Password,
            identity_pub: None,
            proof: vec![0x44; 32],
        });
        let mut expected = vec![1u8];
        expected.extend_from_slice(&[0x44; 32]);
        assert_eq!(msg.encode(), expected);

        let msg = WireMessage::AuthResponse(AuthResponse {
            method: AuthMethod::SignedKey,
            identity_pub: Some([0x55; 32]),
            proof: vec![0x66; 64],
        });
        let mut expected = vec![2u8];
        expected.extend_from_slice(&[0x55; 32]);
        expected.extend_from_slice(&[0x66; 64]);
        assert_eq!(msg.encode(), expected);
    }

    #[test]
    fn kx_init_decode_variants() {
        let enc = WireMessage::KxInit(KxInit {
            ephemeral_pub: [7; 32],
            identity: None,
        })
        .encode();
        match WireMessage::decode(PacketType::KxInit, &enc).unwrap() {
            WireMessage::KxInit(k) => {
                assert_eq!(k.ephemeral_pub, [7; 32]);
                assert!(k.identity.is_none());
            }
            other => panic!("wrong variant: {other:?}"),
        }

        // Bad identity tag byte
        let mut bad = enc;
        bad[32] = 9;
        assert!(WireMessage::decode(PacketType::KxInit, &bad).is_err());
    }
}
