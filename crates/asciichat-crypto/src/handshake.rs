//! The authenticated key-exchange state machines, one per role.
//!
//! Both drivers are sans-I/O: each incoming handshake message is handed to
//! the machine, which either advances and returns the reply to send, or
//! fails and stays failed. Any message arriving in the wrong state is
//! rejected with `UnexpectedState` and leaves the context untouched.
//!
//! Key schedule: X25519 ephemeral agreement, transcript hash
//! `SHA-256(context ‖ server_eph ‖ client_eph)`, HKDF-SHA256 expansion
//! into one 32-byte ChaCha20-Poly1305 key per direction.

use std::sync::Arc;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroizing;

use asciichat_proto::messages::{
    AuthChallenge, AuthFailed, AuthResponse, KxIdentity, KxInit, KxResp, ServerAuthResponse,
    CHALLENGE_LEN, HMAC_LEN,
};
use asciichat_proto::types::{AuthFailReason, AuthMethod};
use asciichat_proto::WireMessage;

use crate::known_hosts::KnownHosts;
use crate::whitelist::Whitelist;

type HmacSha256 = Hmac<Sha256>;

/// Domain separator mixed into the transcript hash.
const CONTEXT: &[u8] = b"asciichat-handshake-v1";
const INFO_C2S: &[u8] = b"asciichat c2s";
const INFO_S2C: &[u8] = b"asciichat s2c";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Init,
    KeyExchange,
    Authenticating,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeErrorKind {
    /// A handshake message arrived in a state that does not expect it.
    UnexpectedState,
    /// Key agreement itself failed (low-order point, bad signature on the
    /// ephemeral, malformed key material).
    KeyExchange,
    /// The peer's proof did not verify.
    AuthenticationFailed,
    /// Proof verified but the identity is not in the whitelist.
    NotAuthorized,
    /// The server's long-term key does not match the known-hosts record.
    PeerIdentityChanged,
    /// The peer went away mid-handshake.
    PeerClosed,
}

#[derive(Debug, Error)]
#[error("handshake failed ({kind:?}): {reason}")]
pub struct HandshakeError {
    pub kind: HandshakeErrorKind,
    pub reason: String,
}

impl HandshakeError {
    pub fn new(kind: HandshakeErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    /// The wire reason code a server reports for this failure.
    pub fn fail_code(&self) -> AuthFailReason {
        match self.kind {
            HandshakeErrorKind::NotAuthorized => AuthFailReason::NotAuthorized,
            HandshakeErrorKind::AuthenticationFailed => AuthFailReason::BadProof,
            _ => AuthFailReason::Internal,
        }
    }
}

/// Directional AEAD keys handed to the transport once a side is READY.
/// `send` seals outbound payloads, `recv` opens inbound ones.
#[derive(Debug)]
pub struct SessionKeys {
    pub send: Zeroizing<[u8; 32]>,
    pub recv: Zeroizing<[u8; 32]>,
}

/// What the server authenticates clients against.
///
/// With neither a password nor a whitelist configured, any peer that
/// completes the key exchange is admitted (the empty-password HMAC still
/// binds the proof to the transcript).
#[derive(Default)]
pub struct ServerAuthConfig {
    pub password: Option<Zeroizing<String>>,
    pub whitelist: Option<Arc<Whitelist>>,
}

/// Client-side credentials.
#[derive(Default)]
pub struct ClientAuth {
    pub password: Option<Zeroizing<String>>,
    pub identity: Option<SigningKey>,
}

fn transcript_hash(server_eph: &[u8; 32], client_eph: &[u8; 32]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(CONTEXT);
    h.update(server_eph);
    h.update(client_eph);
    h.finalize().into()
}

fn derive_keys(
    shared: &[u8; 32],
    transcript: &[u8; 32],
) -> (Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>) {
    let hk = Hkdf::<Sha256>::new(Some(transcript), shared);
    let mut c2s = Zeroizing::new([0u8; 32]);
    let mut s2c = Zeroizing::new([0u8; 32]);
    hk.expand(INFO_C2S, c2s.as_mut())
        .expect("okm length is valid for sha256");
    hk.expand(INFO_S2C, s2c.as_mut())
        .expect("okm length is valid for sha256");
    (c2s, s2c)
}

fn hmac_over(key: &[u8], parts: &[&[u8]]) -> [u8; HMAC_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    for p in parts {
        mac.update(p);
    }
    mac.finalize().into_bytes().into()
}

fn unexpected(state: HandshakeState, what: &str) -> HandshakeError {
    HandshakeError::new(
        HandshakeErrorKind::UnexpectedState,
        format!("{what} in state {state:?}"),
    )
}

// ── Server side ───────────────────────────────────────────────────────

/// The server accept result: the confirmation to send, the installed
/// session keys, and the peer's identity key when key auth was used.
#[derive(Debug)]
pub struct ServerAccept {
    pub reply: WireMessage,
    pub keys: SessionKeys,
    pub peer_identity: Option<[u8; 32]>,
}

pub struct ServerHandshake {
    state: HandshakeState,
    identity: Option<SigningKey>,
    auth: ServerAuthConfig,
    eph_secret: Option<EphemeralSecret>,
    eph_pub: [u8; 32],
    challenge: [u8; 32],
    transcript: [u8; 32],
    keys: Option<(Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>)>,
}

impl ServerHandshake {
    pub fn new(identity: Option<SigningKey>, auth: ServerAuthConfig) -> Self {
        let eph_secret = EphemeralSecret::random_from_rng(OsRng);
        let eph_pub = PublicKey::from(&eph_secret).to_bytes();
        Self {
            state: HandshakeState::Init,
            identity,
            auth,
            eph_secret: Some(eph_secret),
            eph_pub,
            challenge: [0; CHALLENGE_LEN],
            transcript: [0; 32],
            keys: None,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// INIT → KEY_EXCHANGE: emit `KxInit`, signing the ephemeral key with
    /// the long-term identity when one is configured.
    pub fn start(&mut self) -> Result<WireMessage, HandshakeError> {
        if self.state != HandshakeState::Init {
            return Err(unexpected(self.state, "start"));
        }
        let identity = self.identity.as_ref().map(|key| KxIdentity {
            identity_pub: key.verifying_key().to_bytes(),
            signature: key.sign(&self.eph_pub).to_bytes(),
        });
        self.state = HandshakeState::KeyExchange;
        Ok(WireMessage::KxInit(KxInit {
            ephemeral_pub: self.eph_pub,
            identity,
        }))
    }

    /// KEY_EXCHANGE → AUTHENTICATING: derive the session keys and issue
    /// the challenge.
    pub fn on_kx_resp(&mut self, kx: &KxResp) -> Result<WireMessage, HandshakeError> {
        if self.state != HandshakeState::KeyExchange {
            return Err(unexpected(self.state, "KX_RESP"));
        }
        let secret = self.eph_secret.take().expect("ephemeral used once");
        let shared = secret.diffie_hellman(&PublicKey::from(kx.ephemeral_pub));
        if !shared.was_contributory() {
            self.state = HandshakeState::Failed;
            return Err(HandshakeError::new(
                HandshakeErrorKind::KeyExchange,
                "non-contributory shared secret",
            ));
        }

        self.transcript = transcript_hash(&self.eph_pub, &kx.ephemeral_pub);
        self.keys = Some(derive_keys(shared.as_bytes(), &self.transcript));

        OsRng.fill_bytes(&mut self.challenge);
        self.state = HandshakeState::Authenticating;
        Ok(WireMessage::AuthChallenge(AuthChallenge {
            nonce: self.challenge,
        }))
    }

    /// AUTHENTICATING → READY | FAILED: verify the proof, apply the
    /// whitelist, and hand back keys plus the confirmation message.
    pub fn on_auth_response(
        &mut self,
        resp: &AuthResponse,
    ) -> Result<ServerAccept, HandshakeError> {
        if self.state != HandshakeState::Authenticating {
            return Err(unexpected(self.state, "AUTH_RESP"));
        }

        let result = self.verify_proof(resp);
        if let Err(e) = result {
            self.state = HandshakeState::Failed;
            return Err(e);
        }

        let (c2s, s2c) = self.keys.take().expect("keys derived in on_kx_resp");
        let confirm = hmac_over(s2c.as_ref(), &[&self.transcript]);
        self.state = HandshakeState::Ready;
        Ok(ServerAccept {
            reply: WireMessage::ServerAuthResponse(ServerAuthResponse { confirm }),
            keys: SessionKeys {
                send: s2c,
                recv: c2s,
            },
            peer_identity: resp.identity_pub,
        })
    }

    fn verify_proof(&self, resp: &AuthResponse) -> Result<(), HandshakeError> {
        match resp.method {
            AuthMethod::Password => {
                if self.auth.whitelist.is_some() {
                    return Err(HandshakeError::new(
                        HandshakeErrorKind::NotAuthorized,
                        "identity key required by whitelist",
                    ));
                }
                let password = self
                    .auth
                    .password
                    .as_ref()
                    .map(|p| p.as_bytes())
                    .unwrap_or(b"");
                let expected = hmac_over(password, &[&self.challenge, &self.transcript]);
                if expected.as_slice().ct_eq(resp.proof.as_slice()).into() {
                    Ok(())
                } else {
                    Err(HandshakeError::new(
                        HandshakeErrorKind::AuthenticationFailed,
                        "password proof mismatch",
                    ))
                }
            }
            AuthMethod::SignedKey => {
                let pub_bytes = resp.identity_pub.ok_or_else(|| {
                    HandshakeError::new(
                        HandshakeErrorKind::AuthenticationFailed,
                        "missing identity key",
                    )
                })?;
                let key = VerifyingKey::from_bytes(&pub_bytes).map_err(|_| {
                    HandshakeError::new(
                        HandshakeErrorKind::AuthenticationFailed,
                        "malformed identity key",
                    )
                })?;
                let sig_bytes: [u8; 64] = resp.proof.as_slice().try_into().map_err(|_| {
                    HandshakeError::new(
                        HandshakeErrorKind::AuthenticationFailed,
                        "malformed signature",
                    )
                })?;
                let mut msg = Vec::with_capacity(CHALLENGE_LEN + 32);
                msg.extend_from_slice(&self.challenge);
                msg.extend_from_slice(&self.transcript);
                key.verify(&msg, &Signature::from_bytes(&sig_bytes))
                    .map_err(|_| {
                        HandshakeError::new(
                            HandshakeErrorKind::AuthenticationFailed,
                            "signature verification failed",
                        )
                    })?;
                if let Some(whitelist) = &self.auth.whitelist {
                    if !whitelist.contains(&pub_bytes) {
                        return Err(HandshakeError::new(
                            HandshakeErrorKind::NotAuthorized,
                            "identity key not in whitelist",
                        ));
                    }
                }
                Ok(())
            }
        }
    }

    /// Mark the context failed from the outside (peer closed mid-exchange).
    pub fn fail(&mut self) {
        self.state = HandshakeState::Failed;
    }
}

// ── Client side ───────────────────────────────────────────────────────

struct HostPin {
    store: Arc<KnownHosts>,
    host: String,
    port: u16,
}

pub struct ClientHandshake {
    state: HandshakeState,
    auth: ClientAuth,
    pin: Option<HostPin>,
    eph_secret: Option<EphemeralSecret>,
    eph_pub: [u8; 32],
    transcript: [u8; 32],
    keys: Option<(Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>)>,
}

impl ClientHandshake {
    pub fn new(auth: ClientAuth) -> Self {
        let eph_secret = EphemeralSecret::random_from_rng(OsRng);
        let eph_pub = PublicKey::from(&eph_secret).to_bytes();
        Self {
            state: HandshakeState::Init,
            auth,
            pin: None,
            eph_secret: Some(eph_secret),
            eph_pub,
            transcript: [0; 32],
            keys: None,
        }
    }

    /// Anchor the server's identity key to a known-hosts store entry for
    /// `host:port`.
    pub fn with_known_hosts(mut self, store: Arc<KnownHosts>, host: &str, port: u16) -> Self {
        self.pin = Some(HostPin {
            store,
            host: host.to_string(),
            port,
        });
        self
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// INIT → KEY_EXCHANGE: verify the server's signed ephemeral and the
    /// known-hosts pin, then answer with our ephemeral.
    pub fn on_kx_init(&mut self, kx: &KxInit) -> Result<WireMessage, HandshakeError> {
        if self.state != HandshakeState::Init {
            return Err(unexpected(self.state, "KX_INIT"));
        }

        if let Some(id) = &kx.identity {
            let key = VerifyingKey::from_bytes(&id.identity_pub).map_err(|_| {
                self.state = HandshakeState::Failed;
                HandshakeError::new(HandshakeErrorKind::KeyExchange, "malformed server key")
            })?;
            if key
                .verify(&kx.ephemeral_pub, &Signature::from_bytes(&id.signature))
                .is_err()
            {
                self.state = HandshakeState::Failed;
                return Err(HandshakeError::new(
                    HandshakeErrorKind::KeyExchange,
                    "server ephemeral signature invalid",
                ));
            }
            if let Some(pin) = &self.pin {
                if let Err(e) = pin.store.verify_or_record(&pin.host, pin.port, &id.identity_pub)
                {
                    self.state = HandshakeState::Failed;
                    return Err(e);
                }
            }
        } else if let Some(pin) = &self.pin {
            if pin.store.lookup(&pin.host, pin.port).is_some() {
                // A previously keyed server now presents no identity.
                self.state = HandshakeState::Failed;
                return Err(HandshakeError::new(
                    HandshakeErrorKind::PeerIdentityChanged,
                    "server no longer presents an identity key",
                ));
            }
        }

        let secret = self.eph_secret.take().expect("ephemeral used once");
        let shared = secret.diffie_hellman(&PublicKey::from(kx.ephemeral_pub));
        if !shared.was_contributory() {
            self.state = HandshakeState::Failed;
            return Err(HandshakeError::new(
                HandshakeErrorKind::KeyExchange,
                "non-contributory shared secret",
            ));
        }

        self.transcript = transcript_hash(&kx.ephemeral_pub, &self.eph_pub);
        self.keys = Some(derive_keys(shared.as_bytes(), &self.transcript));
        self.state = HandshakeState::KeyExchange;
        Ok(WireMessage::KxResp(KxResp {
            ephemeral_pub: self.eph_pub,
        }))
    }

    /// KEY_EXCHANGE → AUTHENTICATING: answer the challenge with whichever
    /// proof we have material for (identity key wins over password).
    pub fn on_challenge(&mut self, ch: &AuthChallenge) -> Result<WireMessage, HandshakeError> {
        if self.state != HandshakeState::KeyExchange {
            return Err(unexpected(self.state, "AUTH_CHAL"));
        }

        let mut msg = Vec::with_capacity(CHALLENGE_LEN + 32);
        msg.extend_from_slice(&ch.nonce);
        msg.extend_from_slice(&self.transcript);

        let resp = match &self.auth.identity {
            Some(key) => AuthResponse {
                method: AuthMethod::SignedKey,
                identity_pub: Some(key.verifying_key().to_bytes()),
                proof: key.sign(&msg).to_bytes().to_vec(),
            },
            None => {
                let password = self
                    .auth
                    .password
                    .as_ref()
                    .map(|p| p.as_bytes())
                    .unwrap_or(b"");
                AuthResponse {
                    method: AuthMethod::Password,
                    identity_pub: None,
                    proof: hmac_over(password, &[&ch.nonce, &self.transcript]).to_vec(),
                }
            }
        };
        self.state = HandshakeState::Authenticating;
        Ok(WireMessage::AuthResponse(resp))
    }

    /// AUTHENTICATING → READY: check the server's confirmation MAC and
    /// release the session keys.
    pub fn on_server_auth(
        &mut self,
        resp: &ServerAuthResponse,
    ) -> Result<SessionKeys, HandshakeError> {
        if self.state != HandshakeState::Authenticating {
            return Err(unexpected(self.state, "SERVER_AUTH_RESP"));
        }
        let (c2s, s2c) = self.keys.take().expect("keys derived in on_kx_init");
        let expected = hmac_over(s2c.as_ref(), &[&self.transcript]);
        if !bool::from(expected.as_slice().ct_eq(resp.confirm.as_slice())) {
            self.state = HandshakeState::Failed;
            return Err(HandshakeError::new(
                HandshakeErrorKind::AuthenticationFailed,
                "server confirmation mismatch",
            ));
        }
        self.state = HandshakeState::Ready;
        Ok(SessionKeys {
            send: c2s,
            recv: s2c,
        })
    }

    /// Terminal rejection from the server.
    pub fn on_auth_failed(&mut self, failed: &AuthFailed) -> HandshakeError {
        self.state = HandshakeState::Failed;
        let kind = match failed.code {
            AuthFailReason::NotAuthorized => HandshakeErrorKind::NotAuthorized,
            AuthFailReason::BadProof => HandshakeErrorKind::AuthenticationFailed,
            _ => HandshakeErrorKind::AuthenticationFailed,
        };
        HandshakeError::new(kind, failed.reason.clone())
    }

    pub fn fail(&mut self) {
        self.state = HandshakeState::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_exchange(
        mut server: ServerHandshake,
        mut client: ClientHandshake,
    ) -> Result<(SessionKeys, SessionKeys, Option<[u8; 32]>), HandshakeError> {
        let kx_init = server.start()?;
        let kx_resp = match &kx_init {
            WireMessage::KxInit(m) => client.on_kx_init(m)?,
            other => panic!("expected KxInit, got {other:?}"),
        };
        let challenge = match &kx_resp {
            WireMessage::KxResp(m) => server.on_kx_resp(m)?,
            other => panic!("expected KxResp, got {other:?}"),
        };
        let auth_resp = match &challenge {
            WireMessage::AuthChallenge(m) => client.on_challenge(m)?,
            other => panic!("expected AuthChallenge, got {other:?}"),
        };
        let accept = match &auth_resp {
            WireMessage::AuthResponse(m) => server.on_auth_response(m)?,
            other => panic!("expected AuthResponse, got {other:?}"),
        };
        let client_keys = match &accept.reply {
            WireMessage::ServerAuthResponse(m) => client.on_server_auth(m)?,
            other => panic!("expected ServerAuthResponse, got {other:?}"),
        };
        assert_eq!(server.state(), HandshakeState::Ready);
        assert_eq!(client.state(), HandshakeState::Ready);
        Ok((accept.keys, client_keys, accept.peer_identity))
    }

    #[test]
    fn symmetry_open_auth() {
        let server = ServerHandshake::new(None, ServerAuthConfig::default());
        let client = ClientHandshake::new(ClientAuth::default());
        let (sk, ck, peer) = run_exchange(server, client).unwrap();
        // Each direction key is the other side's peer key.
        assert_eq!(sk.send.as_ref(), ck.recv.as_ref());
        assert_eq!(sk.recv.as_ref(), ck.send.as_ref());
        assert_ne!(sk.send.as_ref(), sk.recv.as_ref());
        assert!(peer.is_none());
    }

    #[test]
    fn symmetry_password_auth() {
        let password = || Some(Zeroizing::new("hunter2".to_string()));
        let server = ServerHandshake::new(
            None,
            ServerAuthConfig {
                password: password(),
                whitelist: None,
            },
        );
        let client = ClientHandshake::new(ClientAuth {
            password: password(),
            identity: None,
        });
        let (sk, ck, _) = run_exchange(server, client).unwrap();
        assert_eq!(sk.send.as_ref(), ck.recv.as_ref());
    }

    #[test]
    fn wrong_password_rejected() {
        let server = ServerHandshake::new(
            None,
            ServerAuthConfig {
                password: Some(Zeroizing::new("right".into())),
                whitelist: None,
            },
        );
        let client = ClientHandshake::new(ClientAuth {
            password: Some(Zeroizing::new("wrong".into())),
            identity: None,
        });
        let err = run_exchange(server, client).unwrap_err();
        assert_eq!(err.kind, HandshakeErrorKind::AuthenticationFailed);
    }

    #[test]
    fn signed_key_auth_with_whitelist() {
        let client_key = SigningKey::generate(&mut OsRng);
        let server_key = SigningKey::generate(&mut OsRng);
        let whitelist = Arc::new(Whitelist::from_keys([client_key.verifying_key().to_bytes()]));

        let server = ServerHandshake::new(
            Some(server_key),
            ServerAuthConfig {
                password: None,
                whitelist: Some(whitelist),
            },
        );
        let expected_pub = client_key.verifying_key().to_bytes();
        let client = ClientHandshake::new(ClientAuth {
            password: None,
            identity: Some(client_key),
        });
        let (_, _, peer) = run_exchange(server, client).unwrap();
        assert_eq!(peer, Some(expected_pub));
    }

    #[test]
    fn whitelist_rejects_unknown_key() {
        let authorized = SigningKey::generate(&mut OsRng);
        let intruder = SigningKey::generate(&mut OsRng);
        let whitelist = Arc::new(Whitelist::from_keys([authorized.verifying_key().to_bytes()]));

        let server = ServerHandshake::new(
            None,
            ServerAuthConfig {
                password: None,
                whitelist: Some(whitelist),
            },
        );
        let client = ClientHandshake::new(ClientAuth {
            password: None,
            identity: Some(intruder),
        });
        let err = run_exchange(server, client).unwrap_err();
        assert_eq!(err.kind, HandshakeErrorKind::NotAuthorized);
    }

    #[test]
    fn whitelist_requires_identity() {
        let whitelist = Arc::new(Whitelist::from_keys([[9u8; 32]]));
        let server = ServerHandshake::new(
            None,
            ServerAuthConfig {
                password: None,
                whitelist: Some(whitelist),
            },
        );
        let client = ClientHandshake::new(ClientAuth::default());
        let err = run_exchange(server, client).unwrap_err();
        assert_eq!(err.kind, HandshakeErrorKind::NotAuthorized);
    }

    #[test]
    fn out_of_order_message_leaves_state() {
        let mut server = ServerHandshake::new(None, ServerAuthConfig::default());
        // AUTH_RESP before the exchange even started.
        let resp = AuthResponse {
            method: AuthMethod::Password,
            identity_pub: None,
            proof: vec![0; HMAC_LEN],
        };
        let err = server.on_auth_response(&resp).unwrap_err();
        assert_eq!(err.kind, HandshakeErrorKind::UnexpectedState);
        assert_eq!(server.state(), HandshakeState::Init);

        // The machine still works afterwards.
        assert!(server.start().is_ok());
        assert_eq!(server.state(), HandshakeState::KeyExchange);
    }

    #[test]
    fn client_rejects_bad_server_signature() {
        let server_key = SigningKey::generate(&mut OsRng);
        let mut server = ServerHandshake::new(Some(server_key), ServerAuthConfig::default());
        let mut client = ClientHandshake::new(ClientAuth::default());

        let kx_init = server.start().unwrap();
        let tampered = match kx_init {
            WireMessage::KxInit(mut m) => {
                m.identity.as_mut().unwrap().signature[0] ^= 0xFF;
                m
            }
            other => panic!("expected KxInit, got {other:?}"),
        };
        let err = client.on_kx_init(&tampered).unwrap_err();
        assert_eq!(err.kind, HandshakeErrorKind::KeyExchange);
        assert_eq!(client.state(), HandshakeState::Failed);
    }

    #[test]
    fn tampered_server_confirm_rejected() {
        let server = ServerHandshake::new(None, ServerAuthConfig::default());
        let mut client = ClientHandshake::new(ClientAuth::default());

        let mut server = server;
        let kx_init = server.start().unwrap();
        let kx_resp = match &kx_init {
            WireMessage::KxInit(m) => client.on_kx_init(m).unwrap(),
            _ => unreachable!(),
        };
        let challenge = match &kx_resp {
            WireMessage::KxResp(m) => server.on_kx_resp(m).unwrap(),
            _ => unreachable!(),
        };
        let auth_resp = match &challenge {
            WireMessage::AuthChallenge(m) => client.on_challenge(m).unwrap(),
            _ => unreachable!(),
        };
        let accept = match &auth_resp {
            WireMessage::AuthResponse(m) => server.on_auth_response(m).unwrap(),
            _ => unreachable!(),
        };
        let err = match accept.reply {
            WireMessage::ServerAuthResponse(mut m) => {
                m.confirm[0] ^= 0x01;
                client.on_server_auth(&m).unwrap_err()
            }
            _ => unreachable!(),
        };
        assert_eq!(err.kind, HandshakeErrorKind::AuthenticationFailed);
        assert_eq!(client.state(), HandshakeState::Failed);
    }
}
