//! End-to-end scenarios: a real server on an ephemeral port, driven by a
//! minimal client speaking the wire protocol.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use asciichat_crypto::handshake::{ClientAuth, ClientHandshake};
use asciichat_crypto::transport::{OpenKey, SealKey, SessionCipher};
use asciichat_crypto::{HandshakeError, HandshakeErrorKind, Whitelist};
use asciichat_proto::codec::{encode_packet, try_decode, Packet};
use asciichat_proto::messages::{AudioFrame, ClientJoin};
use asciichat_proto::types::{AuthFailReason, Compression, MediaKind};
use asciichat_proto::{
    WireMessage, DEFAULT_MAX_PAYLOAD, FLAG_ENCRYPTED, PROTOCOL_MAJOR, PROTOCOL_MINOR,
};
use asciichat_server::config::ServerConfig;
use asciichat_server::listener::bind_listener;
use asciichat_server::server;
use asciichat_server::state::ServerState;

struct TestClient {
    stream: TcpStream,
    buf: BytesMut,
    seal: Option<SealKey>,
    open: Option<OpenKey>,
}

impl TestClient {
    async fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        Self {
            stream,
            buf: BytesMut::new(),
            seal: None,
            open: None,
        }
    }

    async fn send(&mut self, msg: &WireMessage) {
        let payload = msg.encode();
        let (flags, bytes) = match &mut self.seal {
            Some(seal) => (FLAG_ENCRYPTED, seal.seal(&payload).unwrap()),
            None => (0, payload),
        };
        let wire = encode_packet(msg.packet_type(), 7, flags, &bytes);
        self.stream.write_all(&wire).await.unwrap();
    }

    async fn recv_raw(&mut self) -> Option<Packet> {
        loop {
            if let Some(packet) = try_decode(&mut self.buf, DEFAULT_MAX_PAYLOAD).unwrap() {
                return Some(packet);
            }
            let n = self.stream.read_buf(&mut self.buf).await.ok()?;
            if n == 0 {
                return None;
            }
        }
    }

    /// Next message, or `None` on EOF.
    async fn recv(&mut self) -> Option<WireMessage> {
        let packet = self.recv_raw().await?;
        let body = match &mut self.open {
            Some(open) if packet.header.flags & FLAG_ENCRYPTED != 0 => {
                open.open(&packet.payload).unwrap()
            }
            _ => packet.payload.to_vec(),
        };
        Some(WireMessage::decode(packet.header.packet_type, &body).unwrap())
    }

    async fn recv_timeout(&mut self, d: Duration) -> Option<WireMessage> {
        timeout(d, self.recv()).await.ok().flatten()
    }

    /// Skip messages until one matches, within the deadline.
    async fn recv_until(
        &mut self,
        d: Duration,
        pred: impl Fn(&WireMessage) -> bool,
    ) -> Option<WireMessage> {
        let start = Instant::now();
        while start.elapsed() < d {
            match self.recv_timeout(d - start.elapsed()).await {
                Some(msg) if pred(&msg) => return Some(msg),
                Some(_) => continue,
                None => return None,
            }
        }
        None
    }

    /// Drive the client handshake to READY.
    async fn handshake(&mut self, auth: ClientAuth) -> Result<(), HandshakeError> {
        let mut hs = ClientHandshake::new(auth);
        loop {
            let msg = self
                .recv()
                .await
                .expect("connection closed during handshake");
            match msg {
                WireMessage::KxInit(m) => {
                    let reply = hs.on_kx_init(&m)?;
                    self.send(&reply).await;
                }
                WireMessage::AuthChallenge(m) => {
                    let reply = hs.on_challenge(&m)?;
                    self.send(&reply).await;
                }
                WireMessage::ServerAuthResponse(m) => {
                    let keys = hs.on_server_auth(&m)?;
                    let (seal, open) = SessionCipher::new(&keys).into_halves();
                    self.seal = Some(seal);
                    self.open = Some(open);
                    return Ok(());
                }
                WireMessage::AuthFailed(m) => return Err(hs.on_auth_failed(&m)),
                other => panic!("unexpected handshake message: {other:?}"),
            }
        }
    }

    async fn join(&mut self) {
        self.send(&WireMessage::ClientJoin(ClientJoin {
            major: PROTOCOL_MAJOR,
            minor: PROTOCOL_MINOR,
            features: 0,
            compression: Compression::None,
        }))
        .await;
    }
}

async fn start_server(
    mut config: ServerConfig,
    identity: Option<SigningKey>,
    whitelist: Option<Arc<Whitelist>>,
) -> (Arc<ServerState>, u16, tokio::task::JoinHandle<()>) {
    config.bind = "127.0.0.1".into();
    let listener = bind_listener(&config.bind, 0).unwrap();
    let port = listener.local_addr().unwrap().port();
    let state = ServerState::new(config, identity, whitelist);
    let handle = {
        let state = state.clone();
        tokio::spawn(async move {
            server::run(state, listener).await.unwrap();
        })
    };
    (state, port, handle)
}

fn plain_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.no_encrypt = true;
    config
}

async fn wait_for<F: Fn() -> bool>(d: Duration, cond: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < d {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

// Scenario: single client, unencrypted. Ping is answered; with no other
// producer the client receives neither video nor audio.
#[tokio::test]
async fn single_client_unencrypted_ping_pong() {
    let (state, port, _server) = start_server(plain_config(), None, None).await;

    let mut client = TestClient::connect(port).await;
    client.join().await;
    client
        .send(&WireMessage::AudioFrame(AudioFrame {
            sample_rate: 48_000,
            channels: 1,
            samples: vec![0; 960],
        }))
        .await;
    client.send(&WireMessage::Ping(42)).await;

    let pong = client
        .recv_until(Duration::from_secs(2), |m| matches!(m, WireMessage::Pong(_)))
        .await
        .expect("expected a pong");
    assert_eq!(pong, WireMessage::Pong(42));

    // Lone client: no ascii frames (no video sources) and no mirrored
    // audio (mixer excludes self, nobody else is producing).
    let unwanted = client
        .recv_until(Duration::from_millis(300), |m| {
            matches!(m, WireMessage::AsciiFrame(_) | WireMessage::AudioFrame(_))
        })
        .await;
    assert!(unwanted.is_none(), "lone client received media: {unwanted:?}");

    state.shutdown.trigger();
}

#[tokio::test]
async fn version_mismatch_rejected() {
    let (_state, port, _server) = start_server(plain_config(), None, None).await;

    let mut client = TestClient::connect(port).await;
    client
        .send(&WireMessage::ClientJoin(ClientJoin {
            major: PROTOCOL_MAJOR + 1,
            minor: 0,
            features: 0,
            compression: Compression::None,
        }))
        .await;

    let failed = client
        .recv_until(Duration::from_secs(2), |m| {
            matches!(m, WireMessage::AuthFailed(_))
        })
        .await
        .expect("expected AuthFailed");
    match failed {
        WireMessage::AuthFailed(f) => assert_eq!(f.code, AuthFailReason::VersionMismatch),
        _ => unreachable!(),
    }
}

// Scenario: handshake rejection via whitelist. The client authenticates
// with a key the server does not know; the slot is torn down promptly.
#[tokio::test]
async fn whitelist_rejects_unknown_client_key() {
    let server_key = SigningKey::generate(&mut OsRng);
    let authorized = SigningKey::generate(&mut OsRng);
    let intruder = SigningKey::generate(&mut OsRng);
    let whitelist = Arc::new(Whitelist::from_keys([authorized.verifying_key().to_bytes()]));

    let (state, port, _server) =
        start_server(ServerConfig::default(), Some(server_key), Some(whitelist)).await;

    let mut client = TestClient::connect(port).await;
    let err = client
        .handshake(ClientAuth {
            password: None,
            identity: Some(intruder),
        })
        .await
        .expect_err("handshake must fail");
    assert_eq!(err.kind, HandshakeErrorKind::NotAuthorized);

    // Server side reaps the slot within 500 ms.
    assert!(
        wait_for(Duration::from_millis(500), || {
            state
                .client_count
                .load(std::sync::atomic::Ordering::Acquire)
                == 0
        })
        .await,
        "slot was not torn down in time"
    );
}

#[tokio::test]
async fn encrypted_password_session_round_trip() {
    let server_key = SigningKey::generate(&mut OsRng);
    let mut config = ServerConfig::default();
    config.password = Some("sesame".into());

    let (_state, port, _server) = start_server(config, Some(server_key), None).await;

    let mut client = TestClient::connect(port).await;
    client
        .handshake(ClientAuth {
            password: Some(zeroize::Zeroizing::new("sesame".into())),
            identity: None,
        })
        .await
        .expect("handshake should succeed");

    client.join().await;
    client.send(&WireMessage::Ping(99)).await;
    let pong = client
        .recv_until(Duration::from_secs(2), |m| matches!(m, WireMessage::Pong(_)))
        .await
        .expect("expected sealed pong");
    assert_eq!(pong, WireMessage::Pong(99));
}

#[tokio::test]
async fn wrong_password_gets_auth_failed() {
    let mut config = ServerConfig::default();
    config.password = Some("right".into());
    let (_state, port, _server) = start_server(config, None, None).await;

    let mut client = TestClient::connect(port).await;
    let err = client
        .handshake(ClientAuth {
            password: Some(zeroize::Zeroizing::new("wrong".into())),
            identity: None,
        })
        .await
        .expect_err("handshake must fail");
    assert_eq!(err.kind, HandshakeErrorKind::AuthenticationFailed);
}

// Scenario: two clients, the mixer excludes self. A sends a tone, B
// silence; B hears the tone, A hears nothing at all (B's producer flag
// is never set, so A's mix is empty and skipped).
#[tokio::test]
async fn two_clients_mixer_excludes_self() {
    let (_state, port, _server) = start_server(plain_config(), None, None).await;

    let mut a = TestClient::connect(port).await;
    a.join().await;
    a.send(&WireMessage::StreamStart(MediaKind::Audio)).await;

    let mut b = TestClient::connect(port).await;
    b.join().await;

    // Feed A's tone for up to two seconds while B listens.
    let feeder = tokio::spawn(async move {
        for _ in 0..200 {
            a.send(&WireMessage::AudioFrame(AudioFrame {
                sample_rate: 44_100,
                channels: 1,
                samples: vec![1000; 256],
            }))
            .await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        a
    });

    let heard = b
        .recv_until(Duration::from_secs(2), |m| {
            matches!(m, WireMessage::AudioFrame(f) if f.samples.iter().any(|&s| s != 0))
        })
        .await
        .expect("B should hear A's tone");
    match heard {
        WireMessage::AudioFrame(f) => {
            assert_eq!(f.channels, 1);
            assert!(f.samples.iter().all(|&s| s == 1000));
        }
        _ => unreachable!(),
    }

    // A must not get its own tone back.
    let mut a = feeder.await.unwrap();
    let echoed = a
        .recv_until(Duration::from_millis(300), |m| {
            matches!(m, WireMessage::AudioFrame(_))
        })
        .await;
    assert!(echoed.is_none(), "mixer echoed audio back to its producer");
}

// Scenario: signal-driven shutdown under load. All sockets close and the
// accept loop finishes promptly.
#[tokio::test]
async fn shutdown_closes_every_client() {
    let (state, port, server_handle) = start_server(plain_config(), None, None).await;

    let mut clients = Vec::new();
    for _ in 0..8 {
        let mut c = TestClient::connect(port).await;
        c.join().await;
        clients.push(c);
    }
    assert!(
        wait_for(Duration::from_secs(1), || {
            state
                .client_count
                .load(std::sync::atomic::Ordering::Acquire)
                == 8
        })
        .await
    );

    state.shutdown.trigger();

    // Every client observes EOF quickly.
    for mut client in clients {
        let closed = timeout(Duration::from_millis(800), async {
            loop {
                if client.recv().await.is_none() {
                    return;
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "client socket was not closed on shutdown");
    }

    timeout(Duration::from_secs(2), server_handle)
        .await
        .expect("accept loop should exit after shutdown")
        .unwrap();
    assert_eq!(
        state
            .client_count
            .load(std::sync::atomic::Ordering::Acquire),
        0
    );
}

#[tokio::test]
async fn duplicate_display_name_disconnects() {
    let (_state, port, _server) = start_server(plain_config(), None, None).await;

    let mut a = TestClient::connect(port).await;
    a.join().await;
    a.send(&WireMessage::DisplayName(
        asciichat_proto::messages::DisplayName { name: "zed".into() },
    ))
    .await;
    // Make sure A's name is registered before B tries to take it.
    a.send(&WireMessage::Ping(1)).await;
    a.recv_until(Duration::from_secs(2), |m| matches!(m, WireMessage::Pong(_)))
        .await
        .unwrap();

    let mut b = TestClient::connect(port).await;
    b.join().await;
    b.send(&WireMessage::DisplayName(
        asciichat_proto::messages::DisplayName { name: "zed".into() },
    ))
    .await;

    // B is disconnected: EOF (possibly after a termination packet).
    let closed = timeout(Duration::from_secs(2), async {
        loop {
            match b.recv().await {
                None => return,
                Some(WireMessage::ClientLeave) => return,
                Some(_) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "duplicate name was not rejected");
}
