//! One connected client: the slot record, its buffers, and the task set
//! (receive, send, video-render, audio-render) that serves it.
//!
//! The receive task owns the connection: it drives the handshake to
//! READY, starts the other three tasks, dispatches inbound packets, and
//! on any exit funnels through [`teardown`], which stops the siblings,
//! closes the socket and flips `active` off so the accept loop's cleanup
//! pass can reap the slot.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use asciichat_audio::mixer::AudioSource;
use asciichat_audio::{FRAME_SAMPLES, SAMPLE_RATE};
use asciichat_crypto::handshake::{ServerAuthConfig, ServerHandshake};
use asciichat_crypto::transport::{OpenKey, SealKey, SessionCipher};
use asciichat_crypto::{HandshakeError, HandshakeErrorKind};
use asciichat_proto::codec::{encode_packet, try_decode, Packet};
use asciichat_proto::messages::{AsciiFrame, AudioFrame, AuthFailed, TerminalCaps};
use asciichat_proto::types::{ClientId, MediaKind};
use asciichat_proto::{WireMessage, FLAG_ENCRYPTED, PROTOCOL_MAJOR};

use crate::buffers::{AudioPacketQueue, FrameSwap};
use crate::config::ServerConfig;
use crate::error::SlotError;
use crate::palette::{GlyphRamp, PaletteKind};
use crate::render::{ImageFrameData, RenderedFrame, Viewport};
use crate::state::ServerState;
use crate::sync::NamedMutex;

/// Per-step ceiling while the handshake is in flight.
const HANDSHAKE_STEP_TIMEOUT: Duration = Duration::from_secs(10);
/// A READY session that stays silent longer than this is disconnected.
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(45);
/// Ceiling on one socket write under the send mutex.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// Bounded wait of the send loop on the audio queue.
const SEND_POLL: Duration = Duration::from_millis(10);
/// How long teardown waits for a sibling task before abandoning it.
pub const TASK_JOIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Mutex-protected non-atomic slot fields.
#[derive(Default)]
pub struct ClientInfo {
    pub display_name: String,
    pub term: Option<TerminalCaps>,
    pub features: u32,
    pub last_pong_ts: Option<u64>,
    /// Resolved glyph ramp for this recipient; cleared when new terminal
    /// capabilities arrive so the next render re-resolves it.
    pub ramp: Option<Arc<GlyphRamp>>,
}

struct SendHalf {
    writer: Option<OwnedWriteHalf>,
    seal: Option<SealKey>,
}

#[derive(Default)]
pub struct SlotTasks {
    pub receive: Option<JoinHandle<()>>,
    pub send: Option<JoinHandle<()>>,
    pub video: Option<JoinHandle<()>>,
    pub audio: Option<JoinHandle<()>>,
}

pub struct ClientSlot {
    pub id: ClientId,
    pub index: usize,
    pub peer: String,
    pub connected_at: Instant,

    active: AtomicBool,
    shutting_down: AtomicBool,
    pub protocol_disconnect_requested: AtomicBool,
    is_sending_video: AtomicBool,
    is_sending_audio: AtomicBool,
    pub send_task_running: AtomicBool,
    pub video_task_running: AtomicBool,
    pub audio_task_running: AtomicBool,
    joined: AtomicBool,

    pub caps: AtomicU32,
    /// Dimensions of the most recent inbound image frame.
    pub width: AtomicU32,
    pub height: AtomicU32,

    pub info: NamedMutex<ClientInfo>,
    writer: NamedMutex<SendHalf>,
    pub tasks: Mutex<SlotTasks>,

    /// Inbound video double buffer (producer: receive task).
    pub video_in: FrameSwap<ImageFrameData>,
    /// Outbound rendered-frame double buffer (producer: video task).
    pub ascii_out: FrameSwap<RenderedFrame>,
    /// Outbound mixed-audio queue (producer: audio task).
    pub audio_out: AudioPacketQueue,
    /// Inbound PCM ring, registered with the mixer.
    pub audio_in: Arc<AudioSource>,

    clear_pending: AtomicBool,
    teardown_notify: Notify,
}

impl ClientSlot {
    pub fn new(
        id: ClientId,
        index: usize,
        peer: String,
        config: &ServerConfig,
        audio_in: Arc<AudioSource>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            index,
            peer,
            connected_at: Instant::now(),
            active: AtomicBool::new(true),
            shutting_down: AtomicBool::new(false),
            protocol_disconnect_requested: AtomicBool::new(false),
            is_sending_video: AtomicBool::new(false),
            is_sending_audio: AtomicBool::new(false),
            send_task_running: AtomicBool::new(false),
            video_task_running: AtomicBool::new(false),
            audio_task_running: AtomicBool::new(false),
            joined: AtomicBool::new(false),
            caps: AtomicU32::new(0),
            width: AtomicU32::new(0),
            height: AtomicU32::new(0),
            info: NamedMutex::new("slot.info", ClientInfo::default()),
            writer: NamedMutex::new(
                "slot.send",
                SendHalf {
                    writer: None,
                    seal: None,
                },
            ),
            tasks: Mutex::new(SlotTasks::default()),
            video_in: FrameSwap::new(),
            ascii_out: FrameSwap::new(),
            audio_out: AudioPacketQueue::new(config.audio_queue_capacity),
            audio_in,
            clear_pending: AtomicBool::new(false),
            teardown_notify: Notify::new(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub(crate) fn shutting_down_flag(&self) -> &AtomicBool {
        &self.shutting_down
    }

    pub fn is_sending_video(&self) -> bool {
        self.is_sending_video.load(Ordering::Acquire)
    }

    pub fn is_sending_audio(&self) -> bool {
        self.is_sending_audio.load(Ordering::Acquire)
    }

    pub fn has_joined(&self) -> bool {
        self.joined.load(Ordering::Acquire)
    }

    pub fn has_capability(&self, bit: u32) -> bool {
        self.caps.load(Ordering::Acquire) & bit != 0
    }

    /// Flag the slot for teardown and wake everything that might be
    /// blocked on it.
    pub fn begin_teardown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.teardown_notify.notify_waiters();
        self.audio_out.wake();
    }

    /// Resolves once [`begin_teardown`](Self::begin_teardown) has run.
    pub async fn teardown_wait(&self) {
        loop {
            let notified = self.teardown_notify.notified();
            if self.is_shutting_down() {
                return;
            }
            notified.await;
        }
    }

    pub async fn attach_writer(&self, writer: OwnedWriteHalf) {
        self.writer.lock().await.writer = Some(writer);
    }

    pub async fn install_cipher(&self, seal: SealKey) {
        self.writer.lock().await.seal = Some(seal);
    }

    /// Serialize, seal (in READY sessions) and write one packet. The
    /// writer mutex is the slot's send mutex: it serializes every write
    /// to the socket, so interleaved packets are impossible.
    pub async fn send_message(&self, msg: &WireMessage) -> Result<(), SlotError> {
        let payload = msg.encode();
        let mut half = self.writer.lock().await;
        let SendHalf { writer, seal } = &mut *half;
        let writer = writer.as_mut().ok_or_else(|| {
            SlotError::Transport(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "socket already closed",
            ))
        })?;
        let (flags, bytes) = match seal {
            Some(seal) => (FLAG_ENCRYPTED, seal.seal(&payload)?),
            None => (0, payload),
        };
        let wire = encode_packet(msg.packet_type(), 0, flags, &bytes);
        timeout(WRITE_TIMEOUT, writer.write_all(&wire))
            .await
            .map_err(|_| SlotError::Timeout("socket write"))??;
        Ok(())
    }

    /// Shut the socket down, unblocking the peer and our own reader.
    pub async fn close_socket(&self) {
        if let Some(mut writer) = self.writer.lock().await.writer.take() {
            let _ = writer.shutdown().await;
        }
    }

    fn set_inactive(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Incremental framed reader over the connection's read half.
pub struct PacketReader {
    read_half: OwnedReadHalf,
    buf: BytesMut,
    max_payload: u32,
}

impl PacketReader {
    pub fn new(read_half: OwnedReadHalf, max_payload: u32) -> Self {
        Self {
            read_half,
            buf: BytesMut::with_capacity(8 * 1024),
            max_payload,
        }
    }

    /// Read until one full validated packet is available.
    pub async fn next(&mut self) -> Result<Packet, SlotError> {
        loop {
            if let Some(packet) = try_decode(&mut self.buf, self.max_payload)? {
                return Ok(packet);
            }
            let n = self.read_half.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(SlotError::PeerClosed);
            }
        }
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Entry point of the receive task.
pub async fn run_receive(state: Arc<ServerState>, slot: Arc<ClientSlot>, read_half: OwnedReadHalf) {
    let mut reader = PacketReader::new(read_half, state.config.max_payload);

    let result = drive(&state, &slot, &mut reader).await;
    let class = match &result {
        Ok(()) => crate::error::DisconnectClass::Clean,
        Err(e) => e.class(),
    };
    state.stats.record_disconnect(class);

    match &result {
        Ok(()) => info!(
            client_id = slot.id,
            peer = %slot.peer,
            uptime_s = slot.connected_at.elapsed().as_secs(),
            "client disconnected"
        ),
        Err(e) => {
            warn!(client_id = slot.id, peer = %slot.peer, class = ?class, "client error: {e}");
            if e.wants_termination_packet() {
                slot.protocol_disconnect_requested
                    .store(true, Ordering::Release);
                let _ = slot.send_message(&WireMessage::ClientLeave).await;
            }
        }
    }

    teardown(&state, &slot).await;
}

async fn drive(
    state: &Arc<ServerState>,
    slot: &Arc<ClientSlot>,
    reader: &mut PacketReader,
) -> Result<(), SlotError> {
    let mut open_key = if state.config.no_encrypt {
        None
    } else {
        Some(run_handshake(state, slot, reader).await?)
    };

    start_session_tasks(state, slot);

    loop {
        let packet = tokio::select! {
            r = reader.next() => match r {
                Err(SlotError::PeerClosed) => return Ok(()),
                other => other?,
            },
            _ = slot.teardown_wait() => return Ok(()),
            _ = state.shutdown.wait() => return Ok(()),
            _ = tokio::time::sleep(KEEPALIVE_TIMEOUT) => {
                return Err(SlotError::Timeout("keep-alive"));
            }
        };

        let msg = decode_session_packet(&mut open_key, packet)?;
        match handle_message(state, slot, msg).await? {
            Flow::Continue => {}
            Flow::Stop => return Ok(()),
        }
    }
}

/// Drive the server handshake to READY over the raw connection.
/// Returns the inbound half of the session cipher; the outbound half is
/// installed into the slot's send state.
async fn run_handshake(
    state: &Arc<ServerState>,
    slot: &Arc<ClientSlot>,
    reader: &mut PacketReader,
) -> Result<OpenKey, SlotError> {
    let auth = ServerAuthConfig {
        password: state.password.clone(),
        whitelist: state.whitelist.clone(),
    };
    let mut hs = ServerHandshake::new(state.identity.clone(), auth);

    let first = hs.start().map_err(SlotError::Handshake)?;
    slot.send_message(&first).await?;

    loop {
        let packet = match timeout(HANDSHAKE_STEP_TIMEOUT, reader.next()).await {
            Err(_) => {
                hs.fail();
                return Err(SlotError::Timeout("handshake step"));
            }
            Ok(Err(SlotError::PeerClosed)) => {
                hs.fail();
                return Err(HandshakeError::new(
                    HandshakeErrorKind::PeerClosed,
                    "peer closed mid-handshake",
                )
                .into());
            }
            Ok(other) => other?,
        };

        if !packet.header.packet_type.is_handshake() {
            hs.fail();
            return Err(SlotError::Violation("session packet before handshake"));
        }

        let msg = WireMessage::decode(packet.header.packet_type, &packet.payload)?;
        let step = match msg {
            WireMessage::KxResp(m) => hs.on_kx_resp(&m).map(Some),
            WireMessage::AuthResponse(m) => match hs.on_auth_response(&m) {
                Ok(accept) => {
                    slot.send_message(&accept.reply).await?;
                    let (seal, open) = SessionCipher::new(&accept.keys).into_halves();
                    slot.install_cipher(seal).await;
                    if accept.peer_identity.is_some() {
                        debug!(client_id = slot.id, "client authenticated by identity key");
                    }
                    info!(client_id = slot.id, peer = %slot.peer, "handshake complete");
                    return Ok(open);
                }
                Err(e) => Err(e),
            },
            other => {
                hs.fail();
                return Err(HandshakeError::new(
                    HandshakeErrorKind::UnexpectedState,
                    format!("unexpected {:?} during handshake", other.packet_type()),
                )
                .into());
            }
        };

        match step {
            Ok(Some(reply)) => slot.send_message(&reply).await?,
            Ok(None) => {}
            Err(e) => {
                state
                    .stats
                    .handshake_failures
                    .fetch_add(1, Ordering::Relaxed);
                let _ = slot
                    .send_message(&WireMessage::AuthFailed(AuthFailed {
                        code: e.fail_code(),
                        reason: e.reason.clone(),
                    }))
                    .await;
                return Err(e.into());
            }
        }
    }
}

fn decode_session_packet(
    open_key: &mut Option<OpenKey>,
    packet: Packet,
) -> Result<WireMessage, SlotError> {
    let body: Vec<u8> = match open_key {
        Some(open) => {
            if packet.header.flags & FLAG_ENCRYPTED == 0 {
                return Err(SlotError::Violation("plaintext packet in encrypted session"));
            }
            open.open(&packet.payload)?
        }
        None => packet.payload.to_vec(),
    };
    Ok(WireMessage::decode(packet.header.packet_type, &body)?)
}

/// Average multichannel PCM down to the mono mixing contract.
fn downmix(samples: &[i16], channels: u8) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / ch as i32) as i16
        })
        .collect()
}

async fn handle_message(
    state: &Arc<ServerState>,
    slot: &Arc<ClientSlot>,
    msg: WireMessage,
) -> Result<Flow, SlotError> {
    match msg {
        WireMessage::ClientJoin(join) => {
            if join.major != PROTOCOL_MAJOR {
                let _ = slot
                    .send_message(&WireMessage::AuthFailed(AuthFailed {
                        code: asciichat_proto::types::AuthFailReason::VersionMismatch,
                        reason: format!(
                            "protocol major mismatch: client {}, server {}",
                            join.major, PROTOCOL_MAJOR
                        ),
                    }))
                    .await;
                return Err(SlotError::Violation("protocol major version mismatch"));
            }
            slot.info.lock().await.features = join.features;
            slot.joined.store(true, Ordering::Release);
            info!(
                client_id = slot.id,
                major = join.major,
                minor = join.minor,
                features = join.features,
                "client joined"
            );
            state.broadcast_server_state().await;
        }
        WireMessage::Capabilities(c) => {
            slot.caps.store(c.bits, Ordering::Release);
        }
        WireMessage::DisplayName(d) => {
            if state.display_name_taken(&d.name, slot.id).await {
                return Err(SlotError::Violation("duplicate display name"));
            }
            slot.info.lock().await.display_name = d.name;
        }
        WireMessage::TerminalCaps(t) => {
            let mut info = slot.info.lock().await;
            info.term = Some(t);
            info.ramp = None;
        }
        WireMessage::StreamStart(kind) => {
            match kind {
                MediaKind::Video => slot.is_sending_video.store(true, Ordering::Release),
                MediaKind::Audio => {
                    slot.is_sending_audio.store(true, Ordering::Release);
                    state.mixer.set_producing(slot.id, true);
                }
            }
            debug!(client_id = slot.id, ?kind, "stream started");
            state.broadcast_server_state().await;
        }
        WireMessage::StreamStop(kind) => {
            match kind {
                MediaKind::Video => slot.is_sending_video.store(false, Ordering::Release),
                MediaKind::Audio => {
                    slot.is_sending_audio.store(false, Ordering::Release);
                    state.mixer.set_producing(slot.id, false);
                }
            }
            debug!(client_id = slot.id, ?kind, "stream stopped");
            state.broadcast_server_state().await;
        }
        WireMessage::ImageFrame(frame) => {
            slot.width.store(frame.width, Ordering::Release);
            slot.height.store(frame.height, Ordering::Release);
            slot.video_in.publish(ImageFrameData {
                width: frame.width,
                height: frame.height,
                format: frame.format,
                flags: frame.flags,
                data: frame.data,
            });
        }
        WireMessage::AudioFrame(frame) => {
            if state.config.audio_enabled {
                let samples = downmix(&frame.samples, frame.channels);
                state.mixer.submit(slot.id, &samples);
            }
        }
        WireMessage::Ping(ts) => {
            slot.send_message(&WireMessage::Pong(ts)).await?;
        }
        WireMessage::Pong(ts) => {
            slot.info.lock().await.last_pong_ts = Some(ts);
        }
        WireMessage::ClientLeave => {
            return Ok(Flow::Stop);
        }
        // Reserved on the wire; harmless in READY.
        WireMessage::HandshakeComplete => {}
        WireMessage::KxInit(_)
        | WireMessage::KxResp(_)
        | WireMessage::AuthChallenge(_)
        | WireMessage::AuthResponse(_)
        | WireMessage::ServerAuthResponse(_)
        | WireMessage::AuthFailed(_) => {
            return Err(SlotError::Violation("handshake packet in ready session"));
        }
        WireMessage::AsciiFrame(_)
        | WireMessage::ClearConsole
        | WireMessage::ServerState(_) => {
            debug!(client_id = slot.id, "ignoring server-bound packet type from client");
        }
    }
    Ok(Flow::Continue)
}

/// Start the send / video-render / audio-render tasks once the session
/// is established.
fn start_session_tasks(state: &Arc<ServerState>, slot: &Arc<ClientSlot>) {
    let mut tasks = slot.tasks.lock();

    tasks.send = Some(tokio::spawn(run_send(state.clone(), slot.clone())));
    tasks.video = Some(tokio::spawn(run_video(state.clone(), slot.clone())));
    if state.config.audio_enabled {
        tasks.audio = Some(tokio::spawn(run_audio(state.clone(), slot.clone())));
    }
}

/// The send loop: drains the audio queue and retransmits the newest
/// rendered frame, all through the slot's send mutex.
async fn run_send(state: Arc<ServerState>, slot: Arc<ClientSlot>) {
    slot.send_task_running.store(true, Ordering::Release);
    let mut last_gen = 0u64;

    let result: Result<(), SlotError> = async {
        loop {
            if state.shutdown.is_triggered() || slot.is_shutting_down() {
                return Ok(());
            }

            if slot.clear_pending.swap(false, Ordering::AcqRel) {
                slot.send_message(&WireMessage::ClearConsole).await?;
            }

            if let Some((gen, frame)) = slot.ascii_out.acquire_if_newer(last_gen) {
                last_gen = gen;
                slot.send_message(&WireMessage::AsciiFrame(AsciiFrame {
                    width: frame.width,
                    height: frame.height,
                    flags: frame.flags,
                    data: Bytes::from(frame.data.clone()),
                }))
                .await?;
            }

            match timeout(
                SEND_POLL,
                slot.audio_out.pop(&state.shutdown, slot.shutting_down_flag()),
            )
            .await
            {
                Ok(Some(samples)) => {
                    slot.send_message(&WireMessage::AudioFrame(AudioFrame {
                        sample_rate: SAMPLE_RATE,
                        channels: 1,
                        samples,
                    }))
                    .await?;
                }
                Ok(None) => return Ok(()),
                Err(_) => {}
            }
        }
    }
    .await;

    if let Err(e) = result {
        debug!(client_id = slot.id, "send task error: {e}");
        slot.begin_teardown();
    }
    slot.send_task_running.store(false, Ordering::Release);
}

/// The video-render tick: compose this recipient's grid at the target
/// frame rate and publish into the outbound double buffer.
async fn run_video(state: Arc<ServerState>, slot: Arc<ClientSlot>) {
    slot.video_task_running.store(true, Ordering::Release);

    let period = Duration::from_secs_f64(1.0 / state.config.fps as f64);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_shape = (0usize, 0usize);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = slot.teardown_wait() => break,
            _ = state.shutdown.wait() => break,
        }

        let sources = state.video_sources().await;
        let shape = crate::render::grid_shape(sources.len());
        if shape != last_shape {
            if last_shape != (0, 0) {
                // Grid geometry changed: the recipient must wipe stale glyphs.
                slot.clear_pending.store(true, Ordering::Release);
            }
            last_shape = shape;
        }
        if sources.is_empty() {
            continue;
        }

        let (viewport, ramp) = {
            let mut info = slot.info.lock().await;
            let viewport = match &info.term {
                Some(term) => Viewport {
                    width: term.width,
                    height: term.height,
                    utf8: term.utf8,
                },
                None => Viewport::default(),
            };
            let ramp = info
                .ramp
                .get_or_insert_with(|| {
                    // A unicode ramp is useless on an ASCII-only terminal.
                    if state.ramp.needs_unicode() && !viewport.utf8 {
                        Arc::new(GlyphRamp::resolve(PaletteKind::Standard, None))
                    } else {
                        state.ramp.clone()
                    }
                })
                .clone();
            (viewport, ramp)
        };

        let frame = state.renderer.render(&sources, &viewport, &ramp);
        slot.ascii_out.publish(frame);
        state.stats.frames_rendered.fetch_add(1, Ordering::Relaxed);
    }

    slot.video_task_running.store(false, Ordering::Release);
}

/// The audio-render tick: one mixer call per 256-sample frame period,
/// enqueued drop-oldest.
async fn run_audio(state: Arc<ServerState>, slot: Arc<ClientSlot>) {
    slot.audio_task_running.store(true, Ordering::Release);

    let period = Duration::from_secs_f64(FRAME_SAMPLES as f64 / SAMPLE_RATE as f64);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = slot.teardown_wait() => break,
            _ = state.shutdown.wait() => break,
        }

        // None means no other producer: skip the emission entirely.
        if let Some(frame) = state.mixer.mix_excluding(slot.id) {
            slot.audio_out.push(frame.to_vec());
        }
    }

    slot.audio_task_running.store(false, Ordering::Release);
}

/// Stop the slot's sibling tasks, close the socket, and mark the slot
/// inactive so the lifecycle manager frees it.
async fn teardown(state: &Arc<ServerState>, slot: &Arc<ClientSlot>) {
    slot.begin_teardown();
    state.mixer.set_producing(slot.id, false);

    let (send, video, audio) = {
        let mut tasks = slot.tasks.lock();
        (tasks.send.take(), tasks.video.take(), tasks.audio.take())
    };
    for handle in [send, video, audio].into_iter().flatten() {
        let mut handle = handle;
        if timeout(TASK_JOIN_TIMEOUT, &mut handle).await.is_err() {
            warn!(client_id = slot.id, "slot task did not stop in time, aborting");
            handle.abort();
        }
    }

    slot.close_socket().await;
    slot.set_inactive();
    state.client_count.fetch_sub(1, Ordering::AcqRel);

    state.broadcast_server_state().await;
    debug!(client_id = slot.id, "slot torn down");
}
