//! The shared server state: a fixed-capacity slot table behind a fair
//! reader-writer lock, the mixer, the shutdown token and run counters.
//!
//! Locking contract: the slot lock is held only to scan or mutate the
//! table itself, never across I/O — callers snapshot the `Arc`s they
//! need and release the lock before touching any slot-internal lock.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use ed25519_dalek::SigningKey;
use zeroize::Zeroizing;

use asciichat_audio::Mixer;
use asciichat_crypto::Whitelist;
use asciichat_proto::messages::ServerState as ServerStateBody;
use asciichat_proto::types::{caps, image_flags, ClientId};
use asciichat_proto::WireMessage;

use crate::client::ClientSlot;
use crate::config::ServerConfig;
use crate::error::DisconnectClass;
use crate::render::{GridRenderer, RampRenderer, VideoSource};
use crate::palette::GlyphRamp;
use crate::shutdown::ShutdownToken;
use crate::sync::NamedRwLock;

/// Monotonic run counters, all updated with relaxed atomics and read by
/// the stats loop and the shutdown summary.
#[derive(Default)]
pub struct ServerStats {
    pub admitted: AtomicU64,
    pub handshake_failures: AtomicU64,
    pub disconnects_clean: AtomicU64,
    pub disconnects_transport: AtomicU64,
    pub disconnects_protocol: AtomicU64,
    pub disconnects_crypto: AtomicU64,
    pub disconnects_resource: AtomicU64,
    pub frames_rendered: AtomicU64,
}

impl ServerStats {
    pub fn record_disconnect(&self, class: DisconnectClass) {
        let counter = match class {
            DisconnectClass::Clean => &self.disconnects_clean,
            DisconnectClass::Transport => &self.disconnects_transport,
            DisconnectClass::Protocol => &self.disconnects_protocol,
            DisconnectClass::Crypto => &self.disconnects_crypto,
            DisconnectClass::Resource => &self.disconnects_resource,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct ServerState {
    pub config: ServerConfig,
    /// Fixed-size table; index is the slot, `None` is free. tokio's
    /// RwLock is fair, so admission (the writer) is never starved by
    /// the scanning readers.
    pub slots: NamedRwLock<Vec<Option<Arc<ClientSlot>>>>,
    pub client_count: AtomicUsize,
    next_client_id: AtomicU32,
    pub mixer: Arc<Mixer>,
    pub shutdown: ShutdownToken,
    pub identity: Option<SigningKey>,
    pub password: Option<Zeroizing<String>>,
    pub whitelist: Option<Arc<Whitelist>>,
    pub renderer: Arc<dyn GridRenderer>,
    pub ramp: Arc<GlyphRamp>,
    pub stats: ServerStats,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        identity: Option<SigningKey>,
        whitelist: Option<Arc<Whitelist>>,
    ) -> Arc<Self> {
        let slots = vec![None; config.max_clients as usize];
        let ramp = GlyphRamp::resolve(config.palette, config.palette_custom.as_deref());
        let password = config.password.clone().map(Zeroizing::new);
        Arc::new(Self {
            slots: NamedRwLock::new("server.slots", slots),
            client_count: AtomicUsize::new(0),
            next_client_id: AtomicU32::new(1),
            mixer: Arc::new(Mixer::new()),
            shutdown: ShutdownToken::new(),
            identity,
            password,
            whitelist,
            renderer: Arc::new(RampRenderer),
            ramp: Arc::new(ramp),
            stats: ServerStats::default(),
            config,
        })
    }

    /// Allocate the next client id. Ids are unique for the server's
    /// lifetime and never zero (zero marks an empty slot).
    pub fn alloc_client_id(&self) -> ClientId {
        loop {
            let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    /// Clone out every occupied slot. The lock is released before the
    /// caller touches any per-slot state.
    pub async fn snapshot_slots(&self) -> Vec<Arc<ClientSlot>> {
        let slots = self.slots.read().await;
        slots.iter().flatten().cloned().collect()
    }

    /// Current video sources for grid composition, in stable id order.
    pub async fn video_sources(&self) -> Vec<VideoSource> {
        let snapshot = self.snapshot_slots().await;
        let mut sources: Vec<VideoSource> = snapshot
            .iter()
            .filter(|slot| slot.is_active() && slot.is_sending_video())
            .filter_map(|slot| {
                slot.video_in.latest().map(|frame| {
                    let stretch = slot.has_capability(caps::STRETCH)
                        || frame.flags & image_flags::STRETCHED != 0;
                    VideoSource {
                        client_id: slot.id,
                        frame,
                        stretch,
                    }
                })
            })
            .collect();
        sources.sort_by_key(|s| s.client_id);
        sources
    }

    /// Whether another active client already claimed `name`.
    pub async fn display_name_taken(&self, name: &str, exclude: ClientId) -> bool {
        let snapshot = self.snapshot_slots().await;
        for slot in snapshot {
            if slot.id == exclude || !slot.is_active() {
                continue;
            }
            let info = slot.info.lock().await;
            if info.display_name == name {
                return true;
            }
        }
        false
    }

    /// Body of a `SERVER_STATE` packet reflecting the current membership.
    pub async fn server_state_body(&self) -> ServerStateBody {
        let snapshot = self.snapshot_slots().await;
        let connected = self.client_count.load(Ordering::Acquire) as u32;
        let video_sources = snapshot
            .iter()
            .filter(|s| s.is_active() && s.is_sending_video())
            .count() as u32;
        let audio_sources = snapshot
            .iter()
            .filter(|s| s.is_active() && s.audio_in.is_producing())
            .count() as u32;
        ServerStateBody {
            connected,
            video_sources,
            audio_sources,
        }
    }

    /// Push a `SERVER_STATE` update to every joined client. Send errors
    /// are each client's own problem and ignored here.
    pub async fn broadcast_server_state(&self) {
        let body = self.server_state_body().await;
        let msg = WireMessage::ServerState(body);
        for slot in self.snapshot_slots().await {
            if slot.is_active() && slot.has_joined() {
                let _ = slot.send_message(&msg).await;
            }
        }
    }
}
