//! The accept/lifecycle manager: admission into free slots, the
//! per-iteration cleanup pass that reaps finished clients, and the
//! ordered shutdown sequence.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{error, info, warn};

use asciichat_proto::types::ClientId;

use crate::client::{run_receive, ClientSlot};
use crate::state::ServerState;

/// Accept timeout; bounds how long a shutdown request can go unobserved.
const ACCEPT_TICK: Duration = Duration::from_millis(200);
/// Ceiling on joining a client task once shutdown has begun.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Run the accept loop until shutdown, then tear everything down.
/// Fatal errors before the first accept are the caller's problem; from
/// here on, per-client failures never propagate.
pub async fn run(state: Arc<ServerState>, listener: TcpListener) -> anyhow::Result<()> {
    info!(
        max_clients = state.config.max_clients,
        audio = state.config.audio_enabled,
        encrypted = !state.config.no_encrypt,
        "server ready, accepting connections"
    );

    loop {
        // 1. Reap slots whose receive task has finished.
        cleanup_pass(&state).await;

        // 2. Shutdown gate.
        if state.shutdown.is_triggered() {
            break;
        }

        // 3. Accept with a short timeout so the gate is checked often.
        match timeout(ACCEPT_TICK, listener.accept()).await {
            Err(_) => continue, // timeout, go re-check the gate
            Ok(Ok((stream, addr))) => admit(&state, stream, addr).await,
            Ok(Err(e)) => match e.kind() {
                std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::ConnectionReset => continue,
                // The listening socket is gone; nothing left to accept.
                _ => {
                    error!("accept failed: {e}");
                    break;
                }
            },
        }
    }

    shutdown_all(&state).await;
    Ok(())
}

/// Admit a connection: allocate an id, claim a free slot, spawn the
/// receive task. Any failure here closes the socket and moves on.
async fn admit(state: &Arc<ServerState>, stream: TcpStream, addr: SocketAddr) {
    let _ = stream.set_nodelay(true);

    if state.client_count.load(Ordering::Acquire) >= state.config.max_clients as usize {
        warn!(peer = %addr, "server full, refusing connection");
        return; // dropping the stream closes it
    }

    let id = state.alloc_client_id();
    let peer = addr.to_string();

    let audio_in = state.mixer.register(id);
    let slot = {
        let mut slots = state.slots.write().await;
        let Some(index) = slots.iter().position(Option::is_none) else {
            drop(slots);
            warn!(peer = %addr, "no free slot, refusing connection");
            state.mixer.unregister(id);
            return;
        };
        let slot = ClientSlot::new(id, index, peer.clone(), &state.config, audio_in);
        slots[index] = Some(slot.clone());
        slot
    };

    state.client_count.fetch_add(1, Ordering::AcqRel);
    state.stats.admitted.fetch_add(1, Ordering::Relaxed);

    let (read_half, write_half) = stream.into_split();
    slot.attach_writer(write_half).await;

    let handle = tokio::spawn(run_receive(state.clone(), slot.clone(), read_half));
    slot.tasks.lock().receive = Some(handle);

    info!(client_id = id, peer = %peer, slot = slot.index, "client admitted");
}

/// Scan for inactive slots under the read lock, then take each one's
/// receive handle and join it with the lock released.
async fn cleanup_pass(state: &Arc<ServerState>) {
    let inactive: Vec<Arc<ClientSlot>> = {
        let slots = state.slots.read().await;
        slots
            .iter()
            .flatten()
            .filter(|slot| !slot.is_active())
            .cloned()
            .collect()
    };

    let mut finished: Vec<(usize, ClientId, tokio::task::JoinHandle<()>)> = Vec::new();
    for slot in inactive {
        if let Some(handle) = slot.tasks.lock().receive.take() {
            finished.push((slot.index, slot.id, handle));
        }
    }

    for (index, id, mut handle) in finished {
        if state.shutdown.is_triggered() {
            if timeout(SHUTDOWN_JOIN_TIMEOUT, &mut handle).await.is_err() {
                warn!(client_id = id, "receive task did not stop in time, abandoning");
                handle.abort();
            }
        } else {
            let _ = handle.await;
        }
        remove_client(state, index, id).await;
    }
}

/// Free a slot after its receive task has been joined.
async fn remove_client(state: &Arc<ServerState>, index: usize, id: ClientId) {
    {
        let mut slots = state.slots.write().await;
        if let Some(slot) = &slots[index] {
            if slot.id == id {
                slots[index] = None;
            }
        }
    }
    state.mixer.unregister(id);
    info!(client_id = id, "client removed");
}

/// Ordered shutdown: close every client socket (unblocking its tasks),
/// join receive tasks with a bounded timeout, free the table, and emit
/// the summary.
async fn shutdown_all(state: &Arc<ServerState>) {
    let snapshot = state.snapshot_slots().await;
    info!(clients = snapshot.len(), "shutting down, closing client connections");

    for slot in &snapshot {
        slot.begin_teardown();
        slot.close_socket().await;
    }

    for slot in &snapshot {
        let handle = slot.tasks.lock().receive.take();
        if let Some(mut handle) = handle {
            if timeout(SHUTDOWN_JOIN_TIMEOUT, &mut handle).await.is_err() {
                warn!(client_id = slot.id, "receive task abandoned at shutdown");
                handle.abort();
            }
        }
        state.mixer.unregister(slot.id);
    }

    {
        let mut slots = state.slots.write().await;
        for entry in slots.iter_mut() {
            *entry = None;
        }
    }

    let stats = &state.stats;
    info!(
        admitted = stats.admitted.load(Ordering::Relaxed),
        clean = stats.disconnects_clean.load(Ordering::Relaxed),
        transport = stats.disconnects_transport.load(Ordering::Relaxed),
        protocol = stats.disconnects_protocol.load(Ordering::Relaxed),
        crypto = stats.disconnects_crypto.load(Ordering::Relaxed),
        resource = stats.disconnects_resource.load(Ordering::Relaxed),
        handshake_failures = stats.handshake_failures.load(Ordering::Relaxed),
        frames_rendered = stats.frames_rendered.load(Ordering::Relaxed),
        "shutdown summary"
    );
}
