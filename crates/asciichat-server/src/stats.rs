//! The stats collector: sleeps in 10 ms increments to stay responsive
//! to shutdown, and every 10 s emits one structured snapshot line built
//! from read-locked scans and atomic counters only. No slot mutex is
//! ever taken here.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, info};

use crate::state::ServerState;

const SLEEP_STEP: Duration = Duration::from_millis(10);
const REPORT_EVERY: Duration = Duration::from_secs(10);

pub async fn run_stats(state: Arc<ServerState>) {
    let mut last_report = Instant::now();
    let mut last_mixer_calls = state.mixer.call_count();

    loop {
        if state.shutdown.is_triggered() {
            return;
        }
        sleep(SLEEP_STEP).await;
        if last_report.elapsed() < REPORT_EVERY {
            continue;
        }

        let elapsed = last_report.elapsed().as_secs_f64();
        let snapshot = state.snapshot_slots().await;

        let mut queue_depth = 0usize;
        let mut queue_drops = 0u64;
        let mut video_backlog = 0u64;
        for slot in &snapshot {
            queue_depth += slot.audio_out.len();
            queue_drops += slot.audio_out.dropped();
            video_backlog += slot.ascii_out.generation();
        }

        let mixer_calls = state.mixer.call_count();
        let mixer_rate = (mixer_calls.saturating_sub(last_mixer_calls)) as f64 / elapsed;

        let held = crate::sync::held_counts();
        if !held.is_empty() {
            debug!(?held, "named locks currently held");
        }

        info!(
            clients = state.client_count.load(Ordering::Acquire),
            producing = state.mixer.producing_count(),
            audio_queue_depth = queue_depth,
            audio_drops = queue_drops,
            frames_rendered = state.stats.frames_rendered.load(Ordering::Relaxed),
            frames_published = video_backlog,
            mixer_rate_hz = format_args!("{mixer_rate:.0}"),
            "stats"
        );

        last_report = Instant::now();
        last_mixer_calls = mixer_calls;
    }
}
