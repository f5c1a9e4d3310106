//! Host state shared by the REPL and the event renderers.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use avatalk_core::{DispatchEvent, EngineHandle, ReplySource};
use parking_lot::Mutex;
use serde::Serialize;

use crate::console::ConsoleRecognizer;
use crate::settings::AppSettings;

pub struct AppState {
    pub engine: EngineHandle,
    /// Feeds typed "speech" into the active recognition pass.
    pub recognizer: ConsoleRecognizer,
    pub settings: Arc<Mutex<AppSettings>>,
    /// Absolute path to `settings.json`.
    pub settings_path: PathBuf,
    pub diagnostics: Arc<Diagnostics>,
}

impl AppState {
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }
}

/// Counters fed from the dispatch broadcast.
#[derive(Debug, Default)]
pub struct Diagnostics {
    dispatches: AtomicUsize,
    remote: AtomicUsize,
    simulated: AtomicUsize,
    no_response: AtomicUsize,
    fallbacks: AtomicUsize,
    reply_latency: Mutex<StageWindow>,
}

impl Diagnostics {
    pub fn record(&self, event: &DispatchEvent) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        let counter = match event.reply.source {
            ReplySource::Remote => &self.remote,
            ReplySource::Simulated => &self.simulated,
            ReplySource::NoResponse => &self.no_response,
            ReplySource::Fallback => &self.fallbacks,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.reply_latency.lock().record(event.latency_ms as f64);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            dispatches: self.dispatches.load(Ordering::Relaxed),
            remote: self.remote.load(Ordering::Relaxed),
            simulated: self.simulated.load(Ordering::Relaxed),
            no_response: self.no_response.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            reply_ms: self.reply_latency.lock().snapshot(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub dispatches: usize,
    pub remote: usize,
    pub simulated: usize,
    pub no_response: usize,
    pub fallbacks: usize,
    pub reply_ms: StageSnapshot,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSnapshot {
    pub count: usize,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
}

/// Rolling window of the most recent samples; mean and max cover all samples.
#[derive(Debug)]
struct StageWindow {
    samples: VecDeque<f64>,
    cap: usize,
    count: usize,
    sum_ms: f64,
    max_ms: f64,
}

impl Default for StageWindow {
    fn default() -> Self {
        Self {
            samples: VecDeque::with_capacity(256),
            cap: 256,
            count: 0,
            sum_ms: 0.0,
            max_ms: 0.0,
        }
    }
}

impl StageWindow {
    fn record(&mut self, elapsed_ms: f64) {
        let v = if elapsed_ms.is_finite() {
            elapsed_ms.max(0.0)
        } else {
            0.0
        };
        if self.samples.len() == self.cap {
            self.samples.pop_front();
        }
        self.samples.push_back(v);
        self.count = self.count.saturating_add(1);
        self.sum_ms += v;
        self.max_ms = self.max_ms.max(v);
    }

    fn snapshot(&self) -> StageSnapshot {
        if self.samples.is_empty() {
            return StageSnapshot::default();
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let percentile = |p: f64| {
            let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
            sorted[idx.min(sorted.len() - 1)]
        };

        StageSnapshot {
            count: self.count,
            mean_ms: self.sum_ms / self.count as f64,
            p50_ms: percentile(0.50),
            p95_ms: percentile(0.95),
            max_ms: self.max_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatalk_core::Reply;

    fn dispatched(source: ReplySource, latency_ms: u64) -> DispatchEvent {
        DispatchEvent {
            request: "halo".into(),
            reply: Reply::new("hai", source),
            latency_ms,
        }
    }

    #[test]
    fn empty_window_snapshot_is_zero() {
        assert_eq!(StageWindow::default().snapshot(), StageSnapshot::default());
    }

    #[test]
    fn window_percentiles_over_recorded_samples() {
        let mut window = StageWindow::default();
        for ms in 1..=100 {
            window.record(ms as f64);
        }
        window.record(f64::NAN);
        let snap = window.snapshot();
        assert_eq!(snap.count, 101);
        assert_eq!(snap.p50_ms, 50.0);
        assert_eq!(snap.p95_ms, 95.0);
        assert_eq!(snap.max_ms, 100.0);
    }

    #[test]
    fn window_evicts_oldest_beyond_cap() {
        let mut window = StageWindow::default();
        for _ in 0..300 {
            window.record(1_000.0);
        }
        for _ in 0..256 {
            window.record(10.0);
        }
        let snap = window.snapshot();
        assert_eq!(snap.p95_ms, 10.0);
        assert_eq!(snap.max_ms, 1_000.0);
    }

    #[test]
    fn diagnostics_count_by_reply_source() {
        let diag = Diagnostics::default();
        diag.record(&dispatched(ReplySource::Simulated, 1_000));
        diag.record(&dispatched(ReplySource::Fallback, 30_000));
        diag.record(&dispatched(ReplySource::Simulated, 1_002));

        let snap = diag.snapshot();
        assert_eq!(snap.dispatches, 3);
        assert_eq!(snap.simulated, 2);
        assert_eq!(snap.fallbacks, 1);
        assert_eq!(snap.remote, 0);
        assert_eq!(snap.reply_ms.count, 3);
        assert_eq!(snap.reply_ms.max_ms, 30_000.0);
    }
}
