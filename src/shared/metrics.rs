use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{LazyLock, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DrainOutcomeStatus {
    Success,
    Partial,
    Failure,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetricsSnapshot {
    pub delivered_total: u64,
    pub failed_total: u64,
    pub pruned_total: u64,
    pub drain_passes: u64,
    pub consecutive_failed_passes: u64,
    pub last_outcome: Option<DrainOutcomeStatus>,
    pub last_trigger: Option<String>,
    pub last_pass_ms: Option<u64>,
}

struct SyncMetrics {
    delivered: AtomicU64,
    failed: AtomicU64,
    pruned: AtomicU64,
    passes: AtomicU64,
    consecutive_failed_passes: AtomicU64,
    last: Mutex<LastPass>,
}

#[derive(Default)]
struct LastPass {
    outcome: Option<DrainOutcomeStatus>,
    trigger: Option<String>,
    timestamp_ms: Option<u64>,
}

impl SyncMetrics {
    fn new() -> Self {
        Self {
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            pruned: AtomicU64::new(0),
            passes: AtomicU64::new(0),
            consecutive_failed_passes: AtomicU64::new(0),
            last: Mutex::new(LastPass::default()),
        }
    }
}

static SYNC_METRICS: LazyLock<SyncMetrics> = LazyLock::new(SyncMetrics::new);

/// ドレイン 1 回分の結果を記録する。
pub fn record_drain_pass(trigger: &str, delivered: u64, failed: u64, pruned: u64) {
    let metrics = &*SYNC_METRICS;
    metrics.delivered.fetch_add(delivered, Ordering::Relaxed);
    metrics.failed.fetch_add(failed, Ordering::Relaxed);
    metrics.pruned.fetch_add(pruned, Ordering::Relaxed);
    metrics.passes.fetch_add(1, Ordering::Relaxed);

    let outcome = match (delivered, failed) {
        (_, 0) => DrainOutcomeStatus::Success,
        (0, _) => DrainOutcomeStatus::Failure,
        _ => DrainOutcomeStatus::Partial,
    };
    if outcome == DrainOutcomeStatus::Failure {
        metrics
            .consecutive_failed_passes
            .fetch_add(1, Ordering::Relaxed);
    } else {
        metrics.consecutive_failed_passes.store(0, Ordering::Relaxed);
    }

    if let Ok(mut last) = metrics.last.lock() {
        last.outcome = Some(outcome);
        last.trigger = Some(trigger.to_string());
        last.timestamp_ms = Some(current_unix_ms());
    }
}

pub fn snapshot() -> SyncMetricsSnapshot {
    let metrics = &*SYNC_METRICS;
    let (last_outcome, last_trigger, last_pass_ms) = match metrics.last.lock() {
        Ok(last) => (last.outcome, last.trigger.clone(), last.timestamp_ms),
        Err(_) => (None, None, None),
    };
    SyncMetricsSnapshot {
        delivered_total: metrics.delivered.load(Ordering::Relaxed),
        failed_total: metrics.failed.load(Ordering::Relaxed),
        pruned_total: metrics.pruned.load(Ordering::Relaxed),
        drain_passes: metrics.passes.load(Ordering::Relaxed),
        consecutive_failed_passes: metrics.consecutive_failed_passes.load(Ordering::Relaxed),
        last_outcome,
        last_trigger,
        last_pass_ms,
    }
}

fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
