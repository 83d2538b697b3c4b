//! Process-wide activity counters, reported by `/forum/stats/`.
//!
//! Counters reset when the process restarts; persistent totals come from
//! [`Storage::get_statistics`](crate::storage::Storage::get_statistics).
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use crate::storage::SearchKind;

static POSTS_CREATED: AtomicU64 = AtomicU64::new(0);
static THREADS_CREATED: AtomicU64 = AtomicU64::new(0);
static PMS_SENT: AtomicU64 = AtomicU64::new(0);
static LOGINS_OK: AtomicU64 = AtomicU64::new(0);
static LOGINS_FAILED: AtomicU64 = AtomicU64::new(0);
static REGISTRATIONS: AtomicU64 = AtomicU64::new(0);
static REQUEST_LATENCY_SUM_MS: AtomicU64 = AtomicU64::new(0);
static REQUEST_LATENCY_COUNT: AtomicU64 = AtomicU64::new(0);

static SEARCH_COUNTERS: OnceLock<Mutex<BTreeMap<String, u64>>> = OnceLock::new();

pub fn inc_posts_created() {
    POSTS_CREATED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_threads_created() {
    THREADS_CREATED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_pms_sent() {
    PMS_SENT.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_logins_ok() {
    LOGINS_OK.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_logins_failed() {
    LOGINS_FAILED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_registrations() {
    REGISTRATIONS.fetch_add(1, Ordering::Relaxed);
}

pub fn observe_request_latency(started: Instant) {
    let ms = started.elapsed().as_millis() as u64;
    REQUEST_LATENCY_SUM_MS.fetch_add(ms, Ordering::Relaxed);
    REQUEST_LATENCY_COUNT.fetch_add(1, Ordering::Relaxed);
}

fn search_counter_lock() -> &'static Mutex<BTreeMap<String, u64>> {
    SEARCH_COUNTERS.get_or_init(|| Mutex::new(BTreeMap::new()))
}

/// Count one search. Unrecognised objects all share the `other` bucket.
pub fn record_search(kind: Option<SearchKind>) -> u64 {
    let label = kind.map(SearchKind::as_str).unwrap_or("other");
    let mut guard = search_counter_lock().lock().unwrap_or_else(|e| e.into_inner());
    let counter = guard.entry(label.to_string()).or_insert(0);
    *counter = counter.saturating_add(1);
    *counter
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Snapshot {
    pub posts_created: u64,
    pub threads_created: u64,
    pub pms_sent: u64,
    pub logins_ok: u64,
    pub logins_failed: u64,
    pub registrations: u64,
    pub request_latency_avg_ms: Option<u64>,
    pub searches: BTreeMap<String, u64>,
}

pub fn snapshot() -> Snapshot {
    let sum = REQUEST_LATENCY_SUM_MS.load(Ordering::Relaxed);
    let count = REQUEST_LATENCY_COUNT.load(Ordering::Relaxed);
    Snapshot {
        posts_created: POSTS_CREATED.load(Ordering::Relaxed),
        threads_created: THREADS_CREATED.load(Ordering::Relaxed),
        pms_sent: PMS_SENT.load(Ordering::Relaxed),
        logins_ok: LOGINS_OK.load(Ordering::Relaxed),
        logins_failed: LOGINS_FAILED.load(Ordering::Relaxed),
        registrations: REGISTRATIONS.load(Ordering::Relaxed),
        request_latency_avg_ms: if count > 0 { Some(sum / count) } else { None },
        searches: search_counter_lock().lock().unwrap_or_else(|e| e.into_inner()).clone(),
    }
}
