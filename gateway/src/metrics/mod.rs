//! Counters for every boundary named by spec.md §4.11, shaped the way
//! the teacher's `metrics::collector::MetricsCollector` does it: plain
//! `AtomicU64` fields for unlabeled counters, `DashMap<String, AtomicU64>`
//! for label series, no external metrics crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Default)]
pub struct MetricsCollector {
    stream_start_total: DashMap<String, AtomicU64>,
    enigma_pts_jump_total: AtomicU64,
    enigma_pmt_change_total: AtomicU64,
    enigma_ingest_reset_total: AtomicU64,
    enigma_source_stall_total: AtomicU64,
    enigma_decode_error_total: AtomicU64,
    request_duration_count: DashMap<String, AtomicU64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_stream_start(&self, reason: &str) {
        self.stream_start_total
            .entry(reason.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pts_jump(&self) {
        self.enigma_pts_jump_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pmt_change(&self) {
        self.enigma_pmt_change_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ingest_reset(&self) {
        self.enigma_ingest_reset_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_source_stall(&self) {
        self.enigma_source_stall_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.enigma_decode_error_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request(&self, operation: &str, status: u16, attempt: u32) {
        let key = format!("{operation}|{status}|{attempt}");
        self.request_duration_count
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            stream_start_total: self
                .stream_start_total
                .iter()
                .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
                .collect(),
            enigma_pts_jump_total: self.enigma_pts_jump_total.load(Ordering::Relaxed),
            enigma_pmt_change_total: self.enigma_pmt_change_total.load(Ordering::Relaxed),
            enigma_ingest_reset_total: self.enigma_ingest_reset_total.load(Ordering::Relaxed),
            enigma_source_stall_total: self.enigma_source_stall_total.load(Ordering::Relaxed),
            enigma_decode_error_total: self.enigma_decode_error_total.load(Ordering::Relaxed),
            enigma_infer_locked_total: crate::receiver::infer_locked_total(),
            request_count_by_key: self
                .request_duration_count
                .iter()
                .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub stream_start_total: HashMap<String, u64>,
    pub enigma_pts_jump_total: u64,
    pub enigma_pmt_change_total: u64,
    pub enigma_ingest_reset_total: u64,
    pub enigma_source_stall_total: u64,
    pub enigma_decode_error_total: u64,
    pub enigma_infer_locked_total: u64,
    pub request_count_by_key: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_start_is_labeled_by_reason() {
        let m = MetricsCollector::new();
        m.record_stream_start("new");
        m.record_stream_start("new");
        m.record_stream_start("hard_reset");

        let snap = m.snapshot();
        assert_eq!(snap.stream_start_total.get("new"), Some(&2));
        assert_eq!(snap.stream_start_total.get("hard_reset"), Some(&1));
    }

    #[test]
    fn unlabeled_counters_accumulate() {
        let m = MetricsCollector::new();
        m.record_pts_jump();
        m.record_pts_jump();
        assert_eq!(m.snapshot().enigma_pts_jump_total, 2);
    }
}
