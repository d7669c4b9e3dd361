//! Lease record (spec.md §3, §4.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub key: String,
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    pub generation: u64,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let elapsed = (now - self.acquired_at).num_seconds().max(0) as u64;
        elapsed >= self.ttl_seconds
    }
}

pub fn tuner_key(slot: u32) -> String {
    format!("tuner:{slot}")
}
