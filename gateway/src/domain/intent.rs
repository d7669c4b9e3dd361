//! Intent record and idempotency-key derivation (spec.md §3, §9).

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::ids::SessionId;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentType {
    Live,
    Vod,
}

/// Transient record capturing an external request; idempotencyKey →
/// sessionId mapping with a finite window (default 5 min).
#[derive(Debug, Clone)]
pub struct Intent {
    pub idempotency_key: String,
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
}

/// Compute `HMAC-SHA256(secret, "v3_intent" | type | targetId | profileId | bucket)`.
///
/// bucket = 0 for live streams, floor(startMs/1000) for VOD.
pub fn idempotency_key(
    secret: &[u8],
    intent_type: IntentType,
    target_id: &str,
    profile_id: &str,
    start_ms: Option<i64>,
) -> String {
    let type_str = match intent_type {
        IntentType::Live => "live",
        IntentType::Vod => "vod",
    };
    let bucket = match intent_type {
        IntentType::Live => 0,
        IntentType::Vod => start_ms.unwrap_or(0) / 1000,
    };

    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(b"v3_intent");
    mac.update(type_str.as_bytes());
    mac.update(target_id.as_bytes());
    mac.update(profile_id.as_bytes());
    mac.update(bucket.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_bucket_is_always_zero() {
        let k1 = idempotency_key(b"secret", IntentType::Live, "svc", "safari", Some(1234));
        let k2 = idempotency_key(b"secret", IntentType::Live, "svc", "safari", Some(9999));
        assert_eq!(k1, k2);
    }

    #[test]
    fn vod_bucket_varies_with_start_ms() {
        let k1 = idempotency_key(b"secret", IntentType::Vod, "svc", "safari", Some(1_000));
        let k2 = idempotency_key(b"secret", IntentType::Vod, "svc", "safari", Some(2_000));
        assert_ne!(k1, k2);
    }

    #[test]
    fn differing_profile_changes_key() {
        let k1 = idempotency_key(b"secret", IntentType::Live, "svc", "safari", None);
        let k2 = idempotency_key(b"secret", IntentType::Live, "svc", "fmp4", None);
        assert_ne!(k1, k2);
    }
}
