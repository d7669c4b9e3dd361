//! Process configuration, loaded from environment variables.
//!
//! Grounded on the teacher's `ApiServerConfig::from_env_or_default`
//! (api/server.rs): defaults first, then env overrides where present
//! and parseable.

use std::time::Duration;

use crate::error::{Error, Result};

/// `XG2G_V3_*` is a legacy key prefix from a prior generation of this
/// gateway. Its presence at startup almost always means a stale deploy
/// config was carried over unchanged, so we refuse to start rather than
/// silently ignore values the operator thinks are taking effect.
const LEGACY_PREFIX: &str = "XG2G_V3_";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_address: String,
    pub port: u16,
    pub e2_host: String,
    pub e2_port: u16,
    pub e2_username: Option<String>,
    pub e2_password: Option<String>,
    pub store_path: String,
    pub hls_root: std::path::PathBuf,
    pub ffmpeg_bin: String,
    pub intent_secret: Vec<u8>,
    pub session_ttl_secs: i64,
    pub lease_ttl_secs: u64,
    pub drain_grace_secs: u64,
    pub max_hard_resets: u32,
    pub hard_reset_window_secs: i64,
    pub ready_timeout: Duration,
    pub enable_cors: bool,
    pub body_limit: usize,
    pub tuner_count: u32,
    pub idem_window_secs: i64,
    pub jwt_secret: Vec<u8>,
    pub jwt_issuer: String,
    pub jwt_audience: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            e2_host: "127.0.0.1".to_string(),
            e2_port: 80,
            e2_username: None,
            e2_password: None,
            store_path: "xg2g.db".to_string(),
            hls_root: std::path::PathBuf::from("./hls"),
            ffmpeg_bin: "ffmpeg".to_string(),
            intent_secret: b"change-me-in-production".to_vec(),
            session_ttl_secs: 300,
            lease_ttl_secs: 30,
            drain_grace_secs: 15,
            max_hard_resets: 3,
            hard_reset_window_secs: 60,
            ready_timeout: Duration::from_secs(12),
            enable_cors: true,
            body_limit: 10 * 1024 * 1024,
            tuner_count: 2,
            idem_window_secs: 300,
            jwt_secret: b"change-me-in-production".to_vec(),
            jwt_issuer: "xg2g".to_string(),
            jwt_audience: "xg2g-api".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load from environment, validating there are no stale `XG2G_V3_*`
    /// keys present. Fails fast so a misconfigured deploy never runs with
    /// config the operator believes is applied.
    pub fn from_env() -> Result<Self> {
        reject_legacy_keys()?;

        let mut config = Self::default();

        if let Ok(v) = std::env::var("XG2G_BIND_ADDRESS") {
            if !v.trim().is_empty() {
                config.bind_address = v;
            }
        }
        if let Ok(v) = std::env::var("XG2G_PORT") {
            config.port = v
                .parse()
                .map_err(|_| Error::config(format!("XG2G_PORT must be a u16, got {v:?}")))?;
        }
        if let Ok(v) = std::env::var("XG2G_E2_HOST") {
            if !v.trim().is_empty() {
                config.e2_host = v;
            }
        }
        if let Ok(v) = std::env::var("XG2G_E2_PORT") {
            config.e2_port = v
                .parse()
                .map_err(|_| Error::config(format!("XG2G_E2_PORT must be a u16, got {v:?}")))?;
        }
        if let Ok(v) = std::env::var("XG2G_E2_USERNAME") {
            config.e2_username = Some(v);
        }
        if let Ok(v) = std::env::var("XG2G_E2_PASSWORD") {
            config.e2_password = Some(v);
        }
        if let Ok(v) = std::env::var("XG2G_STORE_PATH") {
            config.store_path = v;
        }
        if let Ok(v) = std::env::var("XG2G_HLS_ROOT") {
            config.hls_root = std::path::PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("XG2G_FFMPEG_BIN") {
            config.ffmpeg_bin = v;
        }
        if let Ok(v) = std::env::var("XG2G_INTENT_SECRET") {
            if v.trim().is_empty() {
                return Err(Error::config("XG2G_INTENT_SECRET must not be empty"));
            }
            config.intent_secret = v.into_bytes();
        }
        if let Ok(v) = std::env::var("XG2G_SESSION_TTL_SECS") {
            config.session_ttl_secs = v
                .parse()
                .map_err(|_| Error::config("XG2G_SESSION_TTL_SECS must be an integer"))?;
        }
        if let Ok(v) = std::env::var("XG2G_LEASE_TTL_SECS") {
            config.lease_ttl_secs = v
                .parse()
                .map_err(|_| Error::config("XG2G_LEASE_TTL_SECS must be an integer"))?;
        }
        if let Ok(v) = std::env::var("XG2G_DRAIN_GRACE_SECS") {
            config.drain_grace_secs = v
                .parse()
                .map_err(|_| Error::config("XG2G_DRAIN_GRACE_SECS must be an integer"))?;
        }
        if let Ok(v) = std::env::var("XG2G_MAX_HARD_RESETS") {
            config.max_hard_resets = v
                .parse()
                .map_err(|_| Error::config("XG2G_MAX_HARD_RESETS must be an integer"))?;
        }
        if let Ok(v) = std::env::var("XG2G_HARD_RESET_WINDOW_SECS") {
            config.hard_reset_window_secs = v
                .parse()
                .map_err(|_| Error::config("XG2G_HARD_RESET_WINDOW_SECS must be an integer"))?;
        }
        if let Ok(v) = std::env::var("XG2G_READY_TIMEOUT_SECS") {
            let secs: u64 = v
                .parse()
                .map_err(|_| Error::config("XG2G_READY_TIMEOUT_SECS must be an integer"))?;
            config.ready_timeout = Duration::from_secs(secs);
        }
        if let Ok(v) = std::env::var("XG2G_ENABLE_CORS") {
            config.enable_cors = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("XG2G_TUNER_COUNT") {
            config.tuner_count = v
                .parse()
                .map_err(|_| Error::config("XG2G_TUNER_COUNT must be an integer"))?;
        }
        if let Ok(v) = std::env::var("XG2G_IDEM_WINDOW_SECS") {
            config.idem_window_secs = v
                .parse()
                .map_err(|_| Error::config("XG2G_IDEM_WINDOW_SECS must be an integer"))?;
        }
        if let Ok(v) = std::env::var("XG2G_JWT_SECRET") {
            if v.trim().is_empty() {
                return Err(Error::config("XG2G_JWT_SECRET must not be empty"));
            }
            config.jwt_secret = v.into_bytes();
        }
        if let Ok(v) = std::env::var("XG2G_JWT_ISSUER") {
            config.jwt_issuer = v;
        }
        if let Ok(v) = std::env::var("XG2G_JWT_AUDIENCE") {
            config.jwt_audience = v;
        }

        Ok(config)
    }

    pub fn e2_base_url(&self) -> String {
        format!("http://{}:{}", self.e2_host, self.e2_port)
    }
}

fn reject_legacy_keys() -> Result<()> {
    let stale: Vec<String> = std::env::vars()
        .map(|(k, _)| k)
        .filter(|k| k.starts_with(LEGACY_PREFIX))
        .collect();

    if stale.is_empty() {
        Ok(())
    } else {
        Err(Error::config(format!(
            "refusing to start: legacy env keys present: {}",
            stale.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = GatewayConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.e2_base_url(), "http://127.0.0.1:80");
    }

    #[test]
    #[ignore = "mutates process-wide environment; run with --test-threads=1"]
    fn legacy_keys_are_rejected() {
        std::env::set_var("XG2G_V3_TOKEN", "stale");
        let result = GatewayConfig::from_env();
        std::env::remove_var("XG2G_V3_TOKEN");
        assert!(result.is_err());
    }
}
