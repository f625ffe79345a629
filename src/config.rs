use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

const MIB: u64 = 1024 * 1024;

/// Main configuration structure loaded from tok_lens.toml and environment variables
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sessions: SessionConfig,
    pub oembed: OembedConfig,
    pub display: DisplayConfig,
    /// Runtime configuration resolved after file and env overrides
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// HTTP listener and upload limits
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub http_bind: String,
    pub max_upload_mb: u64,
    pub max_entry_mb: u64,
    pub request_timeout_ms: u64,
}

/// Session-scoped storage behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_secs: u64,
    pub max_sessions: usize,
    pub sweep_secs: u64,
}

/// TikTok oEmbed lookups for card thumbnails
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OembedConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub timeout_ms: u64,
    pub requests_per_sec: u32,
    pub concurrency: usize,
    pub cache_max: usize,
    pub user_agent: String,
}

/// Rendering defaults for the dashboard
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// IANA zone name used for bucketing and timestamps
    pub timezone: String,
    pub cards_per_row: usize,
    pub num_cards: usize,
}

/// Archive size limits snapshot for upload intake
#[derive(Debug, Clone, Copy)]
pub struct ArchiveLimits {
    pub max_upload_bytes: u64,
    pub max_entry_bytes: u64,
}

/// Values that only exist after parsing and validation
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub http_bind: SocketAddr,
    pub log_level: String,
    pub tz: Tz,
    pub config_source: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_bind: "127.0.0.1:8501".to_string(),
            max_upload_mb: 200,
            max_entry_mb: 64,
            request_timeout_ms: 30_000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 1800,
            max_sessions: 32,
            sweep_secs: 60,
        }
    }
}

impl Default for OembedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://www.tiktok.com/oembed".to_string(),
            timeout_ms: 8000,
            requests_per_sec: 8,
            concurrency: 6,
            cache_max: 2048,
            user_agent: "Mozilla/5.0".to_string(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            cards_per_row: 4,
            num_cards: 12,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            http_bind: SocketAddr::from(([127, 0, 0, 1], 8501)),
            log_level: "tok_lens=info,tower_http=info".to_string(),
            tz: Tz::UTC,
            config_source: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            sessions: SessionConfig::default(),
            oembed: OembedConfig::default(),
            display: DisplayConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    if v == "1" || v.eq_ignore_ascii_case("true") {
        Some(true)
    } else if v == "0" || v.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses TOK_LENS_CONFIG or defaults to "tok_lens.toml", then the user config dir
    pub fn load() -> anyhow::Result<Self> {
        // 1) TOKLENS_ENV_FILE if set
        // 2) ./.env
        if let Ok(env_path) = std::env::var("TOKLENS_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::from_path(".env");
        }

        let explicit = std::env::var("TOK_LENS_CONFIG").ok().map(PathBuf::from);
        let candidates: Vec<PathBuf> = match explicit {
            Some(p) => vec![p],
            None => {
                let mut v = vec![PathBuf::from("tok_lens.toml")];
                if let Some(dir) = dirs::config_dir() {
                    v.push(dir.join("tok-lens").join("tok_lens.toml"));
                }
                v
            }
        };

        let mut source = None;
        let mut config = Self::default();
        for path in &candidates {
            if let Ok(content) = std::fs::read_to_string(path) {
                config = Self::from_toml_str(&content)?;
                source = Some(path.clone());
                break;
            }
        }
        if source.is_none() {
            tracing::warn!(
                "Config file not found (tried {:?}), using defaults",
                candidates
            );
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.runtime.log_level = level;
        }
        config.runtime.config_source = source;
        config.finalize()?;
        Ok(config)
    }

    /// Parse a TOML document; missing sections and keys fall back to defaults
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `TOKLENS_*` overrides. Unparseable values are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn num<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse::<T>() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("Ignoring {}={:?}: not a number", key, raw);
                    None
                }
            }
        }

        if let Some(bind) = lookup("TOKLENS_HTTP_BIND") {
            self.server.http_bind = bind;
        }
        if let Some(v) = num("TOKLENS_MAX_UPLOAD_MB", lookup("TOKLENS_MAX_UPLOAD_MB")) {
            self.server.max_upload_mb = v;
        }
        if let Some(v) = num("TOKLENS_MAX_ENTRY_MB", lookup("TOKLENS_MAX_ENTRY_MB")) {
            self.server.max_entry_mb = v;
        }
        if let Some(v) = num(
            "TOKLENS_HTTP_REQUEST_TIMEOUT_MS",
            lookup("TOKLENS_HTTP_REQUEST_TIMEOUT_MS"),
        ) {
            self.server.request_timeout_ms = v;
        }
        if let Some(v) = num("TOKLENS_SESSION_TTL_SEC", lookup("TOKLENS_SESSION_TTL_SEC")) {
            self.sessions.ttl_secs = v;
        }
        if let Some(v) = num("TOKLENS_MAX_SESSIONS", lookup("TOKLENS_MAX_SESSIONS")) {
            self.sessions.max_sessions = v;
        }
        if let Some(v) = num("TOKLENS_SWEEP_SEC", lookup("TOKLENS_SWEEP_SEC")) {
            self.sessions.sweep_secs = v;
        }
        if let Some(raw) = lookup("TOKLENS_OEMBED") {
            match parse_flag(&raw) {
                Some(flag) => self.oembed.enabled = flag,
                None => tracing::warn!("Ignoring TOKLENS_OEMBED={:?}", raw),
            }
        }
        if let Some(url) = lookup("TOKLENS_OEMBED_URL") {
            self.oembed.endpoint = url;
        }
        if let Some(v) = num("TOKLENS_OEMBED_TIMEOUT_MS", lookup("TOKLENS_OEMBED_TIMEOUT_MS")) {
            self.oembed.timeout_ms = v;
        }
        if let Some(v) = num("TOKLENS_OEMBED_RPS", lookup("TOKLENS_OEMBED_RPS")) {
            self.oembed.requests_per_sec = v;
        }
        if let Some(v) = num(
            "TOKLENS_OEMBED_CONCURRENCY",
            lookup("TOKLENS_OEMBED_CONCURRENCY"),
        ) {
            self.oembed.concurrency = v;
        }
        if let Some(v) = num("TOKLENS_OEMBED_CACHE_MAX", lookup("TOKLENS_OEMBED_CACHE_MAX")) {
            self.oembed.cache_max = v;
        }
        if let Some(tz) = lookup("TOKLENS_DISPLAY_TZ") {
            self.display.timezone = tz;
        }
    }

    /// Validate, clamp and resolve runtime values
    pub fn finalize(&mut self) -> anyhow::Result<()> {
        self.runtime.http_bind = self
            .server
            .http_bind
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("Invalid http_bind '{}': {}", self.server.http_bind, e))?;

        self.runtime.tz = self
            .display
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Unknown timezone '{}': {}", self.display.timezone, e))?;

        if self.server.max_upload_mb == 0 {
            anyhow::bail!("max_upload_mb must be > 0");
        }
        if self.server.max_entry_mb == 0 {
            self.server.max_entry_mb = 1;
        } else if self.server.max_entry_mb > self.server.max_upload_mb.saturating_mul(8) {
            tracing::warn!(
                "max_entry_mb {} exceeds 8x max_upload_mb, clamping",
                self.server.max_entry_mb
            );
            self.server.max_entry_mb = self.server.max_upload_mb.saturating_mul(8);
        }

        if self.server.request_timeout_ms < 1000 {
            self.server.request_timeout_ms = 1000;
        }

        if self.sessions.max_sessions == 0 {
            self.sessions.max_sessions = 1;
        }
        if self.sessions.ttl_secs < 30 {
            tracing::warn!(
                "Session TTL {}s is below 30s, clamping to 30s",
                self.sessions.ttl_secs
            );
            self.sessions.ttl_secs = 30;
        }
        self.sessions.sweep_secs = self.sessions.sweep_secs.clamp(1, self.sessions.ttl_secs);

        self.oembed.requests_per_sec = self.oembed.requests_per_sec.clamp(1, 100);
        self.oembed.concurrency = self.oembed.concurrency.clamp(1, 32);
        self.oembed.cache_max = self.oembed.cache_max.max(1);
        if !self.oembed.endpoint.starts_with("http://")
            && !self.oembed.endpoint.starts_with("https://")
        {
            tracing::warn!(
                "oEmbed endpoint '{}' is not an http(s) URL, disabling thumbnails",
                self.oembed.endpoint
            );
            self.oembed.enabled = false;
        }

        self.display.cards_per_row = self.display.cards_per_row.clamp(2, 5);
        self.display.num_cards = crate::cards::clamp_num_cards(self.display.num_cards);

        Ok(())
    }

    /// Convenience: snapshot archive limits
    pub fn limits(&self) -> ArchiveLimits {
        ArchiveLimits {
            max_upload_bytes: self.server.max_upload_mb.saturating_mul(MIB),
            max_entry_bytes: self.server.max_entry_mb.saturating_mul(MIB),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg = Config::from_toml_str(
            r#"
[server]
max_upload_mb = 50

[display]
timezone = "Europe/Berlin"
"#,
        )
        .unwrap();
        assert_eq!(cfg.server.max_upload_mb, 50);
        assert_eq!(cfg.server.http_bind, "127.0.0.1:8501");
        assert_eq!(cfg.sessions.ttl_secs, 1800);
        assert_eq!(cfg.display.timezone, "Europe/Berlin");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TOKLENS_HTTP_BIND", "0.0.0.0:9000"),
            ("TOKLENS_OEMBED", "false"),
            ("TOKLENS_MAX_SESSIONS", "not-a-number"),
            ("TOKLENS_DISPLAY_TZ", "America/New_York"),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        cfg.finalize().unwrap();

        assert_eq!(cfg.runtime.http_bind.port(), 9000);
        assert!(!cfg.oembed.enabled);
        assert_eq!(cfg.sessions.max_sessions, 32);
        assert_eq!(cfg.runtime.tz, chrono_tz::America::New_York);
    }

    #[test]
    fn test_finalize_rejects_unknown_timezone() {
        let mut cfg = Config::default();
        cfg.display.timezone = "Mars/Olympus".to_string();
        assert!(cfg.finalize().is_err());
    }

    #[test]
    fn test_finalize_clamps() {
        let mut cfg = Config::default();
        cfg.sessions.ttl_secs = 5;
        cfg.oembed.concurrency = 0;
        cfg.display.cards_per_row = 9;
        cfg.display.num_cards = 13;
        cfg.finalize().unwrap();
        assert_eq!(cfg.sessions.ttl_secs, 30);
        assert_eq!(cfg.oembed.concurrency, 1);
        assert_eq!(cfg.display.cards_per_row, 5);
        assert_eq!(cfg.display.num_cards, 12);
    }

    #[test]
    fn test_limits_snapshot() {
        let cfg = Config::default();
        let limits = cfg.limits();
        assert_eq!(limits.max_upload_bytes, 200 * 1024 * 1024);
        assert_eq!(limits.max_entry_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn test_huge_upload_limit_does_not_overflow() {
        let mut cfg = Config::default();
        cfg.apply_overrides(|key| match key {
            "TOKLENS_MAX_UPLOAD_MB" => Some(u64::MAX.to_string()),
            "TOKLENS_MAX_ENTRY_MB" => Some(u64::MAX.to_string()),
            _ => None,
        });
        cfg.finalize().unwrap();
        assert_eq!(cfg.server.max_upload_mb, u64::MAX);
        let limits = cfg.limits();
        assert_eq!(limits.max_upload_bytes, u64::MAX);
        assert_eq!(limits.max_entry_bytes, u64::MAX);
    }
}
