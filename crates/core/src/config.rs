use std::env;
use std::net::IpAddr;
use std::path::PathBuf;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u16(key: &str, default: u16) -> u16 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i32(key: &str, default: i32) -> i32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env_opt(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Comma-separated list env var.
fn env_list(key: &str) -> Vec<String> {
    env_opt(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
    pub generator: GeneratorConfig,
    pub analyzer: AnalyzerConfig,
    pub defense: DefenseConfig,
    pub intel: IntelConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// CLI flags override individual fields after this returns.
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            capture: CaptureConfig::from_env(),
            storage: StorageConfig::from_env(),
            generator: GeneratorConfig::from_env(),
            analyzer: AnalyzerConfig::from_env(),
            defense: DefenseConfig::from_env(),
            intel: IntelConfig::from_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub bind_addr: String,
    /// Offset from UTC, in whole hours, of the organization's local
    /// clock. Behavioral analytics evaluate working hours against this.
    pub utc_offset_hours: i32,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            port: env_u16("SH_PORT", 8000),
            bind_addr: env_or("SH_BIND_ADDR", "0.0.0.0"),
            utc_offset_hours: env_i32("SH_UTC_OFFSET_HOURS", 0).clamp(-12, 14),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Live sniffer instead of the synthetic generator.
    pub live: bool,
    /// NIC override; auto-detected when empty.
    pub interface: Option<String>,
    /// Rolling flow window before a flow record is emitted.
    pub flow_window_ms: u64,
}

impl CaptureConfig {
    fn from_env() -> Self {
        Self {
            live: env_bool("SH_LIVE", false),
            interface: env_opt("SH_INTERFACE"),
            flow_window_ms: env_u64("SH_FLOW_WINDOW_MS", 2_000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Non-persistent graph store.
    pub inmemory: bool,
    /// Delete the persistent graph before starting.
    pub reset: bool,
}

impl StorageConfig {
    fn from_env() -> Self {
        Self {
            data_dir: PathBuf::from(env_or("SH_DATA_DIR", "./data")),
            inmemory: env_bool("SH_INMEMORY", false),
            reset: false,
        }
    }

    pub fn graph_path(&self) -> PathBuf {
        self.data_dir.join("graph.db")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Deterministic seed for the synthetic generator.
    pub seed: u64,
    pub min_events_per_tick: u32,
    pub max_events_per_tick: u32,
}

impl GeneratorConfig {
    fn from_env() -> Self {
        Self {
            seed: env_u64("SH_SEED", 0xC0FFEE),
            min_events_per_tick: 10,
            max_events_per_tick: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Partitioned analyzer workers (5-tuple hash routing).
    pub workers: usize,
    pub alert_ring_capacity: usize,
    /// Extra prefixes treated as internal address space.
    pub local_prefixes: Vec<IpNet>,
    /// Per-subscriber bus queue depth.
    pub queue_capacity: usize,
    /// Shutdown drain grace in seconds.
    pub drain_grace_secs: u64,
}

impl AnalyzerConfig {
    fn from_env() -> Self {
        let local_prefixes = env_list("SH_LOCAL_PREFIXES")
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        Self {
            workers: env_usize("SH_ANALYZER_WORKERS", 4),
            alert_ring_capacity: env_usize("SH_ALERT_RING", 1_000),
            local_prefixes,
            queue_capacity: env_usize("SH_QUEUE_CAPACITY", 4_096),
            drain_grace_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefenseConfig {
    /// Master switch for active probing.
    pub probe_enabled: bool,
    /// Seconds between probes of the same target.
    pub probe_cooldown_secs: u64,
    /// Rolling per-minute probe budget.
    pub probe_rate_per_minute: usize,
    /// Hard deadline for one probe sequence.
    pub probe_timeout_secs: u64,
    /// Auto-block entry lifetime.
    pub block_ttl_secs: u64,
    /// ML risk at or above which auto-block fires.
    pub critical_risk: f64,
    /// Never-block addresses (DNS resolvers, gateways) on top of the
    /// built-in loopback/multicast refusals.
    pub safe_ips: Vec<IpAddr>,
}

impl DefenseConfig {
    fn from_env() -> Self {
        let mut safe_ips: Vec<IpAddr> = env_list("SH_SAFE_IPS")
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        if safe_ips.is_empty() {
            safe_ips = vec![
                "8.8.8.8".parse().unwrap(),
                "8.8.4.4".parse().unwrap(),
                "1.1.1.1".parse().unwrap(),
                "192.168.1.1".parse().unwrap(),
                "10.0.0.1".parse().unwrap(),
            ];
        }
        Self {
            probe_enabled: env_bool("SH_PROBE_ENABLED", true),
            probe_cooldown_secs: env_u64("SH_PROBE_COOLDOWN_SECS", 300),
            probe_rate_per_minute: env_usize("SH_PROBE_RATE_PER_MIN", 10),
            probe_timeout_secs: env_u64("SH_PROBE_TIMEOUT_SECS", 5),
            block_ttl_secs: env_u64("SH_BLOCK_TTL_SECS", 3_600),
            critical_risk: 95.0,
            safe_ips,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelConfig {
    /// JSON model bundle; the engine runs on rules alone when absent.
    pub model_path: Option<PathBuf>,
    /// Session decay half-life in seconds.
    pub session_half_life_secs: u64,
    /// Session eviction after this much inactivity.
    pub session_ttl_secs: u64,
}

impl IntelConfig {
    fn from_env() -> Self {
        Self {
            model_path: env_opt("SH_MODEL_PATH").map(PathBuf::from),
            session_half_life_secs: env_u64("SH_SESSION_HALF_LIFE_SECS", 600),
            session_ttl_secs: env_u64("SH_SESSION_TTL_SECS", 1_800),
        }
    }
}
