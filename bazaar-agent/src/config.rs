//! Persistent agent configuration: feature toggles and runtime tunables
//! (JSON file in the platform data directory), plus the `Clock` abstraction
//! used for market-hours and date-key computation.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Enumerated feature toggles, per the external-interfaces contract: each
/// has a single, specific effect on pipeline or sync behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct FeatureToggles {
    /// If false, the offline queue is never consulted; transaction writes
    /// still happen locally.
    pub enable_offline_mode: bool,
    /// If true, additional language hints are loaded for the recognizer.
    pub enable_multi_language: bool,
    /// If false, every utterance is classified `Unknown` regardless of the
    /// speaker roster.
    pub enable_speaker_identification: bool,
    /// If false, the daily-summary recompute job is skipped.
    pub enable_daily_summaries: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            enable_offline_mode: true,
            enable_multi_language: false,
            enable_speaker_identification: true,
            enable_daily_summaries: true,
        }
    }
}

/// Persistent agent configuration — feature toggles plus the threshold and
/// timing constants that spec §6 calls out as device-tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AgentConfig {
    pub preferred_input_device: Option<String>,
    pub online_recognizer_endpoint: Option<String>,
    pub recognizer_languages: Vec<String>,
    pub sync_api_base_url: Option<String>,
    pub sync_api_token: Option<String>,
    pub toggles: FeatureToggles,
    pub auto_save_threshold: f32,
    pub review_threshold: f32,
    pub inactivity_timeout_secs: i64,
    pub market_hours_start: u8,
    pub market_hours_end: u8,
    pub max_queue_size: usize,
    pub max_retry_attempts: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            preferred_input_device: None,
            online_recognizer_endpoint: None,
            recognizer_languages: vec!["en".to_string()],
            sync_api_base_url: None,
            sync_api_token: None,
            toggles: FeatureToggles::default(),
            auto_save_threshold: bazaar_core::transaction::machine::AUTO_SAVE_THRESHOLD,
            review_threshold: bazaar_core::transaction::machine::REVIEW_THRESHOLD,
            inactivity_timeout_secs: 120,
            market_hours_start: 6,
            market_hours_end: 20,
            max_queue_size: 1000,
            max_retry_attempts: 3,
        }
    }
}

impl AgentConfig {
    pub fn normalize(&mut self) {
        self.auto_save_threshold = self.auto_save_threshold.clamp(0.0, 1.0);
        self.review_threshold = self.review_threshold.clamp(0.0, self.auto_save_threshold);
        self.inactivity_timeout_secs = self.inactivity_timeout_secs.max(1);
        self.max_queue_size = self.max_queue_size.max(1);
        self.max_retry_attempts = self.max_retry_attempts.max(1);
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        if self.recognizer_languages.is_empty() {
            self.recognizer_languages.push("en".to_string());
        }
    }
}

pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Bazaar")
            .join("agent.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("bazaar")
            .join("agent.json")
    }
}

pub fn load_config(path: &Path) -> AgentConfig {
    let mut config = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AgentConfig>(&raw).ok())
        .unwrap_or_default();
    config.normalize();
    config
}

pub fn save_config(path: &Path, config: &AgentConfig) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

/// Split monotonic/wall clock, injected rather than read from a process-wide
/// singleton so tests can control both independently of real time.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    /// `YYYY-MM-DD` in local time, per spec §6.
    fn date_key(&self, at: DateTime<Utc>) -> String {
        Local
            .from_utc_datetime(&at.naive_utc())
            .format("%Y-%m-%d")
            .to_string()
    }

    /// Whether `at`'s local hour falls within `[market_hours_start, market_hours_end)`.
    fn within_market_hours(&self, at: DateTime<Utc>, config: &AgentConfig) -> bool {
        use chrono::Timelike;
        let local_hour = Local.from_utc_datetime(&at.naive_utc()).hour() as u8;
        local_hour >= config.market_hours_start && local_hour < config.market_hours_end
    }
}

/// The real-time clock used outside tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
