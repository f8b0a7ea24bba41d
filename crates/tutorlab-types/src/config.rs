//! Application configuration types for tutorlab.
//!
//! `AppConfig` represents the `config.toml` in the data directory. Every
//! field has a default so an empty or missing file yields a runnable server.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::user::NewUser;

/// Top-level configuration.
///
/// Loaded from `{data_dir}/config.toml`. All sections are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub experiment: ExperimentConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Participants to seed on startup and via `tutorlab seed-users`.
    #[serde(default)]
    pub users: Vec<NewUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Deadline for non-streaming requests. `/chat` is exempt.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout_ms() -> u64 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file name, relative to the data directory.
    #[serde(default = "default_database_file")]
    pub database_file: String,
    /// Per-call deadline for store operations.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    #[serde(default = "default_max_readers")]
    pub max_readers: u32,
    /// Attempts to open the pool before giving up.
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    #[serde(default = "default_connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,
}

fn default_database_file() -> String {
    "tutorlab.db".to_string()
}

fn default_call_timeout_ms() -> u64 {
    1000
}

fn default_max_readers() -> u32 {
    5
}

fn default_connect_retries() -> u32 {
    5
}

fn default_connect_retry_delay_ms() -> u64 {
    2000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_file: default_database_file(),
            call_timeout_ms: default_call_timeout_ms(),
            max_readers: default_max_readers(),
            connect_retries: default_connect_retries(),
            connect_retry_delay_ms: default_connect_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Day 1 of the topic cycle.
    #[serde(default = "default_start_date")]
    pub start_date: NaiveDate,
    #[serde(default = "default_cycle_days")]
    pub cycle_days: u32,
    /// Window inside which an identical user submission is a duplicate.
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,
    /// Topic name for days without an entry in `topics`.
    #[serde(default = "default_topic_name")]
    pub default_topic: String,
    #[serde(default)]
    pub topics: Vec<TopicEntry>,
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default()
}

fn default_cycle_days() -> u32 {
    7
}

fn default_dedup_window_ms() -> u64 {
    5000
}

fn default_topic_name() -> String {
    "C++ 编程".to_string()
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            start_date: default_start_date(),
            cycle_days: default_cycle_days(),
            dedup_window_ms: default_dedup_window_ms(),
            default_topic: default_topic_name(),
            topics: Vec::new(),
        }
    }
}

/// Topic name for one day of the cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicEntry {
    pub day_id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
    /// Sweep yesterday at startup if no run was recorded for it.
    #[serde(default = "default_true")]
    pub catch_up_on_start: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hour: 0,
            minute: 0,
            catch_up_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_regenerate_temperature")]
    pub regenerate_temperature: f64,
}

fn default_base_url() -> String {
    "https://api.deepseek.com/v1".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_api_key_env() -> String {
    "DEEPSEEK_API_KEY".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_regenerate_temperature() -> f64 {
    0.9
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            regenerate_temperature: default_regenerate_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_admin_username")]
    pub admin_username: String,
    /// Environment variable holding the admin password. Admin login is
    /// disabled when it is unset.
    #[serde(default = "default_admin_password_env")]
    pub admin_password_env: String,
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_admin_password_env() -> String {
    "TUTORLAB_ADMIN_PASSWORD".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_username: default_admin_username(),
            admin_password_env: default_admin_password_env(),
        }
    }
}
