/// Application configuration, persisted as TOML in a config directory.
///
/// A missing file means defaults. Missing keys in an existing file also fall
/// back to their defaults, so older files keep loading as fields are added.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::specs::AUGMENTATION;

pub const CONFIG_FILE: &str = "config.toml";

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Width of one forecast window in milliseconds. Packed payloads need a
    /// multiple of 100.
    #[serde(default = "default_window_ms")]
    pub window_ms: i64,

    /// Whether the aug runs Fate Mirror, which lifts what Prescience is worth.
    #[serde(default = "default_fate_mirror")]
    pub fate_mirror: bool,

    /// How many recent attempts per player feed a forecast.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Encounter difficulties worth simulating (normal, heroic, mythic raid).
    #[serde(default = "default_difficulty_ids")]
    pub difficulty_ids: Vec<u32>,

    #[serde(default = "default_aug_spec_id")]
    pub aug_spec_id: u32,

    /// SQLite file. Relative paths resolve against the config directory.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// External game data table replacing the embedded one.
    #[serde(default)]
    pub game_data_path: Option<PathBuf>,

    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_directive")]
    pub log_directive: String,
}

fn default_window_ms() -> i64 { 1000 }
fn default_fate_mirror() -> bool { true }
fn default_max_attempts() -> u32 { 10 }
fn default_difficulty_ids() -> Vec<u32> { vec![14, 15, 16] }
fn default_aug_spec_id() -> u32 { AUGMENTATION }
fn default_db_path() -> PathBuf { PathBuf::from("prescience_ledger.sqlite") }
fn default_log_directive() -> String { "prescience_ledger=debug".to_owned() }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            window_ms:      default_window_ms(),
            fate_mirror:    default_fate_mirror(),
            max_attempts:   default_max_attempts(),
            difficulty_ids: default_difficulty_ids(),
            aug_spec_id:    default_aug_spec_id(),
            db_path:        default_db_path(),
            game_data_path: None,
            log_directive:  default_log_directive(),
        }
    }
}

impl AppConfig {
    pub fn tracks_difficulty(&self, difficulty_id: u32) -> bool {
        self.difficulty_ids.contains(&difficulty_id)
    }

    /// `db_path`, resolved against `config_dir` when relative.
    pub fn db_path_in(&self, config_dir: &Path) -> PathBuf {
        if self.db_path.is_absolute() {
            self.db_path.clone()
        } else {
            config_dir.join(&self.db_path)
        }
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

pub fn load_or_default(config_dir: &Path) -> Result<AppConfig> {
    let path = config_dir.join(CONFIG_FILE);
    if path.exists() {
        let raw = std::fs::read_to_string(&path)?;
        let cfg: AppConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Config parse error: {}", e))?;
        Ok(cfg)
    } else {
        tracing::debug!("No config at {:?}, using defaults", path);
        Ok(AppConfig::default())
    }
}

pub fn save(config: &AppConfig, config_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(config_dir)?;
    let raw = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("Config serialize error: {}", e))?;
    std::fs::write(config_dir.join(CONFIG_FILE), raw)?;
    Ok(())
}
