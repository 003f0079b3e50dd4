use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_thread_ids: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            console_logging_enabled: default_true(),
            file_logging_enabled: default_false(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_thread_ids: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "bt_robot_remote".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// Per-axis command thresholds. Invariant: `trigger_threshold > neutral_zone >= 0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CommandThreshold {
    /// Band around zero inside which every direction reads inactive.
    pub neutral_zone: f32,
    /// Tilt magnitude past which a direction becomes active. Earlier
    /// builds shipped 0.15; current builds use 0.10.
    pub trigger_threshold: f32,
}

impl Default for CommandThreshold {
    fn default() -> Self {
        Self {
            neutral_zone: 0.05,
            trigger_threshold: 0.10,
        }
    }
}

impl CommandThreshold {
    pub fn is_valid(&self) -> bool {
        self.neutral_zone >= 0.0 && self.trigger_threshold > self.neutral_zone
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Memory constant of the acceleration low-pass filter, in [0, 1].
    #[serde(default = "default_alpha")]
    pub low_pass_alpha: f32,
    /// Angular-speed margin (rad/s) below which the gyro axis is left
    /// unnormalized.
    #[serde(default = "default_epsilon")]
    pub gyro_epsilon: f32,
    #[serde(default)]
    pub command_threshold: CommandThreshold,

    /// Pacing delay between computing an accel event and delivering it.
    #[serde(default = "default_accel_delay_ms")]
    pub accel_delivery_delay_ms: u64,
    /// Pacing delay for the gyro/orientation path.
    #[serde(default = "default_gyro_delay_ms")]
    pub gyro_delivery_delay_ms: u64,

    /// Bound on how long `stop()` waits for the sampling worker to exit.
    #[serde(default = "default_join_timeout_ms")]
    pub worker_join_timeout_ms: u64,

    /// Remote peer address for the command stream, e.g. "192.168.1.30:9750".
    /// When absent, frames are logged instead of transmitted.
    #[serde(default)]
    pub remote_addr: Option<String>,

    #[serde(default)]
    pub log_settings: LogSettings,
}

fn default_alpha() -> f32 {
    0.2
}
fn default_epsilon() -> f32 {
    5.0
}
fn default_accel_delay_ms() -> u64 {
    800
}
fn default_gyro_delay_ms() -> u64 {
    200
}
fn default_join_timeout_ms() -> u64 {
    2000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            low_pass_alpha: default_alpha(),
            gyro_epsilon: default_epsilon(),
            command_threshold: CommandThreshold::default(),
            accel_delivery_delay_ms: default_accel_delay_ms(),
            gyro_delivery_delay_ms: default_gyro_delay_ms(),
            worker_join_timeout_ms: default_join_timeout_ms(),
            remote_addr: None,
            log_settings: LogSettings::default(),
        }
    }
}

impl Settings {
    /// Replace out-of-range values with defaults. Invalid persisted settings
    /// degrade with a warning rather than aborting startup.
    pub fn validated(mut self) -> Self {
        if !(0.0..=1.0).contains(&self.low_pass_alpha) {
            warn!(
                "low_pass_alpha {} outside [0, 1], using default",
                self.low_pass_alpha
            );
            self.low_pass_alpha = default_alpha();
        }
        if !self.gyro_epsilon.is_finite() || self.gyro_epsilon < 0.0 {
            warn!("gyro_epsilon {} invalid, using default", self.gyro_epsilon);
            self.gyro_epsilon = default_epsilon();
        }
        if !self.command_threshold.is_valid() {
            warn!(
                "command threshold ({}, {}) violates trigger > neutral >= 0, using defaults",
                self.command_threshold.neutral_zone, self.command_threshold.trigger_threshold
            );
            self.command_threshold = CommandThreshold::default();
        }
        self
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        let settings = Self::load_from_file(&settings_path)
            .unwrap_or_default()
            .validated();

        Ok(Self {
            settings,
            settings_path,
        })
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BtRobotRemote");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &PathBuf) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_invariant() {
        assert!(CommandThreshold::default().is_valid());
        assert!(!CommandThreshold {
            neutral_zone: 0.2,
            trigger_threshold: 0.1
        }
        .is_valid());
        assert!(!CommandThreshold {
            neutral_zone: -0.1,
            trigger_threshold: 0.1
        }
        .is_valid());
    }

    #[test]
    fn test_validation_restores_defaults() {
        let bad = Settings {
            low_pass_alpha: 1.5,
            command_threshold: CommandThreshold {
                neutral_zone: 0.5,
                trigger_threshold: 0.1,
            },
            ..Default::default()
        };
        let fixed = bad.validated();
        assert_eq!(fixed.low_pass_alpha, 0.2);
        assert!(fixed.command_threshold.is_valid());
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings: Settings = serde_json::from_str("{\"low_pass_alpha\": 0.3}").unwrap();
        assert_eq!(settings.low_pass_alpha, 0.3);
        assert_eq!(settings.gyro_delivery_delay_ms, 200);
        assert_eq!(settings.accel_delivery_delay_ms, 800);
        assert!(settings.remote_addr.is_none());
    }
}
