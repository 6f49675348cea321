use crate::error::{PresenceError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// MinutesRange
// ---------------------------------------------------------------------------

/// A `[min, max]` range in minutes, interpolated linearly by a score in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinutesRange {
    pub min_minutes: u32,
    pub max_minutes: u32,
}

impl MinutesRange {
    /// `min + (max - min) * clamp(score)`, rounded to the nearest minute.
    pub fn interpolate(&self, score: f64) -> u32 {
        let s = clamp_score(score);
        let min = f64::from(self.min_minutes);
        let max = f64::from(self.max_minutes);
        (min + (max - min) * s).round() as u32
    }
}

/// Clamp a reliability score into [0, 1]. NaN clamps to 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}

fn default_window() -> MinutesRange {
    MinutesRange {
        min_minutes: 45,
        max_minutes: 150,
    }
}

fn default_sla() -> MinutesRange {
    MinutesRange {
        min_minutes: 15,
        max_minutes: 40,
    }
}

// ---------------------------------------------------------------------------
// WeakActivityConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeakActivityConfig {
    /// Minimum spacing between two accepted weak signals.
    #[serde(default = "default_throttle")]
    pub throttle_minutes: u32,
    /// How far a weak signal pushes out the current window while soft-away.
    #[serde(default = "default_extension")]
    pub extension_minutes: u32,
}

fn default_throttle() -> u32 {
    10
}

fn default_extension() -> u32 {
    5
}

impl Default for WeakActivityConfig {
    fn default() -> Self {
        Self {
            throttle_minutes: default_throttle(),
            extension_minutes: default_extension(),
        }
    }
}

// ---------------------------------------------------------------------------
// PresenceConfig (top-level)
// ---------------------------------------------------------------------------

/// Every presence tunable, resolved once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Availability window length, from low to full reliability.
    #[serde(default = "default_window")]
    pub window: MinutesRange,
    /// Minutes after `work_start_time` before a start counts as late.
    #[serde(default = "default_grace")]
    pub grace_minutes: u32,
    #[serde(default)]
    pub weak_activity: WeakActivityConfig,
    /// How long a session may sit in soft-away before the sweep marks it away.
    #[serde(default = "default_soft_away_ceiling")]
    pub soft_away_ceiling_minutes: u32,
    /// Ping response deadline, from low to full reliability.
    #[serde(default = "default_sla")]
    pub sla: MinutesRange,
    /// Reliability lost per missed ping.
    #[serde(default = "default_penalty")]
    pub missed_ping_penalty: f64,
    /// Maximum number of pings returned to an admin listing.
    #[serde(default = "default_ping_list_limit")]
    pub ping_list_limit: usize,
}

const MINUTES_PER_DAY: u32 = 24 * 60;

fn default_grace() -> u32 {
    15
}

fn default_soft_away_ceiling() -> u32 {
    25
}

fn default_penalty() -> f64 {
    0.05
}

fn default_ping_list_limit() -> usize {
    100
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            grace_minutes: default_grace(),
            weak_activity: WeakActivityConfig::default(),
            soft_away_ceiling_minutes: default_soft_away_ceiling(),
            sla: default_sla(),
            missed_ping_penalty: default_penalty(),
            ping_list_limit: default_ping_list_limit(),
        }
    }
}

impl PresenceConfig {
    /// Availability window length for a reliability score.
    pub fn dynamic_window_minutes(&self, score: f64) -> u32 {
        self.window.interpolate(score)
    }

    /// Ping SLA for a reliability score. Lower reliability gets a shorter deadline.
    pub fn sla_minutes(&self, score: f64) -> u32 {
        self.sla.interpolate(score)
    }

    /// Load from a YAML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: PresenceConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_yaml::to_string(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Load and reject configurations with error-level warnings.
    pub fn load_validated(path: &Path) -> Result<Self> {
        let cfg = Self::load(path)?;
        let errors: Vec<String> = cfg
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if !errors.is_empty() {
            return Err(PresenceError::InvalidConfig(errors.join("; ")));
        }
        Ok(cfg)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        for (name, range) in [("window", &self.window), ("sla", &self.sla)] {
            if range.min_minutes == 0 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{name}.min_minutes must be greater than zero"),
                });
            }
            if range.min_minutes > range.max_minutes {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!(
                        "{name}.min_minutes ({}) exceeds {name}.max_minutes ({})",
                        range.min_minutes, range.max_minutes
                    ),
                });
            }
        }

        if self.grace_minutes >= MINUTES_PER_DAY {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "grace_minutes ({}) must be less than a day ({MINUTES_PER_DAY})",
                    self.grace_minutes
                ),
            });
        }

        if self.soft_away_ceiling_minutes == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "soft_away_ceiling_minutes must be greater than zero".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.missed_ping_penalty) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "missed_ping_penalty ({}) must be within [0, 1]",
                    self.missed_ping_penalty
                ),
            });
        } else if self.missed_ping_penalty == 0.0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "missed_ping_penalty is 0: missed pings never affect reliability"
                    .to_string(),
            });
        }

        if self.weak_activity.throttle_minutes == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "weak_activity.throttle_minutes is 0: keep-alive signals are unthrottled"
                    .to_string(),
            });
        }

        if self.weak_activity.extension_minutes >= self.soft_away_ceiling_minutes {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "weak_activity.extension_minutes ({}) is not below soft_away_ceiling_minutes ({})",
                    self.weak_activity.extension_minutes, self.soft_away_ceiling_minutes
                ),
            });
        }

        if self.ping_list_limit == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "ping_list_limit is 0: admin ping listings will be empty".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn window_minutes_hit_bounds() {
        let cfg = PresenceConfig::default();
        assert_eq!(cfg.dynamic_window_minutes(0.0), 45);
        assert_eq!(cfg.dynamic_window_minutes(1.0), 150);
        assert_eq!(cfg.dynamic_window_minutes(-3.0), 45);
        assert_eq!(cfg.dynamic_window_minutes(7.0), 150);
    }

    #[test]
    fn sla_minutes_hit_bounds_and_interpolate() {
        let cfg = PresenceConfig::default();
        assert_eq!(cfg.sla_minutes(0.0), 15);
        assert_eq!(cfg.sla_minutes(1.0), 40);
        assert_eq!(cfg.sla_minutes(0.4), 25);
        assert_eq!(cfg.sla_minutes(f64::NAN), 15);
    }

    #[test]
    fn interpolation_is_monotonic() {
        let cfg = PresenceConfig::default();
        let mut prev_window = 0;
        let mut prev_sla = 0;
        for i in 0..=100 {
            let score = f64::from(i) / 100.0;
            let w = cfg.dynamic_window_minutes(score);
            let s = cfg.sla_minutes(score);
            assert!(w >= prev_window, "window not monotonic at {score}");
            assert!(s >= prev_sla, "sla not monotonic at {score}");
            prev_window = w;
            prev_sla = s;
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = PresenceConfig::load(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(cfg.grace_minutes, 15);
        assert_eq!(cfg.soft_away_ceiling_minutes, 25);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("presence.yaml");
        std::fs::write(&path, "grace_minutes: 5\nweak_activity:\n  throttle_minutes: 3\n").unwrap();
        let cfg = PresenceConfig::load(&path).unwrap();
        assert_eq!(cfg.grace_minutes, 5);
        assert_eq!(cfg.weak_activity.throttle_minutes, 3);
        assert_eq!(cfg.weak_activity.extension_minutes, 5);
        assert_eq!(cfg.sla.max_minutes, 40);
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg/presence.yaml");
        let mut cfg = PresenceConfig::default();
        cfg.missed_ping_penalty = 0.1;
        cfg.save(&path).unwrap();
        let loaded = PresenceConfig::load(&path).unwrap();
        assert_eq!(loaded.missed_ping_penalty, 0.1);
    }

    #[test]
    fn default_config_has_no_warnings() {
        assert!(PresenceConfig::default().validate().is_empty());
    }

    #[test]
    fn inverted_range_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("presence.yaml");
        std::fs::write(&path, "sla:\n  min_minutes: 50\n  max_minutes: 40\n").unwrap();
        let err = PresenceConfig::load_validated(&path).unwrap_err();
        assert!(matches!(err, PresenceError::InvalidConfig(_)), "{err}");
    }

    #[test]
    fn day_long_grace_is_an_error() {
        let cfg = PresenceConfig {
            grace_minutes: 1440,
            ..PresenceConfig::default()
        };
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Error);
        assert!(warnings[0].message.starts_with("grace_minutes (1440)"));

        let cfg = PresenceConfig {
            grace_minutes: 1439,
            ..PresenceConfig::default()
        };
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn zero_penalty_is_only_a_warning() {
        let cfg = PresenceConfig {
            missed_ping_penalty: 0.0,
            ..PresenceConfig::default()
        };
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Warning);
    }
}
