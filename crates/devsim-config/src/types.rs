use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Playback speed multiplier. Only the listed steps are offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum SpeedMultiplier {
    #[default]
    X1,
    X2,
    X5,
    X10,
    X50,
}

impl SpeedMultiplier {
    /// All supported multipliers, slowest first.
    pub const ALL: [SpeedMultiplier; 5] = [
        SpeedMultiplier::X1,
        SpeedMultiplier::X2,
        SpeedMultiplier::X5,
        SpeedMultiplier::X10,
        SpeedMultiplier::X50,
    ];

    pub fn factor(self) -> u32 {
        match self {
            SpeedMultiplier::X1 => 1,
            SpeedMultiplier::X2 => 2,
            SpeedMultiplier::X5 => 5,
            SpeedMultiplier::X10 => 10,
            SpeedMultiplier::X50 => 50,
        }
    }
}

impl TryFrom<u32> for SpeedMultiplier {
    type Error = crate::ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        SpeedMultiplier::ALL
            .into_iter()
            .find(|s| s.factor() == value)
            .ok_or(crate::ConfigError::UnsupportedSpeed(value))
    }
}

impl FromStr for SpeedMultiplier {
    type Err = crate::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches(['x', 'X']);
        let value: u32 = trimmed
            .parse()
            .map_err(|_| crate::ConfigError::InvalidConfig(format!("Invalid speed: {}", s)))?;
        SpeedMultiplier::try_from(value)
    }
}

impl fmt::Display for SpeedMultiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.factor())
    }
}

impl Serialize for SpeedMultiplier {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(self.factor())
    }
}

impl<'de> Deserialize<'de> for SpeedMultiplier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u32::deserialize(deserializer)?;
        SpeedMultiplier::try_from(value).map_err(serde::de::Error::custom)
    }
}

/// Human-readable duration (e.g., "16ms", "3s", "1h").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub fn from_millis(ms: u64) -> Self {
        HumanDuration(Duration::from_millis(ms))
    }

    pub fn from_secs(secs: u64) -> Self {
        HumanDuration(Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("Missing unit in duration: {}", s))?;
        let (num_str, unit) = s.split_at(split);

        let num: u64 = num_str
            .parse()
            .map_err(|_| format!("Invalid number in duration: {}", s))?;

        let duration = match unit {
            "ms" => Duration::from_millis(num),
            "s" => Duration::from_secs(num),
            "m" => Duration::from_secs(
                num.checked_mul(60)
                    .ok_or_else(|| format!("Duration out of range: {}", s))?,
            ),
            "h" => Duration::from_secs(
                num.checked_mul(3600)
                    .ok_or_else(|| format!("Duration out of range: {}", s))?,
            ),
            _ => return Err(format!("Unknown duration unit: {}", unit)),
        };

        Ok(HumanDuration(duration))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.0.as_millis();

        if millis == 0 || millis % 1000 != 0 {
            write!(f, "{}ms", millis)
        } else if millis % 3_600_000 == 0 {
            write!(f, "{}h", millis / 3_600_000)
        } else if millis % 60_000 == 0 {
            write!(f, "{}m", millis / 60_000)
        } else {
            write!(f, "{}s", millis / 1000)
        }
    }
}

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        HumanDuration::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Connection settings for the simulator REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout: HumanDuration,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(5)
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: default_base_url(),
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// Historical replay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Step cadence at 1x; the effective threshold is `base_interval / speed`.
    #[serde(default = "default_base_interval")]
    pub base_interval: HumanDuration,
    /// Screen refresh cadence of an interactive replay.
    #[serde(default = "default_frame_interval")]
    pub frame_interval: HumanDuration,
    #[serde(default)]
    pub default_speed: SpeedMultiplier,
    /// Maximum samples requested per range load.
    #[serde(default = "default_range_limit")]
    pub range_limit: usize,
    /// Range length used when no explicit start is given.
    #[serde(default = "default_window")]
    pub default_window: HumanDuration,
}

fn default_base_interval() -> HumanDuration {
    HumanDuration::from_millis(100)
}

fn default_frame_interval() -> HumanDuration {
    HumanDuration::from_millis(16)
}

fn default_range_limit() -> usize {
    1000
}

fn default_window() -> HumanDuration {
    HumanDuration::from_secs(3600)
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig {
            base_interval: default_base_interval(),
            frame_interval: default_frame_interval(),
            default_speed: SpeedMultiplier::default(),
            range_limit: default_range_limit(),
            default_window: default_window(),
        }
    }
}

/// Live monitoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub interval: HumanDuration,
}

fn default_poll_interval() -> HumanDuration {
    HumanDuration::from_secs(3)
}

impl Default for PollingConfig {
    fn default() -> Self {
        PollingConfig {
            interval: default_poll_interval(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DevsimConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}
