use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{ErnaError, Result};
use crate::types::Location;

pub const DEFAULT_MATCH_SIZE: usize = 2;
pub const DEFAULT_MATCH_TIME: &str = "11:30";
pub const DEFAULT_POLL_SECS: u64 = 30;
pub const ENV_PREFIX: &str = "ERNA_";

/// Top-level config (erna.toml + ERNA_* env overrides, nested keys split on `__`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErnaConfig {
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
}

/// How and when recurring match rounds run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Members per group. The last group of a location may be smaller.
    #[serde(default = "default_match_size")]
    pub size: usize,
    #[serde(default)]
    pub day: MatchDay,
    #[serde(default)]
    pub time: MatchTime,
    /// Weeks of the month (1-5) on which the recurring round runs.
    #[serde(default = "default_weeks")]
    pub weeks: Vec<u8>,
    /// Locations matched on every recurring round, grouped by time zone.
    #[serde(default)]
    pub locations: Vec<ZoneLocations>,
}

/// Recurring locations that share a time zone.
///
/// `day`, `time` and `weeks` are read as local time in `tz`, so
/// `11:30` means half past eleven at that office all year round.
///
/// ```toml
/// [[matching.locations]]
/// tz = "Europe/Berlin"
/// locations = ["berlin", "hq"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneLocations {
    #[serde(default = "default_tz")]
    pub tz: Tz,
    pub locations: Vec<Location>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_MATCH_SIZE,
            day: MatchDay::default(),
            time: MatchTime::default(),
            weeks: default_weeks(),
            locations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchDay {
    #[default]
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
    /// Monday through Friday.
    Weekdays,
}

impl MatchDay {
    /// Whether `weekday` (0 = Monday through 6 = Sunday) is a match day.
    pub fn includes(&self, weekday: u32) -> bool {
        match self {
            MatchDay::Weekdays => weekday < 5,
            day => *day as u32 == weekday,
        }
    }
}

/// Time of day for the recurring round, `HH:MM` local to each zone.
///
/// Either component may be `*` to match every hour / minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MatchTime {
    pub hour: Option<u8>,
    pub minute: Option<u8>,
}

impl MatchTime {
    pub fn parse(s: &str) -> Result<Self> {
        let bad = || ErnaError::Config(format!("invalid match time {s:?}: expected HH:MM"));
        let (h, m) = s.trim().split_once(':').ok_or_else(bad)?;
        let hour = parse_component(h, 23).ok_or_else(bad)?;
        let minute = parse_component(m, 59).ok_or_else(bad)?;
        Ok(Self { hour, minute })
    }

    pub fn matches(&self, hour: u32, minute: u32) -> bool {
        self.hour.map_or(true, |h| u32::from(h) == hour)
            && self.minute.map_or(true, |m| u32::from(m) == minute)
    }
}

/// `Some(None)` for a wildcard, `Some(Some(n))` for a number within range.
fn parse_component(s: &str, max: u8) -> Option<Option<u8>> {
    if s == "*" {
        return Some(None);
    }
    if s.is_empty() || s.len() > 2 {
        return None;
    }
    let n: u8 = s.parse().ok()?;
    (n <= max).then_some(Some(n))
}

impl Default for MatchTime {
    fn default() -> Self {
        Self {
            hour: Some(11),
            minute: Some(30),
        }
    }
}

impl TryFrom<String> for MatchTime {
    type Error = ErnaError;
    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<MatchTime> for String {
    fn from(value: MatchTime) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for MatchTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.hour {
            Some(h) => write!(f, "{h:02}:")?,
            None => f.write_str("*:")?,
        }
        match self.minute {
            Some(m) => write!(f, "{m:02}"),
            None => f.write_str("*"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    /// Process-local; everything is lost on exit.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// How often the trigger loop wakes up to look for a new minute.
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            poll_secs: DEFAULT_POLL_SECS,
        }
    }
}

fn default_match_size() -> usize {
    DEFAULT_MATCH_SIZE
}
fn default_tz() -> Tz {
    Tz::UTC
}
fn default_weeks() -> Vec<u8> {
    vec![1, 2, 3, 4, 5]
}
fn default_poll_secs() -> u64 {
    DEFAULT_POLL_SECS
}
fn default_db_path() -> String {
    format!("{}/.erna/erna.db", home_dir())
}

fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
}

impl ErnaConfig {
    /// Load config from a TOML file with ERNA_* env var overrides.
    ///
    /// Path resolution: explicit argument, then `~/.erna/erna.toml`.
    /// A missing file is not an error; every key has a default.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// Extract and validate from an already-assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: ErnaConfig = figment
            .extract()
            .map_err(|e| ErnaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.matching.size == 0 {
            return Err(ErnaError::Config(
                "matching.size must be at least 1".to_string(),
            ));
        }
        if self.matching.weeks.is_empty() {
            return Err(ErnaError::Config(
                "matching.weeks must name at least one week".to_string(),
            ));
        }
        if let Some(w) = self.matching.weeks.iter().find(|w| !(1..=5).contains(*w)) {
            return Err(ErnaError::Config(format!(
                "matching.weeks entry {w} is outside 1-5"
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for zone in &self.matching.locations {
            if let Some(dup) = zone.locations.iter().find(|l| !seen.insert(*l)) {
                return Err(ErnaError::Config(format!(
                    "matching.locations lists {dup} more than once"
                )));
            }
        }
        if self.trigger.poll_secs == 0 || self.trigger.poll_secs > 60 {
            return Err(ErnaError::Config(
                "trigger.poll_secs must be between 1 and 60".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    format!("{}/.erna/erna.toml", home_dir())
}
