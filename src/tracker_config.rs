use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const WINDOW_DAYS: usize = 15;
pub const ACCOUNT_IDS: [u32; 3] = [1, 2, 3];
pub const PLACEHOLDER_NAME_PREFIX: &str = "Tài khoản";
pub const TRACKER_CONFIG_FILE_NAME: &str = "tracker_config.json";

const DEFAULT_ROLL_OFFSET_MINUTES: u32 = 1;
const DEFAULT_ROLL_PERIOD_HOURS: u64 = 24;
const MAX_ROLL_OFFSET_MINUTES: u32 = 24 * 60 - 1;
const MAX_ROLL_PERIOD_HOURS: u64 = 24 * 366;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceDay {
    Today,
    #[default]
    Yesterday,
}

impl ReferenceDay {
    pub fn resolve(self, today: NaiveDate) -> NaiveDate {
        match self {
            ReferenceDay::Today => today,
            ReferenceDay::Yesterday => today.pred_opt().unwrap_or(today),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub reference_day: ReferenceDay,
    #[serde(default = "default_roll_offset_minutes")]
    pub roll_offset_minutes: u32,
    #[serde(default = "default_roll_period_hours")]
    pub roll_period_hours: u64,
}

fn default_roll_offset_minutes() -> u32 {
    DEFAULT_ROLL_OFFSET_MINUTES
}

fn default_roll_period_hours() -> u64 {
    DEFAULT_ROLL_PERIOD_HOURS
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            reference_day: ReferenceDay::default(),
            roll_offset_minutes: DEFAULT_ROLL_OFFSET_MINUTES,
            roll_period_hours: DEFAULT_ROLL_PERIOD_HOURS,
        }
    }
}

impl TrackerConfig {
    pub fn reference_date(&self, today: NaiveDate) -> NaiveDate {
        self.reference_day.resolve(today)
    }

    // Offsets past a day and periods past a year are clamped.
    pub fn next_roll_at(&self, now: NaiveDateTime) -> NaiveDateTime {
        let next_day = now.date().succ_opt().unwrap_or(now.date());
        let midnight = next_day.and_hms_opt(0, 0, 0).unwrap_or(now);
        let offset = self.roll_offset_minutes.min(MAX_ROLL_OFFSET_MINUTES);
        midnight
            .checked_add_signed(Duration::minutes(i64::from(offset)))
            .unwrap_or(midnight)
    }

    pub fn roll_period(&self) -> std::time::Duration {
        let hours = self.roll_period_hours.clamp(1, MAX_ROLL_PERIOD_HOURS);
        std::time::Duration::from_secs(hours * 60 * 60)
    }
}

pub fn load_tracker_config_at_path(path: &Path) -> Result<TrackerConfig, String> {
    if !path.exists() {
        return Ok(TrackerConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read tracker config {}: {e}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(TrackerConfig::default());
    }
    serde_json::from_str::<TrackerConfig>(&raw)
        .map_err(|e| format!("invalid tracker config {}: {e}", path.display()))
}
