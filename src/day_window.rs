use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::date_key::{display_date, to_date_key, weekday_label};
use crate::tracker_config::WINDOW_DAYS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayEntry {
    pub date_key: String,
    pub date: String,
    pub day_of_week: String,
    #[serde(rename = "isToday")]
    pub is_reference: bool,
    pub points: i64,
    pub fees: i64,
    pub airdrop: i64,
    pub earning: i64,
}

impl DayEntry {
    pub fn blank(date: NaiveDate, is_reference: bool) -> Self {
        Self {
            date_key: to_date_key(date),
            date: display_date(date),
            day_of_week: weekday_label(date).to_string(),
            is_reference,
            points: 0,
            fees: 0,
            airdrop: 0,
            earning: 0,
        }
    }

    pub fn field(&self, field: DayField) -> i64 {
        match field {
            DayField::Points => self.points,
            DayField::Fees => self.fees,
            DayField::Airdrop => self.airdrop,
            DayField::Earning => self.earning,
        }
    }

    pub fn set_field(&mut self, field: DayField, value: i64) {
        match field {
            DayField::Points => self.points = value,
            DayField::Fees => self.fees = value,
            DayField::Airdrop => self.airdrop = value,
            DayField::Earning => self.earning = value,
        }
    }

    pub fn carry_values_from(&mut self, other: &DayEntry) {
        for field in DayField::ALL {
            self.set_field(field, other.field(field));
        }
    }

    pub fn has_values(&self) -> bool {
        DayField::ALL.iter().any(|f| self.field(*f) != 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayField {
    Points,
    Fees,
    Airdrop,
    Earning,
}

impl DayField {
    pub const ALL: [DayField; 4] = [
        DayField::Points,
        DayField::Fees,
        DayField::Airdrop,
        DayField::Earning,
    ];

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_lowercase().as_str() {
            "points" => Ok(DayField::Points),
            "fees" => Ok(DayField::Fees),
            "airdrop" => Ok(DayField::Airdrop),
            "earning" => Ok(DayField::Earning),
            other => Err(format!(
                "field must be one of points, fees, airdrop, earning (got {other:?})"
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DayField::Points => "points",
            DayField::Fees => "fees",
            DayField::Airdrop => "airdrop",
            DayField::Earning => "earning",
        }
    }

    pub fn max_value(self) -> Option<i64> {
        match self {
            DayField::Points => Some(21),
            DayField::Fees => Some(30),
            DayField::Airdrop => Some(3),
            DayField::Earning => None,
        }
    }

    pub fn validate(self, value: i64) -> Result<i64, String> {
        if value < 0 {
            return Err(format!("{} must not be negative", self.as_str()));
        }
        if let Some(max) = self.max_value() {
            if value > max {
                return Err(format!("{} must be between 0 and {max}", self.as_str()));
            }
        }
        Ok(value)
    }
}

pub fn build_window(reference: NaiveDate) -> Vec<DayEntry> {
    let mut days = Vec::with_capacity(WINDOW_DAYS);
    for back in (0..WINDOW_DAYS as i64).rev() {
        let date = reference - Duration::days(back);
        days.push(DayEntry::blank(date, back == 0));
    }
    days
}
