use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::day_window::DayEntry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RollReport {
    pub carried: usize,
    pub created: usize,
    pub dropped: usize,
    pub dropped_with_values: usize,
}

impl RollReport {
    pub fn changed_shape(&self) -> bool {
        self.created > 0 || self.dropped > 0
    }
}

// Lookup by date key, then by display date. A later duplicate in `existing` wins.
pub fn reconcile_window(existing: Option<&[DayEntry]>, target: Vec<DayEntry>) -> Vec<DayEntry> {
    reconcile_window_report(existing, target).0
}

pub fn reconcile_window_report(
    existing: Option<&[DayEntry]>,
    target: Vec<DayEntry>,
) -> (Vec<DayEntry>, RollReport) {
    let mut lookup = HashMap::<&str, &DayEntry>::new();
    for entry in existing.unwrap_or_default() {
        lookup.insert(entry.date_key.as_str(), entry);
    }

    let mut report = RollReport::default();
    let mut used = HashSet::<&str>::new();
    let mut days = Vec::with_capacity(target.len());
    for mut day in target {
        let hit = lookup
            .get_key_value(day.date_key.as_str())
            .or_else(|| lookup.get_key_value(day.date.as_str()))
            .map(|(key, entry)| (*key, *entry));
        match hit {
            Some((key, old)) => {
                day.carry_values_from(old);
                used.insert(key);
                report.carried += 1;
            }
            None => report.created += 1,
        }
        days.push(day);
    }

    for (key, entry) in &lookup {
        if !used.contains(key) {
            report.dropped += 1;
            if entry.has_values() {
                report.dropped_with_values += 1;
            }
        }
    }

    (days, report)
}
