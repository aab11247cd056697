use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::date_key::{parse_date_key, parse_display_date, to_date_key};
use crate::day_window::DayEntry;
use crate::tracker_db::{open_tracker_db, read_slot, write_slots};

pub const ACCOUNTS_SLOT: &str = "accounts";
pub const WINDOWS_SLOT: &str = "accountDays";

pub trait SlotStore: Send {
    fn read_slot(&self, slot: &str) -> Result<Option<String>, String>;
    fn write_slot(&self, slot: &str, payload: &str) -> Result<(), String>;

    fn write_slots(&self, slots: &[(&str, &str)]) -> Result<(), String> {
        for (slot, payload) in slots {
            self.write_slot(slot, payload)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct SqliteSlotStore {
    conn: Connection,
    db_path: PathBuf,
}

impl SqliteSlotStore {
    pub fn open(db_path: &Path) -> Result<Self, String> {
        Ok(Self {
            conn: open_tracker_db(db_path)?,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl SlotStore for SqliteSlotStore {
    fn read_slot(&self, slot: &str) -> Result<Option<String>, String> {
        read_slot(&self.conn, slot)
    }

    fn write_slot(&self, slot: &str, payload: &str) -> Result<(), String> {
        write_slots(&self.conn, &[(slot, payload)])
    }

    fn write_slots(&self, slots: &[(&str, &str)]) -> Result<(), String> {
        write_slots(&self.conn, slots)
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySlotStore {
    slots: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

#[cfg(test)]
impl MemorySlotStore {
    pub fn with_slots<I, K, V>(slots: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            slots: std::sync::Mutex::new(
                slots
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
impl SlotStore for MemorySlotStore {
    fn read_slot(&self, slot: &str) -> Result<Option<String>, String> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| "memory slot store poisoned".to_string())?;
        Ok(slots.get(slot).cloned())
    }

    fn write_slot(&self, slot: &str, payload: &str) -> Result<(), String> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| "memory slot store poisoned".to_string())?;
        slots.insert(slot.to_string(), payload.to_string());
        Ok(())
    }
}

#[cfg(test)]
impl<S: SlotStore + Sync> SlotStore for std::sync::Arc<S> {
    fn read_slot(&self, slot: &str) -> Result<Option<String>, String> {
        self.as_ref().read_slot(slot)
    }

    fn write_slot(&self, slot: &str, payload: &str) -> Result<(), String> {
        self.as_ref().write_slot(slot, payload)
    }
}

pub fn coerce_number(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let text = s.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| {
                    text.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f as i64)
                })
                .unwrap_or(0)
        }
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

#[derive(Debug, Deserialize)]
struct StoredDayEntry {
    #[serde(rename = "dateKey", default)]
    date_key: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(rename = "dayOfWeek", default)]
    day_of_week: Option<String>,
    #[serde(rename = "isToday", default)]
    is_today: Option<bool>,
    #[serde(default)]
    points: Value,
    #[serde(default)]
    fees: Value,
    #[serde(default)]
    airdrop: Value,
    #[serde(default)]
    earning: Value,
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

// The flag is true when the key was derived from the display date.
fn decode_day_entry(stored: StoredDayEntry) -> Option<(DayEntry, bool)> {
    let date = non_empty(stored.date);
    let (date_key, derived) = match non_empty(stored.date_key) {
        Some(key) => (key, false),
        None => {
            let display = date.clone()?;
            match parse_display_date(&display) {
                Some(d) => (to_date_key(d), true),
                None => (display, true),
            }
        }
    };
    let display = date.unwrap_or_else(|| date_key.clone());

    let day = DayEntry {
        date_key,
        date: display,
        day_of_week: stored.day_of_week.unwrap_or_default(),
        is_reference: stored.is_today.unwrap_or(false),
        points: coerce_number(&stored.points),
        fees: coerce_number(&stored.fees),
        airdrop: coerce_number(&stored.airdrop),
        earning: coerce_number(&stored.earning),
    };
    Some((day, derived))
}

// A saved dateKey beats a key derived from the display date for the same day.
pub fn decode_window(raw: &Value) -> Vec<DayEntry> {
    let Some(items) = raw.as_array() else {
        return Vec::new();
    };
    let mut decoded = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<StoredDayEntry>(item.clone()) {
            Ok(stored) => decoded.extend(decode_day_entry(stored)),
            Err(e) => log::debug!("skipping unreadable day entry: {e}"),
        }
    }

    let keyed = decoded
        .iter()
        .filter(|(_, derived)| !derived)
        .map(|(day, _)| day.date_key.clone())
        .collect::<HashSet<_>>();
    decoded
        .into_iter()
        .filter(|(day, derived)| !derived || !keyed.contains(&day.date_key))
        .map(|(day, _)| day)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredAccount {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct RestoredState {
    pub accounts: Option<Vec<RestoredAccount>>,
    pub windows: Option<BTreeMap<u32, Vec<DayEntry>>>,
}

fn decode_accounts(raw: &str) -> Result<Vec<RestoredAccount>, String> {
    let parsed = serde_json::from_str::<Value>(raw)
        .map_err(|e| format!("slot {ACCOUNTS_SLOT} is not valid JSON: {e}"))?;
    let items = parsed
        .as_array()
        .ok_or_else(|| format!("slot {ACCOUNTS_SLOT} must hold a JSON array"))?;

    let mut accounts = Vec::new();
    for item in items {
        let id = item.get("id").map(coerce_number).unwrap_or(0);
        let Ok(id) = u32::try_from(id) else {
            continue;
        };
        if id == 0 {
            continue;
        }
        let name = item
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        accounts.push(RestoredAccount { id, name });
    }
    Ok(accounts)
}

fn decode_windows(raw: &str) -> Result<BTreeMap<u32, Vec<DayEntry>>, String> {
    let parsed = serde_json::from_str::<Value>(raw)
        .map_err(|e| format!("slot {WINDOWS_SLOT} is not valid JSON: {e}"))?;
    let object: &Map<String, Value> = parsed
        .as_object()
        .ok_or_else(|| format!("slot {WINDOWS_SLOT} must hold a JSON object"))?;

    let mut windows = BTreeMap::new();
    for (key, value) in object {
        match key.trim().parse::<u32>() {
            Ok(id) => {
                windows.insert(id, decode_window(value));
            }
            Err(_) => log::debug!("ignoring window under non-numeric key {key:?}"),
        }
    }
    Ok(windows)
}

pub fn load_state(store: &dyn SlotStore) -> Result<RestoredState, String> {
    let accounts = match store.read_slot(ACCOUNTS_SLOT)? {
        Some(raw) if !raw.trim().is_empty() => Some(decode_accounts(&raw)?),
        _ => None,
    };
    let windows = match store.read_slot(WINDOWS_SLOT)? {
        Some(raw) if !raw.trim().is_empty() => Some(decode_windows(&raw)?),
        _ => None,
    };
    Ok(RestoredState { accounts, windows })
}

pub fn encode_slot_json<T: serde::Serialize + ?Sized>(slot: &str, value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("failed to encode slot {slot}: {e}"))
}

pub fn save_slot_json<T: serde::Serialize + ?Sized>(
    store: &dyn SlotStore,
    slot: &str,
    value: &T,
) -> Result<(), String> {
    store.write_slot(slot, &encode_slot_json(slot, value)?)
}

pub fn is_canonical_key(key: &str) -> bool {
    parse_date_key(key).is_some()
}
