use serde::Deserialize;
use serde_json::{json, Value};

use crate::day_window::DayField;
use crate::tracker_session::TrackerSession;
use crate::tracker_store::coerce_number;
use chrono::NaiveDate;
#[cfg(feature = "desktop")]
use tauri::State;

#[cfg(feature = "desktop")]
use crate::tracker_host::{with_session, TrackerState};
#[cfg(feature = "desktop")]
use crate::tracker_session::TrackerSnapshot;

#[derive(Debug, Default, Deserialize)]
pub struct RenameAccountRequest {
    pub account_id: Option<u32>,
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDayFieldRequest {
    pub account_id: Option<u32>,
    pub day_index: Option<usize>,
    pub date_key: Option<String>,
    pub field: Option<String>,
    pub value: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SelectAccountRequest {
    pub account_id: Option<u32>,
}

fn required_account_id(raw: Option<u32>) -> Result<u32, String> {
    raw.filter(|id| *id > 0)
        .ok_or_else(|| "account_id is required".to_string())
}

pub fn rename_account_in_session(
    session: &mut TrackerSession,
    req: RenameAccountRequest,
) -> Result<Value, String> {
    let account_id = required_account_id(req.account_id)?;
    let name = req.name.unwrap_or_default();
    let account = session.rename_account(account_id, &name)?.clone();
    Ok(json!({
        "account": account,
        "snapshot": session.snapshot(),
    }))
}

fn resolve_day_index(
    session: &TrackerSession,
    account_id: u32,
    day_index: Option<usize>,
    date_key: Option<String>,
) -> Result<usize, String> {
    if let Some(index) = day_index {
        return Ok(index);
    }
    let key = date_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| "day_index or date_key is required".to_string())?;
    let window = session
        .window(account_id)
        .ok_or_else(|| format!("account {account_id} not found"))?;
    window
        .iter()
        .position(|d| d.date_key == key)
        .ok_or_else(|| format!("{key} is outside the current window"))
}

pub fn update_day_field_in_session(
    session: &mut TrackerSession,
    req: UpdateDayFieldRequest,
) -> Result<Value, String> {
    let account_id = required_account_id(req.account_id)?;
    let field = DayField::parse(req.field.as_deref().unwrap_or_default())?;
    let value = req.value.as_ref().map(coerce_number).unwrap_or(0);
    let day_index = resolve_day_index(session, account_id, req.day_index, req.date_key)?;

    let totals = session.update_day_field(account_id, day_index, field, value)?;
    Ok(json!({
        "account_id": account_id,
        "day_index": day_index,
        "field": field.as_str(),
        "value": value,
        "account_totals": totals,
        "snapshot": session.snapshot(),
    }))
}

pub fn select_account_in_session(
    session: &mut TrackerSession,
    req: SelectAccountRequest,
) -> Result<Value, String> {
    let detail = session.select_account(req.account_id.filter(|id| *id > 0))?;
    Ok(json!({
        "selected_account_id": session.selected_account_id(),
        "detail": detail,
    }))
}

pub fn roll_session(session: &mut TrackerSession, today: NaiveDate) -> Result<Value, String> {
    let rolls = session.roll(today)?;
    Ok(json!({
        "rolls": rolls,
        "snapshot": session.snapshot(),
    }))
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub fn tracker_snapshot(state: State<'_, TrackerState>) -> Result<TrackerSnapshot, String> {
    with_session(&state, |session| Ok(session.snapshot()))
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub fn tracker_rename_account(
    state: State<'_, TrackerState>,
    req: RenameAccountRequest,
) -> Result<Value, String> {
    with_session(&state, |session| rename_account_in_session(session, req))
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub fn tracker_update_day_field(
    state: State<'_, TrackerState>,
    req: UpdateDayFieldRequest,
) -> Result<Value, String> {
    with_session(&state, |session| update_day_field_in_session(session, req))
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub fn tracker_select_account(
    state: State<'_, TrackerState>,
    req: SelectAccountRequest,
) -> Result<Value, String> {
    with_session(&state, |session| select_account_in_session(session, req))
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub fn tracker_roll_now(state: State<'_, TrackerState>) -> Result<Value, String> {
    let today = chrono::Local::now().date_naive();
    with_session(&state, |session| roll_session(session, today))
}
