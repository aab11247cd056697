use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use tauri::{AppHandle, Manager};

use crate::date_key::to_date_key;
use crate::tracker_config::{TrackerConfig, ACCOUNT_IDS, WINDOW_DAYS};
use crate::tracker_db::resolve_tracker_db_path;
use crate::tracker_host::{
    resolve_tracker_config_path, scheduler_active, with_session, TrackerState,
};

#[derive(Debug, Serialize)]
pub struct HealthPing {
    pub status: &'static str,
    pub checked_at: String,
    pub reference_date_key: Option<String>,
    pub scheduler_active: bool,
}

#[derive(Debug, Serialize)]
pub struct AppMetadata {
    pub app_name: String,
    pub app_version: String,
    pub window_days: usize,
    pub account_ids: Vec<u32>,
    pub config: Option<TrackerConfig>,
}

#[derive(Debug, Serialize)]
pub struct TrackerPaths {
    pub db_path: Option<String>,
    pub db_exists: bool,
    pub config_path: Option<String>,
    pub config_exists: bool,
    pub errors: Vec<String>,
}

fn describe_path(resolved: Result<PathBuf, String>, errors: &mut Vec<String>) -> (Option<String>, bool) {
    match resolved {
        Ok(path) => (Some(path.to_string_lossy().to_string()), path.exists()),
        Err(e) => {
            errors.push(e);
            (None, false)
        }
    }
}

#[tauri::command]
pub fn health_ping(app: AppHandle) -> HealthPing {
    let state = app.try_state::<TrackerState>();
    let reference_date_key = state.as_ref().and_then(|s| {
        with_session(s, |session| Ok(to_date_key(session.reference_date()))).ok()
    });
    let scheduler = state.as_ref().is_some_and(|s| scheduler_active(s));

    HealthPing {
        status: if reference_date_key.is_some() && scheduler {
            "ok"
        } else {
            "degraded"
        },
        checked_at: Utc::now().to_rfc3339(),
        reference_date_key,
        scheduler_active: scheduler,
    }
}

#[tauri::command]
pub fn app_metadata(app: AppHandle) -> AppMetadata {
    let package = app.package_info();
    let config = app
        .try_state::<TrackerState>()
        .and_then(|s| with_session(&s, |session| Ok(session.config().clone())).ok());

    AppMetadata {
        app_name: package.name.clone(),
        app_version: package.version.to_string(),
        window_days: WINDOW_DAYS,
        account_ids: ACCOUNT_IDS.to_vec(),
        config,
    }
}

#[tauri::command]
pub fn tracker_paths(app: AppHandle) -> TrackerPaths {
    let mut errors = Vec::new();
    let (db_path, db_exists) = describe_path(resolve_tracker_db_path(&app), &mut errors);
    let (config_path, config_exists) =
        describe_path(resolve_tracker_config_path(&app), &mut errors);
    TrackerPaths {
        db_path,
        db_exists,
        config_path,
        config_exists,
        errors,
    }
}
