use chrono::Local;
use std::path::PathBuf;
use std::sync::Mutex;
use tauri::{AppHandle, Emitter, Manager};

use crate::roll_scheduler::{roll_scheduler, RollSchedule, RollSchedulerHandle, RollTrigger};
use crate::tracker_config::{load_tracker_config_at_path, TRACKER_CONFIG_FILE_NAME};
use crate::tracker_db::resolve_tracker_db_path;
use crate::tracker_session::TrackerSession;
use crate::tracker_store::SqliteSlotStore;

pub const ROLLED_EVENT: &str = "tracker://rolled";

pub struct TrackerState {
    session: Mutex<TrackerSession>,
    scheduler: Mutex<Option<RollSchedulerHandle>>,
}

pub(crate) fn resolve_tracker_config_path(app: &AppHandle) -> Result<PathBuf, String> {
    let base = app
        .path()
        .app_config_dir()
        .map_err(|e| format!("cannot resolve app_config_dir: {e}"))?;
    Ok(base.join(TRACKER_CONFIG_FILE_NAME))
}

pub(crate) fn with_session<T>(
    state: &TrackerState,
    f: impl FnOnce(&mut TrackerSession) -> Result<T, String>,
) -> Result<T, String> {
    let mut session = state
        .session
        .lock()
        .map_err(|_| "tracker session lock poisoned".to_string())?;
    f(&mut session)
}

pub(crate) fn scheduler_active(state: &TrackerState) -> bool {
    state
        .scheduler
        .lock()
        .map(|slot| slot.as_ref().is_some_and(RollSchedulerHandle::is_active))
        .unwrap_or(false)
}

pub(crate) fn install_tracker_state(app: &AppHandle) -> Result<(), String> {
    let config_path = resolve_tracker_config_path(app)?;
    let config = load_tracker_config_at_path(&config_path)?;
    let db_path = resolve_tracker_db_path(app)?;
    log::info!("tracker database at {}", db_path.display());

    let store = SqliteSlotStore::open(&db_path)?;
    let session = TrackerSession::open(Box::new(store), config, Local::now().date_naive())?;
    app.manage(TrackerState {
        session: Mutex::new(session),
        scheduler: Mutex::new(None),
    });
    Ok(())
}

fn scheduled_roll(app: &AppHandle, trigger: RollTrigger) {
    let state = app.state::<TrackerState>();
    let today = Local::now().date_naive();
    let rolled = with_session(&state, |session| {
        session.roll(today)?;
        Ok(session.snapshot())
    });
    match rolled {
        Ok(snapshot) => {
            if let Err(e) = app.emit(ROLLED_EVENT, &snapshot) {
                log::warn!("failed to emit {ROLLED_EVENT}: {e}");
            }
        }
        Err(e) => log::error!("{trigger:?} roll failed: {e}"),
    }
}

pub(crate) fn start_roll_scheduler(app: &AppHandle) -> Result<(), String> {
    let state = app.state::<TrackerState>();
    let config = with_session(&state, |session| Ok(session.config().clone()))?;
    let schedule = RollSchedule::from_now(&config, Local::now().naive_local());

    let handle = app.clone();
    let (scheduler, task) = roll_scheduler(schedule, move |trigger| scheduled_roll(&handle, trigger));
    tauri::async_runtime::spawn(task);
    log::info!(
        "roll scheduler started, first boundary in {}s",
        schedule.first_delay.as_secs()
    );

    let mut slot = state
        .scheduler
        .lock()
        .map_err(|_| "scheduler lock poisoned".to_string())?;
    *slot = Some(scheduler);
    Ok(())
}

pub(crate) fn stop_roll_scheduler(app: &AppHandle) {
    let Some(state) = app.try_state::<TrackerState>() else {
        return;
    };
    if let Ok(mut slot) = state.scheduler.lock() {
        if let Some(mut scheduler) = slot.take() {
            scheduler.cancel();
        }
    }
}
