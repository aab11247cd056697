#[cfg(feature = "desktop")]
mod commands;
pub mod date_key;
pub mod day_window;
pub mod roll_scheduler;
pub mod totals;
pub mod tracker_commands;
pub mod tracker_config;
pub mod tracker_db;
#[cfg(feature = "desktop")]
mod tracker_host;
pub mod tracker_session;
pub mod tracker_store;
pub mod window_reconcile;

pub use tracker_commands::{
    rename_account_in_session, roll_session, select_account_in_session,
    update_day_field_in_session, RenameAccountRequest, SelectAccountRequest,
    UpdateDayFieldRequest,
};
pub use tracker_config::{load_tracker_config_at_path, TrackerConfig};
pub use tracker_db::inspect_status_at_path;
pub use tracker_session::{TrackerSession, TrackerSnapshot};
pub use tracker_store::SqliteSlotStore;

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(
            tauri_plugin_log::Builder::new()
                .level(log::LevelFilter::Info)
                .build(),
        )
        .setup(|app| {
            let handle = app.handle();
            tracker_host::install_tracker_state(handle)?;
            tracker_host::start_roll_scheduler(handle)?;
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::health_ping,
            commands::app_metadata,
            commands::tracker_paths,
            tracker_db::tracker_db_status,
            tracker_commands::tracker_snapshot,
            tracker_commands::tracker_rename_account,
            tracker_commands::tracker_update_day_field,
            tracker_commands::tracker_select_account,
            tracker_commands::tracker_roll_now
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app, event| {
            if let tauri::RunEvent::Exit = event {
                tracker_host::stop_roll_scheduler(app);
            }
        });
}
