use account_tracker_tauri_lib::date_key::parse_date_key;
use account_tracker_tauri_lib::{
    inspect_status_at_path, rename_account_in_session, roll_session,
    update_day_field_in_session, RenameAccountRequest, SqliteSlotStore, TrackerConfig,
    TrackerSession, UpdateDayFieldRequest,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::io::{self, Read};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct AdapterRequest {
    schema_version: u64,
    case: Option<AdapterCaseMeta>,
    endpoint: AdapterEndpoint,
    #[serde(default)]
    query: Value,
    dataset: AdapterDataset,
    config: Option<TrackerConfig>,
}

#[derive(Debug, Deserialize)]
struct AdapterCaseMeta {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdapterEndpoint {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdapterDataset {
    db_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ClockQuery {
    today: Option<String>,
}

#[derive(Debug, Serialize)]
struct AdapterErrorBody {
    category: String,
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
enum AdapterResponse {
    #[serde(rename = "success")]
    Success { payload: Value },
    #[serde(rename = "error")]
    Error { error: AdapterErrorBody },
}

fn classify_error_message(message: &str) -> String {
    let storage_keywords = [
        "database",
        "migration",
        "slot ",
        "tracker config",
        "not persisted",
    ];
    if storage_keywords.iter().any(|k| message.contains(k)) {
        return "STORAGE_ERROR".to_string();
    }

    if message.contains("not found") {
        return "NOT_FOUND_ERROR".to_string();
    }

    let validation_keywords = [
        "is required",
        "must be",
        "must not be",
        "outside the current window",
    ];
    if validation_keywords.iter().any(|k| message.contains(k)) {
        return "VALIDATION_ERROR".to_string();
    }

    "UNKNOWN_ERROR".to_string()
}

fn protocol_category(message: &str) -> Option<&'static str> {
    if message.starts_with("unsupported endpoint path:") {
        Some("UNSUPPORTED_ENDPOINT")
    } else if message.starts_with("unsupported schema_version:")
        || message.starts_with("request.")
        || message.starts_with("invalid JSON request:")
        || message == "empty stdin request"
    {
        Some("ADAPTER_PROTOCOL_ERROR")
    } else {
        None
    }
}

fn error_response(
    category: impl Into<String>,
    message: impl Into<String>,
    error_type: impl Into<String>,
) -> AdapterResponse {
    AdapterResponse::Error {
        error: AdapterErrorBody {
            category: category.into(),
            message: message.into(),
            error_type: error_type.into(),
        },
    }
}

fn parse_bool_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}

fn read_stdin_json() -> Result<Value, String> {
    let mut raw = String::new();
    io::stdin()
        .read_to_string(&mut raw)
        .map_err(|e| format!("failed to read stdin: {e}"))?;
    if raw.trim().is_empty() {
        return Err("empty stdin request".to_string());
    }
    serde_json::from_str::<Value>(&raw).map_err(|e| format!("invalid JSON request: {e}"))
}

fn query_as<T: serde::de::DeserializeOwned + Default>(
    query: &Value,
    endpoint: &str,
) -> Result<T, String> {
    if query.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(query.clone())
        .map_err(|e| format!("request.query invalid for {endpoint}: {e}"))
}

fn resolve_today(query: &Value) -> Result<NaiveDate, String> {
    let clock: ClockQuery = query_as(query, "clock")?;
    match clock.today.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_date_key(raw)
            .ok_or_else(|| format!("today must be a YYYY-MM-DD date (got {raw:?})")),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

fn parse_request(raw: Value) -> Result<AdapterRequest, String> {
    serde_json::from_value::<AdapterRequest>(raw).map_err(|e| format!("request.root invalid: {e}"))
}

fn open_session(
    db_path: &Path,
    config: TrackerConfig,
    today: NaiveDate,
) -> Result<TrackerSession, String> {
    let store = SqliteSlotStore::open(db_path)?;
    TrackerSession::open(Box::new(store), config, today)
}

fn dispatch(req: AdapterRequest) -> Result<Value, String> {
    if req.schema_version != 1 {
        return Err(format!(
            "unsupported schema_version: {}",
            req.schema_version
        ));
    }

    let path = req
        .endpoint
        .path
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "request.endpoint.path missing".to_string())?;
    let db_path = req
        .dataset
        .db_path
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Path::new)
        .ok_or_else(|| "request.dataset.db_path missing".to_string())?;
    let config = req.config.unwrap_or_default();

    match path {
        "/api/tracker/db-status" => {
            let status = inspect_status_at_path(db_path)?;
            serde_json::to_value(status).map_err(|e| format!("failed to encode db status: {e}"))
        }
        "/api/tracker/snapshot" => {
            let session = open_session(db_path, config, resolve_today(&req.query)?)?;
            serde_json::to_value(session.snapshot())
                .map_err(|e| format!("failed to encode snapshot: {e}"))
        }
        "/api/tracker/rename" => {
            let rename: RenameAccountRequest = query_as(&req.query, "rename")?;
            let mut session = open_session(db_path, config, resolve_today(&req.query)?)?;
            rename_account_in_session(&mut session, rename)
        }
        "/api/tracker/update-day" => {
            let update: UpdateDayFieldRequest = query_as(&req.query, "update-day")?;
            let mut session = open_session(db_path, config, resolve_today(&req.query)?)?;
            update_day_field_in_session(&mut session, update)
        }
        "/api/tracker/roll" => {
            let today = resolve_today(&req.query)?;
            let mut session = open_session(db_path, config, today)?;
            roll_session(&mut session, today)
        }
        _ => Err(format!("unsupported endpoint path: {path}")),
    }
}

fn main() {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let pretty = parse_bool_flag(&args, "--pretty");
    let verbose = parse_bool_flag(&args, "--verbose");

    let resp = match read_stdin_json()
        .and_then(parse_request)
        .and_then(|req| {
            if verbose {
                if let Some(case_id) = req.case.as_ref().and_then(|c| c.id.as_deref()) {
                    eprintln!("[tracker_adapter] case={case_id}");
                }
                if let Some(path) = req.endpoint.path.as_deref() {
                    eprintln!("[tracker_adapter] endpoint={path}");
                }
                if let Some(db_path) = req.dataset.db_path.as_deref() {
                    eprintln!("[tracker_adapter] db={db_path}");
                }
            }
            dispatch(req)
        }) {
        Ok(payload) => AdapterResponse::Success { payload },
        Err(message) => {
            let category = protocol_category(&message)
                .map(str::to_string)
                .unwrap_or_else(|| classify_error_message(&message));
            error_response(category, message, "AdapterError")
        }
    };

    let out = if pretty {
        serde_json::to_string_pretty(&resp)
    } else {
        serde_json::to_string(&resp)
    }
    .unwrap_or_else(|e| {
        json!({
            "status": "error",
            "error": {
                "category": "ADAPTER_PROTOCOL_ERROR",
                "message": format!("serialize response failed: {e}"),
                "type": "SerializeError",
            }
        })
        .to_string()
    });

    print!("{out}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str, db_path: &Path, query: Value) -> AdapterRequest {
        serde_json::from_value(json!({
            "schema_version": 1,
            "endpoint": { "path": path },
            "query": query,
            "dataset": { "db_path": db_path.to_string_lossy() },
        }))
        .expect("adapter request")
    }

    fn temp_db() -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "tracker_adapter_test_{}_{}.db",
            std::process::id(),
            uuid::Uuid::new_v4()
        ))
    }

    #[test]
    fn errors_fall_into_categories() {
        assert_eq!(classify_error_message("account 9 not found"), "NOT_FOUND_ERROR");
        assert_eq!(classify_error_message("points must be between 0 and 21"), "VALIDATION_ERROR");
        assert_eq!(
            classify_error_message("slot accountDays is not valid JSON: eof"),
            "STORAGE_ERROR"
        );
        assert_eq!(classify_error_message("boom"), "UNKNOWN_ERROR");
        assert_eq!(
            protocol_category("unsupported endpoint path: /x"),
            Some("UNSUPPORTED_ENDPOINT")
        );
        assert_eq!(
            protocol_category("request.dataset.db_path missing"),
            Some("ADAPTER_PROTOCOL_ERROR")
        );
    }

    #[test]
    fn malformed_request_root_is_a_protocol_error() {
        let err = parse_request(json!({ "schema_version": 1, "endpoint": {} }))
            .expect_err("dataset missing");
        assert!(err.starts_with("request.root invalid"));
        assert_eq!(protocol_category(&err), Some("ADAPTER_PROTOCOL_ERROR"));

        let err = parse_request(json!([1, 2])).expect_err("not an object");
        assert_eq!(protocol_category(&err), Some("ADAPTER_PROTOCOL_ERROR"));
    }

    #[test]
    fn update_then_snapshot_through_dispatch() {
        let db_path = temp_db();
        let updated = dispatch(request(
            "/api/tracker/update-day",
            &db_path,
            json!({ "today": "2026-10-19", "account_id": 2, "day_index": 14, "field": "fees", "value": 7 }),
        ))
        .expect("update-day");
        assert_eq!(updated["account_totals"]["fees"], json!(7));

        let snapshot = dispatch(request(
            "/api/tracker/snapshot",
            &db_path,
            json!({ "today": "2026-10-19" }),
        ))
        .expect("snapshot");
        assert_eq!(snapshot["totals"]["fees"], json!(7));
        assert_eq!(snapshot["windows"]["2"][14]["dateKey"], json!("2026-10-18"));

        let status = dispatch(request("/api/tracker/db-status", &db_path, Value::Null))
            .expect("db-status");
        assert_eq!(status["ready"], json!(true));
        let _ = std::fs::remove_file(&db_path);
    }

    #[test]
    fn bad_today_and_unknown_endpoint_are_rejected() {
        let db_path = temp_db();
        let err = dispatch(request(
            "/api/tracker/roll",
            &db_path,
            json!({ "today": "19/10/2026" }),
        ))
        .expect_err("bad date");
        assert_eq!(classify_error_message(&err), "VALIDATION_ERROR");

        let err = dispatch(request("/api/tracker/nope", &db_path, Value::Null))
            .expect_err("unknown endpoint");
        assert_eq!(protocol_category(&err), Some("UNSUPPORTED_ENDPOINT"));
    }
}
