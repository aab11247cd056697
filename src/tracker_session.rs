use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::date_key::to_date_key;
use crate::day_window::{build_window, DayEntry, DayField};
use crate::totals::{compute_account_totals, compute_global_totals, AccountTotals, GlobalTotals};
use crate::tracker_config::{TrackerConfig, ACCOUNT_IDS, PLACEHOLDER_NAME_PREFIX, WINDOW_DAYS};
use crate::tracker_store::{
    encode_slot_json, is_canonical_key, load_state, save_slot_json, SlotStore, ACCOUNTS_SLOT,
    WINDOWS_SLOT,
};
use crate::window_reconcile::{reconcile_window_report, RollReport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: u32,
    pub name: String,
    pub points: i64,
    pub fees: i64,
    pub earning: i64,
}

impl Account {
    pub fn placeholder(id: u32) -> Self {
        Self {
            id,
            name: format!("{PLACEHOLDER_NAME_PREFIX} {id}"),
            points: 0,
            fees: 0,
            earning: 0,
        }
    }

    pub fn totals(&self) -> AccountTotals {
        AccountTotals {
            points: self.points,
            fees: self.fees,
            earning: self.earning,
        }
    }

    fn apply_totals(&mut self, totals: AccountTotals) {
        self.points = totals.points;
        self.fees = totals.fees;
        self.earning = totals.earning;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialState {
    pub accounts: Vec<Account>,
    pub windows: BTreeMap<u32, Vec<DayEntry>>,
}

impl InitialState {
    pub fn placeholder(config: &TrackerConfig, today: NaiveDate) -> Self {
        let reference = config.reference_date(today);
        Self {
            accounts: ACCOUNT_IDS.iter().map(|id| Account::placeholder(*id)).collect(),
            windows: ACCOUNT_IDS
                .iter()
                .map(|id| (*id, build_window(reference)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccountRoll {
    pub account_id: u32,
    pub report: RollReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountDetail {
    pub account: Account,
    pub days: Vec<DayEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackerSnapshot {
    pub reference_date_key: String,
    pub accounts: Vec<Account>,
    pub windows: BTreeMap<u32, Vec<DayEntry>>,
    pub totals: GlobalTotals,
    pub selected_account_id: Option<u32>,
    pub selected: Option<AccountDetail>,
}

pub struct TrackerSession {
    config: TrackerConfig,
    reference: NaiveDate,
    accounts: Vec<Account>,
    windows: BTreeMap<u32, Vec<DayEntry>>,
    selected: Option<u32>,
    store: Box<dyn SlotStore>,
}

impl TrackerSession {
    pub fn new(
        initial: InitialState,
        config: TrackerConfig,
        today: NaiveDate,
        store: Box<dyn SlotStore>,
    ) -> Self {
        let mut session = Self {
            reference: config.reference_date(today),
            config,
            accounts: initial.accounts,
            windows: initial.windows,
            selected: None,
            store,
        };
        session.recompute_totals();
        session
    }

    pub fn open(
        store: Box<dyn SlotStore>,
        config: TrackerConfig,
        today: NaiveDate,
    ) -> Result<Self, String> {
        let restored = load_state(store.as_ref())?;
        let mut initial = InitialState::placeholder(&config, today);

        if let Some(saved_accounts) = &restored.accounts {
            for account in initial.accounts.iter_mut() {
                if let Some(saved) = saved_accounts.iter().find(|a| a.id == account.id) {
                    account.name = saved.name.clone();
                }
            }
        }

        let restored_windows = restored.windows.unwrap_or_default();
        let legacy_entries = restored_windows
            .values()
            .flatten()
            .filter(|d| !is_canonical_key(&d.date_key))
            .count();
        if legacy_entries > 0 {
            log::warn!("{legacy_entries} stored day entries have no usable date key");
        }

        let reference = config.reference_date(today);
        for (id, window) in initial.windows.iter_mut() {
            let (days, report) = reconcile_window_report(
                restored_windows.get(id).map(Vec::as_slice),
                build_window(reference),
            );
            log::debug!(
                "account {id}: restored window carried={} created={} dropped={}",
                report.carried,
                report.created,
                report.dropped
            );
            *window = days;
        }

        let mut session = Self::new(initial, config, today, store);
        session.persist()?;
        log::info!(
            "tracker session opened, window ends {}",
            to_date_key(session.reference)
        );
        Ok(session)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn account(&self, id: u32) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }

    pub fn window(&self, id: u32) -> Option<&[DayEntry]> {
        self.windows.get(&id).map(Vec::as_slice)
    }

    pub fn selected_account_id(&self) -> Option<u32> {
        self.selected
    }

    pub fn global_totals(&self) -> GlobalTotals {
        let rows = self.accounts.iter().map(Account::totals).collect::<Vec<_>>();
        compute_global_totals(rows.iter())
    }

    pub fn roll(&mut self, today: NaiveDate) -> Result<Vec<AccountRoll>, String> {
        let reference = self.config.reference_date(today);
        let mut rolls = Vec::with_capacity(self.windows.len());
        for (id, window) in self.windows.iter_mut() {
            let (days, report) =
                reconcile_window_report(Some(window.as_slice()), build_window(reference));
            if report.changed_shape() {
                log::debug!(
                    "account {id}: window shifted, created={} dropped={}",
                    report.created,
                    report.dropped
                );
            }
            if report.dropped_with_values > 0 {
                log::info!(
                    "account {id}: {} day(s) with values rolled out of the window",
                    report.dropped_with_values
                );
            }
            *window = days;
            rolls.push(AccountRoll {
                account_id: *id,
                report,
            });
        }
        if reference != self.reference {
            log::info!(
                "window rolled from {} to {}",
                to_date_key(self.reference),
                to_date_key(reference)
            );
        }
        self.reference = reference;
        self.recompute_totals();
        self.persist()?;
        Ok(rolls)
    }

    pub fn rename_account(&mut self, id: u32, name: &str) -> Result<&Account, String> {
        let index = self
            .accounts
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| format!("account {id} not found"))?;
        self.accounts[index].name = name.to_string();
        save_slot_json(self.store.as_ref(), ACCOUNTS_SLOT, &self.accounts)?;
        Ok(&self.accounts[index])
    }

    pub fn update_day_field(
        &mut self,
        account_id: u32,
        day_index: usize,
        field: DayField,
        value: i64,
    ) -> Result<AccountTotals, String> {
        let value = field.validate(value)?;
        let window = self
            .windows
            .get_mut(&account_id)
            .ok_or_else(|| format!("account {account_id} not found"))?;
        let day = window.get_mut(day_index).ok_or_else(|| {
            format!(
                "day_index must be between 0 and {} (got {day_index})",
                WINDOW_DAYS - 1
            )
        })?;
        day.set_field(field, value);

        self.recompute_totals();
        self.persist()?;
        self.account(account_id)
            .map(Account::totals)
            .ok_or_else(|| format!("account {account_id} not found"))
    }

    pub fn select_account(&mut self, id: Option<u32>) -> Result<Option<AccountDetail>, String> {
        if let Some(id) = id {
            if self.account(id).is_none() {
                return Err(format!("account {id} not found"));
            }
        }
        self.selected = id;
        Ok(self.selected_detail())
    }

    pub fn selected_detail(&self) -> Option<AccountDetail> {
        let id = self.selected?;
        Some(AccountDetail {
            account: self.account(id)?.clone(),
            days: self.windows.get(&id).cloned().unwrap_or_default(),
        })
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            reference_date_key: to_date_key(self.reference),
            accounts: self.accounts.clone(),
            windows: self.windows.clone(),
            totals: self.global_totals(),
            selected_account_id: self.selected,
            selected: self.selected_detail(),
        }
    }

    fn recompute_totals(&mut self) {
        for account in self.accounts.iter_mut() {
            let totals = self
                .windows
                .get(&account.id)
                .map(|days| compute_account_totals(days))
                .unwrap_or_default();
            account.apply_totals(totals);
        }
    }

    fn persist(&self) -> Result<(), String> {
        let accounts = encode_slot_json(ACCOUNTS_SLOT, &self.accounts)?;
        let windows = encode_slot_json(WINDOWS_SLOT, &self.windows)?;
        self.store
            .write_slots(&[(ACCOUNTS_SLOT, &accounts), (WINDOWS_SLOT, &windows)])
            .map_err(|e| {
                log::warn!("tracker state not persisted: {e}");
                e
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker_config::ReferenceDay;
    use crate::tracker_store::{MemorySlotStore, SqliteSlotStore};
    use chrono::Duration;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use uuid::Uuid;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn stored_json(store: &MemorySlotStore, slot: &str) -> Value {
        let raw = store
            .read_slot(slot)
            .expect("read slot")
            .unwrap_or_else(|| panic!("slot {slot} missing"));
        serde_json::from_str(&raw).expect("slot json")
    }

    #[test]
    fn fresh_session_has_three_zeroed_accounts() {
        let store = Arc::new(MemorySlotStore::default());
        let session = TrackerSession::open(
            Box::new(store.clone()),
            TrackerConfig::default(),
            ymd(2026, 10, 19),
        )
        .expect("open");

        let names = session
            .accounts()
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Tài khoản 1", "Tài khoản 2", "Tài khoản 3"]);
        assert!(session.accounts().iter().all(|a| a.totals() == AccountTotals::default()));
        assert_eq!(session.global_totals().points, 0);
        assert_eq!(session.reference_date(), ymd(2026, 10, 18));
        for id in ACCOUNT_IDS {
            let window = session.window(id).expect("window");
            assert_eq!(window.len(), WINDOW_DAYS);
            assert_eq!(window[14].date_key, "2026-10-18");
        }

        let saved = stored_json(&store, ACCOUNTS_SLOT);
        assert_eq!(saved.as_array().map(Vec::len), Some(3));
        let windows = stored_json(&store, WINDOWS_SLOT);
        assert_eq!(windows["2"].as_array().map(Vec::len), Some(15));
    }

    #[test]
    fn editing_last_day_updates_account_and_global_totals() {
        let store = Arc::new(MemorySlotStore::default());
        let mut session = TrackerSession::open(
            Box::new(store.clone()),
            TrackerConfig::default(),
            ymd(2026, 10, 19),
        )
        .expect("open");

        for (field, value) in [
            (DayField::Points, 10),
            (DayField::Fees, 2),
            (DayField::Airdrop, 1),
            (DayField::Earning, 5),
        ] {
            session
                .update_day_field(1, 14, field, value)
                .expect("update day");
        }

        assert_eq!(
            session.account(1).map(Account::totals),
            Some(AccountTotals {
                points: -5,
                fees: 2,
                earning: 5,
            })
        );
        assert_eq!(session.account(2).map(Account::totals), Some(AccountTotals::default()));
        let totals = session.global_totals();
        assert_eq!((totals.points, totals.fees, totals.earning), (-5, 2, 5));

        let saved = stored_json(&store, ACCOUNTS_SLOT);
        assert_eq!(saved[0]["points"], json!(-5));
        let windows = stored_json(&store, WINDOWS_SLOT);
        assert_eq!(windows["1"][14]["airdrop"], json!(1));
    }

    #[test]
    fn invalid_edits_leave_state_unchanged() {
        let mut session = TrackerSession::open(
            Box::new(MemorySlotStore::default()),
            TrackerConfig::default(),
            ymd(2026, 10, 19),
        )
        .expect("open");

        assert!(session.update_day_field(4, 0, DayField::Points, 1).is_err());
        assert!(session.update_day_field(1, 15, DayField::Points, 1).is_err());
        assert!(session.update_day_field(1, 0, DayField::Airdrop, 4).is_err());
        assert!(session.update_day_field(1, 0, DayField::Earning, -3).is_err());
        assert!(session.rename_account(9, "x").is_err());
        assert!(session.select_account(Some(0)).is_err());
        assert!(session.window(1).expect("window").iter().all(|d| !d.has_values()));
    }

    #[test]
    fn rename_and_select_are_reflected_in_snapshot() {
        let store = Arc::new(MemorySlotStore::default());
        let mut session = TrackerSession::open(
            Box::new(store.clone()),
            TrackerConfig::default(),
            ymd(2026, 10, 19),
        )
        .expect("open");

        session.rename_account(2, "Ví phụ").expect("rename");
        let detail = session
            .select_account(Some(2))
            .expect("select")
            .expect("detail");
        assert_eq!(detail.account.name, "Ví phụ");
        assert_eq!(detail.days.len(), WINDOW_DAYS);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.selected_account_id, Some(2));
        assert_eq!(snapshot.reference_date_key, "2026-10-18");
        assert_eq!(snapshot.accounts[1].name, "Ví phụ");
        assert_eq!(stored_json(&store, ACCOUNTS_SLOT)[1]["name"], json!("Ví phụ"));

        assert!(session.select_account(None).expect("deselect").is_none());
        assert!(session.snapshot().selected.is_none());
    }

    #[test]
    fn reopening_next_day_rolls_stored_windows_forward() {
        let store = Arc::new(MemorySlotStore::default());
        let day0 = ymd(2026, 10, 19);
        {
            let mut session =
                TrackerSession::open(Box::new(store.clone()), TrackerConfig::default(), day0)
                    .expect("open");
            session.update_day_field(3, 0, DayField::Points, 7).expect("oldest");
            session.update_day_field(3, 14, DayField::Fees, 4).expect("newest");
            session.rename_account(3, "Ba").expect("rename");
        }

        let session = TrackerSession::open(
            Box::new(store.clone()),
            TrackerConfig::default(),
            day0 + Duration::days(1),
        )
        .expect("reopen");
        let window = session.window(3).expect("window");
        assert_eq!(window[14].date_key, "2026-10-19");
        assert!(!window[14].has_values());
        assert_eq!(window[13].date_key, "2026-10-18");
        assert_eq!(window[13].fees, 4);
        assert!(window.iter().all(|d| d.points == 0));
        assert_eq!(session.account(3).map(|a| a.name.as_str()), Some("Ba"));
        assert_eq!(session.account(3).map(|a| a.fees), Some(4));
    }

    #[test]
    fn roll_is_idempotent_within_a_day() {
        let mut session = TrackerSession::open(
            Box::new(MemorySlotStore::default()),
            TrackerConfig::default(),
            ymd(2026, 10, 19),
        )
        .expect("open");
        session.update_day_field(1, 5, DayField::Earning, 50).expect("edit");
        let before = session.snapshot();

        let rolls = session.roll(ymd(2026, 10, 19)).expect("roll");
        assert_eq!(rolls.len(), 3);
        assert!(rolls.iter().all(|r| !r.report.changed_shape()));
        let after = session.snapshot();
        assert_eq!(before.windows, after.windows);
        assert_eq!(before.accounts, after.accounts);
    }

    #[test]
    fn roll_across_midnight_drops_the_oldest_day() {
        let mut session = TrackerSession::open(
            Box::new(MemorySlotStore::default()),
            TrackerConfig::default(),
            ymd(2026, 10, 19),
        )
        .expect("open");
        session.update_day_field(1, 0, DayField::Earning, 50).expect("edit");
        session.update_day_field(1, 1, DayField::Earning, 20).expect("edit");

        let rolls = session.roll(ymd(2026, 10, 20)).expect("roll");
        assert_eq!(rolls[0].report.dropped_with_values, 1);
        assert_eq!(session.account(1).map(|a| a.earning), Some(20));
        assert_eq!(session.window(1).expect("window")[0].earning, 20);
        assert_eq!(session.snapshot().reference_date_key, "2026-10-19");
    }

    #[test]
    fn restored_legacy_windows_and_names_merge_into_fixed_accounts() {
        let store = MemorySlotStore::with_slots([
            (
                ACCOUNTS_SLOT,
                r#"[{"id":1,"name":"Một","points":999},{"id":7,"name":"Thừa"}]"#,
            ),
            (
                WINDOWS_SLOT,
                r#"{"1":[{"date":"18/10/2026","points":"6","airdrop":null},{"date":"1/1/2020","points":3}]}"#,
            ),
        ]);
        let session =
            TrackerSession::open(Box::new(store), TrackerConfig::default(), ymd(2026, 10, 19))
                .expect("open");

        let ids = session.accounts().iter().map(|a| a.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(session.account(1).map(|a| a.name.as_str()), Some("Một"));
        assert_eq!(session.account(2).map(|a| a.name.as_str()), Some("Tài khoản 2"));
        assert_eq!(session.account(1).map(|a| a.points), Some(6));
        let window = session.window(1).expect("window");
        assert_eq!(window[14].points, 6);
        assert_eq!(window[14].date_key, "2026-10-18");
    }

    #[test]
    fn keyed_entry_beats_legacy_duplicate_on_open() {
        let store = MemorySlotStore::with_slots([(
            WINDOWS_SLOT,
            r#"{"1":[{"dateKey":"2026-10-18","date":"18/10/2026","points":7},{"date":"18/10/2026","points":5}]}"#,
        )]);
        let session =
            TrackerSession::open(Box::new(store), TrackerConfig::default(), ymd(2026, 10, 19))
                .expect("open");
        assert_eq!(session.window(1).expect("window")[14].points, 7);
        assert_eq!(session.account(1).map(|a| a.points), Some(7));
    }

    #[test]
    fn today_variant_ends_window_on_today() {
        let config = TrackerConfig {
            reference_day: ReferenceDay::Today,
            ..TrackerConfig::default()
        };
        let session = TrackerSession::new(
            InitialState::placeholder(&config, ymd(2026, 10, 19)),
            config,
            ymd(2026, 10, 19),
            Box::new(MemorySlotStore::default()),
        );
        assert_eq!(session.window(1).expect("window")[14].date_key, "2026-10-19");
        assert_eq!(session.config().reference_day, ReferenceDay::Today);
    }

    #[test]
    fn malformed_store_refuses_to_open() {
        let store = MemorySlotStore::with_slots([(WINDOWS_SLOT, "not json")]);
        assert!(
            TrackerSession::open(Box::new(store), TrackerConfig::default(), ymd(2026, 10, 19))
                .is_err()
        );
    }

    #[test]
    fn state_survives_sqlite_round_trip() {
        let db_path = std::env::temp_dir().join(format!(
            "tracker_session_test_{}_{}.db",
            std::process::id(),
            Uuid::new_v4()
        ));
        let today = ymd(2026, 10, 19);
        {
            let store = SqliteSlotStore::open(&db_path).expect("store");
            let mut session = TrackerSession::open(Box::new(store), TrackerConfig::default(), today)
                .expect("open");
            session.update_day_field(2, 10, DayField::Points, 21).expect("edit");
            session.rename_account(2, "Hai").expect("rename");
        }

        let store = SqliteSlotStore::open(&db_path).expect("store");
        let session =
            TrackerSession::open(Box::new(store), TrackerConfig::default(), today).expect("reopen");
        assert_eq!(session.account(2).map(|a| a.points), Some(21));
        assert_eq!(session.account(2).map(|a| a.name.as_str()), Some("Hai"));
        let _ = std::fs::remove_file(&db_path);
    }

    #[test]
    fn failed_persist_keeps_stored_slots_in_step() {
        let db_path = std::env::temp_dir().join(format!(
            "tracker_session_test_{}_{}.db",
            std::process::id(),
            Uuid::new_v4()
        ));
        let today = ymd(2026, 10, 19);
        let mut session = TrackerSession::open(
            Box::new(SqliteSlotStore::open(&db_path).expect("store")),
            TrackerConfig::default(),
            today,
        )
        .expect("open");
        let reader = SqliteSlotStore::open(&db_path).expect("reader");
        let accounts_before = reader.read_slot(ACCOUNTS_SLOT).expect("read");

        rusqlite::Connection::open(&db_path)
            .and_then(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER lock_windows BEFORE UPDATE ON tracker_slots
                     WHEN NEW.slot = 'accountDays'
                     BEGIN SELECT RAISE(ABORT, 'windows locked'); END;",
                )
            })
            .expect("trigger");

        assert!(session.update_day_field(1, 14, DayField::Points, 3).is_err());
        assert_eq!(reader.read_slot(ACCOUNTS_SLOT).expect("read"), accounts_before);
        let _ = std::fs::remove_file(&db_path);
    }
}
