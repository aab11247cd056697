use serde::Serialize;

use crate::day_window::{DayEntry, DayField};
use crate::tracker_config::WINDOW_DAYS;

pub const AIRDROP_POINT_MULTIPLIER: i64 = WINDOW_DAYS as i64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccountTotals {
    pub points: i64,
    pub fees: i64,
    pub earning: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GlobalTotals {
    pub points: i64,
    pub fees: i64,
    pub earning: i64,
    pub account_count: usize,
}

fn sum_field(days: &[DayEntry], field: DayField) -> Option<i64> {
    days.iter()
        .try_fold(0_i64, |acc, day| acc.checked_add(day.field(field)))
}

pub fn compute_account_totals(days: &[DayEntry]) -> AccountTotals {
    let points = sum_field(days, DayField::Points)
        .zip(sum_field(days, DayField::Airdrop))
        .and_then(|(points, airdrop)| {
            airdrop
                .checked_mul(AIRDROP_POINT_MULTIPLIER)
                .and_then(|penalty| points.checked_sub(penalty))
        })
        .unwrap_or(0);

    AccountTotals {
        points,
        fees: sum_field(days, DayField::Fees).unwrap_or(0),
        earning: sum_field(days, DayField::Earning).unwrap_or(0),
    }
}

pub fn compute_global_totals<'a, I>(accounts: I) -> GlobalTotals
where
    I: IntoIterator<Item = &'a AccountTotals>,
{
    let mut out = GlobalTotals::default();
    let mut points = Some(0_i64);
    let mut fees = Some(0_i64);
    let mut earning = Some(0_i64);
    for totals in accounts {
        points = points.and_then(|v| v.checked_add(totals.points));
        fees = fees.and_then(|v| v.checked_add(totals.fees));
        earning = earning.and_then(|v| v.checked_add(totals.earning));
        out.account_count += 1;
    }
    out.points = points.unwrap_or(0);
    out.fees = fees.unwrap_or(0);
    out.earning = earning.unwrap_or(0);
    out
}
