use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

use super::{BalanceGroupRow, Timeframe};
use crate::utils::time_utils::datetime_from_ms;

/// True for the days of a Monday-based week that `%W` splits across two
/// years: the January days before the first Monday and the trailing
/// December days of a week that ends in January.
pub fn straddles_year_boundary(date: NaiveDate) -> bool {
    let weekday = date.weekday().number_from_monday() as i32;
    let day = date.day() as i32;

    (date.month() == 1 && day < 7 && weekday - day > 0)
        || (date.month() == 12 && day > 25 && day + 7 - weekday > 31)
}

/// Merges week groups split at a year boundary into one group keyed by the
/// week's Monday. Rows must be ascending by `mts`.
///
/// Boundary rows are deduplicated by (currency, wallet), keeping the latest,
/// and flushed before the next regular row or at the end.
pub fn regroup_weekly(rows: Vec<BalanceGroupRow>) -> Vec<BalanceGroupRow> {
    let mut out = Vec::with_capacity(rows.len());
    let mut boundary: BTreeMap<(String, String), BalanceGroupRow> = BTreeMap::new();

    for mut row in rows {
        let Some(date) = datetime_from_ms(row.mts).map(|dt| dt.date_naive()) else {
            out.push(row);
            continue;
        };

        if straddles_year_boundary(date) {
            if let Some(key) = Timeframe::Week
                .bucket_start_date(date)
                .map(|monday| monday.format(Timeframe::Week.strftime_format()).to_string())
            {
                row.group_key = key;
            }
            boundary.insert((row.currency.clone(), row.wallet.clone()), row);
            continue;
        }

        flush(&mut boundary, &mut out);
        out.push(row);
    }
    flush(&mut boundary, &mut out);

    out
}

fn flush(
    boundary: &mut BTreeMap<(String, String), BalanceGroupRow>,
    out: &mut Vec<BalanceGroupRow>,
) {
    if boundary.is_empty() {
        return;
    }
    let mut rows: Vec<_> = std::mem::take(boundary).into_values().collect();
    rows.sort_by_key(|r| r.mts);
    out.extend(rows);
}
