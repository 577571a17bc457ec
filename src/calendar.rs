use chrono::{Datelike, Days, NaiveDate};

/// Academic years run July 1 through June 30 and are named by the July year.
pub fn academic_year(date: NaiveDate) -> i32 {
    if date.month() >= 7 {
        date.year()
    } else {
        date.year() - 1
    }
}

/// `YYYY-MM`
pub fn month_label(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// `YYYY Q<n>`, quarters numbered from calendar Q1.
pub fn quarter_label(date: NaiveDate) -> String {
    format!("{} Q{}", date.year(), date.month0() / 3 + 1)
}

/// First date inside the rolling volume window ending at `as_of`. A window
/// reaching past the earliest representable date covers everything.
pub fn window_start(as_of: NaiveDate, days: i64) -> NaiveDate {
    u64::try_from(days)
        .ok()
        .and_then(|days| as_of.checked_sub_days(Days::new(days)))
        .unwrap_or(NaiveDate::MIN)
}

/// January 1 of the year `years` before `as_of`.
pub fn lookback_start(as_of: NaiveDate, years: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(as_of.year() - years, 1, 1).unwrap_or(NaiveDate::MIN)
}
