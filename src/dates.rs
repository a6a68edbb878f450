use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

pub const EXPORT_TIME_FORMAT: &str = "%Y%m%d %H%M%S";
pub const DEFAULT_REPORT_NAME: &str = "matching_report.csv";
const DAY_START_HOURS: i64 = 7;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%Y%m%d%H%M%S",
    "%Y%m%d %H%M",
    "%Y%m%d %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
    "%b %d %Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%Y%m%d", "%d-%b-%Y", "%b %d %Y"];

pub fn parse_export_time(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), EXPORT_TIME_FORMAT).ok()
}

/// Free-form fallback: RFC 3339 (offset dropped, wall clock kept), then a list of common layouts.
pub fn parse_free_form(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() { return None; }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) { return Some(dt.naive_local()); }
    for f in DATETIME_FORMATS { if let Ok(dt) = NaiveDateTime::parse_from_str(s, f) { return Some(dt); } }
    for f in DATE_FORMATS { if let Ok(d) = NaiveDate::parse_from_str(s, f) { return d.and_hms_opt(0, 0, 0); } }
    None
}

/// Strict export layout first, free-form second.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    parse_export_time(s).or_else(|| parse_free_form(s))
}

/// The operational day starts at 07:00, so earlier timestamps belong to the previous date.
pub fn business_date(ts: NaiveDateTime) -> NaiveDate {
    (ts - Duration::hours(DAY_START_HOURS)).date()
}

pub fn business_date_of(s: &str) -> Option<NaiveDate> { parse_timestamp(s).map(business_date) }

/// Most frequent business date; ties go to the earliest date.
pub fn mode_business_date<'a, I: IntoIterator<Item = &'a str>>(times: I) -> Option<NaiveDate> {
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for t in times { if let Some(d) = business_date_of(t) { *counts.entry(d).or_insert(0) += 1; } }
    let max = counts.values().copied().max()?;
    counts.into_iter().find(|(_, c)| *c == max).map(|(d, _)| d)
}

pub fn report_filename<'a, I: IntoIterator<Item = &'a str>>(times: I) -> String {
    match mode_business_date(times) {
        Some(d) => format!("matching_report_{}.csv", d.format("%m%d")),
        None => DEFAULT_REPORT_NAME.to_string(),
    }
}

pub fn date_label(d: NaiveDate) -> String { d.format("%b %d").to_string() }

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, day).unwrap() }

    #[test]
    fn business_day_boundary_is_seven_am() {
        assert_eq!(business_date_of("20240102 065959"), Some(d(2024, 1, 1)));
        assert_eq!(business_date_of("20240102 070000"), Some(d(2024, 1, 2)));
    }

    #[test]
    fn free_form_fallback() {
        assert_eq!(business_date_of("2024-03-05 12:00:00"), Some(d(2024, 3, 5)));
        assert_eq!(business_date_of("2024/03/05 06:30"), Some(d(2024, 3, 4)));
        assert_eq!(business_date_of("2024-03-05T08:00:00+09:00"), Some(d(2024, 3, 5)));
        assert_eq!(business_date_of("2024-03-05"), Some(d(2024, 3, 4)));
        assert_eq!(business_date_of("not a date"), None);
        assert_eq!(business_date_of(""), None);
    }

    #[test]
    fn strict_format_is_preferred() {
        let ts = parse_timestamp(" 20240101 080000 ").unwrap();
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-01 08:00:00");
    }

    #[test]
    fn report_name_uses_most_frequent_business_date() {
        let times = ["20240301 080000", "20240302 010000", "20240302 090000", "garbage"];
        // 0302 01:00 belongs to 0301, so 0301 appears twice.
        assert_eq!(report_filename(times.iter().copied()), "matching_report_0301.csv");
    }

    #[test]
    fn report_name_ties_pick_earliest_and_fallback_applies() {
        let times = ["20240305 080000", "20240304 080000"];
        assert_eq!(report_filename(times.iter().copied()), "matching_report_0304.csv");
        assert_eq!(report_filename(["N/A", ""].iter().copied()), DEFAULT_REPORT_NAME);
    }

    #[test]
    fn labels_look_like_short_month_day() {
        assert_eq!(date_label(d(2024, 1, 9)), "Jan 09");
    }
}
