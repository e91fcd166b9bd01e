//! Time-range extraction
//!
//! Recognizes fixed labels (today, last week, ...) and parametric forms
//! (last N days, N weeks ago, in March, on 2025-10-01) and produces UTC
//! day boundaries. Weeks are ISO weeks, Monday through Sunday, so the
//! results are locale-independent.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// A resolved time window with the label that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub label: String,
}

/// Extract the first recognized time expression from a query.
///
/// `now` is injected for determinism; production callers pass
/// `Utc::now()`.
pub fn extract_time_range(query: &str, now: DateTime<Utc>) -> Option<TimeRange> {
    let lower = query.to_lowercase();
    let today = now.date_naive();

    // Fixed labels first; ordered so that "last week" wins over "week"
    if lower.contains("yesterday") {
        let day = today - Duration::days(1);
        return Some(day_range(day, day, "yesterday"));
    }
    if lower.contains("today") {
        return Some(day_range(today, today, "today"));
    }
    if lower.contains("last week") {
        let monday = week_start(today) - Duration::days(7);
        return Some(day_range(monday, monday + Duration::days(6), "last week"));
    }
    if lower.contains("this week") {
        let monday = week_start(today);
        return Some(day_range(monday, monday + Duration::days(6), "this week"));
    }
    if lower.contains("last month") {
        let (year, month) = previous_month(today.year(), today.month());
        return Some(month_range(year, month, "last month"));
    }
    if lower.contains("this month") {
        return Some(month_range(today.year(), today.month(), "this month"));
    }
    if lower.contains("last year") {
        return Some(year_range(today.year() - 1, "last year"));
    }
    if lower.contains("this year") {
        return Some(year_range(today.year(), "this year"));
    }

    // last N days/weeks/months
    let last_n = Regex::new(r"last (\d+) (day|week|month)s?").expect("static pattern");
    if let Some(caps) = last_n.captures(&lower) {
        let n: i64 = caps[1].parse().ok()?;
        let unit = &caps[2];
        let days = match unit {
            "day" => n,
            "week" => n * 7,
            "month" => n * 30,
            _ => return None,
        };
        let start = today - Duration::days(days);
        return Some(day_range(start, today, &format!("last {} {}s", n, unit)));
    }

    // N days/weeks ago
    let ago = Regex::new(r"(\d+) (day|week)s? ago").expect("static pattern");
    if let Some(caps) = ago.captures(&lower) {
        let n: i64 = caps[1].parse().ok()?;
        match &caps[2] {
            "day" => {
                let day = today - Duration::days(n);
                return Some(day_range(day, day, &format!("{} days ago", n)));
            }
            "week" => {
                // The ISO week containing that day
                let then = today - Duration::days(n * 7);
                let monday = week_start(then);
                return Some(day_range(
                    monday,
                    monday + Duration::days(6),
                    &format!("{} weeks ago", n),
                ));
            }
            _ => {}
        }
    }

    // on YYYY-MM-DD
    let on_date = Regex::new(r"on (\d{4})-(\d{2})-(\d{2})").expect("static pattern");
    if let Some(caps) = on_date.captures(&lower) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        return Some(day_range(date, date, &format!("on {}", date)));
    }

    // in <month name>; the most recent occurrence not in the future
    if let Some((month, name)) = find_month_name(&lower) {
        let year = if month <= today.month() {
            today.year()
        } else {
            today.year() - 1
        };
        return Some(month_range(year, month, &format!("in {}", name)));
    }

    None
}

/// Monday of the ISO week containing `date`
fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

fn day_range(start: NaiveDate, end: NaiveDate, label: &str) -> TimeRange {
    TimeRange {
        start: start_of_day(start),
        end: end_of_day(end),
        label: label.to_string(),
    }
}

fn month_range(year: i32, month: u32, label: &str) -> TimeRange {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, 1, 1).expect("january exists"));
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let last = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .expect("first of month exists")
        - Duration::days(1);
    day_range(first, last, label)
}

fn year_range(year: i32, label: &str) -> TimeRange {
    let first = NaiveDate::from_ymd_opt(year, 1, 1).expect("january first exists");
    let last = NaiveDate::from_ymd_opt(year, 12, 31).expect("december 31 exists");
    day_range(first, last, label)
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight exists"))
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(23, 59, 59).expect("end of day exists"))
}

const MONTHS: [(&str, u32); 12] = [
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
];

fn find_month_name(lower: &str) -> Option<(u32, String)> {
    for (name, number) in MONTHS {
        if lower.contains(&format!("in {}", name)) {
            return Some((number, name.to_string()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn fixed_now() -> DateTime<Utc> {
        // Wednesday 2025-10-15
        Utc.with_ymd_and_hms(2025, 10, 15, 14, 30, 0).unwrap()
    }

    #[test]
    fn test_today_and_yesterday() {
        let range = extract_time_range("emails from today", fixed_now()).unwrap();
        assert_eq!(range.label, "today");
        assert_eq!(range.start.to_rfc3339(), "2025-10-15T00:00:00+00:00");
        assert_eq!(range.end.to_rfc3339(), "2025-10-15T23:59:59+00:00");

        let range = extract_time_range("what happened yesterday", fixed_now()).unwrap();
        assert_eq!(range.start.to_rfc3339(), "2025-10-14T00:00:00+00:00");
    }

    #[test]
    fn test_last_week_is_iso_monday_to_sunday() {
        // 2025-10-15 is a Wednesday; its week starts Monday 2025-10-13
        let range = extract_time_range("meetings last week", fixed_now()).unwrap();
        assert_eq!(range.label, "last week");
        assert_eq!(range.start.to_rfc3339(), "2025-10-06T00:00:00+00:00");
        assert_eq!(range.end.to_rfc3339(), "2025-10-12T23:59:59+00:00");
        assert_eq!(range.start.weekday(), Weekday::Mon);
        assert_eq!(range.end.weekday(), Weekday::Sun);
    }

    #[test]
    fn test_this_week() {
        let range = extract_time_range("my plans this week", fixed_now()).unwrap();
        assert_eq!(range.start.to_rfc3339(), "2025-10-13T00:00:00+00:00");
        assert_eq!(range.end.to_rfc3339(), "2025-10-19T23:59:59+00:00");
    }

    #[test]
    fn test_last_month_boundaries() {
        let range = extract_time_range("spending last month", fixed_now()).unwrap();
        assert_eq!(range.start.to_rfc3339(), "2025-09-01T00:00:00+00:00");
        assert_eq!(range.end.to_rfc3339(), "2025-09-30T23:59:59+00:00");
    }

    #[test]
    fn test_last_month_across_year_boundary() {
        let january = Utc.with_ymd_and_hms(2026, 1, 10, 8, 0, 0).unwrap();
        let range = extract_time_range("emails last month", january).unwrap();
        assert_eq!(range.start.to_rfc3339(), "2025-12-01T00:00:00+00:00");
        assert_eq!(range.end.to_rfc3339(), "2025-12-31T23:59:59+00:00");
    }

    #[test]
    fn test_last_n_days() {
        let range = extract_time_range("activity in the last 7 days", fixed_now()).unwrap();
        assert_eq!(range.label, "last 7 days");
        assert_eq!(range.start.to_rfc3339(), "2025-10-08T00:00:00+00:00");
        assert_eq!(range.end.to_rfc3339(), "2025-10-15T23:59:59+00:00");
    }

    #[test]
    fn test_n_days_ago_is_single_day() {
        let range = extract_time_range("what arrived 3 days ago", fixed_now()).unwrap();
        assert_eq!(range.start.to_rfc3339(), "2025-10-12T00:00:00+00:00");
        assert_eq!(range.end.to_rfc3339(), "2025-10-12T23:59:59+00:00");
    }

    #[test]
    fn test_weeks_ago_resolves_to_iso_week() {
        let range = extract_time_range("2 weeks ago", fixed_now()).unwrap();
        assert_eq!(range.start.weekday(), Weekday::Mon);
        assert_eq!(range.start.to_rfc3339(), "2025-09-29T00:00:00+00:00");
        assert_eq!(range.end.to_rfc3339(), "2025-10-05T23:59:59+00:00");
    }

    #[test]
    fn test_in_month_uses_most_recent_occurrence() {
        let range = extract_time_range("emails in september", fixed_now()).unwrap();
        assert_eq!(range.start.to_rfc3339(), "2025-09-01T00:00:00+00:00");

        // December hasn't happened yet in 2025-10, so it maps to 2024
        let range = extract_time_range("emails in december", fixed_now()).unwrap();
        assert_eq!(range.start.to_rfc3339(), "2024-12-01T00:00:00+00:00");
    }

    #[test]
    fn test_on_explicit_date() {
        let range = extract_time_range("sent on 2025-10-01", fixed_now()).unwrap();
        assert_eq!(range.start.to_rfc3339(), "2025-10-01T00:00:00+00:00");
        assert_eq!(range.end.to_rfc3339(), "2025-10-01T23:59:59+00:00");
    }

    #[test]
    fn test_no_time_expression() {
        assert!(extract_time_range("budget updates from Ravi", fixed_now()).is_none());
    }
}
