//! Time windows over events.
//!
//! Three overlapping subsets relative to a reference instant `now`:
//!
//! - **now**: start instant within `[now, now + 24h]`
//! - **today**: start date within `[date(now), date(now) + 7 days]`, compared
//!   at calendar-day granularity in `now`'s time zone. Despite the name this
//!   is a week-ahead window, and callers label it as such.
//! - **weekend**: like today, restricted to Friday, Saturday and Sunday. This
//!   bucket was historically called "tomorrow".
//!
//! Events with no start, or a start that does not parse, are in no window.
//! `now` is always passed in; nothing here reads the clock.

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{ClusterConfig, Event};

/// Days counted as the weekend.
pub const WEEKEND_DAYS: [Weekday; 3] = [Weekday::Fri, Weekday::Sat, Weekday::Sun];

/// Events split into the three time windows. The subsets may overlap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeWindows {
    pub now: Vec<Event>,
    pub today: Vec<Event>,
    pub weekend: Vec<Event>,
}

impl TimeWindows {
    /// True when every window is empty.
    pub fn is_empty(&self) -> bool {
        self.now.is_empty() && self.today.is_empty() && self.weekend.is_empty()
    }
}

/// Parse an event timestamp into `tz`.
///
/// Accepts RFC 3339 (`2024-05-15T20:00:00Z`, `...+02:00`), Postgres text
/// output (`2024-05-15 20:00:00+00`), naive date-times (read as local time in
/// `tz`) and bare dates (read as UTC midnight).
pub fn parse_timestamp<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(tz));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(tz));
        }
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return tz.from_local_datetime(&naive).earliest();
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some(Utc.from_utc_datetime(&midnight).with_timezone(tz));
    }

    None
}

/// Split events into the now/today/weekend windows relative to `now`.
///
/// Calendar days are taken in `now`'s time zone, which is the device's local
/// zone when called from the app. Input order is preserved in every window.
pub fn partition<Tz: TimeZone>(events: &[Event], now: &DateTime<Tz>, config: &ClusterConfig) -> TimeWindows {
    let mut windows = TimeWindows::default();
    if events.is_empty() {
        return windows;
    }

    let tz = now.timezone();
    // None when the window runs past chrono's representable range
    let now_end = now
        .clone()
        .checked_add_signed(Duration::hours(i64::from(config.now_window_hours)));
    let first_day = now.date_naive();
    let last_day = first_day
        .checked_add_days(Days::new(u64::from(config.lookahead_days)))
        .unwrap_or(NaiveDate::MAX);

    let mut unscheduled = 0usize;

    for event in events {
        let Some(start) = event
            .start_datetime
            .as_deref()
            .and_then(|raw| parse_timestamp(raw, &tz))
        else {
            unscheduled += 1;
            continue;
        };

        if start >= *now && now_end.as_ref().map_or(true, |end| start <= *end) {
            windows.now.push(event.clone());
        }

        let start_day = start.date_naive();
        if start_day >= first_day && start_day <= last_day {
            windows.today.push(event.clone());
            if WEEKEND_DAYS.contains(&start_day.weekday()) {
                windows.weekend.push(event.clone());
            }
        }
    }

    if unscheduled > 0 {
        debug!(
            "[Temporal] {} of {} events have no usable start and are in no window",
            unscheduled,
            events.len()
        );
    }

    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GeoPoint;
    use chrono::FixedOffset;

    /// Wednesday 2024-05-15 10:00 UTC
    fn now_utc() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 10, 0, 0).unwrap()
    }

    fn event_at(id: &str, start: Option<String>) -> Event {
        let event = Event::new(id, GeoPoint::new(40.0, -74.0));
        match start {
            Some(s) => event.with_start(s),
            None => event,
        }
    }

    fn ids(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let utc = Utc;
        let expected = Utc.with_ymd_and_hms(2024, 5, 15, 20, 0, 0).unwrap();

        assert_eq!(parse_timestamp("2024-05-15T20:00:00Z", &utc), Some(expected));
        assert_eq!(parse_timestamp("2024-05-15T22:00:00+02:00", &utc), Some(expected));
        assert_eq!(parse_timestamp("2024-05-15T20:00:00.000Z", &utc), Some(expected));
        assert_eq!(parse_timestamp("2024-05-15 20:00:00+00", &utc), Some(expected));
        assert_eq!(parse_timestamp("2024-05-15 20:00:00+00:00", &utc), Some(expected));
        assert_eq!(parse_timestamp("2024-05-15T20:00:00", &utc), Some(expected));
        assert_eq!(parse_timestamp("2024-05-15T20:00", &utc), Some(expected));
        assert_eq!(
            parse_timestamp("2024-05-15", &utc),
            Some(Utc.with_ymd_and_hms(2024, 5, 15, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_naive_uses_given_zone() {
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let parsed = parse_timestamp("2024-05-15T20:00:00", &tz).unwrap();
        assert_eq!(
            parsed.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2024, 5, 16, 1, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert_eq!(parse_timestamp("", &Utc), None);
        assert_eq!(parse_timestamp("   ", &Utc), None);
        assert_eq!(parse_timestamp("next friday", &Utc), None);
        assert_eq!(parse_timestamp("2024-13-45T99:00:00Z", &Utc), None);
    }

    #[test]
    fn test_soon_event_is_in_now_and_today() {
        let now = now_utc();
        let soon = event_at("soon", Some((now + Duration::hours(10)).to_rfc3339()));
        let later = event_at("later", Some((now + Duration::days(10)).to_rfc3339()));

        let windows = partition(&[soon, later], &now, &ClusterConfig::default());
        assert_eq!(ids(&windows.now), vec!["soon"]);
        assert_eq!(ids(&windows.today), vec!["soon"]);
        assert!(windows.weekend.is_empty());
    }

    #[test]
    fn test_now_window_bounds_are_inclusive() {
        let now = now_utc();
        let events = vec![
            event_at("at-now", Some(now.to_rfc3339())),
            event_at("at-24h", Some((now + Duration::hours(24)).to_rfc3339())),
            event_at("past-24h", Some((now + Duration::hours(24) + Duration::seconds(1)).to_rfc3339())),
            event_at("started", Some((now - Duration::minutes(1)).to_rfc3339())),
        ];
        let windows = partition(&events, &now, &ClusterConfig::default());
        assert_eq!(ids(&windows.now), vec!["at-now", "at-24h"]);
    }

    #[test]
    fn test_today_window_compares_calendar_days() {
        let now = now_utc();
        let events = vec![
            // Earlier today still counts at day granularity
            event_at("this-morning", Some("2024-05-15T01:00:00Z".to_string())),
            event_at("yesterday", Some("2024-05-14T23:59:00Z".to_string())),
            event_at("day-7", Some("2024-05-22T23:00:00Z".to_string())),
            event_at("day-8", Some("2024-05-23T00:30:00Z".to_string())),
        ];
        let windows = partition(&events, &now, &ClusterConfig::default());
        assert_eq!(ids(&windows.today), vec!["this-morning", "day-7"]);
        assert!(windows.now.is_empty());
    }

    #[test]
    fn test_weekend_filter() {
        let now = now_utc();
        let events = vec![
            event_at("friday", Some("2024-05-17T19:00:00Z".to_string())),
            event_at("saturday", Some("2024-05-18T12:00:00Z".to_string())),
            event_at("sunday", Some("2024-05-19T12:00:00Z".to_string())),
            event_at("tuesday", Some("2024-05-21T12:00:00Z".to_string())),
            event_at("next-saturday", Some("2024-05-25T12:00:00Z".to_string())),
        ];
        let windows = partition(&events, &now, &ClusterConfig::default());
        assert_eq!(ids(&windows.weekend), vec!["friday", "saturday", "sunday"]);
        assert_eq!(
            ids(&windows.today),
            vec!["friday", "saturday", "sunday", "tuesday"]
        );
    }

    #[test]
    fn test_weekday_uses_local_date() {
        // Monday 02:00 UTC is Sunday 21:00 at UTC-5
        let monday_utc = event_at("late-sunday", Some("2024-05-20T02:00:00Z".to_string()));

        let windows = partition(std::slice::from_ref(&monday_utc), &now_utc(), &ClusterConfig::default());
        assert!(windows.weekend.is_empty());

        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let now_local = now_utc().with_timezone(&tz);
        let windows = partition(&[monday_utc], &now_local, &ClusterConfig::default());
        assert_eq!(ids(&windows.weekend), vec!["late-sunday"]);
    }

    #[test]
    fn test_unscheduled_events_are_in_no_window() {
        let now = now_utc();
        let events = vec![
            event_at("none", None),
            event_at("garbage", Some("soon".to_string())),
        ];
        let windows = partition(&events, &now, &ClusterConfig::default());
        assert!(windows.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let windows = partition(&[], &now_utc(), &ClusterConfig::default());
        assert_eq!(windows, TimeWindows::default());
    }

    #[test]
    fn test_oversized_windows_saturate() {
        let now = now_utc();
        let config = ClusterConfig {
            now_window_hours: u32::MAX,
            lookahead_days: u32::MAX,
            ..ClusterConfig::default()
        };
        let events = vec![
            event_at("next-year", Some((now + Duration::days(365)).to_rfc3339())),
            event_at("past", Some((now - Duration::hours(1)).to_rfc3339())),
        ];
        let windows = partition(&events, &now, &config);
        assert_eq!(ids(&windows.now), vec!["next-year"]);
        assert_eq!(ids(&windows.today), vec!["next-year"]);
    }

    #[test]
    fn test_window_lengths_follow_config() {
        let now = now_utc();
        let config = ClusterConfig {
            now_window_hours: 2,
            lookahead_days: 1,
            ..ClusterConfig::default()
        };
        let events = vec![
            event_at("in-1h", Some((now + Duration::hours(1)).to_rfc3339())),
            event_at("in-3h", Some((now + Duration::hours(3)).to_rfc3339())),
            event_at("in-2d", Some((now + Duration::days(2)).to_rfc3339())),
        ];
        let windows = partition(&events, &now, &config);
        assert_eq!(ids(&windows.now), vec!["in-1h"]);
        assert_eq!(ids(&windows.today), vec!["in-1h", "in-3h"]);
    }
}
