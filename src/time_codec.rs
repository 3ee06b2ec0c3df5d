use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_DAY: i64 = 24 * 3600;

/// Hour (local wall clock) before which a date falls into overnight service.
pub const OVERNIGHT_END_HOUR: u32 = 5;

/// Service class a calendar instant belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceClass {
    Weekday,
    Weekend,
    Overnight,
}

/// A value to render as a 12-hour clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockValue {
    /// Seconds since local midnight. GTFS times past 24:00:00 wrap onto the next day.
    SinceMidnight(i64),
    /// Unix epoch seconds, rendered in the caller's timezone.
    Epoch(i64),
}

/// Parse "H:MM:SS" or "H:MM" into seconds since midnight.
///
/// Lenient: a missing seconds component counts as zero and any component
/// without leading digits counts as zero. Never fails.
pub fn parse_clock_to_seconds(s: &str) -> i64 {
    let mut parts = s.split(':');
    let mut component = || {
        let raw = parts.next().unwrap_or("");
        let (value, clean) = leading_number(raw);
        if !clean {
            tracing::warn!(input = s, component = raw, "Malformed clock component, using leading digits");
        }
        value
    };

    let hours = component();
    let minutes = component();
    let seconds = component();
    hours
        .saturating_mul(3600)
        .saturating_add(minutes.saturating_mul(60))
        .saturating_add(seconds)
}

/// Leading decimal digits of `raw` (after trimming). The flag is false when
/// anything other than digits was present, an empty component is clean.
fn leading_number(raw: &str) -> (i64, bool) {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    let value = digits.parse::<i64>().unwrap_or(0);
    (value, digits.len() == trimmed.len())
}

/// Render a clock value as "h:mm AM".
pub fn seconds_to_clock_12h<Tz: TimeZone>(value: ClockValue, tz: &Tz) -> String {
    let (hour, minute) = match value {
        ClockValue::SinceMidnight(seconds) => {
            let seconds = seconds.rem_euclid(SECONDS_PER_DAY);
            ((seconds / 3600) as u32, ((seconds % 3600) / 60) as u32)
        }
        ClockValue::Epoch(epoch) => match tz.timestamp_opt(epoch, 0).single() {
            Some(dt) => (dt.hour(), dt.minute()),
            None => {
                tracing::warn!(epoch, "Epoch out of range for display");
                return "Invalid time".to_string();
            }
        },
    };

    let meridiem = if hour >= 12 { "PM" } else { "AM" };
    let display_hour = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{}:{:02} {}", display_hour, minute, meridiem)
}

/// Seconds elapsed since local midnight.
pub fn seconds_since_midnight(dt: &NaiveDateTime) -> i64 {
    i64::from(dt.num_seconds_from_midnight())
}

/// Service class for a local wall-clock instant, using the default overnight cutoff.
pub fn service_day_for(dt: &NaiveDateTime) -> ServiceClass {
    service_day_with_cutoff(dt, OVERNIGHT_END_HOUR)
}

/// The overnight rule dominates: a Tuesday at 02:00 is overnight service, not weekday.
pub fn service_day_with_cutoff(dt: &NaiveDateTime, overnight_end_hour: u32) -> ServiceClass {
    if dt.hour() < overnight_end_hour {
        return ServiceClass::Overnight;
    }

    match dt.weekday() {
        Weekday::Sat | Weekday::Sun => ServiceClass::Weekend,
        _ => ServiceClass::Weekday,
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// "Today", "Tomorrow", or the weekday name of `date` for later offsets
pub fn day_label(day_offset: i64, date: NaiveDate) -> String {
    match day_offset {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        _ => weekday_name(date.weekday()).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn parses_full_and_short_clock_strings() {
        assert_eq!(parse_clock_to_seconds("13:05:00"), 13 * 3600 + 5 * 60);
        assert_eq!(parse_clock_to_seconds("7:30"), 7 * 3600 + 30 * 60);
        assert_eq!(parse_clock_to_seconds("25:10:30"), 25 * 3600 + 10 * 60 + 30);
    }

    #[test]
    fn malformed_components_degrade_to_zero() {
        assert_eq!(parse_clock_to_seconds(""), 0);
        assert_eq!(parse_clock_to_seconds("ab:cd"), 0);
        assert_eq!(parse_clock_to_seconds("08:xx:15"), 8 * 3600 + 15);
        assert_eq!(parse_clock_to_seconds("9am"), 9 * 3600);
    }

    #[test]
    fn oversized_components_saturate() {
        assert_eq!(parse_clock_to_seconds("99999999999999999:00:00"), i64::MAX);
        assert_eq!(parse_clock_to_seconds("1:99999999999999999999"), 3600);
        assert_eq!(
            seconds_to_clock_12h(ClockValue::SinceMidnight(i64::MAX), &Utc),
            seconds_to_clock_12h(ClockValue::SinceMidnight(i64::MAX % SECONDS_PER_DAY), &Utc)
        );
    }

    #[test]
    fn twelve_hour_display_handles_boundaries() {
        let fmt = |h: i64| seconds_to_clock_12h(ClockValue::SinceMidnight(h * 3600), &Utc);
        assert_eq!(fmt(0), "12:00 AM");
        assert_eq!(fmt(12), "12:00 PM");
        assert_eq!(fmt(23), "11:00 PM");
        assert_eq!(
            seconds_to_clock_12h(ClockValue::SinceMidnight(6 * 3600 + 5 * 60), &Utc),
            "6:05 AM"
        );
    }

    #[test]
    fn past_midnight_gtfs_times_wrap() {
        let display = seconds_to_clock_12h(ClockValue::SinceMidnight(25 * 3600 + 10 * 60), &Utc);
        assert_eq!(display, "1:10 AM");
    }

    #[test]
    fn epoch_display_uses_timezone() {
        // 2024-03-05 14:07:00 UTC
        let epoch = at(2024, 3, 5, 14, 7).and_utc().timestamp();
        assert_eq!(seconds_to_clock_12h(ClockValue::Epoch(epoch), &Utc), "2:07 PM");
    }

    #[test]
    fn overnight_rule_dominates_weekday() {
        // 2024-03-05 is a Tuesday, 2024-03-09 a Saturday
        assert_eq!(service_day_for(&at(2024, 3, 5, 3, 0)), ServiceClass::Overnight);
        assert_eq!(service_day_for(&at(2024, 3, 5, 9, 0)), ServiceClass::Weekday);
        assert_eq!(service_day_for(&at(2024, 3, 9, 9, 0)), ServiceClass::Weekend);
        assert_eq!(service_day_for(&at(2024, 3, 9, 2, 0)), ServiceClass::Overnight);
        assert_eq!(service_day_for(&at(2024, 3, 10, 5, 0)), ServiceClass::Weekend);
    }

    #[test]
    fn day_labels() {
        let sunday = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert_eq!(day_label(0, sunday), "Today");
        assert_eq!(day_label(1, sunday), "Tomorrow");
        assert_eq!(day_label(4, sunday), "Sunday");
    }
}
