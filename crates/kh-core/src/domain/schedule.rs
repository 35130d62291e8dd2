use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// A per-(agent, weekday) allow window. Overnight windows (`start > end`)
/// wrap into the following day (§3, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub agent_id: i64,
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub timezone: chrono_tz::Tz,
    pub active: bool,
}

impl Schedule {
    fn is_overnight(&self) -> bool {
        self.start_time > self.end_time
    }

    /// Whether `time_of_day` falls inside this row's window, given that
    /// `time_of_day` occurs on this row's own weekday.
    fn matches_same_day(&self, time_of_day: NaiveTime) -> bool {
        if !self.is_overnight() {
            self.start_time <= time_of_day && time_of_day < self.end_time
        } else {
            time_of_day >= self.start_time || time_of_day < self.end_time
        }
    }

    /// Whether this row (assumed to describe *yesterday*) still covers
    /// `time_of_day` today because its overnight window wrapped past
    /// midnight.
    fn matches_wrapped_from_yesterday(&self, time_of_day: NaiveTime) -> bool {
        self.is_overnight() && time_of_day < self.end_time
    }
}

/// Evaluate a full set of schedule rows for one agent against `now` (UTC).
/// Converts `now` into the agent's own timezone before comparing (§4.8 step
/// 1) — not a schedule row's timezone, which may differ from the agent's.
pub fn agent_schedule_permits(schedules: &[Schedule], now: DateTime<Utc>, agent_timezone: chrono_tz::Tz) -> bool {
    if schedules.is_empty() {
        return false;
    }
    let local = now.with_timezone(&agent_timezone);
    let today = local.weekday();
    let yesterday = today.pred();
    let time_of_day = local.time();

    let today_match = schedules
        .iter()
        .any(|s| s.active && s.weekday == today && s.matches_same_day(time_of_day));
    if today_match {
        return true;
    }

    schedules
        .iter()
        .any(|s| s.active && s.weekday == yesterday && s.matches_wrapped_from_yesterday(time_of_day))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schedule(weekday: Weekday, start: &str, end: &str, active: bool) -> Schedule {
        Schedule {
            agent_id: 1,
            weekday,
            start_time: NaiveTime::parse_from_str(start, "%H:%M").unwrap(),
            end_time: NaiveTime::parse_from_str(end, "%H:%M").unwrap(),
            timezone: chrono_tz::UTC,
            active,
        }
    }

    #[test]
    fn normal_window_matches_within_bounds() {
        let schedules = vec![schedule(Weekday::Mon, "09:00", "17:00", true)];
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(); // Monday
        assert!(agent_schedule_permits(&schedules, now, chrono_tz::UTC));
    }

    #[test]
    fn normal_window_excludes_outside_bounds() {
        let schedules = vec![schedule(Weekday::Mon, "09:00", "17:00", true)];
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap();
        assert!(!agent_schedule_permits(&schedules, now, chrono_tz::UTC));
    }

    #[test]
    fn overnight_window_matches_late_on_start_day() {
        let schedules = vec![schedule(Weekday::Fri, "22:00", "06:00", true)];
        let now = Utc.with_ymd_and_hms(2024, 1, 5, 23, 0, 0).unwrap(); // Friday
        assert!(agent_schedule_permits(&schedules, now, chrono_tz::UTC));
    }

    #[test]
    fn overnight_window_matches_early_on_following_day() {
        let schedules = vec![schedule(Weekday::Fri, "22:00", "06:00", true)];
        let now = Utc.with_ymd_and_hms(2024, 1, 6, 3, 0, 0).unwrap(); // Saturday
        assert!(agent_schedule_permits(&schedules, now, chrono_tz::UTC));
    }

    #[test]
    fn inactive_row_never_matches() {
        let schedules = vec![schedule(Weekday::Mon, "00:00", "23:59", false)];
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert!(!agent_schedule_permits(&schedules, now, chrono_tz::UTC));
    }

    #[test]
    fn uses_agents_timezone_not_a_schedule_rows_timezone() {
        // Row carries UTC but the agent is in UTC+9 (e.g. Asia/Tokyo); at
        // 2024-01-01T16:00 UTC it's already 2024-01-02 01:00 in Tokyo, which
        // falls outside a 09:00-17:00 Monday window evaluated against Tokyo
        // time even though the row's own (irrelevant) timezone is UTC.
        let schedules = vec![schedule(Weekday::Mon, "09:00", "17:00", true)];
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 16, 0, 0).unwrap(); // Monday 16:00 UTC
        assert!(agent_schedule_permits(&schedules, now, chrono_tz::UTC));
        assert!(!agent_schedule_permits(&schedules, now, chrono_tz::Asia::Tokyo));
    }
}
