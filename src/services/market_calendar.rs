use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

/// Source of the current local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

const FRIDAY_CLOSE: (u32, u32) = (16, 0);
const MONDAY_OPEN: (u32, u32) = (9, 30);

fn at(hm: (u32, u32)) -> NaiveTime {
    NaiveTime::from_hms_opt(hm.0, hm.1, 0).unwrap_or(NaiveTime::MIN)
}

/// Whether a refresh is worth running at `now` (local time).
///
/// Closed over the weekend gap, from Friday 16:00 to Monday 09:30; open at any
/// other time. No holidays, no time zones.
pub fn is_market_open(now: NaiveDateTime) -> bool {
    let time = now.time();
    match now.weekday() {
        Weekday::Sat | Weekday::Sun => false,
        Weekday::Fri => time <= at(FRIDAY_CLOSE),
        Weekday::Mon => time >= at(MONDAY_OPEN),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-06-03 is a Monday
    fn dt(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_weekend_is_closed() {
        for hour in [0, 9, 12, 16, 23] {
            assert!(!is_market_open(dt(1, hour, 0, 0)), "Saturday {hour}:00");
            assert!(!is_market_open(dt(2, hour, 0, 0)), "Sunday {hour}:00");
        }
    }

    #[test]
    fn test_friday_after_close() {
        assert!(is_market_open(dt(7, 15, 59, 59)));
        assert!(is_market_open(dt(7, 16, 0, 0)));
        assert!(!is_market_open(dt(7, 16, 0, 1)));
        assert!(!is_market_open(dt(7, 23, 59, 0)));
    }

    #[test]
    fn test_monday_before_open() {
        assert!(!is_market_open(dt(3, 0, 0, 0)));
        assert!(!is_market_open(dt(3, 9, 29, 59)));
        assert!(is_market_open(dt(3, 9, 30, 0)));
        assert!(is_market_open(dt(3, 20, 0, 0)));
    }

    #[test]
    fn test_midweek_is_open_all_day() {
        for day in [4, 5, 6] {
            assert!(is_market_open(dt(day, 0, 0, 0)));
            assert!(is_market_open(dt(day, 23, 59, 59)));
        }
        assert!(is_market_open(dt(7, 8, 0, 0)));
    }

    #[test]
    fn test_fixed_clock_today() {
        let clock = FixedClock(dt(5, 10, 0, 0));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 6, 5).unwrap());
    }
}
