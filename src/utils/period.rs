use chrono::{Datelike, NaiveDate, Weekday};
use serde::Deserialize;
use utoipa::IntoParams;

/// Calendar month as a half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthRange {
    pub month: u32,
    pub year: i32,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl MonthRange {
    pub fn new(month: u32, year: i32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let end = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(Self {
            month,
            year,
            start,
            end,
        })
    }

    pub fn containing(date: NaiveDate) -> Self {
        let start = date.with_day(1).unwrap_or(date);
        let end = start
            .checked_add_months(chrono::Months::new(1))
            .unwrap_or(start);
        Self {
            month: date.month(),
            year: date.year(),
            start,
            end,
        }
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d < end)
    }
}

/// Monday to Friday; there is no holiday calendar.
pub fn is_working_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// `?month=&year=` query shared by attendance, reports and payslips.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct MonthQuery {
    /// 1-12, defaults to the current month
    pub month: Option<u32>,
    /// defaults to the current year
    pub year: Option<i32>,
}

impl MonthQuery {
    /// Resolves missing parts against `today`; `None` when the month is out of range.
    pub fn resolve(&self, today: NaiveDate) -> Option<MonthRange> {
        MonthRange::new(
            self.month.unwrap_or(today.month()),
            self.year.unwrap_or(today.year()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn december_rolls_into_next_year() {
        let dec = MonthRange::new(12, 2025).unwrap();
        assert_eq!(dec.start, d(2025, 12, 1));
        assert_eq!(dec.end, d(2026, 1, 1));
        assert_eq!(dec.days().count(), 31);
    }

    #[test]
    fn leap_february() {
        assert_eq!(MonthRange::new(2, 2028).unwrap().days().count(), 29);
    }

    #[test]
    fn invalid_month_is_none() {
        assert!(MonthRange::new(13, 2026).is_none());
        assert!(MonthRange::new(0, 2026).is_none());
    }

    #[test]
    fn bounds_are_half_open() {
        let jan = MonthRange::new(1, 2026).unwrap();
        assert_eq!(jan.days().next(), Some(d(2026, 1, 1)));
        assert_eq!(jan.days().last(), Some(d(2026, 1, 31)));
        assert_eq!(jan.end, d(2026, 2, 1));
    }

    #[test]
    fn weekends_are_not_working_days() {
        // 2026-02-06 is a Friday
        assert!(is_working_day(d(2026, 2, 6)));
        assert!(!is_working_day(d(2026, 2, 7)));
        assert!(!is_working_day(d(2026, 2, 8)));
        assert!(is_working_day(d(2026, 2, 9)));
    }

    #[test]
    fn query_defaults_to_today() {
        let today = d(2026, 10, 16);
        let q = MonthQuery::default();
        assert_eq!(q.resolve(today), MonthRange::new(10, 2026));
        assert_eq!(MonthRange::containing(today), MonthRange::new(10, 2026).unwrap());

        let q = MonthQuery {
            month: Some(3),
            year: None,
        };
        assert_eq!(q.resolve(today).unwrap().start, d(2026, 3, 1));
    }
}
