//! Day, week and month bucketing for the appointment calendar.
//!
//! Weeks start on Sunday. A month view is always 42 cells (six weeks) starting from the
//! Sunday on or before the first of the month, so leading and trailing days of the adjacent
//! months fill the grid. All bucketing uses the UTC calendar day of each item.

use crate::appointments::AppointmentWithPatient;
use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, Utc};
use serde::Serialize;

/// Number of cells in a month grid.
pub const MONTH_GRID_CELLS: usize = 42;

/// Anything that can be placed on the calendar.
pub trait Dated {
    fn date(&self) -> DateTime<Utc>;
}

/// One day of a week view.
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
#[aliases(AppointmentDayCell = DayCell<AppointmentWithPatient>)]
pub struct DayCell<T> {
    pub date: NaiveDate,
    pub items: Vec<T>,
}

/// One cell of a month grid.
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
#[aliases(AppointmentMonthCell = MonthCell<AppointmentWithPatient>)]
pub struct MonthCell<T> {
    pub date: NaiveDate,
    pub in_current_month: bool,
    pub items: Vec<T>,
}

/// The Sunday on or before `day`, or `None` before the earliest representable date.
pub fn week_start(day: NaiveDate) -> Option<NaiveDate> {
    day.checked_sub_days(Days::new(u64::from(day.weekday().num_days_from_sunday())))
}

/// First and last day (Sunday to Saturday, inclusive) of the week containing `anchor`.
pub fn week_range(anchor: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let start = week_start(anchor)?;
    Some((start, start.checked_add_days(Days::new(6))?))
}

/// Moves `anchor` by `days` days (negative goes back).
///
/// Returns `None` when the result would leave chrono's supported range.
pub fn shift_day(anchor: NaiveDate, days: i64) -> Option<NaiveDate> {
    let delta = Days::new(days.unsigned_abs());
    if days >= 0 {
        anchor.checked_add_days(delta)
    } else {
        anchor.checked_sub_days(delta)
    }
}

/// Moves `anchor` by `weeks` whole weeks (negative goes back).
///
/// Returns `None` when the result would leave chrono's supported range.
pub fn shift_week(anchor: NaiveDate, weeks: i64) -> Option<NaiveDate> {
    let days = i64::try_from(weeks.unsigned_abs().checked_mul(7)?).ok()?;
    shift_day(anchor, if weeks >= 0 { days } else { -days })
}

/// First day of the month `months` away from the month containing `anchor`.
///
/// Returns `None` only when the result would leave chrono's supported range.
pub fn shift_month(anchor: NaiveDate, months: i32) -> Option<NaiveDate> {
    let first = anchor.with_day(1)?;
    let delta = Months::new(months.unsigned_abs());
    if months >= 0 {
        first.checked_add_months(delta)
    } else {
        first.checked_sub_months(delta)
    }
}

/// Items whose UTC day is `day`, earliest first.
pub fn appointments_for_day<T: Dated + Clone>(day: NaiveDate, items: &[T]) -> Vec<T> {
    let mut found: Vec<T> = items
        .iter()
        .filter(|item| item.date().date_naive() == day)
        .cloned()
        .collect();
    found.sort_by_key(Dated::date);
    found
}

/// Seven day cells from the Sunday on or before `anchor`.
///
/// Empty when that week runs past either end of the supported date range.
pub fn week_view<T: Dated + Clone>(anchor: NaiveDate, items: &[T]) -> Vec<DayCell<T>> {
    let Some((start, _)) = week_range(anchor) else {
        return Vec::new();
    };
    (0..7)
        .map(|offset| {
            let date = start + Duration::days(offset);
            DayCell {
                date,
                items: appointments_for_day(date, items),
            }
        })
        .collect()
}

/// The 42-cell grid for the month containing `month_anchor`.
///
/// Empty when the grid runs past either end of the supported date range.
pub fn month_view<T: Dated + Clone>(month_anchor: NaiveDate, items: &[T]) -> Vec<MonthCell<T>> {
    let Some((grid_start, _)) = month_grid_range(month_anchor) else {
        return Vec::new();
    };
    (0..MONTH_GRID_CELLS as i64)
        .map(|offset| {
            let date = grid_start + Duration::days(offset);
            MonthCell {
                date,
                in_current_month: date.month() == month_anchor.month()
                    && date.year() == month_anchor.year(),
                items: appointments_for_day(date, items),
            }
        })
        .collect()
}

/// First and last day (inclusive) covered by the month grid for `month_anchor`.
pub fn month_grid_range(month_anchor: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let start = week_start(month_anchor.with_day(1)?)?;
    let end = start.checked_add_days(Days::new(MONTH_GRID_CELLS as u64 - 1))?;
    Some((start, end))
}

/// Start of `day` in UTC.
pub fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(chrono::NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Weekday};

    #[derive(Debug, Clone, PartialEq)]
    struct Slot(DateTime<Utc>);

    impl Dated for Slot {
        fn date(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn slot(y: i32, m: u32, d: u32, h: u32) -> Slot {
        Slot(Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap())
    }

    #[test]
    fn test_week_starts_on_sunday() {
        // 2024-03-06 is a Wednesday.
        assert_eq!(week_start(day(2024, 3, 6)), Some(day(2024, 3, 3)));
        assert_eq!(week_start(day(2024, 3, 3)), Some(day(2024, 3, 3)));
        assert_eq!(week_start(day(2024, 3, 9)), Some(day(2024, 3, 3)));
        assert_eq!(week_range(day(2024, 3, 6)), Some((day(2024, 3, 3), day(2024, 3, 9))));
    }

    #[test]
    fn test_week_view_buckets_by_day() {
        let items = vec![
            slot(2024, 3, 6, 15),
            slot(2024, 3, 6, 9),
            slot(2024, 3, 9, 23),
            slot(2024, 3, 10, 0),
        ];
        let week = week_view(day(2024, 3, 6), &items);

        assert_eq!(week.len(), 7);
        assert_eq!(week[0].date.weekday(), Weekday::Sun);
        assert_eq!(week[3].items, vec![slot(2024, 3, 6, 9), slot(2024, 3, 6, 15)]);
        assert_eq!(week[6].items, vec![slot(2024, 3, 9, 23)]);
        let total: usize = week.iter().map(|c| c.items.len()).sum();
        assert_eq!(total, 3, "Sunday 10th belongs to the next week");
    }

    #[test]
    fn test_month_view_has_42_cells_from_sunday() {
        // March 2024 starts on a Friday, so the grid starts on Sunday 25 February.
        let items = vec![slot(2024, 2, 26, 10), slot(2024, 3, 31, 10), slot(2024, 4, 6, 10)];
        let grid = month_view(day(2024, 3, 15), &items);

        assert_eq!(grid.len(), MONTH_GRID_CELLS);
        assert_eq!(grid[0].date, day(2024, 2, 25));
        assert!(!grid[0].in_current_month);
        assert_eq!(grid[1].items.len(), 1);
        assert_eq!(grid[41].date, day(2024, 4, 6));
        assert_eq!(grid[41].items.len(), 1);

        let in_month = grid.iter().filter(|c| c.in_current_month).count();
        assert_eq!(in_month, 31);
        let march_31 = grid.iter().find(|c| c.date == day(2024, 3, 31)).unwrap();
        assert!(march_31.in_current_month);
        assert_eq!(march_31.items.len(), 1);
    }

    #[test]
    fn test_month_grid_when_month_starts_on_sunday() {
        // September 2024 starts on a Sunday.
        let (start, end) = month_grid_range(day(2024, 9, 20)).unwrap();
        assert_eq!(start, day(2024, 9, 1));
        assert_eq!(end, day(2024, 10, 12));
    }

    #[test]
    fn test_shift_week_and_month() {
        assert_eq!(shift_week(day(2024, 3, 6), 1), Some(day(2024, 3, 13)));
        assert_eq!(shift_week(day(2024, 3, 6), -1), Some(day(2024, 2, 28)));
        assert_eq!(shift_day(day(2024, 2, 28), 2), Some(day(2024, 3, 1)));
        assert_eq!(shift_day(day(2024, 3, 1), -1), Some(day(2024, 2, 29)));
        assert_eq!(shift_month(day(2024, 1, 31), 1), Some(day(2024, 2, 1)));
        assert_eq!(shift_month(day(2024, 1, 31), -1), Some(day(2023, 12, 1)));
        assert_eq!(shift_month(day(2024, 3, 15), 0), Some(day(2024, 3, 1)));
    }

    #[test]
    fn test_extreme_offsets_return_none() {
        let today = day(2024, 3, 6);
        assert_eq!(shift_day(today, i64::from(i32::MAX)), None);
        assert_eq!(shift_day(today, i64::from(i32::MIN)), None);
        assert_eq!(shift_week(today, i64::from(i32::MAX)), None);
        assert_eq!(shift_week(today, i64::MIN), None);
        assert_eq!(shift_month(today, i32::MAX), None);
    }

    #[test]
    fn test_ranges_at_the_edges_of_the_calendar() {
        // The last grid always spills into the month after the final representable one.
        assert_eq!(month_grid_range(NaiveDate::MAX), None);
        assert!(month_view::<Slot>(NaiveDate::MAX, &[]).is_empty());

        for n in 0..7 {
            for edge in [
                NaiveDate::MAX.checked_sub_days(Days::new(n)).unwrap(),
                NaiveDate::MIN.checked_add_days(Days::new(n)).unwrap(),
            ] {
                let expected = if week_range(edge).is_some() { 7 } else { 0 };
                assert_eq!(week_view::<Slot>(edge, &[]).len(), expected);
            }
        }
    }

    #[test]
    fn test_appointments_for_day_uses_utc_day() {
        let items = vec![slot(2024, 3, 6, 0), slot(2024, 3, 5, 23)];
        assert_eq!(appointments_for_day(day(2024, 3, 6), &items), vec![slot(2024, 3, 6, 0)]);
        assert_eq!(start_of_day(day(2024, 3, 6)), slot(2024, 3, 6, 0).0);
    }
}
