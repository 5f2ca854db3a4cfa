use chrono::{Days, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Random draws allowed per requested timestamp before falling back to a sweep.
const ATTEMPTS_PER_COMMIT: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("window start {start} is after window end {end}")]
    Inverted { start: NaiveDate, end: NaiveDate },
    #[error("max commits per day must be at least 1")]
    ZeroQuota,
    #[error("invalid working hours {first}..{last} (must satisfy first <= last <= 23)")]
    Hours { first: u32, last: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub max_per_day: u32,
    pub first_hour: u32,
    pub last_hour: u32,
}

impl Default for DateWindow {
    fn default() -> Self {
        let end = NaiveDate::from_ymd_opt(2025, 12, 15).unwrap_or_default();
        Self {
            start: end - Days::new(150),
            end,
            max_per_day: 5,
            first_hour: 9,
            last_hour: 18,
        }
    }
}

impl DateWindow {
    pub fn validate(&self) -> Result<(), WindowError> {
        if self.start > self.end {
            return Err(WindowError::Inverted {
                start: self.start,
                end: self.end,
            });
        }
        if self.max_per_day == 0 {
            return Err(WindowError::ZeroQuota);
        }
        if self.first_hour > self.last_hour || self.last_hour > 23 {
            return Err(WindowError::Hours {
                first: self.first_hour,
                last: self.last_hour,
            });
        }
        Ok(())
    }

    pub fn days(&self) -> u64 {
        (self.end - self.start).num_days().max(0) as u64 + 1
    }

    /// Most timestamps the window can hold without breaking the daily quota.
    pub fn capacity(&self) -> u64 {
        self.days() * u64::from(self.max_per_day)
    }

    fn time_of_day<R: Rng + ?Sized>(&self, day: NaiveDate, rng: &mut R) -> NaiveDateTime {
        let hour = rng.random_range(self.first_hour..=self.last_hour);
        let minute = rng.random_range(0..=59u32);
        let second = rng.random_range(0..=59u32);
        let offset = i64::from(hour * 3600 + minute * 60 + second);
        day.and_time(NaiveTime::MIN) + Duration::seconds(offset)
    }
}

/// Sorted timestamps, at most `max_per_day` per calendar day. Requests above
/// the window's capacity are clamped.
pub fn sample<R: Rng + ?Sized>(
    window: &DateWindow,
    count: usize,
    rng: &mut R,
) -> Result<Vec<NaiveDateTime>, WindowError> {
    window.validate()?;
    let count = count.min(usize::try_from(window.capacity()).unwrap_or(usize::MAX));

    let span = window.days() - 1;
    let mut dates = Vec::with_capacity(count);
    let mut per_day: HashMap<NaiveDate, u32> = HashMap::new();

    let max_attempts = count.saturating_mul(ATTEMPTS_PER_COMMIT);
    let mut attempts = 0;
    while dates.len() < count && attempts < max_attempts {
        attempts += 1;
        let day = window.start + Days::new(rng.random_range(0..=span));
        let taken = per_day.entry(day).or_insert(0);
        if *taken < window.max_per_day {
            *taken += 1;
            dates.push(window.time_of_day(day, rng));
        }
    }

    if dates.len() < count {
        tracing::debug!(
            sampled = dates.len(),
            wanted = count,
            "random sampling under-filled, sweeping window"
        );
        for day in window.start.iter_days().take_while(|d| *d <= window.end) {
            if dates.len() >= count {
                break;
            }
            let taken = per_day.entry(day).or_insert(0);
            if *taken < window.max_per_day {
                *taken += 1;
                dates.push(window.time_of_day(day, rng));
            }
        }
    }

    dates.sort();
    Ok(dates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn window(start: (i32, u32, u32), end: (i32, u32, u32), max_per_day: u32) -> DateWindow {
        DateWindow {
            start: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            end: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
            max_per_day,
            first_hour: 9,
            last_hour: 18,
        }
    }

    fn per_day(dates: &[NaiveDateTime]) -> HashMap<NaiveDate, u32> {
        let mut counts = HashMap::new();
        for d in dates {
            *counts.entry(d.date()).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn default_window_spans_150_days_before_mid_december() {
        let w = DateWindow::default();
        assert_eq!(w.end, NaiveDate::from_ymd_opt(2025, 12, 15).unwrap());
        assert_eq!(w.start, NaiveDate::from_ymd_opt(2025, 7, 18).unwrap());
        assert_eq!(w.days(), 151);
        assert_eq!(w.capacity(), 755);
    }

    #[test]
    fn samples_stay_inside_window_hours_and_quota() {
        let w = DateWindow::default();
        let mut rng = StdRng::seed_from_u64(7);
        let dates = sample(&w, 100, &mut rng).unwrap();

        assert_eq!(dates.len(), 100);
        assert!(dates.windows(2).all(|p| p[0] <= p[1]));
        for d in &dates {
            assert!(d.date() >= w.start && d.date() <= w.end);
            assert!((9..=18).contains(&d.hour()));
        }
        assert!(per_day(&dates).values().all(|&n| n <= 5));
    }

    #[test]
    fn sweep_fills_a_tight_window_exactly() {
        let w = window((2024, 3, 1), (2024, 3, 2), 3);
        let mut rng = StdRng::seed_from_u64(1);
        let dates = sample(&w, 6, &mut rng).unwrap();

        assert_eq!(dates.len(), 6);
        let counts = per_day(&dates);
        assert_eq!(counts.len(), 2);
        assert!(counts.values().all(|&n| n == 3));
    }

    #[test]
    fn overfull_request_is_truncated_to_capacity() {
        let w = window((2024, 3, 1), (2024, 3, 3), 2);
        let mut rng = StdRng::seed_from_u64(3);
        let dates = sample(&w, 50, &mut rng).unwrap();
        assert_eq!(dates.len() as u64, w.capacity());
    }

    #[test]
    fn same_seed_same_timeline() {
        let w = DateWindow::default();
        let a = sample(&w, 40, &mut StdRng::seed_from_u64(99)).unwrap();
        let b = sample(&w, 40, &mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn huge_request_is_clamped_to_capacity() {
        let w = DateWindow::default();
        let mut rng = StdRng::seed_from_u64(12);
        let dates = sample(&w, usize::MAX, &mut rng).unwrap();
        assert_eq!(dates.len(), 755);
        assert!(per_day(&dates).values().all(|&n| n == 5));
    }

    #[test]
    fn zero_count_is_empty() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(sample(&DateWindow::default(), 0, &mut rng).unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_windows() {
        let mut rng = StdRng::seed_from_u64(0);

        let inverted = window((2024, 5, 2), (2024, 5, 1), 5);
        assert!(matches!(
            sample(&inverted, 1, &mut rng),
            Err(WindowError::Inverted { .. })
        ));

        let zero = window((2024, 5, 1), (2024, 5, 2), 0);
        assert_eq!(zero.validate(), Err(WindowError::ZeroQuota));

        let mut hours = window((2024, 5, 1), (2024, 5, 2), 1);
        hours.last_hour = 24;
        assert!(matches!(hours.validate(), Err(WindowError::Hours { .. })));
    }
}
