use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use erna_core::config::{MatchDay, MatchTime, MatchingConfig};

/// Upper bound on how far [`MatchCalendar::next_slot`] looks ahead.
///
/// A fifth-week-only calendar on a given weekday can go a few months
/// without a slot; a year always contains one.
const LOOKAHEAD_DAYS: i64 = 400;

/// When the recurring round runs: weekday, time of day and weeks of the month.
///
/// All three are local to the zone passed in. A slot that falls into a
/// spring-forward gap does not happen that day; a slot inside a repeated
/// fall-back hour happens once, at its first occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCalendar {
    day: MatchDay,
    time: MatchTime,
    weeks: Vec<u8>,
}

impl MatchCalendar {
    pub fn new(day: MatchDay, time: MatchTime, weeks: Vec<u8>) -> Self {
        Self { day, time, weeks }
    }

    pub fn from_config(config: &MatchingConfig) -> Self {
        Self::new(config.day, config.time, config.weeks.clone())
    }

    /// Whether the minute starting at `at` is a recurring slot in `tz`.
    pub fn is_match_slot(&self, at: DateTime<Utc>, tz: Tz) -> bool {
        let local = at.with_timezone(&tz);
        if !self.is_match_date(local.date_naive()) || !self.time.matches(local.hour(), local.minute())
        {
            return false;
        }
        tz.from_local_datetime(&local.naive_local())
            .earliest()
            .is_some_and(|first| first.with_timezone(&Utc) == at)
    }

    /// First slot in `tz` strictly after `after`, or `None` within a year.
    pub fn next_slot(&self, after: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        let start = after.with_timezone(&tz).date_naive();
        (0..=LOOKAHEAD_DAYS)
            .map(|offset| start + Duration::days(offset))
            .filter(|date| self.is_match_date(*date))
            .find_map(|date| self.first_time_on(date, after, tz))
    }

    fn is_match_date(&self, date: NaiveDate) -> bool {
        self.day.includes(date.weekday().num_days_from_monday())
            && self.weeks.contains(&week_of_month(date.day()))
    }

    /// Earliest matching minute on local `date` that is later than `after`.
    fn first_time_on(
        &self,
        date: NaiveDate,
        after: DateTime<Utc>,
        tz: Tz,
    ) -> Option<DateTime<Utc>> {
        let hours = self.time.hour.map_or(0..=23, |h| h..=h);
        hours
            .flat_map(|hour| {
                let minutes = self.time.minute.map_or(0..=59, |m| m..=m);
                minutes.map(move |minute| (hour, minute))
            })
            .filter_map(|(hour, minute)| {
                tz.with_ymd_and_hms(
                    date.year(),
                    date.month(),
                    date.day(),
                    u32::from(hour),
                    u32::from(minute),
                    0,
                )
                .earliest()
            })
            .map(|candidate| candidate.with_timezone(&Utc))
            .find(|candidate| *candidate > after)
    }
}

/// Days 1-7 are week 1, 8-14 week 2, ... 29-31 week 5.
pub fn week_of_month(day: u32) -> u8 {
    (day.saturating_sub(1) / 7 + 1) as u8
}
