use chrono::{DateTime, FixedOffset, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};

#[derive(Debug, Clone)]
pub(crate) struct DailyCadence {
    tz: FixedOffset,
    target: NaiveTime,
}

impl DailyCadence {
    pub(crate) fn new(tz: FixedOffset, hour: u32, minute: u32) -> Self {
        let target = NaiveTime::from_hms_opt(hour, minute, 0)
            .unwrap_or_else(|| panic!("invalid time: {hour:02}:{minute:02}"));
        Self { tz, target }
    }

    pub(crate) fn next_run_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let localized_now = now.with_timezone(&self.tz);
        let mut date = localized_now.date_naive();
        if localized_now.time() > self.target {
            date = advance_day(date);
        }

        let local_target = date.and_time(self.target);

        match self.tz.from_local_datetime(&local_target) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            LocalResult::Ambiguous(first, _) => first.with_timezone(&Utc),
            LocalResult::None => unreachable!("fixed offset should not produce nonexistent times"),
        }
    }
}

fn advance_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt()
        .expect("date should remain representable when advancing")
}
