/// タイムゾーン関連のヘルパー。
///
/// サービスの「今日」はKST（UTC+9、固定オフセット）で解決する。
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};

const KST_OFFSET_HOURS: i32 = 9;

#[must_use]
pub(crate) fn kst() -> FixedOffset {
    FixedOffset::east_opt(KST_OFFSET_HOURS * 3600).expect("valid KST offset")
}

/// KSTでの暦日。
#[must_use]
pub(crate) fn kst_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&kst()).date_naive()
}

/// 月曜=0..日曜=6の曜日インデックス。
#[must_use]
pub(crate) fn weekday_index(date: NaiveDate) -> i16 {
    i16::try_from(date.weekday().num_days_from_monday()).expect("weekday fits i16")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_utc(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    #[test]
    fn kst_date_rolls_over_before_utc() {
        // 2025-11-07 16:00 UTC は KST では翌日 01:00。
        let now = parse_utc("2025-11-07T16:00:00Z");
        assert_eq!(
            kst_date(now),
            NaiveDate::from_ymd_opt(2025, 11, 8).expect("date")
        );
    }

    #[test]
    fn weekday_index_is_monday_based() {
        // 2025-11-03 は月曜。
        let monday = NaiveDate::from_ymd_opt(2025, 11, 3).expect("date");
        assert_eq!(weekday_index(monday), 0);
        let sunday = NaiveDate::from_ymd_opt(2025, 11, 9).expect("date");
        assert_eq!(weekday_index(sunday), 6);
    }
}
