use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Fires once per day at a fixed local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySchedule {
    pub at: NaiveTime,
}

impl DailySchedule {
    pub fn new(at: NaiveTime) -> Self {
        Self { at }
    }

    /// First trigger strictly after `now`.
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date().and_time(self.at);
        if today > now {
            today
        } else {
            today + Duration::days(1)
        }
    }

    /// Time-zone aware variant of [`DailySchedule::next_after`].
    ///
    /// A trigger that falls into a DST gap is pushed forward until it maps to a
    /// real instant. One that falls into a repeated hour resolves to the earlier
    /// of its two instants still ahead of `now`.
    pub fn next_trigger<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let tz = now.timezone();
        let mut candidate = self.next_after(now.naive_local());
        loop {
            let resolved = tz.from_local_datetime(&candidate);
            if let LocalResult::None = resolved {
                candidate += Duration::minutes(30);
                continue;
            }
            match earliest_after(resolved, now) {
                Some(at) => return at,
                None => candidate = self.next_after(candidate),
            }
        }
    }
}

// chrono does not promise an order for the two instants of a repeated hour.
fn earliest_after<Tz: TimeZone>(
    resolved: LocalResult<DateTime<Tz>>,
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    match resolved {
        LocalResult::Single(at) => (at > *now).then_some(at),
        LocalResult::Ambiguous(a, b) => {
            let (early, late) = if a <= b { (a, b) } else { (b, a) };
            if early > *now {
                Some(early)
            } else {
                (late > *now).then_some(late)
            }
        }
        LocalResult::None => None,
    }
}

impl Default for DailySchedule {
    fn default() -> Self {
        Self {
            at: NaiveTime::default() + Duration::hours(18),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn repeated_slot() -> (DateTime<FixedOffset>, DateTime<FixedOffset>) {
        let summer = FixedOffset::east_opt(3600).unwrap();
        let winter = FixedOffset::east_opt(0).unwrap();
        (
            summer.with_ymd_and_hms(2024, 10, 27, 1, 45, 0).unwrap(),
            winter.with_ymd_and_hms(2024, 10, 27, 1, 45, 0).unwrap(),
        )
    }

    #[test]
    fn repeated_hour_resolves_to_the_earlier_instant() {
        let (first, second) = repeated_slot();
        let now = first - Duration::minutes(15);

        assert_eq!(earliest_after(LocalResult::Ambiguous(second, first), &now), Some(first));
        assert_eq!(earliest_after(LocalResult::Ambiguous(first, second), &now), Some(first));
    }

    #[test]
    fn repeated_hour_skips_an_instant_already_passed() {
        let (first, second) = repeated_slot();
        let between = first + Duration::minutes(30);
        let after_both = second + Duration::minutes(1);

        assert_eq!(earliest_after(LocalResult::Ambiguous(second, first), &between), Some(second));
        assert_eq!(earliest_after(LocalResult::Ambiguous(first, second), &after_both), None);
        assert_eq!(earliest_after(LocalResult::None, &between), None);
    }
}
