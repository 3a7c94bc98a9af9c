use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;

/// Whether the regular US equity session is open at `now`: Eastern-time
/// weekdays, 09:30 inclusive to 16:00 exclusive. Exchange holidays are
/// not modeled.
pub fn is_market_open(now: DateTime<Utc>) -> bool {
    let eastern = now.with_timezone(&New_York);

    if matches!(eastern.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }

    let time = eastern.time();
    let after_open = time.hour() > 9 || (time.hour() == 9 && time.minute() >= 30);
    let before_close = time.hour() < 16;
    after_open && before_close
}
