use tripcar_core::{CoreError, CoreResult, DateRange};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Started days, never less than one.
pub fn billable_days(range: &DateRange) -> i64 {
    let millis = range.duration().num_milliseconds();
    let days = millis / MILLIS_PER_DAY + i64::from(millis % MILLIS_PER_DAY != 0);
    days.max(1)
}

pub fn total_price(range: &DateRange, daily_rate: i64) -> CoreResult<i64> {
    if daily_rate <= 0 {
        return Err(CoreError::InvalidState(format!("daily rate {} is not bookable", daily_rate)));
    }
    billable_days(range)
        .checked_mul(daily_rate)
        .ok_or_else(|| CoreError::InvalidRange("rental total overflows".to_string()))
}
