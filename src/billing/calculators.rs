//! Core billing calculation functions.
//!
//! Pure functions for money and calendar math - no database access.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Monthly compounding factor applied to overdue installments (2% a month).
pub const MONTHLY_PENALTY_FACTOR: Decimal = Decimal::from_parts(102, 0, 0, false, 2);

/// Round to specified decimal places using banker's rounding (ROUND_HALF_EVEN).
///
/// Banker's rounding rounds to the nearest even number when the value is exactly
/// halfway between two possibilities. This reduces cumulative rounding bias.
///
/// # Examples
/// ```
/// use rust_decimal_macros::dec;
/// use flat_lease_billing::billing::round_money;
///
/// assert_eq!(round_money(dec!(2.5), 0), dec!(2));   // rounds to even
/// assert_eq!(round_money(dec!(3.5), 0), dec!(4));   // rounds to even
/// assert_eq!(round_money(dec!(1.234), 2), dec!(1.23));
/// ```
pub fn round_money(amount: Decimal, places: u32) -> Decimal {
    amount.round_dp_with_strategy(places, RoundingStrategy::MidpointNearestEven)
}

/// Last valid day of the given month, or `None` for an invalid month.
pub fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    NaiveDate::from_ymd_opt(year, month, 1)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
        .map(|d| d.day())
}

/// True once the due day has started (UTC): an installment due today is
/// already overdue at any time after midnight.
pub fn is_overdue(due_date: NaiveDate, now: DateTime<Utc>) -> bool {
    due_date.and_time(NaiveTime::MIN).and_utc() < now
}

/// Whole calendar months elapsed from `due` to `today`.
///
/// A month only counts once the same day-of-month has been reached again
/// (clamped to the end of shorter months). Returns 0 when `today` is not
/// after `due`.
pub fn months_late(due: NaiveDate, today: NaiveDate) -> u32 {
    if today <= due {
        return 0;
    }

    let span = (today.year() - due.year()) * 12 + today.month() as i32 - due.month() as i32;
    let mut months = span.max(0) as u32;

    while months > 0 {
        match due.checked_add_months(Months::new(months)) {
            Some(anniversary) if anniversary <= today => break,
            _ => months -= 1,
        }
    }

    months
}

/// Compound the late-payment penalty for an installment.
///
/// `penalty = base × 1.02^months_late`, rounded to cents. No penalty
/// applies until a full month has elapsed.
///
/// # Examples
/// ```
/// use rust_decimal_macros::dec;
/// use flat_lease_billing::billing::calculators::compound_penalty;
///
/// assert_eq!(compound_penalty(dec!(1000), 0), dec!(0));
/// assert_eq!(compound_penalty(dec!(1000), 2), dec!(1040.40));
/// ```
pub fn compound_penalty(base_amount: Decimal, months_late: u32) -> Decimal {
    if months_late == 0 {
        return Decimal::ZERO;
    }

    let compounded = (0..months_late).fold(base_amount, |acc, _| acc * MONTHLY_PENALTY_FACTOR);
    round_money(compounded, 2)
}

/// Energy surcharge for a number of billable units at the building price.
pub fn energy_surcharge(billable_units: Decimal, price_per_unit: Decimal) -> Decimal {
    round_money(billable_units * price_per_unit, 2)
}
