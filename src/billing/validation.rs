//! Input checks run before any unit of work is opened.

use rust_decimal::Decimal;

use crate::error::{AppError, Result};

pub const MIN_TERM_MONTHS: i32 = 6;

/// Longest accepted term; keeps schedule generation bounded.
pub const MAX_TERM_MONTHS: i32 = 600;

pub fn validate_term(term_months: i32) -> Result<()> {
    if term_months < MIN_TERM_MONTHS {
        return Err(AppError::InvalidArgument(format!(
            "term must be at least {} months, got {}",
            MIN_TERM_MONTHS, term_months
        )));
    }
    if term_months > MAX_TERM_MONTHS {
        return Err(AppError::InvalidArgument(format!(
            "term must be at most {} months, got {}",
            MAX_TERM_MONTHS, term_months
        )));
    }
    Ok(())
}

pub fn validate_due_day(due_day: i32) -> Result<()> {
    if !(1..=31).contains(&due_day) {
        return Err(AppError::InvalidArgument(format!(
            "due day must be between 1 and 31, got {}",
            due_day
        )));
    }
    Ok(())
}

pub fn validate_rent(rent_amount: Decimal) -> Result<()> {
    if rent_amount <= Decimal::ZERO {
        return Err(AppError::InvalidArgument(format!(
            "rent amount must be positive, got {}",
            rent_amount
        )));
    }
    Ok(())
}

pub fn validate_non_negative(field: &str, value: Decimal) -> Result<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AppError::InvalidArgument(format!(
            "{} must not be negative, got {}",
            field, value
        )));
    }
    Ok(())
}

pub fn validate_adjustment_period(months: Option<i32>) -> Result<()> {
    match months {
        Some(m) if m <= 0 => Err(AppError::InvalidArgument(format!(
            "adjustment period must be positive, got {}",
            m
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rust_decimal_macros::dec;

    #[test]
    fn test_term_bounds() {
        assert!(validate_term(6).is_ok());
        assert!(validate_term(144).is_ok());
        assert!(validate_term(600).is_ok());
        assert_eq!(validate_term(5).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(validate_term(601).unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_due_day_bounds() {
        assert!(validate_due_day(1).is_ok());
        assert!(validate_due_day(31).is_ok());
        assert!(validate_due_day(0).is_err());
        assert!(validate_due_day(32).is_err());
    }

    #[test]
    fn test_amounts() {
        assert!(validate_rent(dec!(0.01)).is_ok());
        assert!(validate_rent(dec!(0)).is_err());
        assert!(validate_non_negative("reading", dec!(0)).is_ok());
        assert!(validate_non_negative("reading", dec!(-0.001)).is_err());
        assert!(validate_adjustment_period(None).is_ok());
        assert!(validate_adjustment_period(Some(0)).is_err());
    }
}
