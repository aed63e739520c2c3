//! Budget and duration rollup rules.
//!
//! Both budgets and durations are dual-mode: a row either carries a fixed
//! value entered by the user or a computed value maintained as the sum over
//! its children. Routine child edits move a computed value by the delta of
//! the edit; flipping the flag from fixed to computed triggers a full re-sum.
//! [`Amount`] tags which mode a stored value is in so callers cannot confuse
//! a ceiling with a running total.

use crate::error::{Violation, ViolationKind};

/// A stored value together with its fixed/computed mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Amount<T> {
    /// User-entered ceiling. Children must fit under it.
    Fixed(T),
    /// Maintained sum over children. Only the engine writes it.
    Computed(T),
}

impl<T: Copy + Default> Amount<T> {
    /// Interpret a nullable column plus its flag. A missing value reads as
    /// the type's zero.
    pub fn from_row(value: Option<T>, fixed: bool) -> Self {
        let v = value.unwrap_or_default();
        if fixed { Amount::Fixed(v) } else { Amount::Computed(v) }
    }

    pub fn value(self) -> T {
        match self {
            Amount::Fixed(v) | Amount::Computed(v) => v,
        }
    }

    pub fn is_fixed(self) -> bool {
        matches!(self, Amount::Fixed(_))
    }
}

/// A fixed value must come with a number; a computed one must not.
pub fn validate_budget_pairing(
    field: &'static str,
    value: Option<f64>,
    fixed: bool,
) -> Result<(), Violation> {
    match (fixed, value) {
        (true, None) => Err(Violation::new(
            field,
            ViolationKind::ConstraintViolation,
            "a fixed budget needs an amount",
        )),
        (false, Some(_)) => Err(Violation::new(
            field,
            ViolationKind::ConstraintViolation,
            "a computed budget cannot be set directly",
        )),
        _ => Ok(()),
    }
}

pub fn validate_duration_pairing(
    field: &'static str,
    value: Option<i32>,
    fixed: bool,
) -> Result<(), Violation> {
    match (fixed, value) {
        (true, None) => Err(Violation::new(
            field,
            ViolationKind::ConstraintViolation,
            "a fixed duration needs a number of weeks",
        )),
        (false, Some(_)) => Err(Violation::new(
            field,
            ViolationKind::ConstraintViolation,
            "a computed duration cannot be set directly",
        )),
        _ => Ok(()),
    }
}

/// Would the children's total burst through a fixed parent budget?
pub fn check_budget_ceiling(
    field: &'static str,
    candidate_total: f64,
    ceiling: f64,
) -> Result<(), Violation> {
    if candidate_total > ceiling {
        Err(Violation::new(
            field,
            ViolationKind::BudgetExceeded,
            format!("total of {candidate_total} would exceed the fixed budget of {ceiling}"),
        ))
    } else {
        Ok(())
    }
}

/// Would a fixed budget fall below what the children already claim?
pub fn check_budget_floor(
    field: &'static str,
    candidate: f64,
    children_total: f64,
) -> Result<(), Violation> {
    if candidate < children_total {
        Err(Violation::new(
            field,
            ViolationKind::BudgetTooLow,
            format!("budget of {candidate} is below the {children_total} already allocated"),
        ))
    } else {
        Ok(())
    }
}

pub fn check_duration_ceiling(
    field: &'static str,
    candidate_total: i64,
    ceiling: i64,
) -> Result<(), Violation> {
    if candidate_total > ceiling {
        Err(Violation::new(
            field,
            ViolationKind::DurationExceeded,
            format!(
                "total of {candidate_total} weeks would exceed the fixed duration of {ceiling} weeks"
            ),
        ))
    } else {
        Ok(())
    }
}

pub fn check_duration_floor(
    field: &'static str,
    candidate: i64,
    children_total: i64,
) -> Result<(), Violation> {
    if candidate < children_total {
        Err(Violation::new(
            field,
            ViolationKind::DurationTooLow,
            format!(
                "duration of {candidate} weeks is below the {children_total} weeks already scheduled"
            ),
        ))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_row_defaults_missing_values_to_zero() {
        assert_eq!(Amount::<f64>::from_row(None, false), Amount::Computed(0.0));
        assert_eq!(Amount::from_row(Some(5), true), Amount::Fixed(5));
    }

    #[test]
    fn fixed_budget_without_value_is_rejected() {
        let err = validate_budget_pairing("budget", None, true).unwrap_err();
        assert_eq!(err.kind, ViolationKind::ConstraintViolation);
    }

    #[test]
    fn computed_budget_with_value_is_rejected() {
        let err = validate_budget_pairing("budget", Some(100.0), false).unwrap_err();
        assert_eq!(err.kind, ViolationKind::ConstraintViolation);
    }

    #[test]
    fn well_paired_inputs_pass() {
        assert!(validate_budget_pairing("budget", Some(100.0), true).is_ok());
        assert!(validate_budget_pairing("budget", None, false).is_ok());
        assert!(validate_duration_pairing("duration", Some(4), true).is_ok());
        assert!(validate_duration_pairing("duration", None, false).is_ok());
    }

    #[test]
    fn ceiling_allows_exact_fit() {
        assert!(check_budget_ceiling("budget", 1000.0, 1000.0).is_ok());
        assert!(check_duration_ceiling("duration", 12, 12).is_ok());
    }

    #[test]
    fn ceiling_rejects_overflow() {
        let err = check_budget_ceiling("budget", 1000.01, 1000.0).unwrap_err();
        assert_eq!(err.kind, ViolationKind::BudgetExceeded);
        let err = check_duration_ceiling("duration", 13, 12).unwrap_err();
        assert_eq!(err.kind, ViolationKind::DurationExceeded);
    }

    #[test]
    fn floor_allows_exact_fit_and_rejects_shortfall() {
        assert!(check_budget_floor("budget", 500.0, 500.0).is_ok());
        let err = check_budget_floor("budget", 499.0, 500.0).unwrap_err();
        assert_eq!(err.kind, ViolationKind::BudgetTooLow);
        let err = check_duration_floor("duration", 3, 4).unwrap_err();
        assert_eq!(err.kind, ViolationKind::DurationTooLow);
    }
}
