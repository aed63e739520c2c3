//! Error taxonomy for lifecycle operations.
//!
//! Validation failures are keyed by input field so callers can render them
//! next to the offending form control; everything else is either a missing
//! row or a storage failure.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Why a field was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Malformed or missing input (empty name, negative amount, ...).
    Invalid,
    /// A fixed/computed flag and its value disagree.
    ConstraintViolation,
    /// The children's total would exceed a fixed parent amount.
    BudgetExceeded,
    /// A fixed amount would fall below the children's total.
    BudgetTooLow,
    /// The children's total duration would exceed a fixed parent duration.
    DurationExceeded,
    /// A fixed duration would fall below the children's total.
    DurationTooLow,
    /// A task referencing itself (or its own subtree) as parent.
    SelfReference,
}

/// One rejected field with a human-readable message.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub field: &'static str,
    pub kind: ViolationKind,
    pub message: String,
}

impl Violation {
    pub fn new(field: &'static str, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            field,
            kind,
            message: message.into(),
        }
    }
}

/// All violations from one operation, in the order they were detected.
#[derive(Debug, Clone, Default)]
pub struct FieldErrors {
    violations: Vec<Violation>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    pub fn add(&mut self, field: &'static str, kind: ViolationKind, message: impl Into<String>) {
        self.push(Violation::new(field, kind, message));
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Field name to messages, for rendering next to form controls.
    pub fn by_field(&self) -> BTreeMap<&'static str, Vec<&str>> {
        let mut map: BTreeMap<&'static str, Vec<&str>> = BTreeMap::new();
        for v in &self.violations {
            map.entry(v.field).or_default().push(v.message.as_str());
        }
        map
    }

    pub fn contains(&self, field: &str, kind: ViolationKind) -> bool {
        self.violations
            .iter()
            .any(|v| v.field == field && v.kind == kind)
    }

    /// `Ok(())` when empty, otherwise the whole set as an [`OpError`].
    pub fn into_result(self) -> Result<(), OpError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(OpError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", v.field, v.message)?;
        }
        Ok(())
    }
}

impl From<Violation> for FieldErrors {
    fn from(violation: Violation) -> Self {
        Self {
            violations: vec![violation],
        }
    }
}

/// What a lifecycle operation can fail with.
#[derive(Debug, Error)]
pub enum OpError {
    /// Input rejected; nothing was written.
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    /// The addressed row does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// Database or infrastructure failure.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl OpError {
    /// Shorthand for a single-field rejection.
    pub fn invalid(field: &'static str, kind: ViolationKind, message: impl Into<String>) -> Self {
        OpError::Validation(Violation::new(field, kind, message).into())
    }
}
