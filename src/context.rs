use std::{collections::HashMap, fmt};

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Context key reserved for percentage bucketing.
///
/// It is an ordinary context field for rule matching, but it is the only field the bucketing
/// step reads.
pub const USER_ID: &str = "userId";

/// Caller-supplied facts about the evaluation subject, keyed by caller-defined field names.
///
/// # Examples
/// ```
/// # use flagwise::{EvaluationContext, ContextValue};
/// let context = [
///     ("userId".to_owned(), "user-1".into()),
///     ("age".to_owned(), 30.0.into()),
///     ("beta".to_owned(), true.into()),
/// ].into_iter().collect::<EvaluationContext>();
/// ```
pub type EvaluationContext = HashMap<String, ContextValue>;

/// A single context value. Contexts carry scalars only.
#[derive(Debug, Serialize, Deserialize, PartialEq, PartialOrd, From, Clone)]
#[serde(untagged)]
pub enum ContextValue {
    /// A string value.
    String(String),
    /// A numerical value.
    Number(f64),
    /// A boolean value.
    Boolean(bool),
}

impl ContextValue {
    /// Numeric view used by the ordering operators.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ContextValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i32> for ContextValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

// Used for the bucketing input, so numbers print without a trailing ".0".
impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::String(s) => f.write_str(s),
            ContextValue::Number(n) => write!(f, "{n}"),
            ContextValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}
