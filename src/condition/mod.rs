//! Policy condition expressions.
//!
//! A condition is a small boolean expression evaluated against the intent
//! being governed, e.g. `args.amount > 50 and resource == "stripe.charge"`.
//! The grammar is closed: literals, the three names `args`, `resource` and
//! `action`, field/index access, arithmetic, comparisons and boolean logic.
//! Nothing in it can call functions or reach outside the intent.

pub mod eval;
pub mod lexer;
pub mod parser;

pub use eval::Scope;
pub use parser::Expr;

use thiserror::Error;

/// Why a condition could not be compiled or evaluated.
///
/// These never leave the policy engine: a rule whose condition errors is
/// treated as not matching.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unknown name '{0}' (only args, resource and action are defined)")]
    UnknownName(String),

    #[error("missing key '{0}'")]
    MissingKey(String),

    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("expression is nested too deeply")]
    TooDeep,

    #[error("condition must evaluate to a boolean, got {0}")]
    NotBoolean(String),
}

impl ConditionError {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        ConditionError::Syntax {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn type_mismatch(message: impl Into<String>) -> Self {
        ConditionError::TypeMismatch(message.into())
    }
}

/// A parsed condition, ready to evaluate against any number of intents.
#[derive(Debug, Clone)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    /// Parse a condition string.
    pub fn compile(source: &str) -> Result<Self, ConditionError> {
        Ok(Self {
            source: source.to_string(),
            expr: parser::parse(source)?,
        })
    }

    /// Evaluate to a boolean. Any non-boolean result is an error.
    pub fn evaluate(&self, scope: &Scope) -> Result<bool, ConditionError> {
        match &*eval::evaluate(&self.expr, scope)? {
            serde_json::Value::Bool(b) => Ok(*b),
            other => Err(ConditionError::NotBoolean(other.to_string())),
        }
    }

    /// The expression text as written in the policy file.
    pub fn source(&self) -> &str {
        &self.source
    }
}
