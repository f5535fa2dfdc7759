//! Spreadsheet-style formulas over a grid of named columns and indexed rows.
//!
//! A formula such as `=IF(A1>0, SUM(B:B), "none")` is tokenized, parsed into
//! an [`Expr`] tree and walked by an interpreter that reads cells through a
//! [`FormulaContext`]. Nothing is compiled or executed dynamically.
//!
//! [`FormulaEngine::evaluate`] never fails: every problem is folded into one of
//! two sentinels, [`ERROR_SENTINEL`] or [`SECURITY_ERROR_SENTINEL`].

mod interpreter;
pub mod lexer;
pub mod parser;

use crate::cell::{CellValue, format_number};
use crate::clock::{Clock, SystemClock};
use interpreter::Interpreter;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::fmt;
use thiserror::Error;

pub use interpreter::parse_date;
pub use parser::{Expr, Function, parse};

pub const ERROR_SENTINEL: &str = "#ERROR";
pub const SECURITY_ERROR_SENTINEL: &str = "#SECURITY_ERROR";

/// Identifiers rejected anywhere in a formula, matched as whole words.
pub const FORBIDDEN_IDENTIFIERS: [&str; 16] = [
    "eval",
    "Function",
    "constructor",
    "prototype",
    "window",
    "document",
    "global",
    "process",
    "require",
    "import",
    "fetch",
    "XMLHttpRequest",
    "__proto__",
    "delete",
    "while",
    "for",
];

lazy_static! {
    static ref FORBIDDEN_REGEX: Regex = Regex::new(&format!(
        r"(?i)\b({})\b",
        FORBIDDEN_IDENTIFIERS.join("|")
    ))
    .unwrap();
    static ref CELL_REF_REGEX: Regex = Regex::new(r"([A-Z]+)(\d+)").unwrap();
    static ref COLUMN_RANGE_REGEX: Regex = Regex::new(r"([A-Z]+):([A-Z]+)").unwrap();
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("formula is empty")]
    EmptyFormula,
    #[error("unbalanced parentheses")]
    UnbalancedParentheses,
    #[error("unclosed parentheses")]
    UnclosedParentheses,
    #[error("parse error at {position}: {message}")]
    Parse { message: String, position: usize },
    #[error("unknown function {0}")]
    UnknownFunction(String),
    #[error("unknown variable {0}")]
    UnknownVariable(String),
    #[error("{function} expects {expected} argument(s), got {got}")]
    Arity {
        function: &'static str,
        expected: String,
        got: usize,
    },
    #[error("ranges are only allowed inside aggregate functions")]
    RangeOutsideAggregate,
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NotFinite,
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("forbidden identifier '{0}'")]
    Forbidden(String),
    #[error("formula nested too deeply")]
    TooDeep,
}

/// Intermediate value produced while walking a formula.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
}

/// What a formula evaluates to, as seen by callers.
#[derive(Clone, Debug, PartialEq)]
pub enum FormulaResult {
    Number(f64),
    Text(String),
    Bool(bool),
    Error,
    SecurityError,
}

impl FormulaResult {
    pub fn is_error(&self) -> bool {
        matches!(self, FormulaResult::Error | FormulaResult::SecurityError)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaResult::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Errors become their sentinel text so they can be stored in a row.
    pub fn to_cell_value(&self) -> CellValue {
        match self {
            FormulaResult::Number(n) => CellValue::Number(*n),
            FormulaResult::Text(s) => CellValue::Text(s.clone()),
            FormulaResult::Bool(b) => CellValue::Bool(*b),
            FormulaResult::Error => CellValue::text(ERROR_SENTINEL),
            FormulaResult::SecurityError => CellValue::text(SECURITY_ERROR_SENTINEL),
        }
    }
}

impl From<Value> for FormulaResult {
    fn from(value: Value) -> Self {
        match value {
            Value::Number(n) => FormulaResult::Number(n),
            Value::Text(s) => FormulaResult::Text(s),
            Value::Bool(b) => FormulaResult::Bool(b),
        }
    }
}

impl fmt::Display for FormulaResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaResult::Number(n) => f.write_str(&format_number(*n)),
            FormulaResult::Text(s) => f.write_str(s),
            FormulaResult::Bool(b) => write!(f, "{}", b),
            FormulaResult::Error => f.write_str(ERROR_SENTINEL),
            FormulaResult::SecurityError => f.write_str(SECURITY_ERROR_SENTINEL),
        }
    }
}

/// Grid the formula reads from.
///
/// Columns are addressed by position (`A` is index 0) and resolved to an id
/// before the value lookup.
pub trait FormulaContext {
    fn column_count(&self) -> usize;
    fn column_id(&self, index: usize) -> Option<&str>;
    fn row_count(&self) -> usize;
    fn value(&self, column_id: &str, row: usize) -> CellValue;

    /// Named scalars such as `price` in pricing formulas. Grids have none.
    fn variable(&self, _name: &str) -> Option<CellValue> {
        None
    }
}

pub struct FormulaEngine<'a> {
    context: &'a dyn FormulaContext,
    clock: &'a dyn Clock,
}

impl<'a> FormulaEngine<'a> {
    pub fn new(context: &'a dyn FormulaContext) -> Self {
        FormulaEngine {
            context,
            clock: &SystemClock,
        }
    }

    pub fn with_clock(context: &'a dyn FormulaContext, clock: &'a dyn Clock) -> Self {
        FormulaEngine { context, clock }
    }

    /// Evaluate a formula, with or without a leading `=`.
    ///
    /// Never fails: forbidden identifiers give [`FormulaResult::SecurityError`],
    /// any other problem gives [`FormulaResult::Error`].
    pub fn evaluate(&self, expression: &str) -> FormulaResult {
        match self.try_evaluate(expression) {
            Ok(value) => value.into(),
            Err(FormulaError::Forbidden(word)) => {
                debug!("formula {:?} rejected: forbidden identifier {}", expression, word);
                FormulaResult::SecurityError
            }
            Err(e) => {
                debug!("formula {:?} failed: {}", expression, e);
                FormulaResult::Error
            }
        }
    }

    pub fn try_evaluate(&self, expression: &str) -> Result<Value, FormulaError> {
        let formula = expression.strip_prefix('=').unwrap_or(expression);
        if let Some(word) = forbidden_identifier(formula) {
            return Err(FormulaError::Forbidden(word));
        }
        let expr = parse(formula)?;
        let interpreter = Interpreter::new(self.context, self.clock);
        let value = interpreter.eval(&expr)?;
        if let Value::Number(n) = value {
            if !n.is_finite() {
                return Err(FormulaError::NotFinite);
            }
        }
        Ok(value)
    }
}

/// First denylisted identifier appearing as a whole word, case-insensitively.
pub fn forbidden_identifier(formula: &str) -> Option<String> {
    FORBIDDEN_REGEX
        .captures(formula)
        .map(|c| c[1].to_string())
}

/// Cheap syntax check used by editors before a formula is saved.
pub fn validate_formula(formula: &str) -> Result<(), FormulaError> {
    if formula.trim().is_empty() {
        return Err(FormulaError::EmptyFormula);
    }
    let mut open: i64 = 0;
    for c in formula.chars() {
        match c {
            '(' => open += 1,
            ')' => open -= 1,
            _ => {}
        }
        if open < 0 {
            return Err(FormulaError::UnbalancedParentheses);
        }
    }
    if open != 0 {
        return Err(FormulaError::UnclosedParentheses);
    }
    Ok(())
}

/// Column letters a formula depends on: every `<Letters><Digits>` reference
/// plus both ends of every `<Letters>:<Letters>` range. Columns strictly
/// inside a range are not listed. Cell references come first, then range ends.
pub fn dependencies(formula: &str) -> Vec<String> {
    let mut deps: Vec<String> = Vec::new();
    let mut add = |letters: &str| {
        if !deps.iter().any(|d| d == letters) {
            deps.push(letters.to_string());
        }
    };
    for caps in CELL_REF_REGEX.captures_iter(formula) {
        add(&caps[1]);
    }
    for caps in COLUMN_RANGE_REGEX.captures_iter(formula) {
        add(&caps[1]);
        add(&caps[2]);
    }
    deps
}
