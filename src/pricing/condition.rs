use crate::cell::{format_number, parse_number};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::PricingContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    CustomerGroup,
    CustomerEmail,
    CustomerCode,
    Quantity,
    DateRange,
    ArticleReference,
    ArticleFamily,
    OrderTotal,
    Custom,
}

impl ConditionType {
    /// Context key holding the value this condition looks at.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::CustomerGroup => "customer_group",
            ConditionType::CustomerEmail => "customer_email",
            ConditionType::CustomerCode => "customer_code",
            ConditionType::Quantity => "quantity",
            ConditionType::DateRange => "date_range",
            ConditionType::ArticleReference => "article_reference",
            ConditionType::ArticleFamily => "article_family",
            ConditionType::OrderTotal => "order_total",
            ConditionType::Custom => "custom",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Between,
    GreaterThan,
    LessThan,
    Contains,
    StartsWith,
    EndsWith,
    After,
    Before,
    #[serde(other)]
    Unknown,
}

/// A `(type, operator, value)` predicate over a [`PricingContext`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricingCondition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
    /// Fallback context key, used when the type's own key is absent or falsy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl PricingCondition {
    pub fn new(condition_type: ConditionType, operator: ConditionOperator, value: Value) -> Self {
        PricingCondition {
            condition_type,
            operator,
            value,
            field: None,
        }
    }

    pub fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    pub fn matches(&self, context: &PricingContext) -> bool {
        evaluate_condition(self, context)
    }
}

/// Evaluate one condition. Never fails: malformed values and unsupported
/// operators (`after`, `before`) evaluate to false.
pub fn evaluate_condition(condition: &PricingCondition, context: &PricingContext) -> bool {
    let actual = context
        .get(condition.condition_type.as_str())
        .filter(|v| truthy(v))
        .or_else(|| context.get(condition.field.as_deref().unwrap_or("")));
    let expected = &condition.value;

    match condition.operator {
        ConditionOperator::Equals => actual.is_some_and(|a| strict_equals(a, expected)),
        ConditionOperator::NotEquals => !actual.is_some_and(|a| strict_equals(a, expected)),
        ConditionOperator::GreaterThan => to_number(actual) > to_number(Some(expected)),
        ConditionOperator::LessThan => to_number(actual) < to_number(Some(expected)),
        ConditionOperator::Between => match expected {
            Value::Object(bounds) if bounds.contains_key("from") && bounds.contains_key("to") => {
                let v = to_number(actual);
                v >= to_number(bounds.get("from")) && v <= to_number(bounds.get("to"))
            }
            _ => false,
        },
        ConditionOperator::Contains => to_text(actual).contains(&to_text(Some(expected))),
        ConditionOperator::StartsWith => to_text(actual).starts_with(&to_text(Some(expected))),
        ConditionOperator::EndsWith => to_text(actual).ends_with(&to_text(Some(expected))),
        ConditionOperator::In => is_member(actual, expected),
        ConditionOperator::NotIn => !is_member(actual, expected),
        ConditionOperator::After | ConditionOperator::Before | ConditionOperator::Unknown => false,
    }
}

/// True when every condition holds; an empty list always holds.
pub fn all_conditions_met(conditions: &[PricingCondition], context: &PricingContext) -> bool {
    conditions.iter().all(|c| evaluate_condition(c, context))
}

fn is_member(actual: Option<&Value>, list: &Value) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match list {
        Value::Array(items) => items.iter().any(|item| strict_equals(item, actual)),
        // list tokens are strings, so only a string value can equal one
        other => match actual {
            Value::String(needle) => to_text(Some(other))
                .split(',')
                .any(|token| token.trim() == needle),
            _ => false,
        },
    }
}

/// JSON truthiness: null, false, 0, NaN and "" are falsy.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Equality without coercion; numbers compare by value regardless of how
/// they were written (`10` equals `10.0`).
fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => false,
        _ => a == b,
    }
}

/// Numeric coercion of a context value. Missing values are NaN.
pub(crate) fn to_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => parse_number(s),
        Some(Value::Array(items)) => match items.as_slice() {
            [] => 0.0,
            [single] => to_number(Some(single)),
            _ => f64::NAN,
        },
        Some(Value::Object(_)) => f64::NAN,
    }
}

pub(crate) fn to_text(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.as_f64().map(format_number).unwrap_or_default(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::Null => String::new(),
                other => to_text(Some(other)),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Object(_)) => "[object Object]".to_string(),
    }
}
