use crate::cell::CellValue;
use crate::formula::{FormulaContext, FormulaEngine, Value};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::condition::{PricingCondition, all_conditions_met, to_number};
use super::{PricingContext, PricingError, RuleValidationError};

lazy_static! {
    static ref FORMULA_CHARS_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9\s+\-*/().,?:<>=!&|]+$").unwrap();
    static ref FORMULA_WORD_REGEX: Regex = Regex::new(r"\b([a-zA-Z_][a-zA-Z0-9_]*)\b").unwrap();
}

/// Variables a pricing formula may read.
pub const FORMULA_VARIABLES: [&str; 8] = [
    "price", "quantity", "weight", "length", "width", "height", "surface", "volume",
];

/// Function names and literals a pricing formula may use, case-insensitive.
pub const FORMULA_KEYWORDS: [&str; 8] = ["true", "false", "min", "max", "floor", "ceil", "round", "abs"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentType {
    Percentage,
    FixedAmount,
    FixedPrice,
    PricePerWeight,
    PricePerLength,
    PricePerSurface,
    PricePerVolume,
    Formula,
}

impl AdjustmentType {
    pub fn is_per_unit(&self) -> bool {
        matches!(
            self,
            AdjustmentType::PricePerWeight
                | AdjustmentType::PricePerLength
                | AdjustmentType::PricePerSurface
                | AdjustmentType::PricePerVolume
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            AdjustmentType::Percentage => "Percentage",
            AdjustmentType::FixedAmount => "Fixed amount",
            AdjustmentType::FixedPrice => "Fixed price",
            AdjustmentType::PricePerWeight => "Price per weight",
            AdjustmentType::PricePerLength => "Price per length",
            AdjustmentType::PricePerSurface => "Price per surface",
            AdjustmentType::PricePerVolume => "Price per volume",
            AdjustmentType::Formula => "Formula",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceRuleChannel {
    #[default]
    All,
    Erp,
    Marketplace,
    B2b,
    Api,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleStatus {
    Inactive,
    Expired,
    Upcoming,
    LimitReached,
    Active,
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuleStatus::Inactive => "Inactive",
            RuleStatus::Expired => "Expired",
            RuleStatus::Upcoming => "Upcoming",
            RuleStatus::LimitReached => "Limit reached",
            RuleStatus::Active => "Active",
        })
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRule {
    pub id: String,
    pub rule_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub channel: PriceRuleChannel,
    pub adjustment_type: AdjustmentType,
    #[serde(default)]
    pub adjustment_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustment_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default)]
    pub conditions: Vec<PricingCondition>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub combinable: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_limit_per_customer: Option<u32>,
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_quantity: Option<f64>,
}

impl PriceRule {
    pub fn new(id: &str, rule_name: &str, adjustment_type: AdjustmentType, value: f64) -> Self {
        PriceRule {
            id: id.to_string(),
            rule_name: rule_name.to_string(),
            description: None,
            channel: PriceRuleChannel::All,
            adjustment_type,
            adjustment_value: value,
            adjustment_unit: None,
            formula: None,
            conditions: Vec::new(),
            priority: 0,
            combinable: true,
            is_active: true,
            valid_from: None,
            valid_until: None,
            usage_limit: None,
            usage_limit_per_customer: None,
            usage_count: 0,
            min_quantity: None,
            max_quantity: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.adjustment_unit = Some(unit.to_string());
        self
    }

    pub fn with_formula(mut self, formula: &str) -> Self {
        self.formula = Some(formula.to_string());
        self
    }

    pub fn with_condition(mut self, condition: PricingCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.combinable = false;
        self
    }

    fn limit_reached(&self) -> bool {
        self.usage_limit
            .is_some_and(|limit| limit > 0 && self.usage_count >= limit)
    }

    /// Status at `now`. An inactive rule is reported as such whatever its dates.
    pub fn status(&self, now: DateTime<Utc>) -> RuleStatus {
        if !self.is_active {
            RuleStatus::Inactive
        } else if self.valid_until.is_some_and(|until| until < now) {
            RuleStatus::Expired
        } else if self.valid_from.is_some_and(|from| from > now) {
            RuleStatus::Upcoming
        } else if self.limit_reached() {
            RuleStatus::LimitReached
        } else {
            RuleStatus::Active
        }
    }

    fn quantity_in_bounds(&self, context: &PricingContext) -> bool {
        let quantity = to_number(context.get("quantity"));
        self.min_quantity.is_none_or(|min| quantity >= min)
            && self.max_quantity.is_none_or(|max| quantity <= max)
    }

    pub fn can_be_applied(&self, context: &PricingContext, now: DateTime<Utc>) -> bool {
        self.status(now) == RuleStatus::Active
            && self.quantity_in_bounds(context)
            && all_conditions_met(&self.conditions, context)
    }

    /// Why the rule would not apply, or `None` if it would.
    pub fn skip_reason(&self, context: &PricingContext, now: DateTime<Utc>) -> Option<String> {
        if self.can_be_applied(context, now) {
            return None;
        }
        let reason = if self.valid_from.is_some_and(|from| from > now) {
            "Rule not yet valid"
        } else if self.valid_until.is_some_and(|until| until < now) {
            "Rule expired"
        } else if self.limit_reached() {
            "Usage limit reached"
        } else if !self.is_active {
            "Rule inactive"
        } else {
            "Conditions not met"
        };
        Some(reason.to_string())
    }

    /// Field-level problems that block saving the rule.
    pub fn validate(&self) -> Vec<RuleValidationError> {
        let mut errors = Vec::new();
        if self.rule_name.trim().is_empty() {
            errors.push(RuleValidationError::NameRequired);
        }
        if !self.adjustment_value.is_finite() {
            errors.push(RuleValidationError::ValueRequired);
        }
        if self.adjustment_type.is_per_unit()
            && self.adjustment_unit.as_deref().is_none_or(str::is_empty)
        {
            errors.push(RuleValidationError::UnitRequired);
        }
        if self.adjustment_type == AdjustmentType::Formula {
            match self.formula.as_deref().filter(|f| !f.trim().is_empty()) {
                None => errors.push(RuleValidationError::FormulaRequired),
                Some(f) if !is_valid_pricing_formula(f) => {
                    errors.push(RuleValidationError::InvalidFormula(f.to_string()))
                }
                Some(_) => {}
            }
        }
        errors
    }

    /// Short human description of the adjustment, e.g. `-10%` or `2.5€/kg`.
    pub fn describe_adjustment(&self) -> String {
        let value = self.adjustment_value;
        match self.adjustment_type {
            AdjustmentType::Formula => self
                .formula
                .clone()
                .unwrap_or_else(|| "Undefined".to_string()),
            AdjustmentType::Percentage => {
                format!("{}{}%", if value >= 0.0 { "+" } else { "" }, value)
            }
            _ => match &self.adjustment_unit {
                Some(unit) => format!("{}€/{}", value, unit),
                None => {
                    let sign = if value >= 0.0 && self.adjustment_type == AdjustmentType::FixedAmount {
                        "+"
                    } else {
                        ""
                    };
                    format!("{}{}€", sign, value)
                }
            },
        }
    }

    /// Price after this rule, starting from `current`.
    ///
    /// Per-unit rules replace the price with `measure × value`, with the
    /// measure converted into the rule's unit; a missing measure or unit
    /// gives 0. Formula results are floored at 0.
    pub fn apply(&self, current: f64, context: &PricingContext) -> Result<f64, PricingError> {
        let value = self.adjustment_value;
        match self.adjustment_type {
            AdjustmentType::Percentage => Ok(current * (1.0 + value / 100.0)),
            AdjustmentType::FixedAmount => Ok(current + value),
            AdjustmentType::FixedPrice => Ok(value),
            AdjustmentType::PricePerWeight
            | AdjustmentType::PricePerLength
            | AdjustmentType::PricePerSurface
            | AdjustmentType::PricePerVolume => {
                let measures = Measures::from_context(context);
                let (Some(unit), Some(measure)) = (
                    self.adjustment_unit.as_deref(),
                    measures.for_type(self.adjustment_type),
                ) else {
                    return Ok(0.0);
                };
                let factor = unit_factor(self.adjustment_type, unit)?;
                Ok(measure / factor * value)
            }
            AdjustmentType::Formula => {
                let Some(formula) = self.formula.as_deref() else {
                    return Ok(current);
                };
                let variables = PricingVariables {
                    price: current,
                    quantity: to_number(context.get("quantity")),
                    measures: Measures::from_context(context),
                };
                match FormulaEngine::new(&variables).try_evaluate(formula)? {
                    Value::Number(n) if !n.is_nan() => Ok(n.max(0.0)),
                    other => Err(PricingError::NotANumber(
                        other.into_cell().display(),
                    )),
                }
            }
        }
    }

    pub fn step_description(&self, before: f64, after: f64) -> String {
        let diff = after - before;
        let unit = self.adjustment_unit.as_deref().unwrap_or("");
        match self.adjustment_type {
            AdjustmentType::Percentage => format!(
                "{} of {}%",
                if self.adjustment_value >= 0.0 { "Surcharge" } else { "Discount" },
                self.adjustment_value.abs()
            ),
            AdjustmentType::FixedAmount => {
                format!("Adjustment of {}{:.2}€", if diff >= 0.0 { "+" } else { "" }, diff)
            }
            AdjustmentType::FixedPrice => format!("Price set to {:.2}€", after),
            AdjustmentType::PricePerWeight => {
                format!("Priced by weight: {}€/{}", self.adjustment_value, unit)
            }
            AdjustmentType::PricePerLength => {
                format!("Priced by length: {}€/{}", self.adjustment_value, unit)
            }
            AdjustmentType::PricePerSurface => {
                format!("Priced by surface: {}€/{}", self.adjustment_value, unit)
            }
            AdjustmentType::PricePerVolume => {
                format!("Priced by volume: {}€/{}", self.adjustment_value, unit)
            }
            AdjustmentType::Formula => "Custom formula applied".to_string(),
        }
    }
}

/// Allowed characters and words only; does not parse the formula.
pub fn is_valid_pricing_formula(formula: &str) -> bool {
    if !FORMULA_CHARS_REGEX.is_match(formula) {
        return false;
    }
    FORMULA_WORD_REGEX.captures_iter(formula).all(|caps| {
        let word = &caps[1];
        FORMULA_VARIABLES.contains(&word)
            || FORMULA_KEYWORDS.contains(&word.to_lowercase().as_str())
    })
}

/// Physical measures of the priced article, in storage units:
/// kg, mm, m² and m³.
#[derive(Clone, Copy, Debug, Default)]
struct Measures {
    weight: Option<f64>,
    length: Option<f64>,
    width: Option<f64>,
    height: Option<f64>,
    surface: Option<f64>,
    volume: Option<f64>,
}

impl Measures {
    fn from_context(context: &PricingContext) -> Self {
        let read = |key: &str| {
            let n = to_number(context.get(key));
            (n.is_finite() && n != 0.0).then_some(n)
        };
        let length = read("length");
        let width = read("width");
        let height = read("height");
        let surface = read("surface").or_else(|| Some(length? * width? / 1_000_000.0));
        let volume = read("volume").or_else(|| Some(length? * width? * height? / 1_000_000_000.0));
        Measures {
            weight: read("weight"),
            length,
            width,
            height,
            surface,
            volume,
        }
    }

    fn for_type(&self, adjustment: AdjustmentType) -> Option<f64> {
        match adjustment {
            AdjustmentType::PricePerWeight => self.weight,
            AdjustmentType::PricePerLength => self.length,
            AdjustmentType::PricePerSurface => self.surface,
            AdjustmentType::PricePerVolume => self.volume,
            _ => None,
        }
    }
}

/// How many storage units make one `unit`.
fn unit_factor(adjustment: AdjustmentType, unit: &str) -> Result<f64, PricingError> {
    let factor = match (adjustment, unit.to_lowercase().as_str()) {
        (AdjustmentType::PricePerWeight, "kg") => 1.0,
        (AdjustmentType::PricePerWeight, "t") => 1000.0,
        (AdjustmentType::PricePerWeight, "g") => 0.001,
        (AdjustmentType::PricePerLength, "mm") => 1.0,
        (AdjustmentType::PricePerLength, "cm") => 10.0,
        (AdjustmentType::PricePerLength, "m") => 1000.0,
        (AdjustmentType::PricePerLength, "km") => 1_000_000.0,
        (AdjustmentType::PricePerSurface, "m2") => 1.0,
        (AdjustmentType::PricePerSurface, "cm2") => 0.0001,
        (AdjustmentType::PricePerSurface, "mm2") => 0.000_001,
        (AdjustmentType::PricePerVolume, "m3") => 1.0,
        (AdjustmentType::PricePerVolume, "l") => 0.001,
        (AdjustmentType::PricePerVolume, "cm3") => 0.000_001,
        _ => {
            return Err(PricingError::UnknownUnit {
                adjustment: adjustment.label(),
                unit: unit.to_string(),
            });
        }
    };
    Ok(factor)
}

/// Formula context exposing the pricing variables and no grid.
struct PricingVariables {
    price: f64,
    quantity: f64,
    measures: Measures,
}

impl FormulaContext for PricingVariables {
    fn column_count(&self) -> usize {
        0
    }

    fn column_id(&self, _index: usize) -> Option<&str> {
        None
    }

    fn row_count(&self) -> usize {
        0
    }

    fn value(&self, _column_id: &str, _row: usize) -> CellValue {
        CellValue::Null
    }

    fn variable(&self, name: &str) -> Option<CellValue> {
        let m = &self.measures;
        let n = match name {
            "price" | "basePrice" => self.price,
            "quantity" => {
                if self.quantity.is_nan() || self.quantity == 0.0 {
                    1.0
                } else {
                    self.quantity
                }
            }
            "weight" => m.weight.unwrap_or(0.0),
            "length" => m.length.unwrap_or(0.0),
            "width" => m.width.unwrap_or(0.0),
            "height" => m.height.unwrap_or(0.0),
            "surface" => m.surface.unwrap_or(0.0),
            "volume" => m.volume.unwrap_or(0.0),
            _ => return None,
        };
        Some(CellValue::Number(n))
    }
}

