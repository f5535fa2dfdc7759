//! Price rules: condition matching, rule status and validation, and a
//! simulator that applies rules in priority order.
//!
//! A [`PricingContext`] is a flat JSON object such as
//! `{"customer_group": "VIP", "quantity": 12, "weight": 2.5}`. Measures are
//! read in storage units: kilograms, millimetres, m² and m³.

pub mod condition;
pub mod rule;
pub mod simulator;

use crate::formula::FormulaError;
use thiserror::Error;

pub use condition::{
    ConditionOperator, ConditionType, PricingCondition, all_conditions_met, evaluate_condition,
};
pub use rule::{AdjustmentType, PriceRule, PriceRuleChannel, RuleStatus, is_valid_pricing_formula};
pub use simulator::{AppliedRule, BreakdownStep, PriceCalculation, PriceSimulator, SkippedRule};

pub type PricingContext = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("unknown unit '{unit}' for {adjustment}")]
    UnknownUnit {
        adjustment: &'static str,
        unit: String,
    },
    #[error("formula error: {0}")]
    Formula(#[from] FormulaError),
    #[error("formula result is not a number: {0}")]
    NotANumber(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleValidationError {
    #[error("name is required")]
    NameRequired,
    #[error("adjustment value is required")]
    ValueRequired,
    #[error("a unit is required for this adjustment type")]
    UnitRequired,
    #[error("formula is required")]
    FormulaRequired,
    #[error("invalid formula '{0}': use only the allowed variables and arithmetic operators")]
    InvalidFormula(String),
}

impl RuleValidationError {
    /// Form field the error belongs to.
    pub fn field(&self) -> &'static str {
        match self {
            RuleValidationError::NameRequired => "ruleName",
            RuleValidationError::ValueRequired => "adjustmentValue",
            RuleValidationError::UnitRequired => "adjustmentUnit",
            RuleValidationError::FormulaRequired | RuleValidationError::InvalidFormula(_) => {
                "formula"
            }
        }
    }
}
