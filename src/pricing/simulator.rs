use crate::clock::{Clock, SystemClock};
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;

use super::rule::{AdjustmentType, PriceRule};
use super::PricingContext;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedRule {
    pub rule_id: String,
    pub rule_name: String,
    pub rule_type: AdjustmentType,
    pub adjustment: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment_unit: Option<String>,
    pub discount_amount: f64,
    pub discount_percentage: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRule {
    pub rule_id: String,
    pub rule_name: String,
    pub reason: String,
    pub priority: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownStep {
    pub step_number: usize,
    pub rule_id: String,
    pub rule_name: String,
    pub price_before: f64,
    pub price_after: f64,
    pub adjustment: f64,
    pub adjustment_type: AdjustmentType,
    pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceCalculation {
    pub base_price: f64,
    pub final_price: f64,
    pub applied_rules: Vec<AppliedRule>,
    pub skipped_rules: Vec<SkippedRule>,
    pub steps: Vec<BreakdownStep>,
    pub warnings: Vec<String>,
    pub total_discount: f64,
    pub total_discount_percentage: f64,
}

/// Runs a set of price rules against a base price without side effects:
/// usage counters are read to decide applicability but never incremented.
pub struct PriceSimulator<C: Clock = SystemClock> {
    rules: Vec<PriceRule>,
    clock: C,
}

impl PriceSimulator<SystemClock> {
    pub fn new(rules: Vec<PriceRule>) -> Self {
        PriceSimulator {
            rules,
            clock: SystemClock,
        }
    }
}

impl<C: Clock> PriceSimulator<C> {
    pub fn with_clock(rules: Vec<PriceRule>, clock: C) -> Self {
        PriceSimulator { rules, clock }
    }

    pub fn rules(&self) -> &[PriceRule] {
        &self.rules
    }

    /// Rules by descending priority; ties keep their given order.
    fn ordered_rules(&self) -> Vec<&PriceRule> {
        let mut rules: Vec<&PriceRule> = self.rules.iter().collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        rules
    }

    pub fn simulate(&self, base_price: f64, context: &PricingContext) -> PriceCalculation {
        let now = self.clock.now();
        let mut context = context.clone();
        let has_quantity = context.get("quantity").is_some_and(super::condition::truthy);
        if !has_quantity {
            context.insert("quantity".to_string(), Value::from(1));
        }

        let mut result = PriceCalculation {
            base_price,
            ..Default::default()
        };

        let mut applicable = Vec::new();
        for rule in self.ordered_rules() {
            match rule.skip_reason(&context, now) {
                None => applicable.push(rule),
                Some(reason) => {
                    debug!("rule {} skipped: {}", rule.id, reason);
                    result.skipped_rules.push(SkippedRule {
                        rule_id: rule.id.clone(),
                        rule_name: rule.rule_name.clone(),
                        reason,
                        priority: rule.priority,
                    });
                }
            }
        }

        let mut current = base_price;
        for rule in applicable {
            let next = match rule.apply(current, &context) {
                Ok(price) => price,
                Err(e) => {
                    warn!("rule {} failed: {}", rule.id, e);
                    result.warnings.push(format!("Rule {} failed: {}", rule.rule_name, e));
                    continue;
                }
            };
            if next == current {
                continue;
            }

            result.applied_rules.push(AppliedRule {
                rule_id: rule.id.clone(),
                rule_name: rule.rule_name.clone(),
                rule_type: rule.adjustment_type,
                adjustment: rule.adjustment_value,
                adjustment_unit: rule.adjustment_unit.clone(),
                discount_amount: current - next,
                discount_percentage: if current != 0.0 {
                    (current - next) / current * 100.0
                } else {
                    0.0
                },
            });
            result.steps.push(BreakdownStep {
                step_number: result.steps.len() + 1,
                rule_id: rule.id.clone(),
                rule_name: rule.rule_name.clone(),
                price_before: current,
                price_after: next,
                adjustment: next - current,
                adjustment_type: rule.adjustment_type,
                description: rule.step_description(current, next),
            });
            current = next;

            if !rule.combinable {
                break;
            }
        }

        result.final_price = current.max(0.0);
        result.total_discount = base_price - result.final_price;
        result.total_discount_percentage = if base_price > 0.0 {
            result.total_discount / base_price * 100.0
        } else {
            0.0
        };
        result
    }
}
