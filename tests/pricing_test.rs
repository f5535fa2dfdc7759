use chrono::{Duration, TimeZone, Utc};
use datatable::ManualClock;
use datatable::pricing::{
    AdjustmentType, ConditionOperator, ConditionType, PriceRule, PriceSimulator, PricingCondition,
    PricingContext, PricingError, RuleStatus, RuleValidationError, all_conditions_met,
    evaluate_condition, is_valid_pricing_formula,
};
use serde_json::{Value, json};

fn context(value: Value) -> PricingContext {
    match value {
        Value::Object(map) => map,
        _ => panic!("context must be an object"),
    }
}

fn quantity(operator: ConditionOperator, value: Value) -> PricingCondition {
    PricingCondition::new(ConditionType::Quantity, operator, value)
}

#[test]
fn test_between_is_inclusive_and_needs_both_bounds() {
    let between = quantity(ConditionOperator::Between, json!({"from": 10, "to": 20}));
    assert!(between.matches(&context(json!({"quantity": 15}))));
    assert!(between.matches(&context(json!({"quantity": 10}))));
    assert!(between.matches(&context(json!({"quantity": 20}))));
    assert!(!between.matches(&context(json!({"quantity": 21}))));

    let malformed = quantity(ConditionOperator::Between, json!({"from": 10}));
    assert!(!malformed.matches(&context(json!({"quantity": 15}))));
    let not_an_object = quantity(ConditionOperator::Between, json!(15));
    assert!(!not_an_object.matches(&context(json!({"quantity": 15}))));
}

#[test]
fn test_numeric_comparisons_coerce_and_reject_nan() {
    let gt = quantity(ConditionOperator::GreaterThan, json!("5"));
    assert!(gt.matches(&context(json!({"quantity": 6}))));
    assert!(gt.matches(&context(json!({"quantity": "7"}))));
    assert!(!gt.matches(&context(json!({"quantity": "lots"}))));
    assert!(!gt.matches(&context(json!({}))));

    let lt = quantity(ConditionOperator::LessThan, json!(5));
    assert!(lt.matches(&context(json!({"quantity": 4.5}))));
    assert!(!lt.matches(&context(json!({"quantity": 5}))));
}

#[test]
fn test_equality_is_strict() {
    let group = PricingCondition::new(ConditionType::CustomerGroup, ConditionOperator::Equals, json!("VIP"));
    assert!(group.matches(&context(json!({"customer_group": "VIP"}))));
    assert!(!group.matches(&context(json!({"customer_group": "vip"}))));

    let ten = quantity(ConditionOperator::Equals, json!(10));
    assert!(ten.matches(&context(json!({"quantity": 10.0}))));
    assert!(!ten.matches(&context(json!({"quantity": "10"}))));

    let not_vip = PricingCondition::new(ConditionType::CustomerGroup, ConditionOperator::NotEquals, json!("VIP"));
    assert!(not_vip.matches(&context(json!({}))));
    assert!(!not_vip.matches(&context(json!({"customer_group": "VIP"}))));
}

#[test]
fn test_string_operators() {
    let ctx = context(json!({"article_reference": "TUBE-40-ALU"}));
    let cond = |op, v: &str| PricingCondition::new(ConditionType::ArticleReference, op, json!(v));
    assert!(evaluate_condition(&cond(ConditionOperator::Contains, "40"), &ctx));
    assert!(evaluate_condition(&cond(ConditionOperator::StartsWith, "TUBE"), &ctx));
    assert!(evaluate_condition(&cond(ConditionOperator::EndsWith, "ALU"), &ctx));
    assert!(!evaluate_condition(&cond(ConditionOperator::EndsWith, "INOX"), &ctx));
}

#[test]
fn test_membership_accepts_arrays_and_comma_lists() {
    let ctx = context(json!({"customer_group": "PRO", "quantity": 3}));
    let group = |op, v| PricingCondition::new(ConditionType::CustomerGroup, op, v);

    assert!(group(ConditionOperator::In, json!(["VIP", "PRO"])).matches(&ctx));
    assert!(group(ConditionOperator::In, json!("VIP, PRO ,B2B")).matches(&ctx));
    assert!(!group(ConditionOperator::In, json!("VIP,B2B")).matches(&ctx));
    assert!(group(ConditionOperator::NotIn, json!(["VIP"])).matches(&ctx));
    // a number never equals a list token
    assert!(!quantity(ConditionOperator::In, json!("1,3,5")).matches(&ctx));
    assert!(quantity(ConditionOperator::NotIn, json!("1,3,5")).matches(&ctx));
    assert!(quantity(ConditionOperator::In, json!([1, 3, 5])).matches(&ctx));
}

#[test]
fn test_field_fallback_and_unknown_operators() {
    let custom = PricingCondition::new(ConditionType::Custom, ConditionOperator::Equals, json!("red"))
        .with_field("color");
    assert!(custom.matches(&context(json!({"color": "red"}))));

    let unknown: PricingCondition =
        serde_json::from_value(json!({"type": "quantity", "operator": "roughly", "value": 3})).unwrap();
    assert_eq!(unknown.operator, ConditionOperator::Unknown);
    assert!(!unknown.matches(&context(json!({"quantity": 3}))));

    let after = quantity(ConditionOperator::After, json!(1));
    assert!(!after.matches(&context(json!({"quantity": 3}))));
}

#[test]
fn test_all_conditions_are_anded() {
    let conditions = vec![
        quantity(ConditionOperator::GreaterThan, json!(5)),
        PricingCondition::new(ConditionType::CustomerGroup, ConditionOperator::Equals, json!("VIP")),
    ];
    assert!(all_conditions_met(&conditions, &context(json!({"quantity": 10, "customer_group": "VIP"}))));
    assert!(!all_conditions_met(&conditions, &context(json!({"quantity": 10, "customer_group": "PRO"}))));
    assert!(all_conditions_met(&[], &context(json!({}))));
}

#[test]
fn test_rule_status_order() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let mut rule = PriceRule::new("r1", "Summer", AdjustmentType::Percentage, -10.0);
    assert_eq!(rule.status(now), RuleStatus::Active);

    rule.valid_from = Some(now + Duration::days(1));
    assert_eq!(rule.status(now), RuleStatus::Upcoming);

    rule.valid_until = Some(now - Duration::days(1));
    assert_eq!(rule.status(now), RuleStatus::Expired);

    rule.is_active = false;
    assert_eq!(rule.status(now), RuleStatus::Inactive);

    let mut limited = PriceRule::new("r2", "Launch", AdjustmentType::FixedAmount, -5.0);
    limited.usage_limit = Some(3);
    limited.usage_count = 3;
    assert_eq!(limited.status(now), RuleStatus::LimitReached);
    limited.usage_limit = Some(0);
    assert_eq!(limited.status(now), RuleStatus::Active);
}

#[test]
fn test_rule_validation() {
    let mut rule = PriceRule::new("r", " ", AdjustmentType::PricePerWeight, 2.0);
    assert_eq!(
        rule.validate(),
        vec![RuleValidationError::NameRequired, RuleValidationError::UnitRequired]
    );
    rule.rule_name = "By weight".to_string();
    rule.adjustment_unit = Some("kg".to_string());
    assert!(rule.validate().is_empty());

    let formula = PriceRule::new("f", "Formula", AdjustmentType::Formula, 0.0);
    assert_eq!(formula.validate(), vec![RuleValidationError::FormulaRequired]);
    let bad = formula.clone().with_formula("price * window");
    assert!(matches!(bad.validate()[0], RuleValidationError::InvalidFormula(_)));
    assert_eq!(bad.validate()[0].field(), "formula");
}

#[test]
fn test_pricing_formula_whitelist() {
    assert!(is_valid_pricing_formula("price * 0.9"));
    assert!(is_valid_pricing_formula("MAX(price - 5, quantity * 2)"));
    assert!(is_valid_pricing_formula("weight > 10 ? price * 0.8 : price"));
    assert!(!is_valid_pricing_formula("price; alert(1)"));
    assert!(!is_valid_pricing_formula("cost * 2"));
    assert!(!is_valid_pricing_formula("price * \"2\""));
}

#[test]
fn test_apply_adjustments() {
    let ctx = context(json!({"quantity": 2, "weight": 2.5, "length": 2000, "width": 500}));
    let apply = |rule: PriceRule| rule.apply(100.0, &ctx).unwrap();

    assert_eq!(apply(PriceRule::new("p", "P", AdjustmentType::Percentage, -10.0)), 90.0);
    assert_eq!(apply(PriceRule::new("a", "A", AdjustmentType::FixedAmount, 15.0)), 115.0);
    assert_eq!(apply(PriceRule::new("f", "F", AdjustmentType::FixedPrice, 42.0)), 42.0);
    assert_eq!(
        apply(PriceRule::new("w", "W", AdjustmentType::PricePerWeight, 4.0).with_unit("kg")),
        10.0
    );
    assert_eq!(
        apply(PriceRule::new("l", "L", AdjustmentType::PricePerLength, 3.0).with_unit("m")),
        6.0
    );
    // surface derived from length x width in mm
    assert_eq!(
        apply(PriceRule::new("s", "S", AdjustmentType::PricePerSurface, 10.0).with_unit("m2")),
        10.0
    );
    // no height, no volume
    assert_eq!(
        apply(PriceRule::new("v", "V", AdjustmentType::PricePerVolume, 10.0).with_unit("m3")),
        0.0
    );
    assert_eq!(
        apply(PriceRule::new("fx", "Fx", AdjustmentType::Formula, 0.0).with_formula("price * quantity - 250")),
        0.0
    );
    assert_eq!(
        apply(PriceRule::new("fm", "Fm", AdjustmentType::Formula, 0.0).with_formula("min(price, 80)")),
        80.0
    );

    let unknown_unit = PriceRule::new("u", "U", AdjustmentType::PricePerWeight, 1.0).with_unit("stone");
    assert!(matches!(
        unknown_unit.apply(100.0, &ctx),
        Err(PricingError::UnknownUnit { .. })
    ));
}

#[test]
fn test_simulation_applies_by_priority_and_stops_on_exclusive_rule() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let clock = ManualClock::new(now);
    let rules = vec![
        PriceRule::new("low", "Low priority", AdjustmentType::FixedAmount, -5.0).with_priority(1),
        PriceRule::new("vip", "VIP", AdjustmentType::Percentage, -10.0)
            .with_priority(10)
            .with_condition(PricingCondition::new(
                ConditionType::CustomerGroup,
                ConditionOperator::Equals,
                json!("VIP"),
            )),
        PriceRule::new("flat", "Flat", AdjustmentType::FixedPrice, 80.0)
            .with_priority(5)
            .exclusive(),
    ];
    let simulator = PriceSimulator::with_clock(rules, &clock);

    let result = simulator.simulate(100.0, &context(json!({"customer_group": "VIP"})));
    let applied: Vec<&str> = result.applied_rules.iter().map(|r| r.rule_id.as_str()).collect();
    assert_eq!(applied, vec!["vip", "flat"]);
    assert_eq!(result.final_price, 80.0);
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[0].price_before, 100.0);
    assert_eq!(result.steps[0].price_after, 90.0);
    assert_eq!(result.steps[1].step_number, 2);
    assert_eq!(result.total_discount, 20.0);
    assert_eq!(result.total_discount_percentage, 20.0);

    let result = simulator.simulate(100.0, &context(json!({"customer_group": "PRO"})));
    assert_eq!(result.skipped_rules.len(), 1);
    assert_eq!(result.skipped_rules[0].rule_id, "vip");
    assert_eq!(result.skipped_rules[0].reason, "Conditions not met");
    assert_eq!(result.final_price, 80.0);
}

#[test]
fn test_simulation_reports_skip_reasons_and_warnings() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let mut expired = PriceRule::new("old", "Old", AdjustmentType::Percentage, -50.0);
    expired.valid_until = Some(now - Duration::days(10));
    let mut upcoming = PriceRule::new("new", "New", AdjustmentType::Percentage, -50.0);
    upcoming.valid_from = Some(now + Duration::days(10));
    let mut used_up = PriceRule::new("used", "Used", AdjustmentType::Percentage, -50.0);
    used_up.usage_limit = Some(1);
    used_up.usage_count = 1;
    let broken = PriceRule::new("bad", "Bad unit", AdjustmentType::PricePerWeight, 1.0).with_unit("stone");
    let noop = PriceRule::new("zero", "Zero", AdjustmentType::FixedAmount, 0.0);
    let big = PriceRule::new("big", "Big discount", AdjustmentType::FixedAmount, -500.0);

    let simulator = PriceSimulator::with_clock(
        vec![expired, upcoming, used_up, broken, noop, big],
        ManualClock::new(now),
    );
    let result = simulator.simulate(100.0, &context(json!({"weight": 1})));

    let reasons: Vec<&str> = result.skipped_rules.iter().map(|s| s.reason.as_str()).collect();
    assert_eq!(reasons, vec!["Rule expired", "Rule not yet valid", "Usage limit reached"]);
    assert_eq!(result.warnings.len(), 1);
    // unchanged prices are not recorded
    let applied: Vec<&str> = result.applied_rules.iter().map(|r| r.rule_id.as_str()).collect();
    assert_eq!(applied, vec!["big"]);
    assert_eq!(result.final_price, 0.0);
    // usage counts are never touched
    assert_eq!(simulator.rules()[2].usage_count, 1);
}

#[test]
fn test_quantity_defaults_to_one_and_bounds_apply() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let mut bulk = PriceRule::new("bulk", "Bulk", AdjustmentType::Percentage, -20.0);
    bulk.min_quantity = Some(10.0);
    let per_piece = PriceRule::new("pp", "Per piece", AdjustmentType::Formula, 0.0)
        .with_formula("price * quantity")
        .with_priority(-1);

    let simulator = PriceSimulator::with_clock(vec![bulk, per_piece], ManualClock::new(now));
    let single = simulator.simulate(50.0, &PricingContext::new());
    assert_eq!(single.final_price, 50.0);
    assert_eq!(single.skipped_rules[0].rule_id, "bulk");

    let many = simulator.simulate(50.0, &context(json!({"quantity": 10})));
    assert_eq!(many.final_price, 400.0);
}

#[test]
fn test_rules_deserialize_from_json() {
    let rule: PriceRule = serde_json::from_value(json!({
        "id": "r1",
        "ruleName": "VIP",
        "adjustmentType": "PERCENTAGE",
        "adjustmentValue": -15,
        "conditions": [{"type": "customer_group", "operator": "in", "value": "VIP,GOLD"}],
        "priority": 3
    }))
    .unwrap();
    assert!(rule.combinable);
    assert!(rule.is_active);
    assert_eq!(rule.describe_adjustment(), "-15%");
    assert_eq!(rule.apply(200.0, &PricingContext::new()).unwrap(), 170.0);
}
