use crate::cell::CellValue;
use crate::column::ColumnConfig;
use crate::table::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub struct PaletteEntry {
    pub background: &'static str,
    pub text: &'static str,
    pub name: &'static str,
}

pub const PREDEFINED_COLORS: [PaletteEntry; 8] = [
    PaletteEntry { background: "#fef2f2", text: "#991b1b", name: "Light red" },
    PaletteEntry { background: "#fff7ed", text: "#9a3412", name: "Light orange" },
    PaletteEntry { background: "#fffbeb", text: "#92400e", name: "Light yellow" },
    PaletteEntry { background: "#f0fdf4", text: "#166534", name: "Light green" },
    PaletteEntry { background: "#f0f9ff", text: "#1e40af", name: "Light blue" },
    PaletteEntry { background: "#faf5ff", text: "#7c3aed", name: "Light violet" },
    PaletteEntry { background: "#fdf2f8", text: "#be185d", name: "Light pink" },
    PaletteEntry { background: "#f8fafc", text: "#475569", name: "Light grey" },
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorCondition {
    Equals,
    Contains,
    Greater,
    Less,
    Between,
    Empty,
    NotEmpty,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyTo {
    #[default]
    Cell,
    Row,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorRule {
    pub id: String,
    pub name: String,
    pub column_id: String,
    pub condition: ColorCondition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<CellValue>,
    /// Upper bound for `between`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value2: Option<CellValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default)]
    pub apply_to: ApplyTo,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub enabled: bool,
}

impl ColorRule {
    /// A fresh enabled `equals` rule on `column_id` in the first palette colour.
    pub fn new(name: &str, column_id: &str, priority: i32) -> Self {
        let palette = &PREDEFINED_COLORS[0];
        ColorRule {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            column_id: column_id.to_string(),
            condition: ColorCondition::Equals,
            value: None,
            value2: None,
            background_color: Some(palette.background.to_string()),
            text_color: Some(palette.text.to_string()),
            apply_to: ApplyTo::Cell,
            priority,
            enabled: true,
        }
    }

    pub fn when(mut self, condition: ColorCondition, value: Option<CellValue>) -> Self {
        self.condition = condition;
        self.value = value;
        self
    }

    pub fn between(mut self, low: CellValue, high: CellValue) -> Self {
        self.condition = ColorCondition::Between;
        self.value = Some(low);
        self.value2 = Some(high);
        self
    }

    pub fn on_row(mut self) -> Self {
        self.apply_to = ApplyTo::Row;
        self
    }

    pub fn colors(mut self, background: &str, text: &str) -> Self {
        self.background_color = Some(background.to_string());
        self.text_color = Some(text.to_string());
        self
    }

    pub fn matches(&self, value: &CellValue) -> bool {
        let operand = self.value.clone().unwrap_or_default();
        match self.condition {
            ColorCondition::Equals => value.display() == operand.display(),
            ColorCondition::Contains => value
                .display()
                .to_lowercase()
                .contains(&operand.display().to_lowercase()),
            ColorCondition::Greater => value.to_number() > operand.to_number(),
            ColorCondition::Less => value.to_number() < operand.to_number(),
            ColorCondition::Between => {
                let n = value.to_number();
                let high = self.value2.clone().unwrap_or_default();
                n >= operand.to_number() && n <= high.to_number()
            }
            ColorCondition::Empty => value.is_empty_trimmed(),
            ColorCondition::NotEmpty => !value.is_empty_trimmed(),
        }
    }

    fn style(&self) -> CellStyle {
        CellStyle {
            background_color: self.background_color.clone(),
            text_color: self.text_color.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellStyle {
    pub background_color: Option<String>,
    pub text_color: Option<String>,
}

/// The rules of one table, evaluated in ascending priority.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorRuleSet {
    pub rules: Vec<ColorRule>,
}

impl ColorRuleSet {
    pub fn new(rules: Vec<ColorRule>) -> Self {
        ColorRuleSet { rules }
    }

    /// Create, store and return a default rule on the first column.
    pub fn add_default_rule(&mut self, columns: &[ColumnConfig]) -> &ColorRule {
        let column_id = columns.first().map(|c| c.id.as_str()).unwrap_or("");
        let priority = self.rules.len() as i32 + 1;
        self.rules.push(ColorRule::new("New rule", column_id, priority));
        &self.rules[self.rules.len() - 1]
    }

    pub fn upsert(&mut self, rule: ColorRule) {
        match self.rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        self.rules.len() != before
    }

    fn active_rules(&self) -> Vec<&ColorRule> {
        let mut rules: Vec<&ColorRule> = self.rules.iter().filter(|r| r.enabled).collect();
        rules.sort_by_key(|r| r.priority);
        rules
    }

    fn rule_matches_row(rule: &ColorRule, row: &Row, columns: &[ColumnConfig]) -> bool {
        columns
            .iter()
            .find(|c| c.id == rule.column_id)
            .is_some_and(|c| rule.matches(row.get(&c.key).unwrap_or(&CellValue::Null)))
    }

    /// Style for one cell: the first enabled rule that either targets this
    /// cell's column or colours the whole row, and whose condition holds.
    pub fn cell_style(
        &self,
        row: &Row,
        columns: &[ColumnConfig],
        column_id: &str,
    ) -> Option<CellStyle> {
        self.active_rules()
            .into_iter()
            .find(|rule| {
                (rule.apply_to == ApplyTo::Row || rule.column_id == column_id)
                    && Self::rule_matches_row(rule, row, columns)
            })
            .map(ColorRule::style)
    }

    pub fn row_style(&self, row: &Row, columns: &[ColumnConfig]) -> Option<CellStyle> {
        self.active_rules()
            .into_iter()
            .find(|rule| rule.apply_to == ApplyTo::Row && Self::rule_matches_row(rule, row, columns))
            .map(ColorRule::style)
    }
}
