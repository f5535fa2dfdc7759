//! Grid view state: global search, column filters, advanced filter groups,
//! multi-key sorting and column ordering.
//!
//! A [`ViewState`] is plain data so it can be persisted through
//! [`crate::settings`]; [`ViewState::apply`] turns it into the visible rows.

use crate::cell::CellValue;
use crate::column::ColumnConfig;
use crate::table::Row;
use crate::validation::to_date;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

lazy_static! {
    static ref HTML_TAG_REGEX: Regex = Regex::new(r"<[^>]*>").unwrap();
}

/// Marker used by checkbox filters to select empty cells.
pub const EMPTY_MARKER: &str = "(Vide)";

/// Order given to columns without a saved position.
pub const DEFAULT_COLUMN_ORDER: i32 = 999;

pub fn strip_html(s: &str) -> String {
    HTML_TAG_REGEX.replace_all(s, "").trim().to_string()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortConfig {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortConfig {
    pub fn asc(column: &str) -> Self {
        SortConfig {
            column: column.to_string(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: &str) -> Self {
        SortConfig {
            column: column.to_string(),
            direction: SortDirection::Desc,
        }
    }
}

/// Structured filter produced by the column filter popover.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StructuredFilter {
    /// Checkbox list of display values; [`EMPTY_MARKER`] selects empties.
    #[serde(rename = "values")]
    Values { values: Vec<String> },
    #[serde(rename = "range")]
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    #[serde(rename = "dateRange")]
    DateRange {
        #[serde(default)]
        start: Option<CellValue>,
        #[serde(default)]
        end: Option<CellValue>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Structured(StructuredFilter),
    Scalar(CellValue),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    Gt,
    Lt,
    Gte,
    Lte,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<FilterOperator>,
    pub value: FilterValue,
}

impl ColumnFilter {
    pub fn values(column: &str, values: &[&str]) -> Self {
        ColumnFilter {
            column: column.to_string(),
            operator: None,
            value: FilterValue::Structured(StructuredFilter::Values {
                values: values.iter().map(|v| v.to_string()).collect(),
            }),
        }
    }

    pub fn range(column: &str, min: Option<f64>, max: Option<f64>) -> Self {
        ColumnFilter {
            column: column.to_string(),
            operator: None,
            value: FilterValue::Structured(StructuredFilter::Range { min, max }),
        }
    }

    pub fn operator(column: &str, operator: FilterOperator, value: CellValue) -> Self {
        ColumnFilter {
            column: column.to_string(),
            operator: Some(operator),
            value: FilterValue::Scalar(value),
        }
    }

    pub fn matches(&self, value: &CellValue) -> bool {
        match &self.value {
            FilterValue::Structured(filter) => structured_matches(filter, value),
            FilterValue::Scalar(expected) => {
                let Some(operator) = self.operator else {
                    return true;
                };
                let text = || loose_text(value).to_lowercase();
                let needle = || expected.display().to_lowercase();
                match operator {
                    FilterOperator::Equals => value == expected,
                    FilterOperator::Contains => text().contains(&needle()),
                    FilterOperator::StartsWith => text().starts_with(&needle()),
                    FilterOperator::EndsWith => text().ends_with(&needle()),
                    FilterOperator::Gt => value.to_number() > expected.to_number(),
                    FilterOperator::Lt => value.to_number() < expected.to_number(),
                    FilterOperator::Gte => value.to_number() >= expected.to_number(),
                    FilterOperator::Lte => value.to_number() <= expected.to_number(),
                    FilterOperator::Unknown => true,
                }
            }
        }
    }
}

fn structured_matches(filter: &StructuredFilter, value: &CellValue) -> bool {
    match filter {
        StructuredFilter::Values { values } => {
            let is_empty = match value {
                CellValue::Null => true,
                CellValue::Text(s) => strip_html(s).is_empty(),
                _ => false,
            };
            if is_empty {
                return values.iter().any(|v| v == EMPTY_MARKER);
            }
            let shown = match value {
                CellValue::Bool(true) => "Oui".to_string(),
                CellValue::Bool(false) => "Non".to_string(),
                CellValue::Text(s) if s.contains('<') => strip_html(s),
                other => other.display(),
            };
            values.contains(&shown)
        }
        StructuredFilter::Range { min, max } => {
            let n = value.to_number();
            !n.is_nan() && min.is_none_or(|min| n >= min) && max.is_none_or(|max| n <= max)
        }
        StructuredFilter::DateRange { start, end } => {
            let Some(date) = to_date(value) else {
                return false;
            };
            let after_start = match start.as_ref().filter(|s| s.truthy()) {
                Some(start) => to_date(start).is_some_and(|s| date >= s),
                None => true,
            };
            let before_end = match end.as_ref().filter(|e| e.truthy()) {
                Some(end) => to_date(end).is_some_and(|e| date <= e),
                None => true,
            };
            after_start && before_end
        }
    }
}

/// Text form where falsy values read as empty.
fn loose_text(value: &CellValue) -> String {
    if value.truthy() {
        value.display()
    } else {
        String::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvancedOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
    In,
    NotIn,
    IsEmpty,
    IsNotEmpty,
    #[serde(other)]
    Unknown,
}

fn default_enabled() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdvancedFilterRule {
    pub column: String,
    pub operator: AdvancedOperator,
    #[serde(default)]
    pub value: CellValue,
    #[serde(default)]
    pub value2: CellValue,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl AdvancedFilterRule {
    pub fn new(column: &str, operator: AdvancedOperator, value: CellValue) -> Self {
        AdvancedFilterRule {
            column: column.to_string(),
            operator,
            value,
            value2: CellValue::Null,
            enabled: true,
        }
    }

    pub fn matches(&self, value: &CellValue) -> bool {
        let text = || loose_text(value).to_lowercase();
        let needle = || loose_text(&self.value).to_lowercase();
        let tokens = || {
            self.value
                .display()
                .split(',')
                .map(|t| t.trim().to_string())
                .collect::<Vec<_>>()
        };
        match self.operator {
            AdvancedOperator::Equals => *value == self.value,
            AdvancedOperator::NotEquals => *value != self.value,
            AdvancedOperator::Contains => text().contains(&needle()),
            AdvancedOperator::NotContains => !text().contains(&needle()),
            AdvancedOperator::StartsWith => text().starts_with(&needle()),
            AdvancedOperator::EndsWith => text().ends_with(&needle()),
            AdvancedOperator::Gt => value.to_number() > self.value.to_number(),
            AdvancedOperator::Gte => value.to_number() >= self.value.to_number(),
            AdvancedOperator::Lt => value.to_number() < self.value.to_number(),
            AdvancedOperator::Lte => value.to_number() <= self.value.to_number(),
            AdvancedOperator::Between => {
                let n = value.to_number();
                n >= self.value.to_number() && n <= self.value2.to_number()
            }
            AdvancedOperator::In => tokens().contains(&value.display()),
            AdvancedOperator::NotIn => !tokens().contains(&value.display()),
            AdvancedOperator::IsEmpty => value.is_empty_trimmed(),
            AdvancedOperator::IsNotEmpty => !value.is_empty_trimmed(),
            AdvancedOperator::Unknown => true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterLogic {
    #[default]
    And,
    Or,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvancedFilterGroup {
    #[serde(default)]
    pub logic: FilterLogic,
    #[serde(default)]
    pub rules: Vec<AdvancedFilterRule>,
}

impl AdvancedFilterGroup {
    /// A group with no enabled rules lets every row through. A rule on a
    /// column that is not shown fails.
    pub fn matches(&self, row: &Row, columns: &[ColumnConfig]) -> bool {
        let results: Vec<bool> = self
            .rules
            .iter()
            .filter(|r| r.enabled)
            .map(|rule| {
                columns
                    .iter()
                    .find(|c| c.id == rule.column)
                    .is_some_and(|c| rule.matches(cell(row, &c.key)))
            })
            .collect();
        if results.is_empty() {
            return true;
        }
        match self.logic {
            FilterLogic::And => results.iter().all(|r| *r),
            FilterLogic::Or => results.iter().any(|r| *r),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub filters: Vec<ColumnFilter>,
    #[serde(default)]
    pub advanced_filters: Vec<AdvancedFilterGroup>,
    #[serde(default)]
    pub sort: Vec<SortConfig>,
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnSettings>,
}

fn cell<'a>(row: &'a Row, key: &str) -> &'a CellValue {
    row.get(key).unwrap_or(&CellValue::Null)
}

impl ViewState {
    /// Columns to display: saved visibility wins over the column's own flag,
    /// then saved order ascending (unsaved columns last, declaration order kept).
    pub fn ordered_columns(&self, columns: &[ColumnConfig]) -> Vec<ColumnConfig> {
        let mut ordered: Vec<ColumnConfig> = columns
            .iter()
            .filter(|c| {
                self.columns
                    .get(&c.id)
                    .and_then(|s| s.visible)
                    .unwrap_or(c.visible)
            })
            .cloned()
            .collect();
        ordered.sort_by_key(|c| {
            self.columns
                .get(&c.id)
                .and_then(|s| s.order)
                .unwrap_or(DEFAULT_COLUMN_ORDER)
        });
        ordered
    }

    pub fn set_column_order(&mut self, column_ids: &[&str]) {
        for (i, id) in column_ids.iter().enumerate() {
            self.columns.entry(id.to_string()).or_default().order = Some(i as i32);
        }
    }

    pub fn toggle_sort(&mut self, column: &str) {
        match self.sort.iter().position(|s| s.column == column) {
            Some(i) if self.sort[i].direction == SortDirection::Asc => {
                self.sort[i].direction = SortDirection::Desc
            }
            Some(i) => {
                self.sort.remove(i);
            }
            None => self.sort.push(SortConfig::asc(column)),
        }
    }

    /// Indices into `rows` that survive search and filters, in sorted order.
    pub fn visible_indices(&self, rows: &[Row], columns: &[ColumnConfig]) -> Vec<usize> {
        let columns = self.ordered_columns(columns);
        let search = self.search.trim().to_lowercase();

        let mut indices: Vec<usize> = (0..rows.len())
            .filter(|&i| search.is_empty() || row_matches_search(&rows[i], &columns, &search))
            .filter(|&i| {
                self.filters.iter().all(|f| {
                    let key = columns
                        .iter()
                        .find(|c| c.id == f.column)
                        .map_or(f.column.as_str(), |c| c.key.as_str());
                    f.matches(cell(&rows[i], key))
                })
            })
            .filter(|&i| {
                self.advanced_filters
                    .iter()
                    .all(|g| g.matches(&rows[i], &columns))
            })
            .collect();

        // Each key is a separate stable sort, so the last key dominates.
        for sort in &self.sort {
            let key = columns
                .iter()
                .find(|c| c.id == sort.column)
                .map_or(sort.column.as_str(), |c| c.key.as_str());
            indices.sort_by(|&a, &b| {
                compare_for_sort(cell(&rows[a], key), cell(&rows[b], key), sort.direction)
            });
        }
        indices
    }

    pub fn apply(&self, rows: &[Row], columns: &[ColumnConfig]) -> Vec<Row> {
        self.visible_indices(rows, columns)
            .into_iter()
            .map(|i| rows[i].clone())
            .collect()
    }
}

fn row_matches_search(row: &Row, columns: &[ColumnConfig], search: &str) -> bool {
    columns
        .iter()
        .filter(|c| c.searchable)
        .any(|c| match cell(row, &c.key) {
            CellValue::Null => false,
            CellValue::Text(s) => strip_html(s).to_lowercase().contains(search),
            CellValue::Number(n) => n.to_string().contains(search),
            CellValue::Bool(true) => "oui true vrai".contains(search),
            CellValue::Bool(false) => "non false faux".contains(search),
            CellValue::Date(d) => d.format("%d/%m/%Y").to_string().contains(search),
        })
}

/// Nulls sort first ascending and last descending.
pub fn compare_for_sort(a: &CellValue, b: &CellValue, direction: SortDirection) -> Ordering {
    let ordering = match (a, b) {
        (CellValue::Null, CellValue::Null) => Ordering::Equal,
        (CellValue::Null, _) => Ordering::Less,
        (_, CellValue::Null) => Ordering::Greater,
        (CellValue::Text(x), CellValue::Text(y)) => sort_text(x).cmp(&sort_text(y)),
        (CellValue::Date(x), CellValue::Date(y)) => x.cmp(y),
        (CellValue::Bool(x), CellValue::Bool(y)) => x.cmp(y),
        (CellValue::Number(x), CellValue::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (x, y) => x
            .to_number()
            .partial_cmp(&y.to_number())
            .unwrap_or(Ordering::Equal),
    };
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

fn sort_text(s: &str) -> String {
    if s.contains('<') {
        strip_html(s)
    } else {
        s.to_string()
    }
}
