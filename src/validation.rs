use crate::cell::{CellValue, parse_number};
use crate::column::{ColumnConfig, ColumnType};
use crate::formula::{parse_date, validate_formula};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

/// Outcome of checking one edited or imported value against its column.
///
/// `error` blocks the save; `warning` lets it through but flags the value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error: Option<String>,
    pub warning: Option<String>,
    pub converted_value: Option<CellValue>,
}

impl ValidationResult {
    fn ok(value: CellValue) -> Self {
        ValidationResult {
            is_valid: true,
            converted_value: Some(value),
            ..Default::default()
        }
    }

    fn error(message: impl Into<String>) -> Self {
        ValidationResult {
            is_valid: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }

    fn warning(value: CellValue, message: impl Into<String>) -> Self {
        ValidationResult {
            is_valid: true,
            warning: Some(message.into()),
            converted_value: Some(value),
            ..Default::default()
        }
    }

    /// The value to store: the converted one when present, else `original`.
    pub fn value_or(self, original: CellValue) -> CellValue {
        self.converted_value.unwrap_or(original)
    }
}

const TRUE_WORDS: [&str; 5] = ["true", "1", "oui", "yes", "vrai"];
const FALSE_WORDS: [&str; 5] = ["false", "0", "non", "no", "faux"];

pub fn validate_value(value: &CellValue, column: &ColumnConfig) -> ValidationResult {
    if value.is_blank() {
        if column.required {
            return ValidationResult::error(format!("{} is required", column.title));
        }
        return ValidationResult::ok(CellValue::Null);
    }

    match column.column_type {
        ColumnType::Number => validate_number(value, column),
        ColumnType::Boolean => match value {
            CellValue::Bool(b) => ValidationResult::ok(CellValue::Bool(*b)),
            other => {
                let word = other.display().trim().to_lowercase();
                if TRUE_WORDS.contains(&word.as_str()) {
                    ValidationResult::ok(CellValue::Bool(true))
                } else if FALSE_WORDS.contains(&word.as_str()) {
                    ValidationResult::ok(CellValue::Bool(false))
                } else {
                    ValidationResult::error("must be true or false")
                }
            }
        },
        ColumnType::Date | ColumnType::Datetime => match to_date(value) {
            Some(d) => ValidationResult::ok(CellValue::Date(d)),
            None => ValidationResult::error("invalid date format"),
        },
        ColumnType::Select => validate_select(value, column),
        ColumnType::Formula => match validate_formula(&value.display()) {
            Ok(()) => ValidationResult::ok(value.clone()),
            Err(e) => ValidationResult::error(format!("invalid formula: {}", e)),
        },
        ColumnType::Text | ColumnType::Richtext => validate_text(value, column),
        ColumnType::Multiselect => ValidationResult::ok(value.clone()),
    }
}

fn validate_number(value: &CellValue, column: &ColumnConfig) -> ValidationResult {
    let n = match value {
        CellValue::Number(n) => *n,
        CellValue::Text(s) => parse_number(&s.replace(',', ".")),
        other => other.to_number(),
    };
    if n.is_nan() {
        return ValidationResult::error("must be a number");
    }
    if let Some(rules) = &column.validation {
        if let Some(min) = rules.min.filter(|min| n < *min) {
            return ValidationResult::error(format!("minimum: {}", min));
        }
        if let Some(max) = rules.max.filter(|max| n > *max) {
            return ValidationResult::error(format!("maximum: {}", max));
        }
    }
    ValidationResult::ok(CellValue::Number(n))
}

fn validate_select(value: &CellValue, column: &ColumnConfig) -> ValidationResult {
    if column.options.is_empty() {
        return ValidationResult::ok(value.clone());
    }
    let text = value.display();
    match column
        .options
        .iter()
        .find(|o| o.value.display() == text || o.label == text)
    {
        Some(option) => ValidationResult::ok(option.value.clone()),
        None => ValidationResult::warning(value.clone(), format!("unrecognised value: {}", text)),
    }
}

fn validate_text(value: &CellValue, column: &ColumnConfig) -> ValidationResult {
    let text = value.display().trim().to_string();
    let pattern = column.validation.as_ref().and_then(|v| v.pattern.as_deref());
    if let Some(pattern) = pattern {
        match Regex::new(pattern) {
            Ok(re) if !re.is_match(&text) => {
                return ValidationResult::error(format!("does not match pattern {}", pattern));
            }
            Ok(_) => {}
            Err(_) => return ValidationResult::error(format!("invalid pattern {}", pattern)),
        }
    }
    ValidationResult::ok(CellValue::Text(text))
}

/// Dates as typed by users or found in files: RFC 3339, `YYYY-MM-DD`,
/// `YYYY-MM-DD HH:MM:SS`, `DD/MM/YYYY`, or a millisecond timestamp.
pub fn to_date(value: &CellValue) -> Option<DateTime<Utc>> {
    match value {
        CellValue::Date(d) => Some(*d),
        CellValue::Number(n) if n.is_finite() => Utc.timestamp_millis_opt(*n as i64).single(),
        CellValue::Text(s) => {
            let s = s.trim();
            if let Some(d) = parse_date(s) {
                return Some(d);
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(Utc.from_utc_datetime(&naive));
            }
            let day = NaiveDate::parse_from_str(s, "%d/%m/%Y").ok()?;
            Some(Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0)?))
        }
        _ => None,
    }
}
