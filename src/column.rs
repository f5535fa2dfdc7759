use crate::cell::CellValue;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    Text,
    Number,
    Boolean,
    Date,
    Datetime,
    Select,
    Multiselect,
    Formula,
    Richtext,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: CellValue,
    pub label: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Regular expression text values must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Display format applied on export.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnFormat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    /// chrono format string for dates, e.g. `%d/%m/%Y`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Configuration of one grid column.
///
/// `id` identifies the column in selections, filters and settings; `key` is
/// the field read from each row. They are usually the same.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnConfig {
    pub id: String,
    pub key: String,
    pub title: String,
    #[serde(rename = "type", default)]
    pub column_type: ColumnType,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub searchable: bool,
    #[serde(default = "default_true")]
    pub sortable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ColumnValidation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ColumnFormat>,
    /// Expression evaluated per row for [`ColumnType::Formula`] columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

impl ColumnConfig {
    pub fn new(id: &str, title: &str, column_type: ColumnType) -> Self {
        ColumnConfig {
            id: id.to_string(),
            key: id.to_string(),
            title: title.to_string(),
            column_type,
            required: false,
            visible: true,
            searchable: true,
            sortable: true,
            width: None,
            options: Vec::new(),
            validation: None,
            format: None,
            formula: None,
        }
    }

    pub fn formula(id: &str, title: &str, expression: &str) -> Self {
        let mut column = Self::new(id, title, ColumnType::Formula);
        column.formula = Some(expression.to_string());
        column
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn with_options(mut self, options: Vec<SelectOption>) -> Self {
        self.options = options;
        self
    }

    pub fn with_validation(mut self, validation: ColumnValidation) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn with_format(mut self, format: ColumnFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// Convert column letters to a zero-based column index (A=0, Z=25, AA=26).
///
/// Returns `None` for empty input, non-letters, or sequences too long to
/// address. Letters are case-insensitive.
pub fn letters_to_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut number: usize = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = (c.to_ascii_uppercase() as u8 - b'A' + 1) as usize;
        number = number.checked_mul(26)?.checked_add(digit)?;
    }
    Some(number - 1)
}

/// Convert a zero-based column index back to letters (0=A, 25=Z, 26=AA).
pub fn index_to_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut result = String::new();
    while n > 0 {
        n -= 1;
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    result
}

/// Position of `column_id` inside an ordered list of columns.
pub fn position_of(columns: &[ColumnConfig], column_id: &str) -> Option<usize> {
    columns.iter().position(|c| c.id == column_id)
}
