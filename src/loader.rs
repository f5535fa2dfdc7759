use crate::cell::CellValue;
use crate::column::ColumnConfig;
use crate::table::Row;
use crate::validation::validate_value;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::Path;

/// How delimited text is read before validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportOptions {
    /// Field separator; detected from the header line when `None`.
    pub delimiter: Option<char>,
    pub skip_empty_rows: bool,
    pub trim_values: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            delimiter: None,
            skip_empty_rows: true,
            trim_values: true,
        }
    }
}

/// A problem tied to a spreadsheet position. `row` counts the header as
/// row 1, so the first data row is 2; 0 means the file as a whole.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImportIssue {
    pub row: usize,
    pub column: String,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ImportResult {
    pub success: bool,
    pub rows: Vec<Row>,
    pub errors: Vec<ImportIssue>,
    pub warnings: Vec<ImportIssue>,
}

/// Load and validate a CSV or TSV file against `columns`.
///
/// I/O failures are returned as errors; everything wrong with the content is
/// reported inside the [`ImportResult`].
///
/// # Examples
/// ```no_run
/// use datatable::column::{ColumnConfig, ColumnType};
/// use datatable::loader::{import_file, ImportOptions};
///
/// let columns = vec![ColumnConfig::new("name", "Name", ColumnType::Text)];
/// match import_file("articles.csv", &columns, &ImportOptions::default()) {
///     Ok(result) => println!("imported {} rows, {} errors", result.rows.len(), result.errors.len()),
///     Err(e) => eprintln!("Error loading CSV: {}", e),
/// }
/// ```
pub fn import_file(
    path: impl AsRef<Path>,
    columns: &[ColumnConfig],
    options: &ImportOptions,
) -> Result<ImportResult, Box<dyn Error>> {
    let text = fs::read_to_string(path)?;
    Ok(import_text(&text, columns, options))
}

pub fn import_text(text: &str, columns: &[ColumnConfig], options: &ImportOptions) -> ImportResult {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let delimiter = options
        .delimiter
        .unwrap_or_else(|| detect_delimiter(text.lines().next().unwrap_or("")));

    let mut records = parse_delimited(text, delimiter);
    if options.trim_values {
        for record in records.iter_mut() {
            for field in record.iter_mut() {
                *field = field.trim().to_string();
            }
        }
    }
    if options.skip_empty_rows {
        let mut kept = Vec::with_capacity(records.len());
        for (i, record) in records.into_iter().enumerate() {
            if i == 0 || record.iter().any(|f| !f.trim().is_empty()) {
                kept.push(record);
            }
        }
        records = kept;
    }

    import_records(&records, columns)
}

/// Validate parsed records, the first of which is the header line.
///
/// Rows with any column error are left out of `rows`; the others are kept
/// with values converted to the column types.
pub fn import_records(records: &[Vec<String>], columns: &[ColumnConfig]) -> ImportResult {
    let mut result = ImportResult {
        success: true,
        ..Default::default()
    };

    let Some((headers, data)) = records.split_first() else {
        result.success = false;
        result.errors.push(ImportIssue {
            row: 0,
            column: String::new(),
            message: "no data found".to_string(),
        });
        return result;
    };

    let mapping = map_columns(headers, columns);

    for (index, record) in data.iter().enumerate() {
        let row_number = index + 2;
        let mut row = Row::new();
        let mut has_errors = false;

        for column in columns {
            let raw = mapping
                .get(&column.id)
                .and_then(|&i| record.get(i))
                .map_or(CellValue::Null, |s| CellValue::Text(s.clone()));

            let checked = validate_value(&raw, column);
            if let Some(message) = &checked.error {
                result.errors.push(ImportIssue {
                    row: row_number,
                    column: column.title.clone(),
                    message: message.clone(),
                });
                has_errors = true;
            } else if let Some(message) = &checked.warning {
                result.warnings.push(ImportIssue {
                    row: row_number,
                    column: column.title.clone(),
                    message: message.clone(),
                });
            }
            row.insert(column.key.clone(), checked.value_or(raw));
        }

        if !has_errors {
            result.rows.push(row);
        }
    }

    if !result.errors.is_empty() {
        result.success = false;
    }
    info!(
        "import: {} of {} rows accepted, {} errors, {} warnings",
        result.rows.len(),
        data.len(),
        result.errors.len(),
        result.warnings.len()
    );
    result
}

/// Header position for each column id: an exact case-insensitive title
/// match first, then a header containing the title or contained in it.
pub fn map_columns(headers: &[String], columns: &[ColumnConfig]) -> BTreeMap<String, usize> {
    let normalized: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    let mut mapping = BTreeMap::new();

    for column in columns {
        let title = column.title.trim().to_lowercase();
        let found = normalized.iter().position(|h| *h == title).or_else(|| {
            normalized
                .iter()
                .position(|h| !h.is_empty() && (h.contains(&title) || title.contains(h.as_str())))
        });
        if let Some(index) = found {
            mapping.insert(column.id.clone(), index);
        }
    }
    mapping
}

/// Pick `,`, `;` or tab, whichever appears most outside quotes.
pub fn detect_delimiter(header_line: &str) -> char {
    let mut counts = [(',', 0usize), (';', 0), ('\t', 0)];
    let mut in_quotes = false;
    for c in header_line.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if !in_quotes {
            if let Some(entry) = counts.iter_mut().find(|(d, _)| *d == c) {
                entry.1 += 1;
            }
        }
    }
    counts
        .iter()
        .fold((',', 0), |best, &(d, n)| if n > best.1 { (d, n) } else { best })
        .0
}

/// Split delimited text into records. Quoted fields may contain the
/// delimiter, newlines and doubled quotes.
pub fn parse_delimited(text: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    // Double quote inside quoted field - add a single quote
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.is_empty() => in_quotes = true,
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' if !in_quotes => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            c if c == delimiter && !in_quotes => {
                record.push(std::mem::take(&mut field));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}
