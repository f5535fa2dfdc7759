use crate::cell::CellValue;
use crate::column::{ColumnConfig, ColumnFormat, ColumnType};
use crate::table::Row;
use crate::view::strip_html;
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use lazy_static::lazy_static;
use log::info;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::error::Error;

lazy_static! {
    static ref SCRIPT_REGEX: Regex = Regex::new(r"(?is)<script\b.*?</script>").unwrap();
    static ref STYLE_REGEX: Regex = Regex::new(r"(?is)<style\b.*?</style>").unwrap();
}

const PRINT_TEMPLATE: &str = r#"<html>
<head>
<meta charset="utf-8">
<title>{{title}}</title>
<style>
body { font-family: Arial, sans-serif; font-size: 12px; margin: 20px; }
table { width: 100%; border-collapse: collapse; margin-top: 20px; }
th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
th { background-color: #f5f5f5; font-weight: bold; }
tr:nth-child(even) { background-color: #f9f9f9; }
.number { text-align: right; }
.center { text-align: center; }
.header { text-align: center; margin-bottom: 20px; }
.footer { margin-top: 20px; font-size: 10px; color: #666; }
</style>
</head>
<body>
<div class="header">
<h1>{{title}}</h1>
<p>Generated on {{generated}}</p>
<p>Rows: {{row_count}} | Columns: {{column_count}}</p>
</div>
<table>
{{#if headers}}<thead><tr>{{#each headers}}<th>{{this}}</th>{{/each}}</tr></thead>{{/if}}
<tbody>
{{#each rows}}<tr>{{#each this}}<td class="{{class}}">{{#if raw}}{{{value}}}{{else}}{{value}}{{/if}}</td>{{/each}}</tr>
{{/each}}</tbody>
</table>
<div class="footer"><p>Exported by datatable-kit</p></div>
</body>
</html>
"#;

/// Export settings shared by every format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportOptions {
    pub include_headers: bool,
    pub visible_only: bool,
    pub title: String,
    pub sheet_name: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            include_headers: true,
            visible_only: true,
            title: "Data export".to_string(),
            sheet_name: "Data".to_string(),
        }
    }
}

fn export_columns<'a>(columns: &'a [ColumnConfig], options: &ExportOptions) -> Vec<&'a ColumnConfig> {
    columns
        .iter()
        .filter(|c| !options.visible_only || c.visible)
        .collect()
}

/// Quote a CSV field when it holds a comma, a quote or a newline.
pub fn escape_csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Text written for one cell: rich text loses its markup, then the column's
/// display format applies.
pub fn export_text(value: &CellValue, column: &ColumnConfig) -> String {
    let value = match value {
        CellValue::Text(s) if column.column_type == ColumnType::Richtext && !s.is_empty() => {
            CellValue::Text(strip_html(s))
        }
        other => other.clone(),
    };
    match &column.format {
        Some(format) => format_value(&value, format),
        None => value.display(),
    }
}

pub fn format_value(value: &CellValue, format: &ColumnFormat) -> String {
    match value {
        CellValue::Null => String::new(),
        CellValue::Number(n) => {
            let mut formatted = match (&format.currency, format.decimals) {
                (Some(currency), decimals) => format_currency(*n, currency, decimals.unwrap_or(2)),
                (None, Some(decimals)) => format!("{:.*}", decimals, n),
                (None, None) => value.display(),
            };
            if let Some(prefix) = &format.prefix {
                formatted.insert_str(0, prefix);
            }
            if let Some(suffix) = &format.suffix {
                formatted.push_str(suffix);
            }
            formatted
        }
        CellValue::Date(d) => match &format.date_format {
            Some(pattern) => d.format(pattern).to_string(),
            None => value.display(),
        },
        other => other.display(),
    }
}

/// French-style currency: space-grouped thousands, decimal comma, trailing
/// symbol (`1 234,50 €`).
fn format_currency(n: f64, currency: &str, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, n.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (fixed.clone(), None),
    };
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(c);
    }
    let symbol = match currency {
        "EUR" => "€",
        "USD" => "$",
        "GBP" => "£",
        other => other,
    };
    let sign = if n < 0.0 { "-" } else { "" };
    match frac_part {
        Some(frac) => format!("{}{},{} {}", sign, grouped, frac, symbol),
        None => format!("{}{} {}", sign, grouped, symbol),
    }
}

/// Convert rows to CSV.
///
/// Headers are the column titles. Fields are escaped with
/// [`escape_csv_field`]; rows are separated by `\n` with no trailing newline.
///
/// # Examples
/// ```
/// use datatable::column::{ColumnConfig, ColumnType};
/// use datatable::downloader::{to_csv, ExportOptions};
/// use datatable::table::Row;
///
/// let columns = vec![ColumnConfig::new("note", "Note", ColumnType::Text)];
/// let mut row = Row::new();
/// row.insert("note".into(), "He said \"hi\", bye".into());
/// let csv = to_csv(&[row], &columns, &ExportOptions::default()).unwrap();
/// assert_eq!(csv, "Note\n\"He said \"\"hi\"\", bye\"");
/// ```
pub fn to_csv(
    rows: &[Row],
    columns: &[ColumnConfig],
    options: &ExportOptions,
) -> Result<String, Box<dyn Error>> {
    let columns = export_columns(columns, options);
    let mut lines: Vec<String> = Vec::with_capacity(rows.len() + 1);

    if options.include_headers {
        lines.push(
            columns
                .iter()
                .map(|c| escape_csv_field(&c.title))
                .collect::<Vec<_>>()
                .join(","),
        );
    }

    for row in rows {
        let fields: Vec<String> = columns
            .iter()
            .map(|c| {
                let value = row.get(&c.key).unwrap_or(&CellValue::Null);
                escape_csv_field(&export_text(value, c))
            })
            .collect();
        lines.push(fields.join(","));
    }

    info!("exported {} rows x {} columns to CSV", rows.len(), columns.len());
    Ok(lines.join("\n"))
}

/// Printable HTML document, the basis of the PDF export.
///
/// Cell text is HTML-escaped except rich-text cells, which keep their markup
/// minus `<script>` and `<style>` blocks.
pub fn to_html(
    rows: &[Row],
    columns: &[ColumnConfig],
    options: &ExportOptions,
    generated_at: DateTime<Utc>,
) -> Result<String, Box<dyn Error>> {
    let columns = export_columns(columns, options);

    let body: Vec<Vec<serde_json::Value>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| {
                    let value = row.get(&c.key).unwrap_or(&CellValue::Null);
                    let class = match c.column_type {
                        ColumnType::Number => "number",
                        ColumnType::Boolean | ColumnType::Select => "center",
                        _ => "",
                    };
                    match value {
                        CellValue::Text(s) if c.column_type == ColumnType::Richtext => {
                            let cleaned = SCRIPT_REGEX.replace_all(s, "");
                            let cleaned = STYLE_REGEX.replace_all(&cleaned, "");
                            json!({ "class": class, "value": cleaned, "raw": true })
                        }
                        other => json!({ "class": class, "value": export_text(other, c), "raw": false }),
                    }
                })
                .collect()
        })
        .collect();

    let headers: Vec<&str> = if options.include_headers {
        columns.iter().map(|c| c.title.as_str()).collect()
    } else {
        Vec::new()
    };

    let data = json!({
        "title": options.title,
        "generated": generated_at.format("%d/%m/%Y %H:%M").to_string(),
        "row_count": rows.len(),
        "column_count": columns.len(),
        "headers": headers,
        "rows": body,
    });

    let mut handlebars = Handlebars::new();
    handlebars.register_template_string("print", PRINT_TEMPLATE)?;
    let html = handlebars.render("print", &data)?;
    info!("rendered {} rows to HTML", rows.len());
    Ok(html)
}

/// Convert rows to XLSX bytes.
///
/// Headers are bold, numbers and booleans keep their type, and cells pick up
/// the background colour of matching colour rules.
#[cfg(feature = "xlsx")]
pub fn to_xlsx(
    rows: &[Row],
    all_columns: &[ColumnConfig],
    options: &ExportOptions,
    colors: Option<&crate::color_rules::ColorRuleSet>,
) -> Result<Vec<u8>, Box<dyn Error>> {
    use rust_xlsxwriter::{Color, Format, Workbook};

    let columns = export_columns(all_columns, options);
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(&options.sheet_name)?;

    let bold = Format::new().set_bold();
    let mut first_row: u32 = 0;
    if options.include_headers {
        for (c, column) in columns.iter().enumerate() {
            worksheet.write_string_with_format(0, c as u16, &column.title, &bold)?;
        }
        first_row = 1;
    }

    for (c, column) in columns.iter().enumerate() {
        let width = column.width.map_or(15.0, |w| f64::from(w) / 7.0);
        worksheet.set_column_width(c as u16, width)?;
    }

    for (r, row) in rows.iter().enumerate() {
        let xr = first_row + r as u32;
        for (c, column) in columns.iter().enumerate() {
            let xc = c as u16;
            let value = row.get(&column.key).unwrap_or(&CellValue::Null);

            let mut format = Format::new();
            let background = colors
                .and_then(|set| set.cell_style(row, all_columns, &column.id))
                .and_then(|style| style.background_color)
                .and_then(|hex| parse_hex_color(&hex));
            if let Some(rgb) = background {
                format = format.set_background_color(Color::RGB(rgb));
            }

            match value {
                CellValue::Null => {
                    worksheet.write_blank(xr, xc, &format)?;
                }
                CellValue::Number(n) if column.format.is_none() => {
                    worksheet.write_number_with_format(xr, xc, *n, &format)?;
                }
                CellValue::Bool(b) => {
                    worksheet.write_boolean_with_format(xr, xc, *b, &format)?;
                }
                other => {
                    worksheet.write_string_with_format(xr, xc, export_text(other, column), &format)?;
                }
            }
        }
    }

    let buffer = workbook.save_to_buffer()?;
    info!("exported {} rows to XLSX ({} bytes)", rows.len(), buffer.len());
    Ok(buffer)
}

/// `#rrggbb` to a packed RGB value.
pub fn parse_hex_color(hex: &str) -> Option<u32> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}
