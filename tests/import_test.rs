use datatable::column::{ColumnConfig, ColumnType, ColumnValidation, SelectOption};
use datatable::downloader::{ExportOptions, to_csv};
use datatable::loader::{
    ImportOptions, detect_delimiter, import_file, import_records, import_text, map_columns,
    parse_delimited,
};
use datatable::CellValue;
use std::fs;
use tempfile::TempDir;

fn columns() -> Vec<ColumnConfig> {
    vec![
        ColumnConfig::new("ref", "Reference", ColumnType::Text).required(),
        ColumnConfig::new("qty", "Quantity", ColumnType::Number).with_validation(ColumnValidation {
            min: Some(0.0),
            ..Default::default()
        }),
        ColumnConfig::new("active", "Active", ColumnType::Boolean),
        ColumnConfig::new("family", "Family", ColumnType::Select).with_options(vec![
            SelectOption {
                value: CellValue::text("tube"),
                label: "Tube".to_string(),
            },
            SelectOption {
                value: CellValue::text("sheet"),
                label: "Sheet".to_string(),
            },
        ]),
    ]
}

#[test]
fn test_parse_delimited_handles_quotes_and_newlines() {
    let records = parse_delimited("a,b\r\n\"x, y\",\"say \"\"hi\"\"\"\n\"multi\nline\",2", ',');
    assert_eq!(
        records,
        vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["x, y".to_string(), "say \"hi\"".to_string()],
            vec!["multi\nline".to_string(), "2".to_string()],
        ]
    );
    assert!(parse_delimited("", ',').is_empty());
    assert_eq!(parse_delimited("a,\n", ',').len(), 1);
}

#[test]
fn test_detect_delimiter() {
    assert_eq!(detect_delimiter("a,b,c"), ',');
    assert_eq!(detect_delimiter("a;b;c"), ';');
    assert_eq!(detect_delimiter("a\tb\tc"), '\t');
    assert_eq!(detect_delimiter("\"a;b\",c"), ',');
    assert_eq!(detect_delimiter("single"), ',');
}

#[test]
fn test_map_columns_exact_then_substring() {
    let headers: Vec<String> = ["QUANTITY", "Ref", "Product family", ""]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mapping = map_columns(&headers, &columns());
    assert_eq!(mapping.get("qty"), Some(&0));
    assert_eq!(mapping.get("ref"), Some(&1));
    assert_eq!(mapping.get("family"), Some(&2));
    assert_eq!(mapping.get("active"), None);
}

#[test]
fn test_rows_with_errors_are_excluded() {
    let text = "Reference;Quantity;Active;Family\n\
                T-1;12,5;oui;Tube\n\
                ;3;non;sheet\n\
                T-3;-1;yes;tube\n\
                T-4;7;maybe;tube\n\
                T-5;2;0;plate\n";
    let result = import_text(text, &columns(), &ImportOptions::default());

    assert!(!result.success);
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[0].get("ref"), Some(&CellValue::text("T-1")));
    assert_eq!(result.rows[0].get("qty"), Some(&CellValue::Number(12.5)));
    assert_eq!(result.rows[0].get("active"), Some(&CellValue::Bool(true)));
    assert_eq!(result.rows[0].get("family"), Some(&CellValue::text("tube")));

    // unknown select values are kept with a warning
    assert_eq!(result.rows[1].get("family"), Some(&CellValue::text("plate")));
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].row, 6);

    let errors: Vec<(usize, &str)> = result
        .errors
        .iter()
        .map(|e| (e.row, e.column.as_str()))
        .collect();
    assert_eq!(errors, vec![(3, "Reference"), (4, "Quantity"), (5, "Active")]);
    assert_eq!(result.errors[0].message, "Reference is required");
}

#[test]
fn test_empty_input_reports_no_data() {
    let result = import_records(&[], &columns());
    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].row, 0);
    assert_eq!(result.errors[0].message, "no data found");
}

#[test]
fn test_header_only_is_a_successful_empty_import() {
    let result = import_text("\u{feff}Reference,Quantity\n", &columns(), &ImportOptions::default());
    assert!(result.success);
    assert!(result.rows.is_empty());
    assert!(result.errors.is_empty());
}

#[test]
fn test_blank_lines_are_skipped_unless_asked() {
    let text = "Reference,Quantity\nT-1,1\n,\nT-2,2";
    let result = import_text(text, &columns(), &ImportOptions::default());
    assert!(result.success);
    assert_eq!(result.rows.len(), 2);

    let keep = ImportOptions {
        skip_empty_rows: false,
        ..Default::default()
    };
    let result = import_text(text, &columns(), &keep);
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].row, 3);
}

#[test]
fn test_exported_csv_imports_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stock.csv");

    let source = import_text(
        "Reference,Quantity,Active,Family\n\"T-1, large\",4,true,Sheet\n",
        &columns(),
        &ImportOptions::default(),
    );
    assert!(source.success);

    let csv = to_csv(&source.rows, &columns(), &ExportOptions::default()).unwrap();
    fs::write(&path, csv).unwrap();

    let reloaded = import_file(&path, &columns(), &ImportOptions::default()).unwrap();
    assert!(reloaded.success);
    assert_eq!(reloaded.rows, source.rows);
}

#[test]
fn test_import_file_missing_is_an_error() {
    let dir = TempDir::new().unwrap();
    let result = import_file(dir.path().join("missing.csv"), &columns(), &ImportOptions::default());
    assert!(result.is_err());
}
