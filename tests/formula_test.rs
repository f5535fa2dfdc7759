use chrono::{TimeZone, Utc};
use datatable::column::{ColumnConfig, ColumnType, index_to_letters, letters_to_index};
use datatable::formula::{FormulaEngine, FormulaError, FormulaResult, dependencies, validate_formula};
use datatable::table::{DataTable, Row};
use datatable::{CellValue, ManualClock};

fn grid(values: Vec<CellValue>) -> DataTable {
    let columns = vec![
        ColumnConfig::new("qty", "Quantity", ColumnType::Number),
        ColumnConfig::new("name", "Name", ColumnType::Text),
    ];
    let rows = values
        .into_iter()
        .map(|v| {
            let mut row = Row::new();
            if !v.is_null() {
                row.insert("qty".to_string(), v);
            }
            row
        })
        .collect();
    DataTable::with_rows(columns, rows)
}

fn mixed_column() -> DataTable {
    grid(vec![1.0.into(), "x".into(), 3.0.into(), CellValue::Null])
}

#[test]
fn test_column_letters_round_trip() {
    assert_eq!(letters_to_index("A"), Some(0));
    assert_eq!(letters_to_index("Z"), Some(25));
    assert_eq!(letters_to_index("AA"), Some(26));
    assert_eq!(letters_to_index("aa"), Some(26));
    assert_eq!(letters_to_index(""), None);
    assert_eq!(letters_to_index("A1"), None);

    for index in 0..20_000 {
        let letters = index_to_letters(index);
        assert_eq!(letters_to_index(&letters), Some(index), "{}", letters);
    }
    assert_eq!(index_to_letters(701), "ZZ");
    assert_eq!(index_to_letters(702), "AAA");
}

#[test]
fn test_aggregates_over_mixed_column() {
    let table = mixed_column();
    assert_eq!(table.evaluate("=SUM(A:A)"), FormulaResult::Number(4.0));
    // COUNT counts non-empty values of any type, COUNTA numbers only
    assert_eq!(table.evaluate("=COUNT(A:A)"), FormulaResult::Number(3.0));
    assert_eq!(table.evaluate("=COUNTA(A:A)"), FormulaResult::Number(2.0));
    assert_eq!(table.evaluate("=AVERAGE(A:A)"), FormulaResult::Number(2.0));
    assert_eq!(table.evaluate("=MAX(A:A)"), FormulaResult::Number(3.0));
    assert_eq!(table.evaluate("=MIN(A:A)"), FormulaResult::Number(1.0));
    assert_eq!(table.evaluate("=SUM(A1:A2)"), FormulaResult::Number(1.0));
    assert_eq!(table.evaluate("=SUM(B:B)"), FormulaResult::Number(0.0));
}

#[test]
fn test_cell_references() {
    let table = mixed_column();
    assert_eq!(table.evaluate("A1+A3"), FormulaResult::Number(4.0));
    assert_eq!(table.evaluate("=A1*10"), FormulaResult::Number(10.0));
    assert_eq!(table.evaluate("=A2"), FormulaResult::Text("x".to_string()));
    // outside the grid reads as 0
    assert_eq!(table.evaluate("=A99"), FormulaResult::Number(0.0));
    assert_eq!(table.evaluate("=Z1"), FormulaResult::Number(0.0));
    assert_eq!(table.evaluate("=A0"), FormulaResult::Number(0.0));
    assert_eq!(table.evaluate("=A4 + 1"), FormulaResult::Number(1.0));
}

#[test]
fn test_arithmetic_and_comparison() {
    let table = grid(Vec::new());
    assert_eq!(table.evaluate("=1+2*3"), FormulaResult::Number(7.0));
    assert_eq!(table.evaluate("=(1+2)*3"), FormulaResult::Number(9.0));
    assert_eq!(table.evaluate("=2^3"), FormulaResult::Number(8.0));
    assert_eq!(table.evaluate("=-A1"), FormulaResult::Number(0.0));
    assert_eq!(table.evaluate("=10/4"), FormulaResult::Number(2.5));
    assert_eq!(table.evaluate("=2>1"), FormulaResult::Bool(true));
    assert_eq!(table.evaluate("=2<>2"), FormulaResult::Bool(false));
    assert_eq!(table.evaluate("=\"a\" & 1"), FormulaResult::Text("a1".to_string()));
    assert_eq!(table.evaluate("=1/0"), FormulaResult::Error);
}

#[test]
fn test_scalar_functions() {
    let table = mixed_column();
    assert_eq!(
        table.evaluate("=IF(A1>0, \"pos\", \"neg\")"),
        FormulaResult::Text("pos".to_string())
    );
    assert_eq!(table.evaluate("=IF(A1>5, 1)"), FormulaResult::Bool(false));
    assert_eq!(table.evaluate("=ROUND(2.5)"), FormulaResult::Number(3.0));
    assert_eq!(table.evaluate("=ROUND(1.234, 1)"), FormulaResult::Number(1.2));
    assert_eq!(table.evaluate("=FLOOR(2.7)"), FormulaResult::Number(2.0));
    assert_eq!(table.evaluate("=CEIL(2.1)"), FormulaResult::Number(3.0));
    assert_eq!(table.evaluate("=ABS(-4)"), FormulaResult::Number(4.0));
    assert_eq!(table.evaluate("=SQRT(16)"), FormulaResult::Number(4.0));
    assert_eq!(table.evaluate("=POWER(2, 10)"), FormulaResult::Number(1024.0));
    assert_eq!(table.evaluate("=sum(1, 2)"), FormulaResult::Number(3.0));
}

#[test]
fn test_text_functions_use_one_based_positions() {
    let table = grid(Vec::new());
    assert_eq!(table.evaluate("=UPPER(\"abc\")"), FormulaResult::Text("ABC".to_string()));
    assert_eq!(table.evaluate("=LOWER(\"ABC\")"), FormulaResult::Text("abc".to_string()));
    assert_eq!(table.evaluate("=LEN(\"hello\")"), FormulaResult::Number(5.0));
    assert_eq!(table.evaluate("=LEFT(\"hello\", 2)"), FormulaResult::Text("he".to_string()));
    assert_eq!(table.evaluate("=LEFT(\"hello\")"), FormulaResult::Text("h".to_string()));
    assert_eq!(table.evaluate("=RIGHT(\"hello\", 3)"), FormulaResult::Text("llo".to_string()));
    assert_eq!(table.evaluate("=RIGHT(\"hello\", 0)"), FormulaResult::Text(String::new()));
    assert_eq!(table.evaluate("=MID(\"hello\", 2, 3)"), FormulaResult::Text("ell".to_string()));
}

#[test]
fn test_logic_functions() {
    let table = grid(Vec::new());
    assert_eq!(table.evaluate("=AND(1, TRUE, \"x\")"), FormulaResult::Bool(true));
    assert_eq!(table.evaluate("=AND(1, 0)"), FormulaResult::Bool(false));
    assert_eq!(table.evaluate("=OR(0, FALSE, 2)"), FormulaResult::Bool(true));
    assert_eq!(table.evaluate("=NOT(0)"), FormulaResult::Bool(true));
}

#[test]
fn test_date_functions_follow_the_clock() {
    let table = grid(Vec::new());
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap());
    let engine = FormulaEngine::with_clock(&table, &clock);

    assert_eq!(engine.evaluate("=YEAR(NOW())"), FormulaResult::Number(2024.0));
    assert_eq!(engine.evaluate("=MONTH(TODAY())"), FormulaResult::Number(3.0));
    assert_eq!(engine.evaluate("=DAY(\"2023-12-25\")"), FormulaResult::Number(25.0));
    assert_eq!(engine.evaluate("=YEAR(\"not a date\")"), FormulaResult::Error);

    clock.advance(chrono::Duration::days(365));
    assert_eq!(engine.evaluate("=YEAR(NOW())"), FormulaResult::Number(2025.0));
}

#[test]
fn test_denylisted_identifiers_are_security_errors() {
    let table = mixed_column();
    for formula in [
        "=window.alert(1)",
        "eval(\"1\")",
        "=SUM(A:A) + constructor",
        "=1 + __proto__",
        "=FETCH(1)",
        "for",
    ] {
        assert_eq!(table.evaluate(formula), FormulaResult::SecurityError, "{}", formula);
    }
    // whole words only
    assert_eq!(table.evaluate("=LEN(\"format\")"), FormulaResult::Number(6.0));

    // cell values are data, only the written formula is screened
    let listing = grid(vec!["for sale".into()]);
    assert_eq!(listing.evaluate("=A1"), FormulaResult::Text("for sale".to_string()));

    let err = FormulaEngine::new(&table).try_evaluate("=eval(1)").unwrap_err();
    assert!(matches!(err, FormulaError::Forbidden(ref w) if w == "eval"));
}

#[test]
fn test_evaluate_never_panics() {
    let table = mixed_column();
    let deep_open = "(".repeat(5_000);
    let deep = format!("{}1{}", "(".repeat(1_000), ")".repeat(1_000));
    let long = vec!["1"; 5_000].join("+");
    let chain = vec!["1"; 2_000].join("+");
    let powers = format!("={}1", "2^".repeat(2_000));
    let inputs = [
        "",
        "=",
        "((",
        "))",
        "1+",
        "\"unterminated",
        "SUM(",
        "A1:",
        "@#$%",
        "=NOPE(1)",
        "=IF()",
        "=MID(\"a\")",
        "=SUM(A:A",
        "=A1 +* 2",
        "=99999999999999999999999999A",
        "=A99999999999999999999999",
        "=1e400",
        "=SQRT(-1)",
        "=POWER(10, 400)",
        "=YEAR(1e300)",
        "=MID(\"abc\", -1e300, 1)",
        "=MID(\"abc\", 1e300, 1e300)",
        "=RIGHT(\"abc\", -1e300)",
        "=\u{1F600}",
        deep_open.as_str(),
        deep.as_str(),
        long.as_str(),
        chain.as_str(),
        powers.as_str(),
    ];
    for input in inputs {
        let result = table.evaluate(input);
        assert!(
            matches!(
                result,
                FormulaResult::Number(_)
                    | FormulaResult::Text(_)
                    | FormulaResult::Bool(_)
                    | FormulaResult::Error
                    | FormulaResult::SecurityError
            ),
            "{:?}",
            input
        );
    }
    assert_eq!(table.evaluate("=SQRT(-1)"), FormulaResult::Error);
    assert_eq!(table.evaluate(""), FormulaResult::Error);

    // huge positions clamp to the text bounds
    assert_eq!(
        table.evaluate("=MID(\"abc\", -1e300, 1)"),
        FormulaResult::Text(String::new())
    );
    assert_eq!(
        table.evaluate("=MID(\"abc\", 1e300, 1e300)"),
        FormulaResult::Text(String::new())
    );
    assert_eq!(table.evaluate(&powers), FormulaResult::Error);
    assert_eq!(table.evaluate(&chain), FormulaResult::Error);
    assert_eq!(table.evaluate("=2^3^2"), FormulaResult::Number(512.0));
}

#[test]
fn test_validate_formula_parentheses() {
    assert_eq!(validate_formula("SUM(A:A"), Err(FormulaError::UnclosedParentheses));
    assert_eq!(validate_formula(")SUM(A:A)"), Err(FormulaError::UnbalancedParentheses));
    assert_eq!(validate_formula("SUM(A:A)"), Ok(()));
    assert_eq!(validate_formula("   "), Err(FormulaError::EmptyFormula));
}

#[test]
fn test_dependencies_list_range_ends_only() {
    assert_eq!(dependencies("=A1+SUM(C:E)*B2"), vec!["A", "B", "C", "E"]);
    assert_eq!(dependencies("=A1+A2"), vec!["A"]);
    assert!(dependencies("=1+2").is_empty());
}

#[test]
fn test_sentinels_display() {
    assert_eq!(FormulaResult::Error.to_string(), "#ERROR");
    assert_eq!(FormulaResult::SecurityError.to_string(), "#SECURITY_ERROR");
    assert_eq!(
        FormulaResult::Error.to_cell_value(),
        CellValue::Text("#ERROR".to_string())
    );
}
