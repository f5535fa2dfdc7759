use datatable::column::{ColumnConfig, ColumnType};
use datatable::selection::{CellPosition, ClipboardSink, RangeSelection};
use datatable::table::{DataTable, Row};
use datatable::CellValue;
use std::error::Error;

fn columns() -> Vec<ColumnConfig> {
    vec![
        ColumnConfig::new("a", "A", ColumnType::Text),
        ColumnConfig::new("b", "B", ColumnType::Text),
        ColumnConfig::new("c", "C", ColumnType::Text),
        ColumnConfig::new("d", "D", ColumnType::Text),
    ]
}

fn rows(count: usize) -> Vec<Row> {
    (0..count)
        .map(|r| {
            let mut row = Row::new();
            for col in ["a", "b", "c", "d"] {
                row.insert(col.to_string(), CellValue::text(format!("{}{}", col, r)));
            }
            row
        })
        .collect()
}

fn select(selection: &mut RangeSelection, from: (usize, &str), to: (usize, &str), multi: bool) {
    selection.start_selection(CellPosition::new(from.0, from.1), multi);
    selection.extend_selection(CellPosition::new(to.0, to.1));
    selection.end_selection();
}

#[test]
fn test_start_extend_end() {
    let cols = columns();
    let mut selection = RangeSelection::new();
    assert!(selection.is_empty());

    selection.start_selection(CellPosition::new(1, "b"), false);
    assert!(selection.active().is_some());
    assert!(selection.is_cell_selected(1, "b", Some(&cols)));

    selection.extend_selection(CellPosition::new(3, "c"));
    // the active range already counts
    assert!(selection.is_cell_selected(2, "c", Some(&cols)));
    selection.end_selection();

    assert!(selection.active().is_none());
    assert_eq!(selection.ranges().len(), 1);
    assert!(selection.is_cell_selected(3, "b", Some(&cols)));
    assert!(!selection.is_cell_selected(4, "b", Some(&cols)));
    assert!(!selection.is_cell_selected(2, "a", Some(&cols)));
    assert!(!selection.is_cell_selected(2, "d", Some(&cols)));
}

#[test]
fn test_extend_without_active_range_is_a_no_op() {
    let mut selection = RangeSelection::new();
    selection.extend_selection(CellPosition::new(2, "a"));
    selection.end_selection();
    assert!(selection.is_empty());
}

#[test]
fn test_multi_select_keeps_previous_ranges() {
    let mut selection = RangeSelection::new();
    select(&mut selection, (0, "a"), (0, "a"), false);
    select(&mut selection, (2, "c"), (2, "c"), true);
    assert_eq!(selection.ranges().len(), 2);

    select(&mut selection, (4, "d"), (4, "d"), false);
    assert_eq!(selection.ranges().len(), 1);
    assert!(!selection.is_cell_selected(0, "a", None));
}

#[test]
fn test_membership_without_ordering_uses_corner_columns() {
    let cols = columns();
    let mut selection = RangeSelection::new();
    select(&mut selection, (0, "a"), (2, "c"), false);

    assert!(selection.is_cell_selected(1, "b", Some(&cols)));
    assert!(!selection.is_cell_selected(1, "b", None));
    assert!(selection.is_cell_selected(1, "a", None));
    assert!(selection.is_cell_selected(1, "c", None));

    // a corner outside the ordering degrades to the corner ids too
    let mut odd = RangeSelection::new();
    select(&mut odd, (0, "a"), (2, "zz"), false);
    assert!(odd.is_cell_selected(1, "a", Some(&cols)));
    assert!(!odd.is_cell_selected(1, "b", Some(&cols)));
}

#[test]
fn test_select_row_and_column() {
    let cols = columns();
    let mut selection = RangeSelection::new();
    selection.select_row(2, &cols);
    for col in ["a", "b", "c", "d"] {
        assert!(selection.is_cell_selected(2, col, Some(&cols)));
    }
    assert!(!selection.is_cell_selected(1, "a", Some(&cols)));

    selection.select_column("c", 5);
    assert!(selection.is_cell_selected(0, "c", Some(&cols)));
    assert!(selection.is_cell_selected(4, "c", Some(&cols)));
    assert!(!selection.is_cell_selected(2, "a", Some(&cols)));
}

#[test]
fn test_copy_text_is_tab_separated() {
    let cols = columns();
    let data = rows(4);
    let mut selection = RangeSelection::new();
    select(&mut selection, (1, "b"), (2, "c"), false);
    assert_eq!(selection.copy_text(&data, &cols), "b1\tc1\nb2\tc2");
}

#[test]
fn test_copy_flattens_disjoint_ranges_to_bounding_rows_and_columns() {
    let cols = columns();
    let data = rows(4);
    let mut selection = RangeSelection::new();
    select(&mut selection, (0, "a"), (0, "a"), false);
    select(&mut selection, (2, "c"), (2, "c"), true);
    assert_eq!(selection.copy_text(&data, &cols), "a0\tc0\na2\tc2");

    // rows past the data read as empty
    let mut beyond = RangeSelection::new();
    select(&mut beyond, (3, "a"), (5, "a"), false);
    assert_eq!(beyond.copy_text(&data, &cols), "a3\n\n");
}

struct BrokenClipboard;

impl ClipboardSink for BrokenClipboard {
    fn write_text(&mut self, _text: &str) -> Result<(), Box<dyn Error>> {
        Err("clipboard unavailable".into())
    }
}

#[test]
fn test_copy_to_clipboard_is_best_effort() {
    let cols = columns();
    let data = rows(2);
    let mut selection = RangeSelection::new();

    let mut clipboard = String::new();
    assert!(!selection.copy_to_clipboard(&data, &cols, &mut clipboard));

    select(&mut selection, (0, "a"), (1, "b"), false);
    assert!(selection.copy_to_clipboard(&data, &cols, &mut clipboard));
    assert_eq!(clipboard, "a0\tb0\na1\tb1");

    assert!(!selection.copy_to_clipboard(&data, &cols, &mut BrokenClipboard));
}

#[test]
fn test_fill_down_skips_unselected_rows_in_between() {
    let cols = columns();
    let mut data = rows(6);
    data[2].insert("c".to_string(), CellValue::text("X"));

    let mut selection = RangeSelection::new();
    select(&mut selection, (2, "c"), (2, "c"), false);
    select(&mut selection, (5, "c"), (5, "c"), true);

    let mut changes = Vec::new();
    selection.fill_down(&data, &cols, |row, column, value| {
        changes.push((row, column.to_string(), value))
    });
    assert_eq!(changes, vec![(5, "c".to_string(), CellValue::text("X"))]);
}

#[test]
fn test_fill_down_leaves_single_row_columns_alone() {
    let cols = columns();
    let data = rows(3);
    let mut selection = RangeSelection::new();
    select(&mut selection, (0, "a"), (0, "b"), false);

    let mut calls = 0;
    selection.fill_down(&data, &cols, |_, _, _| calls += 1);
    assert_eq!(calls, 0);

    RangeSelection::new().fill_down(&data, &cols, |_, _, _| calls += 1);
    assert_eq!(calls, 0);
}

#[test]
fn test_fill_right_uses_declaration_order() {
    let cols = columns();
    let data = rows(2);
    let mut selection = RangeSelection::new();
    // dragged right to left
    select(&mut selection, (1, "d"), (1, "b"), false);

    let mut changes = Vec::new();
    selection.fill_right(&data, &cols, |row, column, value| {
        changes.push((row, column.to_string(), value))
    });
    assert_eq!(
        changes,
        vec![
            (1, "c".to_string(), CellValue::text("b1")),
            (1, "d".to_string(), CellValue::text("b1")),
        ]
    );
}

#[test]
fn test_table_fill_down_writes_and_can_be_undone() {
    let mut table = DataTable::with_rows(columns(), rows(4));
    let mut selection = RangeSelection::new();
    select(&mut selection, (0, "a"), (3, "a"), false);

    assert_eq!(table.fill_down(&selection), Ok(3));
    for row in 0..4 {
        assert_eq!(table.value(row, "a"), CellValue::text("a0"));
    }
    assert!(table.undo());
    assert_eq!(table.value(3, "a"), CellValue::text("a3"));
    assert_eq!(table.value(2, "a"), CellValue::text("a0"));
}
