use crate::cell::CellValue;
use crate::column::{ColumnConfig, position_of};
use crate::table::Row;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellPosition {
    pub row: usize,
    pub column: String,
}

impl CellPosition {
    pub fn new(row: usize, column: &str) -> Self {
        CellPosition {
            row,
            column: column.to_string(),
        }
    }
}

/// A rectangle given by two opposite corners, in any order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRange {
    pub start: CellPosition,
    pub end: CellPosition,
}

impl CellRange {
    pub fn single(position: CellPosition) -> Self {
        CellRange {
            start: position.clone(),
            end: position,
        }
    }

    pub fn min_row(&self) -> usize {
        self.start.row.min(self.end.row)
    }

    pub fn max_row(&self) -> usize {
        self.start.row.max(self.end.row)
    }

    /// Column indices of both corners within `columns`, if both are known.
    fn column_bounds(&self, columns: &[ColumnConfig]) -> Option<(usize, usize)> {
        let a = position_of(columns, &self.start.column)?;
        let b = position_of(columns, &self.end.column)?;
        Some((a.min(b), a.max(b)))
    }

    /// Membership test. Without an ordering, or when a corner's column is not
    /// part of it, only the corners' own columns count.
    pub fn contains(&self, row: usize, column_id: &str, order: Option<&[ColumnConfig]>) -> bool {
        if row < self.min_row() || row > self.max_row() {
            return false;
        }
        match order.and_then(|cols| self.column_bounds(cols).map(|b| (cols, b))) {
            Some((cols, (lo, hi))) => {
                position_of(cols, column_id).is_some_and(|idx| idx >= lo && idx <= hi)
            }
            None => column_id == self.start.column || column_id == self.end.column,
        }
    }

    fn column_indices(&self, columns: &[ColumnConfig]) -> Vec<usize> {
        match self.column_bounds(columns) {
            Some((lo, hi)) => (lo..=hi).collect(),
            None => columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.id == self.start.column || c.id == self.end.column)
                .map(|(i, _)| i)
                .collect(),
        }
    }
}

/// Where copied text goes. Failures are reported but never propagated by
/// [`RangeSelection::copy_to_clipboard`].
pub trait ClipboardSink {
    fn write_text(&mut self, text: &str) -> Result<(), Box<dyn Error>>;
}

impl ClipboardSink for String {
    fn write_text(&mut self, text: &str) -> Result<(), Box<dyn Error>> {
        self.clear();
        self.push_str(text);
        Ok(())
    }
}

/// Spreadsheet-like rectangular selection: any number of committed ranges
/// plus at most one range still being dragged out.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeSelection {
    ranges: Vec<CellRange>,
    active: Option<CellRange>,
}

impl RangeSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ranges(&self) -> &[CellRange] {
        &self.ranges
    }

    pub fn active(&self) -> Option<&CellRange> {
        self.active.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty() && self.active.is_none()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
        self.active = None;
    }

    pub fn start_selection(&mut self, position: CellPosition, multi_select: bool) {
        if !multi_select {
            self.ranges.clear();
        }
        self.active = Some(CellRange::single(position));
    }

    pub fn extend_selection(&mut self, position: CellPosition) {
        if let Some(active) = self.active.as_mut() {
            active.end = position;
        }
    }

    pub fn end_selection(&mut self) {
        if let Some(active) = self.active.take() {
            self.ranges.push(active);
        }
    }

    pub fn is_cell_selected(
        &self,
        row: usize,
        column_id: &str,
        column_order: Option<&[ColumnConfig]>,
    ) -> bool {
        self.all_ranges()
            .any(|r| r.contains(row, column_id, column_order))
    }

    /// Replace the selection with one full row.
    pub fn select_row(&mut self, row: usize, columns: &[ColumnConfig]) {
        let (Some(first), Some(last)) = (columns.first(), columns.last()) else {
            return;
        };
        self.ranges = vec![CellRange {
            start: CellPosition::new(row, &first.id),
            end: CellPosition::new(row, &last.id),
        }];
        self.active = None;
    }

    /// Replace the selection with rows `0..row_count` of one column.
    pub fn select_column(&mut self, column_id: &str, row_count: usize) {
        if row_count == 0 {
            return;
        }
        self.ranges = vec![CellRange {
            start: CellPosition::new(0, column_id),
            end: CellPosition::new(row_count - 1, column_id),
        }];
        self.active = None;
    }

    fn all_ranges(&self) -> impl Iterator<Item = &CellRange> {
        self.ranges.iter().chain(self.active.iter())
    }

    /// Selected rows keyed by column index, both ascending.
    fn rows_by_column(&self, columns: &[ColumnConfig]) -> BTreeMap<usize, BTreeSet<usize>> {
        let mut by_column: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for range in self.all_ranges() {
            for col in range.column_indices(columns) {
                by_column
                    .entry(col)
                    .or_default()
                    .extend(range.min_row()..=range.max_row());
            }
        }
        by_column
    }

    /// Tab-separated text of the bounding rows × columns of the selection.
    ///
    /// Rows are the distinct selected rows ascending, columns the distinct
    /// selected columns in declaration order; a ragged multi-range selection
    /// is therefore flattened to its cross product. Missing rows or values
    /// become empty strings.
    pub fn copy_text(&self, data: &[Row], columns: &[ColumnConfig]) -> String {
        let by_column = self.rows_by_column(columns);
        let rows: BTreeSet<usize> = by_column.values().flatten().copied().collect();

        rows.iter()
            .map(|&row| {
                by_column
                    .keys()
                    .map(|&col| {
                        data.get(row)
                            .and_then(|r| r.get(&columns[col].key))
                            .map(CellValue::display)
                            .unwrap_or_default()
                    })
                    .collect::<Vec<_>>()
                    .join("\t")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Best effort: returns whether the text reached the clipboard.
    pub fn copy_to_clipboard(
        &self,
        data: &[Row],
        columns: &[ColumnConfig],
        clipboard: &mut dyn ClipboardSink,
    ) -> bool {
        if self.is_empty() {
            return false;
        }
        let text = self.copy_text(data, columns);
        match clipboard.write_text(&text) {
            Ok(()) => true,
            Err(e) => {
                warn!("clipboard write failed: {}", e);
                false
            }
        }
    }

    /// For each column with at least two selected rows, copy the value of the
    /// topmost selected row into the other selected rows of that column.
    /// Unselected rows between them are left alone.
    pub fn fill_down(
        &self,
        data: &[Row],
        columns: &[ColumnConfig],
        mut on_cell_change: impl FnMut(usize, &str, CellValue),
    ) {
        for (col, rows) in self.rows_by_column(columns) {
            let column = &columns[col];
            let rows: Vec<usize> = rows.into_iter().filter(|&r| r < data.len()).collect();
            if rows.len() < 2 {
                continue;
            }
            let source = data[rows[0]].get(&column.key).cloned().unwrap_or_default();
            for &row in &rows[1..] {
                on_cell_change(row, &column.id, source.clone());
            }
        }
    }

    /// Row-wise counterpart of [`fill_down`](Self::fill_down): the leftmost
    /// selected column, by declaration order, is copied to the right.
    pub fn fill_right(
        &self,
        data: &[Row],
        columns: &[ColumnConfig],
        mut on_cell_change: impl FnMut(usize, &str, CellValue),
    ) {
        let mut by_row: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for (col, rows) in self.rows_by_column(columns) {
            for row in rows {
                by_row.entry(row).or_default().insert(col);
            }
        }

        for (row, cols) in by_row {
            let Some(record) = data.get(row) else {
                continue;
            };
            if cols.len() < 2 {
                continue;
            }
            let mut cols = cols.into_iter();
            let Some(first) = cols.next() else {
                continue;
            };
            let source = record.get(&columns[first].key).cloned().unwrap_or_default();
            for col in cols {
                on_cell_change(row, &columns[col].id, source.clone());
            }
        }
    }
}
