use crate::cell::CellValue;
use crate::clock::{Clock, SystemClock};
use crate::column::{ColumnConfig, ColumnType};
use crate::events::{EventRegistry, HandlerId, TableEvent};
use crate::formula::{FormulaContext, FormulaEngine, FormulaResult};
use crate::selection::RangeSelection;
use crate::validation::{ValidationResult, validate_value};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// One record: column key to value.
pub type Row = BTreeMap<String, CellValue>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("row {row} out of range (table has {len} rows)")]
    RowOutOfRange { row: usize, len: usize },
    #[error("invalid value for {column}: {message}")]
    Invalid { column: String, message: String },
}

#[derive(Clone, Debug, PartialEq)]
struct CellEdit {
    row: usize,
    key: String,
    column: String,
    old: CellValue,
}

/// Columns plus rows, with cell edits, formula columns and per-table events.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DataTable {
    pub columns: Vec<ColumnConfig>,
    pub rows: Vec<Row>,
    #[serde(skip)]
    undo_stack: Vec<CellEdit>,
    #[serde(skip)]
    events: EventRegistry<TableEvent>,
}

impl DataTable {
    pub fn new(columns: Vec<ColumnConfig>) -> Self {
        DataTable {
            columns,
            ..Default::default()
        }
    }

    pub fn with_rows(columns: Vec<ColumnConfig>, rows: Vec<Row>) -> Self {
        DataTable {
            columns,
            rows,
            ..Default::default()
        }
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, column_id: &str) -> Option<&ColumnConfig> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    pub fn column_index(&self, column_id: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.id == column_id)
    }

    pub fn visible_columns(&self) -> Vec<&ColumnConfig> {
        self.columns.iter().filter(|c| c.visible).collect()
    }

    /// Raw stored value; `Null` for unknown cells.
    pub fn value(&self, row: usize, column_id: &str) -> CellValue {
        self.column(column_id)
            .and_then(|c| self.rows.get(row)?.get(&c.key))
            .cloned()
            .unwrap_or_default()
    }

    /// Store a value without validation, returning the previous one.
    pub fn set_value(
        &mut self,
        row: usize,
        column_id: &str,
        value: CellValue,
    ) -> Result<CellValue, TableError> {
        let old = self.write_cell(row, column_id, value.clone())?;
        let key = self
            .column(column_id)
            .map(|c| c.key.clone())
            .unwrap_or_default();
        self.undo_stack.push(CellEdit {
            row,
            key,
            column: column_id.to_string(),
            old: old.clone(),
        });
        self.events.dispatch(&TableEvent::CellChanged {
            row,
            column: column_id.to_string(),
            old: old.clone(),
            new: value,
        });
        Ok(old)
    }

    fn write_cell(
        &mut self,
        row: usize,
        column_id: &str,
        value: CellValue,
    ) -> Result<CellValue, TableError> {
        let key = self
            .column(column_id)
            .ok_or_else(|| TableError::UnknownColumn(column_id.to_string()))?
            .key
            .clone();
        let len = self.rows.len();
        let record = self
            .rows
            .get_mut(row)
            .ok_or(TableError::RowOutOfRange { row, len })?;
        Ok(record.insert(key, value).unwrap_or_default())
    }

    /// Validate against the column and store the converted value.
    ///
    /// Warnings do not block the edit and are returned to the caller.
    pub fn edit_cell(
        &mut self,
        row: usize,
        column_id: &str,
        value: CellValue,
    ) -> Result<ValidationResult, TableError> {
        let column = self
            .column(column_id)
            .ok_or_else(|| TableError::UnknownColumn(column_id.to_string()))?;
        let result = validate_value(&value, column);
        if !result.is_valid {
            return Err(TableError::Invalid {
                column: column.title.clone(),
                message: result.error.unwrap_or_default(),
            });
        }
        let stored = result.clone().value_or(value);
        self.set_value(row, column_id, stored)?;
        Ok(result)
    }

    /// Revert the most recent edit. Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(edit) = self.undo_stack.pop() else {
            return false;
        };
        let Some(record) = self.rows.get_mut(edit.row) else {
            return false;
        };
        let new = record.insert(edit.key, edit.old.clone()).unwrap_or_default();
        self.events.dispatch(&TableEvent::CellChanged {
            row: edit.row,
            column: edit.column,
            old: new,
            new: edit.old,
        });
        true
    }

    /// Evaluate a formula against the stored rows.
    pub fn evaluate(&self, formula: &str) -> FormulaResult {
        FormulaEngine::new(self).evaluate(formula)
    }

    pub fn computed_rows(&self) -> Vec<Row> {
        self.computed_rows_with_clock(&SystemClock)
    }

    /// Rows with every formula column filled in.
    ///
    /// Formula columns run in declaration order; references to the current row
    /// see results already computed for it, other rows are read as stored.
    pub fn computed_rows_with_clock(&self, clock: &dyn Clock) -> Vec<Row> {
        let formulas: Vec<(&ColumnConfig, &str)> = self
            .columns
            .iter()
            .filter(|c| c.column_type == ColumnType::Formula)
            .filter_map(|c| c.formula.as_deref().map(|f| (c, f)))
            .collect();

        self.rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let mut current = row.clone();
                for (column, formula) in &formulas {
                    let result = {
                        let ctx = RowContext {
                            table: self,
                            row_index: index,
                            current: &current,
                        };
                        FormulaEngine::with_clock(&ctx, clock).evaluate(formula)
                    };
                    if result.is_error() {
                        debug!("row {} column {}: {}", index, column.id, result);
                    }
                    current.insert(column.key.clone(), result.to_cell_value());
                }
                current
            })
            .collect()
    }

    pub fn copy_selection(&self, selection: &RangeSelection) -> String {
        selection.copy_text(&self.rows, &self.columns)
    }

    /// Apply [`RangeSelection::fill_down`] to this table. Returns the number
    /// of cells written.
    pub fn fill_down(&mut self, selection: &RangeSelection) -> Result<usize, TableError> {
        let mut changes = Vec::new();
        selection.fill_down(&self.rows, &self.columns, |row, column, value| {
            changes.push((row, column.to_string(), value))
        });
        self.apply(changes)
    }

    pub fn fill_right(&mut self, selection: &RangeSelection) -> Result<usize, TableError> {
        let mut changes = Vec::new();
        selection.fill_right(&self.rows, &self.columns, |row, column, value| {
            changes.push((row, column.to_string(), value))
        });
        self.apply(changes)
    }

    fn apply(&mut self, changes: Vec<(usize, String, CellValue)>) -> Result<usize, TableError> {
        let count = changes.len();
        for (row, column, value) in changes {
            self.set_value(row, &column, value)?;
        }
        Ok(count)
    }

    pub fn on_event(&mut self, handler: impl FnMut(&TableEvent) + 'static) -> HandlerId {
        self.events.register(handler)
    }

    pub fn off_event(&mut self, id: HandlerId) -> bool {
        self.events.unregister(id)
    }

    /// Notify listeners that a row action (open on a map, edit, ...) was used.
    pub fn trigger_row_action(&mut self, action: &str, row: usize) -> usize {
        self.events.dispatch(&TableEvent::RowAction {
            action: action.to_string(),
            row,
        })
    }
}

impl FormulaContext for DataTable {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_id(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|c| c.id.as_str())
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn value(&self, column_id: &str, row: usize) -> CellValue {
        DataTable::value(self, row, column_id)
    }
}

struct RowContext<'a> {
    table: &'a DataTable,
    row_index: usize,
    current: &'a Row,
}

impl FormulaContext for RowContext<'_> {
    fn column_count(&self) -> usize {
        self.table.columns.len()
    }

    fn column_id(&self, index: usize) -> Option<&str> {
        self.table.column_id(index)
    }

    fn row_count(&self) -> usize {
        self.table.rows.len()
    }

    fn value(&self, column_id: &str, row: usize) -> CellValue {
        if row != self.row_index {
            return self.table.value(row, column_id);
        }
        self.table
            .column(column_id)
            .and_then(|c| self.current.get(&c.key))
            .cloned()
            .unwrap_or_default()
    }
}
