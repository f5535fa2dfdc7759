/*!
# DataTable Kit

Typed data-table engine with an Excel-like formula language, rule-based
pricing, and CSV/HTML/XLSX import and export, built in Rust.

## Overview

A table is a list of [`ColumnConfig`](column::ColumnConfig) definitions and
rows keyed by column. Columns are addressed in formulas by spreadsheet
letters (`A`, `B`, ... `AA`) following their position in the column list;
rows are 1-based inside formulas.

## Architecture

### Core Layer
- **Cell values**: untyped [`CellValue`](cell::CellValue) with number/text/bool/date variants
- **Formula engine**: lexer, recursive-descent parser and interpreter over any
  [`FormulaContext`](formula::FormulaContext); never fails, errors become `#ERROR`
  or `#SECURITY_ERROR`
- **Validation**: per-type conversion and checks applied on edit and import

### Table Layer
- **DataTable**: rows, computed formula columns, undo of cell edits, events
- **Selection**: multi-range selection with copy to clipboard, fill down and fill right
- **View**: search, column filters, advanced filter groups, multi-column sorting
- **Colour rules**: conditional cell and row styling

### Pricing Layer
- Price rules with conditions, validity window and usage limits
- Simulator that applies rules by priority and explains every step

### Data Persistence Layer
- Table snapshots as gzip-compressed JSON
- Per-table settings with a time-to-live in a pluggable key-value store
- CSV/TSV import with header mapping; CSV, printable HTML and XLSX export

## Modules

- **cell**: cell values and number parsing
- **column**: column definitions and column letters
- **clock**: injectable time source
- **formula**: formula language
- **events**: typed event listeners
- **validation**: value conversion per column type
- **table**: the `DataTable` itself
- **selection**: range selection and clipboard operations
- **view**: filtering and sorting
- **color_rules**: conditional formatting
- **pricing**: price rules and the price simulator
- **settings**: persisted per-table settings
- **config**: CLI and library defaults
- **loader**: CSV/TSV import
- **downloader**: CSV/HTML/XLSX export
- **saving**: compressed snapshots
*/

pub mod cell;
pub mod clock;
pub mod color_rules;
pub mod column;
pub mod config;
pub mod downloader;
pub mod events;
pub mod formula;
pub mod loader;
pub mod pricing;
pub mod saving;
pub mod selection;
pub mod settings;
pub mod table;
pub mod validation;
pub mod view;

/// Re-export the types most callers need
pub use cell::CellValue;
pub use clock::{Clock, ManualClock, SystemClock};
pub use column::{ColumnConfig, ColumnType, index_to_letters, letters_to_index};
pub use formula::{FormulaContext, FormulaEngine, FormulaError, FormulaResult};
pub use saving::*;
pub use selection::{CellPosition, CellRange, RangeSelection};
pub use table::{DataTable, Row, TableError};
