#![cfg(not(tarpaulin_include))]

use chrono::{Duration, Utc};
use clap::{Parser, ValueEnum};
use datatable::column::{ColumnConfig, ColumnType, index_to_letters};
use datatable::config::Config;
use datatable::downloader::{to_csv, to_html};
use datatable::loader::{ImportOptions, detect_delimiter, import_file, parse_delimited};
use datatable::pricing::{PriceRule, PriceSimulator, PricingContext};
use datatable::settings::{FileStore, SettingsStore, TableSettings};
use datatable::table::DataTable;
use datatable::view::ViewState;
use datatable::{CellValue, save_table};
use log::{info, warn};
use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExportFormat {
    Csv,
    Html,
    Xlsx,
}

/// Load a CSV/TSV file into a typed table, evaluate formulas, export it or
/// run the price simulator.
#[derive(Debug, Parser)]
#[command(name = "datatable-cli", version)]
struct Args {
    /// CSV or TSV file to import
    input: Option<PathBuf>,

    /// JSON config file (falls back to $DATATABLE_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON array of column definitions; text columns named after the headers when absent
    #[arg(long)]
    columns: Option<PathBuf>,

    /// Formula to evaluate against the imported rows
    #[arg(long)]
    formula: Option<String>,

    #[arg(long, value_enum, requires = "out")]
    export: Option<ExportFormat>,

    #[arg(long)]
    out: Option<PathBuf>,

    /// Write a compressed snapshot of the table
    #[arg(long)]
    save: Option<PathBuf>,

    /// JSON array of price rules to simulate
    #[arg(long, requires = "price")]
    rules: Option<PathBuf>,

    /// Base price for the simulation
    #[arg(long)]
    price: Option<f64>,

    /// JSON object used as the pricing context
    #[arg(long)]
    context: Option<String>,

    /// Interactive prompt after loading
    #[arg(long)]
    repl: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();
    let config = Config::resolve(args.config.as_deref())?;

    if let Some(rules_path) = &args.rules {
        simulate(rules_path, args.price.unwrap_or_default(), args.context.as_deref())?;
    }

    let Some(input) = &args.input else {
        if args.rules.is_none() {
            eprintln!("Usage: datatable-cli <file> [--formula F] [--export csv|html|xlsx --out PATH] [--repl]");
        }
        return Ok(());
    };

    let columns = match &args.columns {
        Some(path) => serde_json::from_str::<Vec<ColumnConfig>>(&fs::read_to_string(path)?)?,
        None => columns_from_header(input, config.csv_delimiter)?,
    };

    let options = ImportOptions {
        delimiter: config.csv_delimiter,
        ..Default::default()
    };
    let start = Instant::now();
    let result = import_file(input, &columns, &options)?;
    for issue in &result.errors {
        eprintln!("error row {} {}: {}", issue.row, issue.column, issue.message);
    }
    for issue in &result.warnings {
        eprintln!("warning row {} {}: {}", issue.row, issue.column, issue.message);
    }
    println!(
        "[{:.1}] imported {} rows ({} errors)",
        start.elapsed().as_secs_f64(),
        result.rows.len(),
        result.errors.len()
    );

    let mut table = DataTable::with_rows(columns, result.rows);

    if let Some(formula) = &args.formula {
        println!("{}", table.evaluate(formula));
    }

    if let (Some(format), Some(out)) = (args.export, &args.out) {
        export(&table, format, out, &config)?;
    }

    if let Some(path) = &args.save {
        save_table(&table, path)?;
        info!("snapshot written to {}", path.display());
    }

    if args.repl {
        let table_id = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "table".to_string());
        repl(&mut table, &config, &table_id)?;
    }

    Ok(())
}

fn columns_from_header(
    input: &Path,
    delimiter: Option<char>,
) -> Result<Vec<ColumnConfig>, Box<dyn Error>> {
    let text = fs::read_to_string(input)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    let first_line = text.lines().next().unwrap_or("");
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(first_line));
    let headers = parse_delimited(first_line, delimiter)
        .into_iter()
        .next()
        .unwrap_or_default();

    Ok(headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let title = h.trim();
            let id = if title.is_empty() {
                index_to_letters(i).to_lowercase()
            } else {
                title.to_lowercase().replace(' ', "_")
            };
            ColumnConfig::new(&id, title, ColumnType::Text)
        })
        .collect())
}

fn export(
    table: &DataTable,
    format: ExportFormat,
    out: &Path,
    config: &Config,
) -> Result<(), Box<dyn Error>> {
    let rows = table.computed_rows();
    match format {
        ExportFormat::Csv => fs::write(out, to_csv(&rows, &table.columns, &config.export)?)?,
        ExportFormat::Html => fs::write(out, to_html(&rows, &table.columns, &config.export, Utc::now())?)?,
        #[cfg(feature = "xlsx")]
        ExportFormat::Xlsx => fs::write(
            out,
            datatable::downloader::to_xlsx(&rows, &table.columns, &config.export, None)?,
        )?,
        #[cfg(not(feature = "xlsx"))]
        ExportFormat::Xlsx => return Err("XLSX export requires the `xlsx` feature".into()),
    }
    println!("exported {} rows to {}", rows.len(), out.display());
    Ok(())
}

fn simulate(rules_path: &Path, base_price: f64, context: Option<&str>) -> Result<(), Box<dyn Error>> {
    let rules: Vec<PriceRule> = serde_json::from_str(&fs::read_to_string(rules_path)?)?;
    let context: PricingContext = match context {
        Some(json) => serde_json::from_str(json)?,
        None => PricingContext::new(),
    };

    let calculation = PriceSimulator::new(rules).simulate(base_price, &context);
    for step in &calculation.steps {
        println!("{:>10.2}  {}", step.price_after, step.description);
    }
    for skipped in &calculation.skipped_rules {
        println!("  skipped {}: {}", skipped.rule_name, skipped.reason);
    }
    for warning in &calculation.warnings {
        warn!("{}", warning);
    }
    println!("final price: {:.2}", calculation.final_price);
    Ok(())
}

fn print_table(table: &DataTable, view: &ViewState) {
    let columns = view.ordered_columns(&table.columns);
    let rows = view.apply(&table.computed_rows(), &table.columns);

    print!("{:>4} ", "");
    for column in &columns {
        print!("{:<14.14} ", column.title);
    }
    println!();
    for (i, row) in rows.iter().enumerate() {
        print!("{:>4} ", i + 1);
        for column in &columns {
            let text = row.get(&column.key).map(CellValue::display).unwrap_or_default();
            print!("{:<14.14} ", text);
        }
        println!();
    }
}

fn repl(table: &mut DataTable, config: &Config, table_id: &str) -> Result<(), Box<dyn Error>> {
    let mut settings = match &config.settings_dir {
        Some(dir) => Some(
            SettingsStore::new(FileStore::open(dir)?)
                .prefix(&config.settings_prefix)
                .ttl(Duration::days(config.settings_ttl_days)),
        ),
        None => None,
    };
    let mut saved = match settings.as_mut() {
        Some(store) => store.load::<TableSettings>(table_id)?.unwrap_or_default(),
        None => TableSettings::default(),
    };

    let mut status = String::from("ok");
    let mut show = true;
    let mut start_time = Instant::now();
    loop {
        if show {
            print_table(table, &saved.view);
        }

        print!("[{:.1}] ({}) > ", start_time.elapsed().as_secs_f64(), status);
        io::stdout().flush()?;

        let mut command = String::new();
        if io::stdin().read_line(&mut command)? == 0 {
            break;
        }
        let command = command.trim();
        start_time = Instant::now();

        if command.is_empty() {
            status = String::from("invalid command");
            continue;
        }

        if command == "help" {
            println!("Commands:");
            println!("  q: Quit");
            println!("  =<formula>: Evaluate a formula");
            println!("  set <row> <column> <value>: Edit a cell (rows start at 1)");
            println!("  undo: Revert the last edit");
            println!("  sort <column>: Cycle ascending, descending, unsorted");
            println!("  search <text>: Filter rows by text");
            println!("  disable_output / enable_output: Toggle table display");
            println!("  save <path>: Write a compressed snapshot");
            continue;
        }

        let (verb, rest) = command.split_once(' ').unwrap_or((command, ""));
        status = match verb {
            "q" => break,
            "disable_output" => {
                show = false;
                String::from("ok")
            }
            "enable_output" => {
                show = true;
                String::from("ok")
            }
            "undo" if table.undo() => String::from("ok"),
            "undo" => String::from("no undo"),
            "sort" if table.column(rest).is_some() => {
                saved.view.toggle_sort(rest);
                String::from("ok")
            }
            "search" => {
                saved.view.search = rest.to_string();
                String::from("ok")
            }
            "save" if !rest.is_empty() => match save_table(table, rest) {
                Ok(()) => String::from("saved"),
                Err(e) => e.to_string(),
            },
            "set" => edit(table, rest),
            _ if command.starts_with('=') => {
                println!("{}", table.evaluate(command));
                String::from("ok")
            }
            _ => String::from("invalid command"),
        };
    }

    if let Some(store) = settings.as_mut() {
        store.save(table_id, &saved)?;
    }
    Ok(())
}

fn edit(table: &mut DataTable, args: &str) -> String {
    let mut parts = args.splitn(3, ' ');
    let (Some(row), Some(column), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
        return String::from("usage: set <row> <column> <value>");
    };
    let Ok(row) = row.parse::<usize>() else {
        return String::from("invalid row");
    };
    match table.edit_cell(row.saturating_sub(1), column, CellValue::text(value)) {
        Ok(result) => result.warning.unwrap_or_else(|| String::from("ok")),
        Err(e) => e.to_string(),
    }
}
