//! Derivation of a composite title column, e.g. `jane_doe_2024-03-05`.

use std::fmt::Write;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::error::{Result, ToolError};
use crate::model::{CellValue, SheetTable, datetime_from_excel_serial, parse_datetime_text};

pub const DEFAULT_TITLE_SHEET: &str = "PACELOGIC";
pub const DEFAULT_TARGET_COLUMN: &str = "Title";
pub const DEFAULT_DATE_COLUMN: &str = "mph_original_requested_date";
pub const DEFAULT_SEPARATOR: &str = "_";
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Describes how the composite column is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleOptions {
    /// Text columns joined in order.
    pub part_columns: Vec<String>,
    /// Column coerced to a date and appended last. A row whose date cannot be
    /// read gets an empty title.
    pub date_column: Option<String>,
    pub separator: String,
    pub target: String,
    /// `chrono` format used to render the date component.
    pub date_format: String,
}

impl Default for TitleOptions {
    fn default() -> Self {
        Self {
            part_columns: vec!["firstname".to_string(), "lastname".to_string()],
            date_column: Some(DEFAULT_DATE_COLUMN.to_string()),
            separator: DEFAULT_SEPARATOR.to_string(),
            target: DEFAULT_TARGET_COLUMN.to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

/// Statistics about one composition pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TitleStats {
    pub rows: usize,
    /// Rows left without a title because their date was unreadable.
    pub undated: usize,
}

/// Coerces a cell into a date-time: native date-times pass through, numbers
/// are read as Excel serial dates, text is parsed in common layouts.
pub fn coerce_datetime(value: &CellValue) -> Option<NaiveDateTime> {
    match value {
        CellValue::DateTime(datetime) => Some(*datetime),
        CellValue::Number(serial) => datetime_from_excel_serial(*serial),
        CellValue::Int(serial) => datetime_from_excel_serial(*serial as f64),
        CellValue::String(text) => parse_datetime_text(text),
        _ => None,
    }
}

/// Adds or overwrites the target column of `table` with the composite title.
/// The date column is rewritten with the coerced date-time.
pub fn compose_titles(table: &mut SheetTable, options: &TitleOptions) -> Result<TitleStats> {
    let (part_indices, date_index) = resolve_columns(table, options)?;
    let target_index = table.ensure_column(&options.target);
    let mut stats = TitleStats::default();

    for row in 0..table.rows.len() {
        let mut parts: Vec<String> = part_indices
            .iter()
            .map(|&col| table.cell(row, col).to_text().trim().to_string())
            .collect();

        let mut dated = true;
        if let Some(col) = date_index {
            let coerced = coerce_datetime(table.cell(row, col));
            match coerced {
                Some(datetime) => {
                    parts.push(render_date(&datetime, &options.date_format)?);
                    table.set_cell(row, col, CellValue::DateTime(datetime));
                }
                None => {
                    dated = false;
                    table.set_cell(row, col, CellValue::Empty);
                }
            }
        }

        let title = if dated {
            CellValue::String(parts.join(&options.separator))
        } else {
            stats.undated += 1;
            CellValue::Empty
        };
        table.set_cell(row, target_index, title);
        stats.rows += 1;
    }

    debug!(rows = stats.rows, undated = stats.undated, target = %options.target, "titles composed");
    Ok(stats)
}

fn render_date(datetime: &NaiveDateTime, format: &str) -> Result<String> {
    let mut rendered = String::new();
    write!(rendered, "{}", datetime.format(format))
        .map_err(|_| ToolError::InvalidConfig(format!("invalid date format '{format}'")))?;
    Ok(rendered)
}

fn resolve_columns(
    table: &SheetTable,
    options: &TitleOptions,
) -> Result<(Vec<usize>, Option<usize>)> {
    let part_indices = options
        .part_columns
        .iter()
        .map(|column| table.require_column(column))
        .collect::<Result<Vec<_>>>()?;
    let date_index = options
        .date_column
        .as_deref()
        .map(|column| table.require_column(column))
        .transpose()?;
    Ok((part_indices, date_index))
}
