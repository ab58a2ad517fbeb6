use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::{Result, ToolError};

/// Layout used whenever a date-time is rendered as text.
pub const DATETIME_TEXT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Represents a single spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    /// Blank cell, or a cell past the end of a short row.
    #[default]
    Empty,
    /// Plain text.
    String(String),
    /// Floating point number. Excel stores every number this way.
    Number(f64),
    /// Integer number.
    Int(i64),
    /// Boolean literal.
    Bool(bool),
    /// Date-time without a timezone.
    DateTime(NaiveDateTime),
    /// Spreadsheet error literal such as `#N/A`, kept as its text.
    Error(String),
}

impl CellValue {
    /// Returns `true` for blank cells and empty strings.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::String(value) => value.is_empty(),
            _ => false,
        }
    }

    /// Renders the cell as text. Integral numbers lose their fractional part
    /// so that `26.0` and `26` read the same.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::String(value) => value.clone(),
            CellValue::Number(value) => format_number(*value),
            CellValue::Int(value) => value.to_string(),
            CellValue::Bool(value) => value.to_string(),
            CellValue::DateTime(value) => value.format(DATETIME_TEXT_FORMAT).to_string(),
            CellValue::Error(value) => value.clone(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::String(value)
    }
}

fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn excel_epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)
}

/// Converts an Excel serial date (1900 date system) into a date-time.
pub fn datetime_from_excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let millis = (serial * MILLIS_PER_DAY).round() as i64;
    excel_epoch()?.checked_add_signed(Duration::milliseconds(millis))
}

/// Converts a date-time into an Excel serial date (1900 date system).
pub fn datetime_to_excel_serial(value: &NaiveDateTime) -> Option<f64> {
    let elapsed = *value - excel_epoch()?;
    Some(elapsed.num_milliseconds() as f64 / MILLIS_PER_DAY)
}

const DATETIME_LAYOUTS: [&str; 7] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d-%b-%Y %H:%M:%S",
];

const DATE_LAYOUTS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%d-%b-%Y", "%Y/%m/%d"];

/// Parses date-time text in the layouts spreadsheets commonly export.
/// A bare date reads as midnight.
pub fn parse_datetime_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    DATETIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
        .or_else(|| {
            DATE_LAYOUTS
                .iter()
                .find_map(|layout| NaiveDate::parse_from_str(text, layout).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// A header row plus data rows that map onto one worksheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub sheet_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    /// One-based worksheet row of each data row.
    sheet_rows: Vec<usize>,
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl SheetTable {
    /// Creates an empty table with the given header.
    pub fn new(sheet_name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            columns,
            rows: Vec::new(),
            sheet_rows: Vec::new(),
        }
    }

    /// Position of the column with exactly this header.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|header| header == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// Like [`column_index`](Self::column_index), but a missing column is an
    /// error naming this sheet.
    pub fn require_column(&self, column: &str) -> Result<usize> {
        self.column_index(column)
            .ok_or_else(|| ToolError::MissingColumn {
                column: column.to_string(),
                side: format!("sheet '{}'", self.sheet_name),
            })
    }

    /// Cell at the given coordinates. Short rows read as blank.
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    /// Appends a row, padding or truncating it to the header width. The row
    /// is numbered as if it directly followed the previous one.
    pub fn push_row(&mut self, cells: Vec<CellValue>) {
        let sheet_row = self.sheet_rows.last().map_or(2, |last| last + 1);
        self.push_row_at(cells, sheet_row);
    }

    /// Appends a row that sits on the given one-based worksheet row.
    pub fn push_row_at(&mut self, mut cells: Vec<CellValue>, sheet_row: usize) {
        cells.resize(self.columns.len(), CellValue::Empty);
        self.rows.push(cells);
        self.sheet_rows.push(sheet_row);
    }

    /// One-based worksheet row of a data row, counting the header as row 1
    /// unless the table was read from a sheet with gaps.
    pub fn sheet_row(&self, row: usize) -> usize {
        self.sheet_rows.get(row).copied().unwrap_or(row + 2)
    }

    /// Views a row as a column → value mapping.
    pub fn record(&self, row: usize) -> Record<'_> {
        Record { table: self, row }
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        (0..self.rows.len()).map(move |row| self.record(row))
    }

    /// Returns the index of `column`, appending an empty column when it does
    /// not exist yet.
    pub fn ensure_column(&mut self, column: &str) -> usize {
        if let Some(index) = self.column_index(column) {
            return index;
        }
        self.columns.push(column.to_string());
        for row in &mut self.rows {
            row.push(CellValue::Empty);
        }
        self.columns.len() - 1
    }

    /// Overwrites a single cell, growing the row if it is short.
    pub fn set_cell(&mut self, row: usize, col: usize, value: CellValue) {
        if let Some(cells) = self.rows.get_mut(row) {
            if cells.len() <= col {
                cells.resize(col + 1, CellValue::Empty);
            }
            cells[col] = value;
        }
    }
}

/// Borrowed view of one table row.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    table: &'a SheetTable,
    row: usize,
}

impl<'a> Record<'a> {
    /// Zero-based data row index (the header is not counted).
    pub fn index(&self) -> usize {
        self.row
    }

    /// One-based worksheet row this record was read from.
    pub fn sheet_row(&self) -> usize {
        self.table.sheet_row(self.row)
    }

    /// Value of `column`, or blank when the table has no such column.
    pub fn get(&self, column: &str) -> &'a CellValue {
        match self.table.column_index(column) {
            Some(col) => self.table.cell(self.row, col),
            None => &EMPTY_CELL,
        }
    }
}

/// Represents all tables required to materialise an Excel workbook.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkbookData {
    pub tables: Vec<SheetTable>,
}

impl WorkbookData {
    pub fn sheet(&self, name: &str) -> Option<&SheetTable> {
        self.tables.iter().find(|table| table.sheet_name == name)
    }

    /// Replaces the sheet with the same name, or appends the table when the
    /// workbook has no such sheet.
    pub fn upsert(&mut self, table: SheetTable) {
        match self
            .tables
            .iter_mut()
            .find(|existing| existing.sheet_name == table.sheet_name)
        {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
    }
}
