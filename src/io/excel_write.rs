use std::collections::HashSet;
use std::path::Path;

use rust_xlsxwriter::{Format, Table, Workbook, Worksheet};
use tracing::debug;

use crate::error::Result;
use crate::io::excel_read;
use crate::model::{CellValue, SheetTable, WorkbookData, datetime_to_excel_serial};

const MAX_SHEET_NAME_LEN: usize = 31;
const DATETIME_NUM_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// Writes the provided tables to the given path, one worksheet per table.
pub fn write_workbook(path: &Path, workbook: &WorkbookData) -> Result<()> {
    let mut workbook_writer = build_workbook(workbook)?;
    workbook_writer.save(path)?;
    Ok(())
}

/// Renders a single table as the bytes of a one-sheet `.xlsx` file.
pub fn table_to_buffer(table: &SheetTable) -> Result<Vec<u8>> {
    let mut workbook_writer = build_workbook(&WorkbookData {
        tables: vec![table.clone()],
    })?;
    Ok(workbook_writer.save_to_buffer()?)
}

fn build_workbook(workbook: &WorkbookData) -> Result<Workbook> {
    let mut workbook_writer = Workbook::new();
    let datetime_format = Format::new().set_num_format(DATETIME_NUM_FORMAT);

    for table in &workbook.tables {
        let worksheet = workbook_writer.add_worksheet();
        worksheet.set_name(sanitize_sheet_name(&table.sheet_name))?;

        for (col_idx, header) in table.columns.iter().enumerate() {
            worksheet.write_string(0, col_idx as u16, header)?;
        }

        for (row_idx, row) in table.rows.iter().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                write_cell(
                    worksheet,
                    (row_idx + 1) as u32,
                    col_idx as u16,
                    cell,
                    &datetime_format,
                )?;
            }
        }

        if has_table_header(table) {
            let mut excel_table = Table::new();
            excel_table.set_autofilter(true);
            let col_end = (table.columns.len() as u16).saturating_sub(1);
            let row_end = table.rows.len() as u32;
            worksheet.add_table(0, 0, row_end, col_end, &excel_table)?;
        }
    }

    Ok(workbook_writer)
}

/// Writes a single table as a one-sheet workbook.
pub fn write_table(path: &Path, table: &SheetTable) -> Result<()> {
    write_workbook(
        path,
        &WorkbookData {
            tables: vec![table.clone()],
        },
    )
}

/// Replaces the named sheets of an existing workbook, keeping every other
/// sheet's values. When `path` does not exist a new workbook is created.
pub fn replace_sheets(path: &Path, tables: Vec<SheetTable>) -> Result<()> {
    let mut workbook = if path.exists() {
        excel_read::read_workbook(path)?
    } else {
        WorkbookData::default()
    };

    for mut table in tables {
        // Match against the names the workbook was written with.
        table.sheet_name = sanitize_sheet_name(&table.sheet_name);
        debug!(sheet = %table.sheet_name, rows = table.rows.len(), "replacing sheet");
        workbook.upsert(table);
    }

    write_workbook(path, &workbook)
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &CellValue,
    datetime_format: &Format,
) -> Result<()> {
    match cell {
        CellValue::Empty => {}
        CellValue::String(value) | CellValue::Error(value) => {
            worksheet.write_string(row, col, value)?;
        }
        CellValue::Number(value) => {
            worksheet.write_number(row, col, *value)?;
        }
        CellValue::Int(value) => {
            worksheet.write_number(row, col, *value as f64)?;
        }
        CellValue::Bool(value) => {
            worksheet.write_boolean(row, col, *value)?;
        }
        CellValue::DateTime(value) => match datetime_to_excel_serial(value) {
            Some(serial) => {
                worksheet.write_number_with_format(row, col, serial, datetime_format)?;
            }
            None => {
                worksheet.write_string(row, col, cell.to_text())?;
            }
        },
    }
    Ok(())
}

/// Excel tables need unique, non-empty headers and at least one data row.
fn has_table_header(table: &SheetTable) -> bool {
    if table.columns.is_empty() || table.rows.is_empty() {
        return false;
    }
    let mut seen = HashSet::new();
    table
        .columns
        .iter()
        .all(|header| !header.trim().is_empty() && seen.insert(header.to_lowercase()))
}

/// Replaces characters Excel rejects in sheet names and enforces the
/// 31-character limit.
pub fn sanitize_sheet_name(raw: &str) -> String {
    let invalid = [':', '\\', '/', '?', '*', '[', ']', '\'', '"'];
    let mut sanitized: String = raw
        .chars()
        .map(|ch| {
            if invalid.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    sanitized = sanitized.trim().to_string();
    if sanitized.is_empty() {
        sanitized = "Sheet".to_string();
    }

    if sanitized.chars().count() > MAX_SHEET_NAME_LEN {
        sanitized = sanitized.chars().take(MAX_SHEET_NAME_LEN).collect();
    }

    sanitized
}
