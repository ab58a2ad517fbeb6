use std::path::Path;

use calamine::{DataType, Reader, Xlsx, open_workbook};

use crate::error::{Result, ToolError};
use crate::model::{
    CellValue, SheetTable, WorkbookData, datetime_from_excel_serial, parse_datetime_text,
};

/// Reads one worksheet. The first row of the used range is the header and
/// every following non-blank row becomes a data row padded to the header
/// width.
pub fn read_sheet(path: &Path, sheet: &str) -> Result<SheetTable> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = read_required_sheet(&mut workbook, sheet)?;
    Ok(range_to_table(sheet, &range))
}

/// Reads every worksheet in workbook order.
pub fn read_workbook(path: &Path) -> Result<WorkbookData> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let mut tables = Vec::new();
    for name in workbook.sheet_names().to_vec() {
        let range = read_required_sheet(&mut workbook, &name)?;
        tables.push(range_to_table(&name, &range));
    }
    Ok(WorkbookData { tables })
}

fn read_required_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
) -> Result<calamine::Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("missing sheet '{name}'")))?;
    let range = range_result.map_err(ToolError::from)?;
    Ok(range)
}

fn range_to_table(name: &str, range: &calamine::Range<DataType>) -> SheetTable {
    let columns: Vec<String> = match range.rows().next() {
        Some(first_row) => first_row
            .iter()
            .enumerate()
            .map(|(idx, cell)| {
                let header = cell_to_value(cell).to_text().trim().to_string();
                if header.is_empty() {
                    format!("column_{}", idx + 1)
                } else {
                    header
                }
            })
            .collect(),
        None => Vec::new(),
    };

    // Worksheet row of the header, one-based.
    let header_row = range.start().map_or(1, |(row, _)| row as usize + 1);

    let mut table = SheetTable::new(name, columns);
    for (offset, row) in range.rows().enumerate().skip(1) {
        let cells: Vec<CellValue> = row.iter().map(cell_to_value).collect();
        if cells.iter().all(CellValue::is_blank) {
            continue;
        }
        table.push_row_at(cells, header_row + offset);
    }
    table
}

fn cell_to_value(cell: &DataType) -> CellValue {
    match cell {
        DataType::String(value) => CellValue::String(value.clone()),
        DataType::Float(value) => CellValue::Number(*value),
        DataType::Int(value) => CellValue::Int(*value),
        DataType::Bool(value) => CellValue::Bool(*value),
        DataType::DateTime(serial) => datetime_from_excel_serial(*serial)
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Number(*serial)),
        DataType::DateTimeIso(value) => parse_datetime_text(value)
            .map(CellValue::DateTime)
            .unwrap_or_else(|| CellValue::String(value.clone())),
        DataType::Error(error) => CellValue::Error(error.to_string()),
        DataType::Empty => CellValue::Empty,
        other => CellValue::String(other.to_string()),
    }
}
