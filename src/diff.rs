//! Title-existence diff between two sheets.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::error::Result;
use crate::io::excel_write::sanitize_sheet_name;
use crate::model::{CellValue, SheetTable};

pub const DEFAULT_LEFT_SHEET: &str = "SMART SHEET DATA";
pub const DEFAULT_RIGHT_SHEET: &str = "PACELOGIC";
pub const DEFAULT_KEY_COLUMN: &str = "title";

/// Rows present on one side only.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleDiff {
    /// Left rows whose title is absent from the right table.
    pub missing_from_right: SheetTable,
    /// Right rows whose title is absent from the left table.
    pub missing_from_left: SheetTable,
}

/// Trims and lower-cases every header.
pub fn normalize_headers(table: &mut SheetTable) {
    for header in &mut table.columns {
        *header = header.trim().to_lowercase();
    }
}

/// Output sheet name for rows not found in `sheet`, e.g.
/// `NOT_FOUND_IN_PACELOGIC`. The name is already valid for Excel, so reruns
/// find and replace the sheet they wrote before.
pub fn not_found_sheet_name(sheet: &str) -> String {
    let suffix: String = sheet
        .trim()
        .to_uppercase()
        .chars()
        .map(|ch| if ch.is_whitespace() { '_' } else { ch })
        .collect();
    sanitize_sheet_name(&format!("NOT_FOUND_IN_{suffix}"))
}

/// Compares the raw values of `column` in both tables. Headers are
/// normalized first, so `column` is matched case-insensitively. Output tables
/// keep their source's normalized header and row order.
pub fn diff_titles(left: &SheetTable, right: &SheetTable, column: &str) -> Result<TitleDiff> {
    let column = column.trim().to_lowercase();
    let mut left = left.clone();
    let mut right = right.clone();
    normalize_headers(&mut left);
    normalize_headers(&mut right);

    let left_col = left.require_column(&column)?;
    let right_col = right.require_column(&column)?;

    let missing_from_right = rows_absent_from(&left, left_col, &right, right_col);
    let missing_from_left = rows_absent_from(&right, right_col, &left, left_col);

    debug!(
        missing_from_right = missing_from_right.rows.len(),
        missing_from_left = missing_from_left.rows.len(),
        "title diff computed"
    );

    Ok(TitleDiff {
        missing_from_right,
        missing_from_left,
    })
}

fn rows_absent_from(
    source: &SheetTable,
    source_col: usize,
    other: &SheetTable,
    other_col: usize,
) -> SheetTable {
    let present: HashSet<TitleKey> = (0..other.rows.len())
        .map(|row| TitleKey::from(other.cell(row, other_col)))
        .collect();

    let mut table = SheetTable::new(not_found_sheet_name(&other.sheet_name), source.columns.clone());
    for (row, cells) in source.rows.iter().enumerate() {
        if !present.contains(&TitleKey::from(source.cell(row, source_col))) {
            table.push_row(cells.clone());
        }
    }
    table
}

/// Hashable form of a raw title. Equal keys mean exactly equal cells, except
/// that every blank form maps to `Blank`.
#[derive(Debug, PartialEq, Eq, Hash)]
enum TitleKey {
    Blank,
    Text(String),
    Number(u64),
    Int(i64),
    Bool(bool),
    DateTime(NaiveDateTime),
    Error(String),
}

impl From<&CellValue> for TitleKey {
    fn from(value: &CellValue) -> Self {
        match value {
            _ if value.is_blank() => TitleKey::Blank,
            CellValue::Empty => TitleKey::Blank,
            CellValue::String(text) => TitleKey::Text(text.clone()),
            // -0.0 == 0.0 for floats, so both share one key.
            CellValue::Number(number) if *number == 0.0 => TitleKey::Number(0.0f64.to_bits()),
            CellValue::Number(number) => TitleKey::Number(number.to_bits()),
            CellValue::Int(number) => TitleKey::Int(*number),
            CellValue::Bool(flag) => TitleKey::Bool(*flag),
            CellValue::DateTime(datetime) => TitleKey::DateTime(*datetime),
            CellValue::Error(error) => TitleKey::Error(error.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;

    fn table(name: &str, header: &str, titles: &[CellValue]) -> SheetTable {
        let mut table = SheetTable::new(name, vec![header.to_string(), "Owner".to_string()]);
        for (idx, title) in titles.iter().enumerate() {
            table.push_row(vec![title.clone(), CellValue::Int(idx as i64)]);
        }
        table
    }

    #[test]
    fn reports_rows_missing_on_each_side() {
        let left = table(
            "SMART SHEET DATA",
            " Title ",
            &["a_b_2024-01-01".into(), "c_d_2024-01-02".into()],
        );
        let right = table(
            "PACELOGIC",
            "TITLE",
            &["c_d_2024-01-02".into(), "e_f_2024-01-03".into()],
        );

        let diff = diff_titles(&left, &right, "Title").unwrap();

        assert_eq!(diff.missing_from_right.sheet_name, "NOT_FOUND_IN_PACELOGIC");
        assert_eq!(diff.missing_from_right.columns, vec!["title", "owner"]);
        assert_eq!(diff.missing_from_right.rows.len(), 1);
        assert_eq!(diff.missing_from_right.rows[0][0], CellValue::from("a_b_2024-01-01"));

        assert_eq!(diff.missing_from_left.sheet_name, "NOT_FOUND_IN_SMART_SHEET_DATA");
        assert_eq!(diff.missing_from_left.rows.len(), 1);
        assert_eq!(diff.missing_from_left.rows[0][0], CellValue::from("e_f_2024-01-03"));
    }

    #[test]
    fn comparison_is_exact_on_raw_values() {
        let left = table("L", "title", &["Abc".into(), CellValue::Number(5.0)]);
        let right = table("R", "title", &["abc".into(), "5".into()]);

        let diff = diff_titles(&left, &right, "title").unwrap();
        assert_eq!(diff.missing_from_right.rows.len(), 2);
        assert_eq!(diff.missing_from_left.rows.len(), 2);
    }

    #[test]
    fn blank_titles_match_each_other() {
        let left = table("L", "title", &[CellValue::Empty, "".into(), CellValue::Number(-0.0)]);
        let right = table("R", "title", &["".into(), CellValue::Number(0.0)]);

        let diff = diff_titles(&left, &right, "title").unwrap();
        assert!(diff.missing_from_right.rows.is_empty());
        assert!(diff.missing_from_left.rows.is_empty());
    }

    #[test]
    fn long_sheet_names_fit_excel() {
        assert_eq!(
            not_found_sheet_name("PACELOGIC EXPORT 2024 Q1"),
            "NOT_FOUND_IN_PACELOGIC_EXPORT_2"
        );
        assert_eq!(not_found_sheet_name("A/B"), "NOT_FOUND_IN_A_B");
    }

    #[test]
    fn missing_title_column_is_an_error() {
        let left = table("L", "title", &[]);
        let right = table("R", "name", &[]);
        let err = diff_titles(&left, &right, "title").unwrap_err();
        assert!(matches!(err, ToolError::MissingColumn { ref side, .. } if side.contains("'R'")));
    }
}
