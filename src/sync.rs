use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::diff::{self, TitleDiff};
use crate::error::{Result, ToolError};
use crate::io::{excel_read, excel_write};
use crate::model::{SheetTable, WorkbookData};
use crate::reconcile::{ReconcileConfig, ReconcileReport, Reconciler};
use crate::title::{self, TitleOptions, TitleStats};

/// A worksheet inside a workbook file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSource {
    pub path: PathBuf,
    pub sheet: String,
}

impl SheetSource {
    pub fn new(path: impl Into<PathBuf>, sheet: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sheet: sheet.into(),
        }
    }
}

/// Where the reconcile results are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutputs {
    /// Workbook receiving only `new` and `updated` rows.
    pub changes: PathBuf,
    /// Workbook receiving every row.
    pub all: PathBuf,
    /// Optional workbook receiving rows rejected for a missing key.
    pub rejected: Option<PathBuf>,
}

/// Loads two sheets, reconciles them, and writes the result workbooks. No
/// file is written unless the reconciliation succeeds, and the outputs only
/// replace their targets once every one of them has been staged.
#[instrument(
    level = "info",
    skip_all,
    fields(
        old = %old.path.display(),
        old_sheet = %old.sheet,
        new = %new.path.display(),
        new_sheet = %new.sheet
    )
)]
pub fn reconcile_workbooks(
    old: &SheetSource,
    new: &SheetSource,
    config: ReconcileConfig,
    outputs: &ReconcileOutputs,
) -> Result<ReconcileReport> {
    let reconciler = Reconciler::new(config)?;

    let old_table = load_sheet(old)?;
    let new_table = load_sheet(new)?;
    info!(
        old_rows = old_table.rows.len(),
        new_rows = new_table.rows.len(),
        "loaded input sheets"
    );

    let outcome = reconciler.reconcile(&old_table, &new_table)?;
    let summary = &outcome.report.summary;
    info!(
        new = summary.new,
        updated = summary.updated,
        unchanged = summary.unchanged,
        old = summary.old,
        rejected = summary.rejected,
        "reconciliation complete"
    );

    let mut files = vec![
        (outputs.changes.as_path(), excel_write::table_to_buffer(&outcome.changes)?),
        (outputs.all.as_path(), excel_write::table_to_buffer(&outcome.all)?),
    ];
    match &outputs.rejected {
        Some(path) => files.push((path.as_path(), excel_write::table_to_buffer(&outcome.rejected)?)),
        None if !outcome.rejected.rows.is_empty() => {
            warn!(
                rows = outcome.rejected.rows.len(),
                "rows with missing keys were rejected and not written anywhere"
            );
        }
        None => {}
    }
    write_staged(&files)?;

    Ok(outcome.report)
}

/// Adds the composite title column to a sheet and writes the workbook back,
/// keeping the other sheets.
#[instrument(level = "info", skip_all, fields(input = %input.display(), sheet = %sheet))]
pub fn compose_title(input: &Path, sheet: &str, options: &TitleOptions) -> Result<TitleStats> {
    let mut workbook = load_workbook(input)?;
    let table = workbook
        .tables
        .iter_mut()
        .find(|table| table.sheet_name == sheet)
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("missing sheet '{sheet}'")))?;

    let stats = title::compose_titles(table, options)?;
    info!(
        rows = stats.rows,
        undated = stats.undated,
        target = %options.target,
        "composite titles derived"
    );

    excel_write::write_workbook(input, &workbook)?;
    Ok(stats)
}

/// Writes the rows of each sheet whose title is missing from the other sheet
/// back into the same workbook as two `NOT_FOUND_IN_*` sheets.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %input.display(), left_sheet = %left_sheet, right_sheet = %right_sheet)
)]
pub fn diff_titles(
    input: &Path,
    left_sheet: &str,
    right_sheet: &str,
    column: &str,
) -> Result<TitleDiff> {
    let workbook = load_workbook(input)?;
    let left = workbook
        .sheet(left_sheet)
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("missing sheet '{left_sheet}'")))?;
    let right = workbook
        .sheet(right_sheet)
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("missing sheet '{right_sheet}'")))?;

    let diff = diff::diff_titles(left, right, column)?;
    info!(
        missing_from_right = diff.missing_from_right.rows.len(),
        missing_from_left = diff.missing_from_left.rows.len(),
        "title diff complete"
    );

    excel_write::replace_sheets(
        input,
        vec![
            diff.missing_from_right.clone(),
            diff.missing_from_left.clone(),
        ],
    )?;
    Ok(diff)
}

fn load_sheet(source: &SheetSource) -> Result<SheetTable> {
    if !source.path.exists() {
        return Err(ToolError::MissingInput(source.path.clone()));
    }
    excel_read::read_sheet(&source.path, &source.sheet)
}

fn load_workbook(path: &Path) -> Result<WorkbookData> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.to_path_buf()));
    }
    excel_read::read_workbook(path)
}

/// Writes every file next to its target under a temporary name, then renames
/// them into place. A failed write removes the staged files and leaves the
/// targets untouched.
fn write_staged(files: &[(&Path, Vec<u8>)]) -> Result<()> {
    let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(files.len());
    for (target, bytes) in files {
        let staging = staging_path(target);
        if let Err(err) = fs::write(&staging, bytes) {
            discard_staged(&staged);
            return Err(err.into());
        }
        staged.push((staging, *target));
    }

    for (staging, target) in &staged {
        fs::rename(staging, target)?;
        debug!(path = %target.display(), "output written");
    }
    Ok(())
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(target.file_name().unwrap_or_default());
    name.push(".partial");
    target.with_file_name(name)
}

fn discard_staged(staged: &[(PathBuf, &Path)]) {
    for (staging, _) in staged {
        if let Err(err) = fs::remove_file(staging) {
            warn!(path = %staging.display(), %err, "failed to remove staged output");
        }
    }
}
