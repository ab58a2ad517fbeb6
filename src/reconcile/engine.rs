use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Result, ToolError};
use crate::model::{CellValue, Record, SheetTable};
use crate::reconcile::compare::{Comparable, comparable, values_differ};
use crate::reconcile::config::{DuplicatePolicy, MissingKeyPolicy, ReconcileConfig};
use crate::reconcile::key::{JoinKey, KeyNormalizer, normalize_key};

/// Column holding the classification in every result table.
pub const FLAG_COLUMN: &str = "flag";
/// Column naming the source side in the rejected-rows table.
pub const SIDE_COLUMN: &str = "side";

pub const CHANGES_SHEET: &str = "changes";
pub const ALL_SHEET: &str = "all";
pub const REJECTED_SHEET: &str = "rejected";

// ---------------------------------------------------------------------------
// Row model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Old,
    New,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Old => write!(f, "old"),
            Self::New => write!(f, "new"),
        }
    }
}

/// Which inputs contributed to an aligned row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    OldOnly,
    NewOnly,
    Both,
}

/// Classification of an aligned row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    /// Only in the old data.
    Old,
    /// Only in the new data.
    New,
    /// In both, with at least one tracked column changed.
    Updated,
    /// In both, with every tracked column equal.
    Unchanged,
}

impl Flag {
    /// Rows that belong in the changes view.
    pub fn is_change(&self) -> bool {
        matches!(self, Flag::New | Flag::Updated)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Old => write!(f, "old"),
            Self::New => write!(f, "new"),
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Outer-join pairing of at most one old and one new record.
#[derive(Debug, Clone)]
pub struct AlignedRow<'a> {
    pub key: JoinKey,
    pub origin: Origin,
    pub old: Option<Record<'a>>,
    pub new: Option<Record<'a>>,
}

impl AlignedRow<'_> {
    /// New value when non-blank, else old value, else blank.
    pub fn effective_value(&self, column: &str) -> CellValue {
        self.new
            .map(|record| record.get(column))
            .filter(|value| !value.is_blank())
            .or_else(|| {
                self.old
                    .map(|record| record.get(column))
                    .filter(|value| !value.is_blank())
            })
            .cloned()
            .unwrap_or_default()
    }
}

/// A row left out of the join because its key had a missing part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    pub side: Side,
    /// One-based worksheet row the rejected record was read from.
    pub sheet_row: usize,
    pub key: String,
    #[serde(skip)]
    index: usize,
}

#[derive(Debug)]
pub struct Alignment<'a> {
    pub rows: Vec<AlignedRow<'a>>,
    pub rejected: Vec<RejectedRow>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub aligned_rows: usize,
    pub old: usize,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub rejected: usize,
}

impl ReconcileSummary {
    fn record(&mut self, flag: Flag) {
        self.aligned_rows += 1;
        match flag {
            Flag::Old => self.old += 1,
            Flag::New => self.new += 1,
            Flag::Updated => self.updated += 1,
            Flag::Unchanged => self.unchanged += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub summary: ReconcileSummary,
    /// Tracked columns present on one side only, and therefore not compared.
    pub uncompared_columns: Vec<String>,
    pub rejected: Vec<RejectedRow>,
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Rows flagged `new` or `updated`.
    pub changes: SheetTable,
    /// Every aligned row.
    pub all: SheetTable,
    /// Rows excluded by the missing-key policy, with their side.
    pub rejected: SheetTable,
    pub report: ReconcileReport,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classifies one aligned row from its normalized tracked values, given in
/// tracked-column order. The first differing column decides `updated`.
pub fn classify(origin: Origin, old: &[Comparable], new: &[Comparable]) -> Flag {
    match origin {
        Origin::OldOnly => Flag::Old,
        Origin::NewOnly => Flag::New,
        Origin::Both => {
            if old
                .iter()
                .zip(new)
                .any(|(old_value, new_value)| values_differ(old_value, new_value))
            {
                Flag::Updated
            } else {
                Flag::Unchanged
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Joins an old and a new table on a normalized key and classifies each row.
#[derive(Debug, Clone)]
pub struct Reconciler {
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(config: ReconcileConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Runs the full reconciliation. Nothing is produced unless every
    /// configured column checks out.
    pub fn reconcile(&self, old: &SheetTable, new: &SheetTable) -> Result<ReconcileOutcome> {
        self.check_columns(old, new)?;

        let (compared, uncompared) = self.partition_tracked(old, new);
        for column in &uncompared {
            warn!(%column, "tracked column exists on one side only; not compared");
        }

        let alignment = self.align(old, new)?;

        let output_columns: Vec<String> = self
            .config
            .output_columns()
            .into_iter()
            .filter(|column| old.has_column(column) || new.has_column(column))
            .collect();

        let mut header = output_columns.clone();
        header.push(FLAG_COLUMN.to_string());
        let mut all = SheetTable::new(ALL_SHEET, header.clone());
        let mut changes = SheetTable::new(CHANGES_SHEET, header);
        let mut summary = ReconcileSummary::default();

        for row in &alignment.rows {
            let flag = self.classify_row(row, &compared);
            summary.record(flag);

            let mut cells: Vec<CellValue> = output_columns
                .iter()
                .map(|column| row.effective_value(column))
                .collect();
            cells.push(CellValue::String(flag.to_string()));

            if flag.is_change() {
                changes.push_row(cells.clone());
            }
            all.push_row(cells);
        }

        let rejected = self.rejected_table(&alignment.rejected, old, new, &output_columns);
        summary.rejected = alignment.rejected.len();

        debug!(
            aligned = summary.aligned_rows,
            old = summary.old,
            new = summary.new,
            updated = summary.updated,
            unchanged = summary.unchanged,
            rejected = summary.rejected,
            "reconciliation classified"
        );

        Ok(ReconcileOutcome {
            changes,
            all,
            rejected,
            report: ReconcileReport {
                summary,
                uncompared_columns: uncompared,
                rejected: alignment.rejected,
            },
        })
    }

    /// Full outer join of both tables on the normalized key, ordered by key.
    pub fn align<'a>(&self, old: &'a SheetTable, new: &'a SheetTable) -> Result<Alignment<'a>> {
        let mut rejected = Vec::new();
        let old_index = self.index_side(old, Side::Old, &mut rejected)?;
        let new_index = self.index_side(new, Side::New, &mut rejected)?;

        if !rejected.is_empty() {
            warn!(
                count = rejected.len(),
                "rows with a missing key part were left out of the join"
            );
        }

        let keys: BTreeSet<&JoinKey> = old_index.keys().chain(new_index.keys()).collect();
        let rows = keys
            .into_iter()
            .map(|key| {
                let old_record = old_index.get(key).copied();
                let new_record = new_index.get(key).copied();
                let origin = match (old_record.is_some(), new_record.is_some()) {
                    (true, true) => Origin::Both,
                    (true, false) => Origin::OldOnly,
                    _ => Origin::NewOnly,
                };
                AlignedRow {
                    key: key.clone(),
                    origin,
                    old: old_record,
                    new: new_record,
                }
            })
            .collect();

        Ok(Alignment { rows, rejected })
    }

    fn check_columns(&self, old: &SheetTable, new: &SheetTable) -> Result<()> {
        for column in &self.config.key_columns {
            for (side, table) in [(Side::Old, old), (Side::New, new)] {
                if !table.has_column(column) {
                    return Err(ToolError::MissingColumn {
                        column: column.clone(),
                        side: format!("{side} sheet '{}'", table.sheet_name),
                    });
                }
            }
        }

        for column in &self.config.tracked_columns {
            if !old.has_column(column) && !new.has_column(column) {
                return Err(ToolError::MissingColumn {
                    column: column.clone(),
                    side: format!(
                        "both old sheet '{}' and new sheet '{}'",
                        old.sheet_name, new.sheet_name
                    ),
                });
            }
        }

        Ok(())
    }

    fn partition_tracked(&self, old: &SheetTable, new: &SheetTable) -> (Vec<String>, Vec<String>) {
        self.config
            .tracked_columns
            .iter()
            .cloned()
            .partition(|column| old.has_column(column) && new.has_column(column))
    }

    fn index_side<'a>(
        &self,
        table: &'a SheetTable,
        side: Side,
        rejected: &mut Vec<RejectedRow>,
    ) -> Result<BTreeMap<JoinKey, Record<'a>>> {
        let normalizers: Vec<(&str, KeyNormalizer)> = self
            .config
            .key_columns
            .iter()
            .map(|column| {
                let normalizer = if self.config.is_identifier(column) {
                    KeyNormalizer::Identifier
                } else {
                    KeyNormalizer::Generic
                };
                (column.as_str(), normalizer)
            })
            .collect();

        let mut index: BTreeMap<JoinKey, Record<'a>> = BTreeMap::new();

        for record in table.records() {
            let key = JoinKey(
                normalizers
                    .iter()
                    .map(|(column, normalizer)| normalize_key(record.get(column), *normalizer))
                    .collect(),
            );

            if !key.is_complete() && self.config.missing_keys == MissingKeyPolicy::Reject {
                rejected.push(RejectedRow {
                    side,
                    sheet_row: record.sheet_row(),
                    key: key.to_string(),
                    index: record.index(),
                });
                continue;
            }

            match index.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(slot) => match self.config.duplicates {
                    DuplicatePolicy::Error => {
                        return Err(ToolError::DuplicateKey {
                            side: format!("{side} sheet '{}'", table.sheet_name),
                            key: slot.key().to_string(),
                        });
                    }
                    DuplicatePolicy::KeepFirst => {
                        warn!(
                            %side,
                            key = %slot.key(),
                            sheet_row = record.sheet_row(),
                            "dropping row with duplicate key"
                        );
                    }
                },
            }
        }

        debug!(%side, keys = index.len(), "indexed side");
        Ok(index)
    }

    fn classify_row(&self, row: &AlignedRow<'_>, compared: &[String]) -> Flag {
        let old = self.comparables(row.old, compared);
        let new = self.comparables(row.new, compared);
        classify(row.origin, &old, &new)
    }

    fn comparables(&self, record: Option<Record<'_>>, compared: &[String]) -> Vec<Comparable> {
        match record {
            Some(record) => compared
                .iter()
                .map(|column| comparable(record.get(column), self.config.comparison_for(column)))
                .collect(),
            None => Vec::new(),
        }
    }

    fn rejected_table(
        &self,
        rejected: &[RejectedRow],
        old: &SheetTable,
        new: &SheetTable,
        output_columns: &[String],
    ) -> SheetTable {
        let mut header = output_columns.to_vec();
        header.push(SIDE_COLUMN.to_string());
        let mut table = SheetTable::new(REJECTED_SHEET, header);

        for row in rejected {
            let source = match row.side {
                Side::Old => old,
                Side::New => new,
            };
            let record = source.record(row.index);
            let mut cells: Vec<CellValue> = output_columns
                .iter()
                .map(|column| record.get(column).clone())
                .collect();
            cells.push(CellValue::String(row.side.to_string()));
            table.push_row(cells);
        }

        table
    }
}

/// Reconciles two tables with a one-off [`Reconciler`].
pub fn reconcile(
    old: &SheetTable,
    new: &SheetTable,
    config: &ReconcileConfig,
) -> Result<ReconcileOutcome> {
    Reconciler::new(config.clone())?.reconcile(old, new)
}
