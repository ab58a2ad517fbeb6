//! Row-level reconciliation of an "old" and a "new" version of a dataset.
//!
//! Rows are matched on a normalized key, each aligned row is classified as
//! `old`, `new`, `updated`, or `unchanged`, and two result tables are built:
//! the changes (new and updated rows) and the full view.

pub mod compare;
pub mod config;
pub mod engine;
pub mod key;

pub use config::{ComparisonPolicy, DuplicatePolicy, MissingKeyPolicy, ReconcileConfig};
pub use engine::{
    AlignedRow, Flag, Origin, ReconcileOutcome, ReconcileReport, ReconcileSummary, Reconciler,
    RejectedRow, Side, classify, reconcile,
};
pub use key::{JoinKey, KeyNormalizer, KeyPart};
