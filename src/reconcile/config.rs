use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolError};

/// Passthrough column carried when nothing else is configured.
pub const DEFAULT_PASSTHROUGH_COLUMN: &str = "created";

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// What to do with rows whose key has an empty part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingKeyPolicy {
    /// Leave the row out of the join and report it.
    #[default]
    Reject,
    /// Treat missing parts as equal, so all such rows share one key.
    Join,
}

/// What to do when two rows of one side share a normalized key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Abort the run.
    #[default]
    Error,
    /// Keep the first row in sheet order and drop the rest.
    KeepFirst,
}

/// How tracked values are compared once normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonPolicy {
    /// Coerce both sides to a common scalar type first, so `"5"` equals `5`.
    /// Numeric text loses leading zeros too (`"0123"` equals `"123"`), so
    /// identifier-like tracked columns such as `memberid` should be set to
    /// `strict` in `column_comparison`.
    #[default]
    Canonical,
    /// Compare values of different types as different.
    Strict,
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Options for one reconcile run. Loadable from TOML; every field is optional
/// in the file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileConfig {
    /// Columns whose normalized values form the join key.
    pub key_columns: Vec<String>,
    /// Key columns that may carry spurious `:00.0` / `.0` suffixes.
    pub identifier_columns: Vec<String>,
    /// Columns compared to detect updates, in precedence order.
    pub tracked_columns: Vec<String>,
    /// Columns copied to the output without comparison.
    pub passthrough_columns: Vec<String>,
    pub missing_keys: MissingKeyPolicy,
    pub duplicates: DuplicatePolicy,
    /// Default comparison policy for tracked columns.
    pub comparison: ComparisonPolicy,
    /// Per-column overrides of `comparison`.
    pub column_comparison: BTreeMap<String, ComparisonPolicy>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            key_columns: Vec::new(),
            identifier_columns: Vec::new(),
            tracked_columns: Vec::new(),
            passthrough_columns: vec![DEFAULT_PASSTHROUGH_COLUMN.to_string()],
            missing_keys: MissingKeyPolicy::default(),
            duplicates: DuplicatePolicy::default(),
            comparison: ComparisonPolicy::default(),
            column_comparison: BTreeMap::new(),
        }
    }
}

impl ReconcileConfig {
    /// Convenience constructor for the common single-call case.
    pub fn new<K, T>(key_columns: K, tracked_columns: T) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            key_columns: key_columns.into_iter().map(Into::into).collect(),
            tracked_columns: tracked_columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn from_toml(input: &str) -> Result<Self> {
        let config: ReconcileConfig = toml::from_str(input)?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let source = std::fs::read_to_string(path)?;
        Self::from_toml(&source)
    }

    /// Checks the parts of the config that do not depend on the data.
    pub fn validate(&self) -> Result<()> {
        if self.key_columns.is_empty() {
            return Err(ToolError::InvalidConfig(
                "at least one key column is required".into(),
            ));
        }
        if let Some(column) = self
            .key_columns
            .iter()
            .find(|column| column.trim().is_empty())
        {
            return Err(ToolError::InvalidConfig(format!(
                "key column name '{column}' is blank"
            )));
        }
        if let Some(column) = self
            .identifier_columns
            .iter()
            .find(|column| !self.key_columns.contains(column))
        {
            return Err(ToolError::InvalidConfig(format!(
                "identifier column '{column}' is not a key column"
            )));
        }
        Ok(())
    }

    pub fn is_identifier(&self, column: &str) -> bool {
        self.identifier_columns.iter().any(|c| c == column)
    }

    /// Comparison policy for a tracked column.
    pub fn comparison_for(&self, column: &str) -> ComparisonPolicy {
        self.column_comparison
            .get(column)
            .copied()
            .unwrap_or(self.comparison)
    }

    /// Key, tracked, and passthrough columns in that order without repeats.
    pub fn output_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for column in self
            .key_columns
            .iter()
            .chain(&self.tracked_columns)
            .chain(&self.passthrough_columns)
        {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
        columns
    }
}
