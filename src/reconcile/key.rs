use std::fmt;

use crate::model::CellValue;

/// Text forms that stand for "no value" once trimmed and lower-cased.
pub const NULL_LITERALS: [&str; 3] = ["", "nan", "null"];

/// One normalized key-column value.
///
/// `Present` sorts before `Missing`, so incomplete keys trail the output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Present(String),
    Missing,
}

impl KeyPart {
    pub fn is_missing(&self) -> bool {
        matches!(self, KeyPart::Missing)
    }
}

/// Normalization applied to a key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyNormalizer {
    /// Trim, lower-case, and collapse null literals.
    Generic,
    /// `Generic` plus stripping of trailing `:00.0` and `.0` suffixes.
    Identifier,
}

/// The full, ordered key of one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinKey(pub Vec<KeyPart>);

impl JoinKey {
    /// `true` when no part is missing.
    pub fn is_complete(&self) -> bool {
        !self.0.iter().any(KeyPart::is_missing)
    }
}

impl fmt::Display for JoinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, part) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, "|")?;
            }
            match part {
                KeyPart::Present(value) => write!(f, "{value}")?,
                KeyPart::Missing => write!(f, "<missing>")?,
            }
        }
        Ok(())
    }
}

/// Normalizes a cell for use as (part of) a join key.
pub fn normalize_key(value: &CellValue, normalizer: KeyNormalizer) -> KeyPart {
    normalize_key_text(&value.to_text(), normalizer)
}

/// Normalizes key text: `"26:00.0"` and `"26.0"` both become `"26"` for
/// identifier columns; `"NULL"` and `" nan "` become `Missing`.
pub fn normalize_key_text(text: &str, normalizer: KeyNormalizer) -> KeyPart {
    let mut text = text.trim().to_lowercase();

    if normalizer == KeyNormalizer::Identifier {
        if let Some(stripped) = text.strip_suffix(":00.0") {
            text = stripped.to_string();
        }
        if let Some(stripped) = text.strip_suffix(".0") {
            text = stripped.to_string();
        }
    }

    if NULL_LITERALS.contains(&text.as_str()) {
        KeyPart::Missing
    } else {
        KeyPart::Present(text)
    }
}
