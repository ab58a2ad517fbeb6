use chrono::{NaiveDateTime, Timelike};

use crate::model::{CellValue, parse_datetime_text};
use crate::reconcile::config::ComparisonPolicy;
use crate::reconcile::key::NULL_LITERALS;

/// A tracked value after normalization, ready for equality checks.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparable {
    /// Absent, blank, or a textual null.
    Null,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Comparable {
    pub fn is_null(&self) -> bool {
        matches!(self, Comparable::Null)
    }
}

/// Normalizes a raw cell under the given policy.
pub fn comparable(value: &CellValue, policy: ComparisonPolicy) -> Comparable {
    let strict = match value {
        CellValue::Empty => Comparable::Null,
        CellValue::String(text) | CellValue::Error(text) => normalize_text(text),
        CellValue::Number(number) => Comparable::Number(*number),
        CellValue::Int(number) => Comparable::Number(*number as f64),
        CellValue::Bool(flag) => Comparable::Bool(*flag),
        CellValue::DateTime(datetime) => Comparable::DateTime(*datetime),
    };

    match policy {
        ComparisonPolicy::Strict => strict,
        ComparisonPolicy::Canonical => canonicalize(strict),
    }
}

/// `true` when two normalized values count as a change. Two nulls never do.
pub fn values_differ(old: &Comparable, new: &Comparable) -> bool {
    if old.is_null() && new.is_null() {
        return false;
    }
    old != new
}

fn normalize_text(text: &str) -> Comparable {
    let text = text.trim().to_lowercase();
    if NULL_LITERALS.contains(&text.as_str()) {
        Comparable::Null
    } else {
        Comparable::Text(text)
    }
}

fn canonicalize(value: Comparable) -> Comparable {
    match value {
        Comparable::Text(text) => {
            if let Ok(number) = text.parse::<f64>() {
                if number.is_finite() {
                    return Comparable::Number(number);
                }
            }
            match text.as_str() {
                "true" => return Comparable::Bool(true),
                "false" => return Comparable::Bool(false),
                _ => {}
            }
            match parse_datetime_text(&text) {
                Some(datetime) => truncate_to_seconds(datetime),
                None => Comparable::Text(text),
            }
        }
        Comparable::DateTime(datetime) => truncate_to_seconds(datetime),
        other => other,
    }
}

fn truncate_to_seconds(datetime: NaiveDateTime) -> Comparable {
    Comparable::DateTime(datetime.with_nanosecond(0).unwrap_or(datetime))
}
