//! Record abstraction shared by all synchronized entity types.
//!
//! The sync layer is generic over the rows it keeps in memory; this module
//! defines the trait a row type must implement and the typed field values
//! used by filters and the derived view.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Typed value of a single record field.
///
/// Filters compare these for equality and the derived view sorts by them, so
/// the comparison rules live here instead of being re-derived from JSON at
/// every call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Textual field (names, identifiers, enum-like statuses).
    Text(String),
    /// Integer field (cohort years, semester counters).
    Int(i64),
    /// Floating-point field (GPA).
    Float(f64),
    /// Absent or null field. Sorts after every present value.
    Null,
}

impl FieldValue {
    /// Whether this value is `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Total ordering between two non-null values of the same field.
    ///
    /// Numbers compare numerically (integers and floats mix), text compares
    /// lexicographically. Mixed number/text comparisons rank numbers first;
    /// a well-formed schema never produces them for a single field.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Greater,
            (_, Self::Null) => Ordering::Less,
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            #[allow(clippy::cast_precision_loss)] // GPA-scale numbers, well below 2^52
            (Self::Int(a), Self::Float(b)) => (*a as f64).total_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float(a), Self::Int(b)) => a.total_cmp(&(*b as f64)),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Text(_), _) => Ordering::Greater,
            (_, Self::Text(_)) => Ordering::Less,
        }
    }

    /// Render the value the way the remote service's filter grammar expects.
    #[must_use]
    pub fn to_expr(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Int(n) => n.to_string(),
            Self::Float(x) => x.to_string(),
            Self::Null => "null".to_string(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A row type the sync layer can keep in memory and reconcile.
///
/// Identifiers are immutable once assigned and never reused after deletion;
/// the reconciler relies on both properties for de-duplication.
pub trait Record: Clone + Send + Sync + 'static {
    /// Stable unique identifier.
    fn id(&self) -> Uuid;

    /// Creation timestamp, used for the initial most-recent-first ordering.
    fn created_at(&self) -> DateTime<Utc>;

    /// Typed access to a field by column name. Unknown names yield `Null`.
    fn field(&self, name: &str) -> FieldValue;

    /// Lowercased haystack for free-text search (name and identifier fields).
    fn search_text(&self) -> String;

    /// Human-readable name used in change notifications.
    fn display_name(&self) -> String;
}
