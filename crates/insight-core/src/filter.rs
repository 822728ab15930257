//! Equality filters over synchronized records.
//!
//! A [`Filter`] is a conjunction of field-equality clauses. It is pure data:
//! the reconciler re-evaluates it against every incoming change event, and
//! the remote query layer renders it into the server-side filter grammar for
//! the initial fetch. An empty filter matches everything.

use serde::{Deserialize, Serialize};

use crate::record::{FieldValue, Record};

/// One `field = value` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    /// Column name the clause applies to.
    pub field: String,
    /// Value the column must equal.
    pub value: FieldValue,
}

/// A conjunction of field-equality clauses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Filter {
    clauses: Vec<FilterClause>,
}

impl Filter {
    /// The filter that matches every record.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            clauses: Vec::new(),
        }
    }

    /// Add an equality clause. Builder-style so call sites read like the
    /// query they express.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.clauses.push(FilterClause {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Whether the filter has no clauses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// The clauses of this filter.
    #[must_use]
    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    /// Evaluate the filter against a record. Every clause must hold.
    #[must_use]
    pub fn matches<R: Record>(&self, record: &R) -> bool {
        self.clauses
            .iter()
            .all(|clause| record.field(&clause.field) == clause.value)
    }

    /// Render the server-side filter expression, `None` when empty.
    ///
    /// The remote service uses a `field=eq.value` conjunction grammar joined
    /// with `&`; null clauses render as `field=is.null`.
    #[must_use]
    pub fn to_expr(&self) -> Option<String> {
        if self.clauses.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .clauses
            .iter()
            .map(|clause| {
                if clause.value.is_null() {
                    format!("{}=is.null", clause.field)
                } else {
                    format!("{}=eq.{}", clause.field, clause.value.to_expr())
                }
            })
            .collect();
        Some(parts.join("&"))
    }
}
