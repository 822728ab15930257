//! Change-stream event types.
//!
//! The remote transport delivers loosely-typed `{kind, new, old}` payloads;
//! this module decodes them into the closed [`ChangeEvent`] union so that
//! every consumer is forced to handle all three change kinds exhaustively.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Remote tables the client is allowed to subscribe to.
///
/// The allow-list is closed by construction; there is no way to hand the
/// client an arbitrary collection name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Students,
    Grades,
    Courses,
    Profiles,
}

impl Table {
    /// Remote table name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Students => "students",
            Self::Grades => "grades",
            Self::Courses => "courses",
            Self::Profiles => "profiles",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a single change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Which change kinds a subscription delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventMask {
    Insert,
    Update,
    Delete,
    All,
}

impl EventMask {
    /// Whether a change of `kind` passes this mask.
    #[must_use]
    pub const fn accepts(self, kind: ChangeKind) -> bool {
        match self {
            Self::All => true,
            Self::Insert => matches!(kind, ChangeKind::Insert),
            Self::Update => matches!(kind, ChangeKind::Update),
            Self::Delete => matches!(kind, ChangeKind::Delete),
        }
    }
}

/// A decoded change event for one record type.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<R> {
    /// A row was inserted.
    Inserted(R),

    /// A row was updated. The transport only carries the old row when the
    /// table's replica identity includes it, so `old` is optional.
    Updated {
        /// Previous row state, when the transport provided it.
        old: Option<R>,
        /// New row state.
        new: R,
    },

    /// A row was deleted; only its identity survives.
    Deleted {
        /// Identifier of the deleted row.
        id: Uuid,
    },
}

impl<R> ChangeEvent<R> {
    /// The change kind of this event.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        match self {
            Self::Inserted(_) => ChangeKind::Insert,
            Self::Updated { .. } => ChangeKind::Update,
            Self::Deleted { .. } => ChangeKind::Delete,
        }
    }
}

/// A raw change payload as delivered by the transport, before decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawChange {
    /// Kind of change.
    pub kind: ChangeKind,

    /// New row state (inserts and updates).
    #[serde(default)]
    pub new: Option<serde_json::Value>,

    /// Old row state (deletes, and updates when available).
    #[serde(default)]
    pub old: Option<serde_json::Value>,
}

/// Errors turning a raw payload into a [`ChangeEvent`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is missing the row object its kind requires.
    #[error("{kind:?} event missing `{field}` payload")]
    MissingPayload {
        /// Kind of the offending event.
        kind: ChangeKind,
        /// Name of the absent payload field.
        field: &'static str,
    },

    /// The row object did not deserialize into the record type.
    #[error("malformed {kind:?} payload: {source}")]
    Malformed {
        /// Kind of the offending event.
        kind: ChangeKind,
        /// Underlying deserialization error.
        source: serde_json::Error,
    },

    /// A delete payload carried no usable record id.
    #[error("delete payload missing record id")]
    MissingId,
}

impl RawChange {
    /// Decode into a typed event.
    ///
    /// Deletes only need the `id` of the old row; the remote service strips
    /// the remaining columns, so the full record is not required.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the payload its kind requires is
    /// absent or malformed.
    pub fn decode<R: DeserializeOwned>(self) -> Result<ChangeEvent<R>, DecodeError> {
        match self.kind {
            ChangeKind::Insert => {
                let new = self.new.ok_or(DecodeError::MissingPayload {
                    kind: ChangeKind::Insert,
                    field: "new",
                })?;
                let record = serde_json::from_value(new).map_err(|source| {
                    DecodeError::Malformed {
                        kind: ChangeKind::Insert,
                        source,
                    }
                })?;
                Ok(ChangeEvent::Inserted(record))
            }
            ChangeKind::Update => {
                let new = self.new.ok_or(DecodeError::MissingPayload {
                    kind: ChangeKind::Update,
                    field: "new",
                })?;
                let new = serde_json::from_value(new).map_err(|source| {
                    DecodeError::Malformed {
                        kind: ChangeKind::Update,
                        source,
                    }
                })?;
                // The old row is best-effort: a payload that carries one but
                // fails to decode it degrades to `None` rather than losing
                // the whole event.
                let old = self
                    .old
                    .and_then(|value| serde_json::from_value(value).ok());
                Ok(ChangeEvent::Updated { old, new })
            }
            ChangeKind::Delete => {
                let old = self.old.ok_or(DecodeError::MissingPayload {
                    kind: ChangeKind::Delete,
                    field: "old",
                })?;
                let id = old
                    .get("id")
                    .and_then(|value| serde_json::from_value::<Uuid>(value.clone()).ok())
                    .ok_or(DecodeError::MissingId)?;
                Ok(ChangeEvent::Deleted { id })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use insight_core::Student;

    fn student_row(id: Uuid, program: &str) -> serde_json::Value {
        json!({
            "id": id,
            "student_number": "2110512034",
            "name": "Siti Rahayu",
            "program": program,
            "cohort_year": 2021,
            "status": "active",
            "gpa": 3.4,
            "current_semester": 6,
            "created_at": "2021-08-01T00:00:00Z",
            "updated_at": "2024-02-01T00:00:00Z",
        })
    }

    #[test]
    fn test_mask_accepts() {
        assert!(EventMask::All.accepts(ChangeKind::Insert));
        assert!(EventMask::All.accepts(ChangeKind::Delete));
        assert!(EventMask::Insert.accepts(ChangeKind::Insert));
        assert!(!EventMask::Insert.accepts(ChangeKind::Update));
        assert!(!EventMask::Delete.accepts(ChangeKind::Insert));
    }

    #[test]
    fn test_decode_insert() {
        let id = Uuid::new_v4();
        let raw = RawChange {
            kind: ChangeKind::Insert,
            new: Some(student_row(id, "CS")),
            old: None,
        };
        let event: ChangeEvent<Student> = raw.decode().unwrap();
        match event {
            ChangeEvent::Inserted(student) => assert_eq!(student.id, id),
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_update_without_old_row() {
        let id = Uuid::new_v4();
        let raw = RawChange {
            kind: ChangeKind::Update,
            new: Some(student_row(id, "EE")),
            old: None,
        };
        let event: ChangeEvent<Student> = raw.decode().unwrap();
        match event {
            ChangeEvent::Updated { old, new } => {
                assert!(old.is_none());
                assert_eq!(new.program, "EE");
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_delete_needs_only_id() {
        let id = Uuid::new_v4();
        let raw = RawChange {
            kind: ChangeKind::Delete,
            new: None,
            old: Some(json!({ "id": id })),
        };
        let event: ChangeEvent<Student> = raw.decode().unwrap();
        assert_eq!(event, ChangeEvent::Deleted { id });
    }

    #[test]
    fn test_decode_insert_without_payload_fails() {
        let raw = RawChange {
            kind: ChangeKind::Insert,
            new: None,
            old: None,
        };
        let err = raw.decode::<Student>().unwrap_err();
        assert!(matches!(err, DecodeError::MissingPayload { .. }));
    }

    #[test]
    fn test_decode_malformed_payload_fails() {
        let raw = RawChange {
            kind: ChangeKind::Insert,
            new: Some(json!({ "id": "not-a-uuid" })),
            old: None,
        };
        let err = raw.decode::<Student>().unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }
}
