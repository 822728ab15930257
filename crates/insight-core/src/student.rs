//! Student records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::{FieldValue, Record};

/// Enrollment status of a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentStatus {
    /// Currently enrolled.
    Active,
    /// Completed their program.
    Graduated,
    /// Left without completing.
    DroppedOut,
    /// On an approved leave of absence.
    OnLeave,
}

impl StudentStatus {
    /// Canonical column value for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Graduated => "graduated",
            Self::DroppedOut => "dropped_out",
            Self::OnLeave => "on_leave",
        }
    }
}

impl std::fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<StudentStatus> for FieldValue {
    fn from(status: StudentStatus) -> Self {
        Self::Text(status.as_str().to_string())
    }
}

/// A student row as stored in the remote `students` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    /// Stable unique identifier, assigned by the remote service.
    pub id: Uuid,

    /// Institutional student number (the "NIM").
    pub student_number: String,

    /// Full name.
    pub name: String,

    /// Degree program the student is enrolled in.
    pub program: String,

    /// Admission cohort year.
    pub cohort_year: i32,

    /// Enrollment status.
    pub status: StudentStatus,

    /// Cumulative GPA. Absent for students without graded coursework.
    #[serde(default)]
    pub gpa: Option<f64>,

    /// Semester the student is currently in.
    pub current_semester: i32,

    /// Row creation time.
    pub created_at: DateTime<Utc>,

    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Record for Student {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "id" => FieldValue::Text(self.id.to_string()),
            "student_number" => FieldValue::Text(self.student_number.clone()),
            "name" => FieldValue::Text(self.name.clone()),
            "program" => FieldValue::Text(self.program.clone()),
            "cohort_year" => FieldValue::from(self.cohort_year),
            "status" => FieldValue::from(self.status),
            "gpa" => FieldValue::from(self.gpa),
            "current_semester" => FieldValue::from(self.current_semester),
            _ => FieldValue::Null,
        }
    }

    fn search_text(&self) -> String {
        format!(
            "{} {}",
            self.name.to_lowercase(),
            self.student_number.to_lowercase()
        )
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}
