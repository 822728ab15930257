//! Grade records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::{FieldValue, Record};

/// A grade row as stored in the remote `grades` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    /// Stable unique identifier.
    pub id: Uuid,

    /// Student this grade belongs to.
    pub student_id: Uuid,

    /// Course the grade was earned in.
    pub course_id: Uuid,

    /// Letter grade (e.g. "A", "B+").
    pub grade: String,

    /// Numeric grade point on the 0.0-4.0 scale.
    pub grade_point: f64,

    /// Semester label (e.g. "odd", "even").
    pub semester: String,

    /// Academic year label (e.g. "2023/2024").
    pub academic_year: String,

    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

impl Record for Grade {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "id" => FieldValue::Text(self.id.to_string()),
            "student_id" => FieldValue::Text(self.student_id.to_string()),
            "course_id" => FieldValue::Text(self.course_id.to_string()),
            "grade" => FieldValue::Text(self.grade.clone()),
            "grade_point" => FieldValue::Float(self.grade_point),
            "semester" => FieldValue::Text(self.semester.clone()),
            "academic_year" => FieldValue::Text(self.academic_year.clone()),
            _ => FieldValue::Null,
        }
    }

    fn search_text(&self) -> String {
        format!("{} {}", self.grade.to_lowercase(), self.academic_year)
    }

    fn display_name(&self) -> String {
        self.grade.clone()
    }
}
