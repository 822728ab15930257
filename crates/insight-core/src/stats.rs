//! Aggregate statistics over the full student set.
//!
//! Statistics are always recomputed wholesale from a freshly fetched record
//! set, never patched incrementally; the snapshot either reflects one
//! complete fetch or the previous one.

use serde::Serialize;

use crate::student::{Student, StudentStatus};

/// A snapshot of derived counts and rates over the entire student set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStats {
    /// Total number of students.
    pub total: usize,

    /// Students with status `active`.
    pub active: usize,

    /// Students with status `graduated`.
    pub graduated: usize,

    /// Students with status `dropped_out`.
    pub dropped_out: usize,

    /// Students with status `on_leave`.
    pub on_leave: usize,

    /// Mean GPA over students with a recorded GPA above zero.
    pub average_gpa: f64,

    /// Graduated students as a percentage of the total.
    pub graduation_rate: f64,

    /// Dropped-out students as a percentage of the total.
    pub dropout_rate: f64,
}

impl AggregateStats {
    /// The all-zero snapshot for an empty record set.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            total: 0,
            active: 0,
            graduated: 0,
            dropped_out: 0,
            on_leave: 0,
            average_gpa: 0.0,
            graduation_rate: 0.0,
            dropout_rate: 0.0,
        }
    }

    /// Compute a snapshot from the full student set.
    ///
    /// An empty set yields 0 for every rate and the average, never `NaN`.
    #[must_use]
    pub fn compute(students: &[Student]) -> Self {
        let total = students.len();
        if total == 0 {
            return Self::empty();
        }

        let count = |status: StudentStatus| students.iter().filter(|s| s.status == status).count();
        let active = count(StudentStatus::Active);
        let graduated = count(StudentStatus::Graduated);
        let dropped_out = count(StudentStatus::DroppedOut);
        let on_leave = count(StudentStatus::OnLeave);

        // Mean over students with graded coursework only; a zero GPA means
        // "no grades yet" in the source data, not a grade of zero.
        let gpas: Vec<f64> = students
            .iter()
            .filter_map(|s| s.gpa)
            .filter(|gpa| *gpa > 0.0)
            .collect();
        #[allow(clippy::cast_precision_loss)] // head counts, far below 2^52
        let average_gpa = if gpas.is_empty() {
            0.0
        } else {
            gpas.iter().sum::<f64>() / gpas.len() as f64
        };

        #[allow(clippy::cast_precision_loss)]
        let rate = |part: usize| (part as f64 / total as f64) * 100.0;

        Self {
            total,
            active,
            graduated,
            dropped_out,
            on_leave,
            average_gpa,
            graduation_rate: rate(graduated),
            dropout_rate: rate(dropped_out),
        }
    }
}

impl Default for AggregateStats {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn student(status: StudentStatus, gpa: Option<f64>) -> Student {
        Student {
            id: Uuid::new_v4(),
            student_number: "2110512001".to_string(),
            name: "Test Student".to_string(),
            program: "CS".to_string(),
            cohort_year: 2021,
            status,
            gpa,
            current_semester: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_set_yields_zero_rates() {
        let stats = AggregateStats::compute(&[]);
        assert_eq!(stats, AggregateStats::empty());
        assert!(!stats.graduation_rate.is_nan());
        assert!(!stats.dropout_rate.is_nan());
        assert!(!stats.average_gpa.is_nan());
    }

    #[test]
    fn test_counts_and_rates() {
        let students = vec![
            student(StudentStatus::Active, Some(3.0)),
            student(StudentStatus::Active, Some(3.5)),
            student(StudentStatus::Graduated, Some(3.8)),
            student(StudentStatus::DroppedOut, None),
        ];
        let stats = AggregateStats::compute(&students);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.graduated, 1);
        assert_eq!(stats.dropped_out, 1);
        assert!((stats.graduation_rate - 25.0).abs() < f64::EPSILON);
        assert!((stats.dropout_rate - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_average_gpa_skips_zero_and_absent() {
        let students = vec![
            student(StudentStatus::Active, Some(3.0)),
            student(StudentStatus::Active, Some(4.0)),
            student(StudentStatus::Active, Some(0.0)),
            student(StudentStatus::Active, None),
        ];
        let stats = AggregateStats::compute(&students);
        assert!((stats.average_gpa - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_all_zero_gpas_yield_zero_average() {
        let students = vec![
            student(StudentStatus::Active, Some(0.0)),
            student(StudentStatus::Active, None),
        ];
        let stats = AggregateStats::compute(&students);
        assert!((stats.average_gpa - 0.0).abs() < f64::EPSILON);
    }
}
