//! Client-side derived view: search, sort, paginate.
//!
//! These operate over the already-reconciled in-memory collection; nothing
//! here re-fetches from the remote service. The view is recomputed from
//! scratch on every render, which is cheap at dashboard scale and keeps the
//! reconciled collection itself untouched.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Sort direction for a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// The opposite direction, used when a column header is clicked again.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

/// Sort specification: column name plus direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    /// Column to sort by.
    pub field: String,
    /// Direction to sort in.
    pub direction: SortDirection,
}

/// Parameters of a derived view over the reconciled collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewQuery {
    /// Free-text query, matched case-insensitively against each record's
    /// search text. `None` or empty disables the search stage.
    pub search: Option<String>,

    /// Optional sort. Without one the reconciled (recency) order is kept.
    pub sort: Option<SortSpec>,

    /// Zero-based page index. Out-of-range indexes clamp to the last page.
    pub page: usize,

    /// Rows per page. Zero is treated as one.
    pub page_size: usize,
}

impl ViewQuery {
    /// An unsearched, unsorted view with the given page size (typically
    /// `SyncConfig::page_size`).
    #[must_use]
    pub const fn with_page_size(page_size: usize) -> Self {
        Self {
            search: None,
            sort: None,
            page: 0,
            page_size,
        }
    }
}

/// One page of the derived view.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R> {
    /// Rows on this page, in view order.
    pub rows: Vec<R>,

    /// Total row count after the search stage (before pagination).
    pub total: usize,

    /// The (possibly clamped) page index these rows came from.
    pub page: usize,

    /// Number of pages the searched set spans; at least 1.
    pub page_count: usize,
}

/// Apply search, sort, and pagination to a snapshot of the collection.
///
/// Sorting is stable, so records that compare equal keep their reconciled
/// order. Null field values sort last regardless of direction.
#[must_use]
pub fn apply<R: Record>(records: &[R], query: &ViewQuery) -> Page<R> {
    let needle = query
        .search
        .as_deref()
        .map(str::to_lowercase)
        .filter(|s| !s.is_empty());

    let mut rows: Vec<R> = records
        .iter()
        .filter(|r| {
            needle
                .as_deref()
                .is_none_or(|needle| r.search_text().contains(needle))
        })
        .cloned()
        .collect();

    if let Some(sort) = &query.sort {
        rows.sort_by(|a, b| {
            let left = a.field(&sort.field);
            let right = b.field(&sort.field);
            // Nulls pin to the end in both directions.
            match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => match sort.direction {
                    SortDirection::Ascending => left.compare(&right),
                    SortDirection::Descending => left.compare(&right).reverse(),
                },
            }
        });
    }

    let total = rows.len();
    let page_size = query.page_size.max(1);
    let page_count = total.div_ceil(page_size).max(1);
    let page = query.page.min(page_count - 1);

    let start = page * page_size;
    let rows = if start < total {
        rows[start..(start + page_size).min(total)].to_vec()
    } else {
        Vec::new()
    };

    Page {
        rows,
        total,
        page,
        page_count,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::student::{Student, StudentStatus};

    fn student(name: &str, number: &str, gpa: Option<f64>) -> Student {
        Student {
            id: Uuid::new_v4(),
            student_number: number.to_string(),
            name: name.to_string(),
            program: "CS".to_string(),
            cohort_year: 2021,
            status: StudentStatus::Active,
            gpa,
            current_semester: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn names(page: &Page<Student>) -> Vec<&str> {
        page.rows.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let records = vec![
            student("Siti Rahayu", "2110512034", None),
            student("Budi Santoso", "2210512001", None),
        ];
        let page = apply(
            &records,
            &ViewQuery {
                search: Some("SITI".to_string()),
                page_size: 10,
                ..Default::default()
            },
        );
        assert_eq!(names(&page), vec!["Siti Rahayu"]);
    }

    #[test]
    fn test_search_matches_student_number() {
        let records = vec![
            student("Siti Rahayu", "2110512034", None),
            student("Budi Santoso", "2210512001", None),
        ];
        let page = apply(
            &records,
            &ViewQuery {
                search: Some("22105".to_string()),
                page_size: 10,
                ..Default::default()
            },
        );
        assert_eq!(names(&page), vec!["Budi Santoso"]);
    }

    #[test]
    fn test_sort_places_nulls_last_in_both_directions() {
        let records = vec![
            student("No GPA", "1", None),
            student("High", "2", Some(3.9)),
            student("Low", "3", Some(2.1)),
        ];
        for direction in [SortDirection::Ascending, SortDirection::Descending] {
            let page = apply(
                &records,
                &ViewQuery {
                    sort: Some(SortSpec {
                        field: "gpa".to_string(),
                        direction,
                    }),
                    page_size: 10,
                    ..Default::default()
                },
            );
            assert_eq!(page.rows.last().unwrap().name, "No GPA");
        }
    }

    #[test]
    fn test_sort_descending() {
        let records = vec![
            student("Low", "1", Some(2.1)),
            student("High", "2", Some(3.9)),
        ];
        let page = apply(
            &records,
            &ViewQuery {
                sort: Some(SortSpec {
                    field: "gpa".to_string(),
                    direction: SortDirection::Descending,
                }),
                page_size: 10,
                ..Default::default()
            },
        );
        assert_eq!(names(&page), vec!["High", "Low"]);
    }

    #[test]
    fn test_pagination_bounds() {
        let records: Vec<Student> = (0..25)
            .map(|i| student(&format!("Student {i}"), &i.to_string(), None))
            .collect();
        let page = apply(
            &records,
            &ViewQuery {
                page: 2,
                page_size: 10,
                ..Default::default()
            },
        );
        assert_eq!(page.rows.len(), 5);
        assert_eq!(page.page_count, 3);
        assert_eq!(page.total, 25);

        // Out-of-range page clamps to the last page.
        let clamped = apply(
            &records,
            &ViewQuery {
                page: 99,
                page_size: 10,
                ..Default::default()
            },
        );
        assert_eq!(clamped.page, 2);
        assert_eq!(clamped.rows.len(), 5);
    }

    proptest::proptest! {
        /// Walking every page visits each searched row exactly once,
        /// whatever the page size.
        #[test]
        fn prop_pages_partition_the_collection(
            count in 0usize..40,
            page_size in 1usize..10,
        ) {
            let records: Vec<Student> = (0..count)
                .map(|i| student(&format!("Student {i}"), &i.to_string(), None))
                .collect();
            let mut seen = Vec::new();
            let mut page_index = 0;
            loop {
                let page = apply(
                    &records,
                    &ViewQuery {
                        page: page_index,
                        page_size,
                        ..Default::default()
                    },
                );
                seen.extend(page.rows.iter().map(|s| s.id));
                page_index += 1;
                if page_index >= page.page_count {
                    break;
                }
            }
            let expected: Vec<_> = records.iter().map(|s| s.id).collect();
            proptest::prop_assert_eq!(seen, expected);
        }
    }

    #[test]
    fn test_empty_collection_has_one_empty_page() {
        let page = apply(
            &Vec::<Student>::new(),
            &ViewQuery {
                page_size: 10,
                ..Default::default()
            },
        );
        assert!(page.rows.is_empty());
        assert_eq!(page.page_count, 1);
        assert_eq!(page.total, 0);
    }
}
