//! Shared fixtures for the integration tests.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use insight_core::{Student, StudentStatus};

/// Install a test tracing subscriber once; later calls are no-ops.
/// `RUST_LOG=debug` makes failing runs narrate their state transitions.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Deterministic student: id and creation time derive from `n`, so later
/// numbers sort newer.
#[must_use]
pub fn student(n: u128, program: &str, status: StudentStatus) -> Student {
    let created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        + chrono::Duration::seconds(i64::try_from(n).unwrap());
    Student {
        id: Uuid::from_u128(n),
        student_number: format!("21105120{n:02}"),
        name: format!("Student {n}"),
        program: program.to_string(),
        cohort_year: 2021,
        status,
        gpa: Some(3.0),
        current_semester: 5,
        created_at,
        updated_at: created_at,
    }
}

/// JSON row for seeding the in-memory source.
#[must_use]
pub fn student_row(student: &Student) -> serde_json::Value {
    serde_json::to_value(student).unwrap()
}

/// Poll `condition` until it holds or thirty seconds elapse. The generous
/// bound keeps paused-clock tests from tripping over their own backoff
/// delays; wall-clock tests meet their conditions in milliseconds.
pub async fn wait_for<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(30), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met within timeout");
}
