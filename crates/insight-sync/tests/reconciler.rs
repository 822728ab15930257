//! Reconciliation semantics: idempotence, filter exits, stale-fetch
//! discards.

#[allow(dead_code)]
mod common;

use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use insight_core::record::FieldValue;
use insight_core::{Filter, Record, Student, StudentStatus};
use insight_sync::{
    ChangeEvent, DataSource, FetchOrder, MemoryDataSource, Notification, NotificationKind,
    Reconciler, SourceError, Table,
};

use common::{student, student_row};

fn reconciler(filter: Filter) -> Reconciler<Student> {
    Reconciler::new(Arc::new(MemoryDataSource::new()), Table::Students, filter)
}

#[test]
fn test_insert_is_idempotent() {
    let reconciler = reconciler(Filter::all());
    let s = student(1, "CS", StudentStatus::Active);

    reconciler.apply_event(ChangeEvent::Inserted(s.clone()));
    reconciler.apply_event(ChangeEvent::Inserted(s.clone()));

    let records = reconciler.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, s.id);
}

#[test]
fn test_insert_ignores_filter_mismatch() {
    let reconciler = reconciler(Filter::all().eq("program", "CS"));
    reconciler.apply_event(ChangeEvent::Inserted(student(1, "EE", StudentStatus::Active)));
    assert!(reconciler.is_empty());
}

#[test]
fn test_update_removes_record_that_left_the_view() {
    let reconciler = reconciler(Filter::all().eq("status", "active"));
    let mut s = student(1, "CS", StudentStatus::Active);
    reconciler.apply_event(ChangeEvent::Inserted(s.clone()));
    assert_eq!(reconciler.len(), 1);

    let old = s.clone();
    s.status = StudentStatus::Graduated;
    reconciler.apply_event(ChangeEvent::Updated {
        old: Some(old),
        new: s,
    });
    assert!(reconciler.is_empty());
}

#[test]
fn test_update_replaces_in_place() {
    let reconciler = reconciler(Filter::all());
    let a = student(1, "CS", StudentStatus::Active);
    let b = student(2, "CS", StudentStatus::Active);
    reconciler.apply_event(ChangeEvent::Inserted(a.clone()));
    reconciler.apply_event(ChangeEvent::Inserted(b.clone()));

    let mut updated = a.clone();
    updated.name = "Renamed".to_string();
    reconciler.apply_event(ChangeEvent::Updated {
        old: Some(a.clone()),
        new: updated,
    });

    let records = reconciler.records();
    // Position preserved: b was prepended after a, so a stays last.
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, b.id);
    assert_eq!(records[1].id, a.id);
    assert_eq!(records[1].name, "Renamed");
}

#[test]
fn test_update_of_unseen_record_is_implicit_insert() {
    let reconciler = reconciler(Filter::all().eq("program", "CS"));
    let s = student(7, "CS", StudentStatus::Active);
    reconciler.apply_event(ChangeEvent::Updated {
        old: None,
        new: s.clone(),
    });
    assert_eq!(reconciler.records()[0].id, s.id);
}

#[test]
fn test_delete_of_absent_id_is_noop() {
    let reconciler = reconciler(Filter::all());
    let s = student(1, "CS", StudentStatus::Active);
    reconciler.apply_event(ChangeEvent::Inserted(s.clone()));
    let before = reconciler.records();

    reconciler.apply_event(ChangeEvent::Deleted { id: Uuid::from_u128(999) });
    assert_eq!(reconciler.records(), before);
}

#[test]
fn test_end_to_end_reconciliation_scenario() {
    // Filtered to program = CS; initial state has student 1.
    let reconciler = reconciler(Filter::all().eq("program", "CS"));
    let s1 = student(1, "CS", StudentStatus::Active);
    reconciler.apply_event(ChangeEvent::Inserted(s1.clone()));

    // New CS student arrives: prepended.
    let s2 = student(2, "CS", StudentStatus::Active);
    reconciler.apply_event(ChangeEvent::Inserted(s2.clone()));
    let ids: Vec<Uuid> = reconciler.records().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![s2.id, s1.id]);

    // Student 1 transfers to EE: leaves the view.
    let mut transferred = s1.clone();
    transferred.program = "EE".to_string();
    reconciler.apply_event(ChangeEvent::Updated {
        old: Some(s1),
        new: transferred,
    });
    let ids: Vec<Uuid> = reconciler.records().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![s2.id]);
}

#[test]
fn test_notifications_follow_applied_changes() {
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
    let reconciler = Reconciler::with_sink(
        Arc::new(MemoryDataSource::new()),
        Table::Students,
        Filter::all().eq("program", "CS"),
        Arc::new(tx),
    );

    let s = student(1, "CS", StudentStatus::Active);
    reconciler.apply_event(ChangeEvent::Inserted(s.clone()));
    let n = rx.try_recv().unwrap();
    assert_eq!(n.kind, NotificationKind::Added);
    assert_eq!(n.id, s.id);
    assert_eq!(n.display_name, s.name);

    // Duplicate insert: no notification.
    reconciler.apply_event(ChangeEvent::Inserted(s.clone()));
    assert!(rx.try_recv().is_err());

    // Filter exit: removal notification.
    let mut moved = s.clone();
    moved.program = "EE".to_string();
    reconciler.apply_event(ChangeEvent::Updated {
        old: Some(s.clone()),
        new: moved,
    });
    assert_eq!(rx.try_recv().unwrap().kind, NotificationKind::Removed);

    // Delete of an id no longer present: no notification.
    reconciler.apply_event(ChangeEvent::Deleted { id: s.id });
    assert!(rx.try_recv().is_err());
}

// ============================================================================
// Stale fetch discards
// ============================================================================

/// Data source whose first fetch blocks until released, so tests can race
/// completions against `close`/`set_filter`.
struct GatedSource {
    gate: std::sync::Mutex<Option<oneshot::Receiver<()>>>,
    rows: Vec<serde_json::Value>,
}

impl GatedSource {
    fn new(rows: Vec<serde_json::Value>) -> (Arc<Self>, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                gate: std::sync::Mutex::new(Some(rx)),
                rows,
            }),
            tx,
        )
    }
}

#[async_trait]
impl DataSource for GatedSource {
    async fn fetch(
        &self,
        _table: Table,
        filter: &Filter,
        _order: FetchOrder,
    ) -> Result<Vec<serde_json::Value>, SourceError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(self
            .rows
            .iter()
            .filter(|row| {
                filter.clauses().iter().all(|clause| {
                    row.get(&clause.field).map(|v| v.to_string().trim_matches('"').to_string())
                        == Some(clause.value.to_expr())
                })
            })
            .cloned()
            .collect())
    }

    async fn insert(&self, _: Table, _: serde_json::Value) -> Result<(), SourceError> {
        Err(SourceError::Mutation("unsupported".to_string()))
    }

    async fn update(&self, _: Table, _: Uuid, _: serde_json::Value) -> Result<(), SourceError> {
        Err(SourceError::Mutation("unsupported".to_string()))
    }

    async fn delete(&self, _: Table, _: Uuid) -> Result<(), SourceError> {
        Err(SourceError::Mutation("unsupported".to_string()))
    }
}

#[tokio::test]
async fn test_fetch_completing_after_close_is_discarded() {
    let rows = vec![student_row(&student(1, "CS", StudentStatus::Active))];
    let (source, release) = GatedSource::new(rows);
    let reconciler: Reconciler<Student> =
        Reconciler::new(source, Table::Students, Filter::all());

    let worker = reconciler.clone();
    let fetch = tokio::spawn(async move { worker.refresh().await });
    tokio::task::yield_now().await;

    reconciler.close();
    let _ = release.send(());
    fetch.await.unwrap().unwrap();

    // The completed fetch was not applied to the closed collection.
    assert!(reconciler.is_empty());
    assert!(reconciler.error().is_none());
}

#[tokio::test]
async fn test_fetch_completing_after_filter_change_is_discarded() {
    let cs = student(1, "CS", StudentStatus::Active);
    let ee = student(2, "EE", StudentStatus::Active);
    let rows = vec![student_row(&cs), student_row(&ee)];
    let (source, release) = GatedSource::new(rows);
    let reconciler: Reconciler<Student> = Reconciler::new(
        source,
        Table::Students,
        Filter::all().eq("program", "CS"),
    );

    let worker = reconciler.clone();
    let stale = tokio::spawn(async move { worker.refresh().await });
    tokio::task::yield_now().await;

    // The view moves to EE while the CS fetch is still in flight.
    reconciler.set_filter(Filter::all().eq("program", "EE"));
    let _ = release.send(());
    stale.await.unwrap().unwrap();
    assert!(reconciler.is_empty());

    // The re-fetch for the new filter populates the view.
    reconciler.refresh().await.unwrap();
    let ids: Vec<Uuid> = reconciler.records().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![ee.id]);
}

// ============================================================================
// Invariants
// ============================================================================

#[derive(Debug, Clone)]
enum EventScript {
    Insert(u128, bool),
    Update(u128, bool),
    Delete(u128),
}

fn event_strategy() -> impl Strategy<Value = EventScript> {
    prop_oneof![
        (0u128..8, any::<bool>()).prop_map(|(n, cs)| EventScript::Insert(n, cs)),
        (0u128..8, any::<bool>()).prop_map(|(n, cs)| EventScript::Update(n, cs)),
        (0u128..8).prop_map(EventScript::Delete),
    ]
}

proptest! {
    /// No event sequence can produce duplicate ids or records that fail the
    /// active filter.
    #[test]
    fn prop_collection_stays_deduplicated_and_filtered(
        script in proptest::collection::vec(event_strategy(), 0..64)
    ) {
        let reconciler = reconciler(Filter::all().eq("program", "CS"));
        for step in script {
            let event = match step {
                EventScript::Insert(n, cs) => {
                    ChangeEvent::Inserted(student(n, if cs { "CS" } else { "EE" }, StudentStatus::Active))
                }
                EventScript::Update(n, cs) => ChangeEvent::Updated {
                    old: None,
                    new: student(n, if cs { "CS" } else { "EE" }, StudentStatus::Active),
                },
                EventScript::Delete(n) => ChangeEvent::Deleted { id: Uuid::from_u128(n) },
            };
            reconciler.apply_event(event);
        }

        let records = reconciler.records();
        let mut ids: Vec<Uuid> = records.iter().map(|s| s.id).collect();
        ids.sort();
        ids.dedup();
        prop_assert_eq!(ids.len(), records.len());
        for record in &records {
            prop_assert_eq!(record.field("program"), FieldValue::from("CS"));
        }
    }
}
