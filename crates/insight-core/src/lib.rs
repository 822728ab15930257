//! insight-core - Domain layer for the Academic Insight sync core.
//!
//! This crate holds everything the synchronization layer needs that does not
//! touch a runtime: the synchronized record types ([`Student`], [`Grade`]),
//! typed field access for filtering and sorting, the equality [`Filter`]
//! evaluated against incoming change events, aggregate statistics
//! computation, the client-side derived view (search/sort/paginate), and the
//! sync configuration.
//!
//! The asynchronous pieces (change-stream client, reconciler, recalculator)
//! live in the `insight-sync` crate.

pub mod config;
pub mod filter;
pub mod grade;
pub mod record;
pub mod stats;
pub mod student;
pub mod view;

pub use config::{ConfigError, SyncConfig};
pub use filter::{Filter, FilterClause};
pub use grade::Grade;
pub use record::{FieldValue, Record};
pub use stats::AggregateStats;
pub use student::{Student, StudentStatus};
pub use view::{Page, SortDirection, SortSpec, ViewQuery};
