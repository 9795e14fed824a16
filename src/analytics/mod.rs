//! Request analytics for the NoteMate backend
//!
//! The recorder folds every tracked event into one process-wide aggregate,
//! which is checkpointed to a JSON snapshot and read back by the reporter to
//! build the admin dashboard, activity, insight and health views.

pub mod api_server;
pub mod events;
pub mod models;
pub mod persistence;
pub mod recommendations;
pub mod recorder;
pub mod reporter;
pub mod service;

pub use api_server::{build_router, AnalyticsApiServer};
pub use events::AnalyticsEvent;
pub use models::*;
pub use persistence::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use recorder::{apply_event, checkpoint_due};
pub use reporter::Timeframe;
pub use service::AnalyticsService;
