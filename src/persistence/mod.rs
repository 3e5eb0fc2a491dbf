//! Saved detection snapshots.
//!
//! A `DetectionStore` is the service of record: in-memory for tests, SQLite for
//! local use, or a remote JSON API over HTTP. `HistoryClient` sits in front of
//! a store and keeps the history list the user sees.

mod history;
mod http;
mod record;
mod sqlite;
mod store;

pub use history::HistoryClient;
pub use http::HttpDetectionStore;
pub use record::{format_utc, DetectionRecord, NewDetectionRecord};
pub use sqlite::SqliteDetectionStore;
pub use store::{DetectionStore, InMemoryDetectionStore};

use anyhow::Result;

use crate::auth::AuthSession;

impl DetectionStore for Box<dyn DetectionStore> {
    fn save(&mut self, auth: &AuthSession, record: NewDetectionRecord) -> Result<DetectionRecord> {
        (**self).save(auth, record)
    }

    fn list(&mut self, auth: &AuthSession) -> Result<Vec<DetectionRecord>> {
        (**self).list(auth)
    }
}
