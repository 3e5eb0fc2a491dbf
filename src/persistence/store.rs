use anyhow::{anyhow, Result};

use super::record::{now_ms, DetectionRecord, NewDetectionRecord};
use crate::auth::{AuthSession, User};

/// Remote or local service of record for saved snapshots.
///
/// Every call is made on behalf of the signed-in user in `auth`.
pub trait DetectionStore {
    /// Create a record owned by the current user.
    fn save(&mut self, auth: &AuthSession, record: NewDetectionRecord) -> Result<DetectionRecord>;

    /// Records of the current user, in the store's own order.
    fn list(&mut self, auth: &AuthSession) -> Result<Vec<DetectionRecord>>;
}

pub(crate) fn require_user(auth: &AuthSession) -> Result<&User> {
    if !auth.is_authenticated() {
        return Err(anyhow!("no authenticated user"));
    }
    auth.user().ok_or_else(|| anyhow!("no authenticated user"))
}

/// Process-local store, newest first. Used by tests and offline demos.
#[derive(Debug, Default)]
pub struct InMemoryDetectionStore {
    records: Vec<DetectionRecord>,
    next_id: i64,
    fail_saves: bool,
    save_calls: usize,
    list_calls: usize,
}

impl InMemoryDetectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail, as an unreachable service would.
    pub fn fail_saves(&mut self, fail: bool) {
        self.fail_saves = fail;
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl DetectionStore for InMemoryDetectionStore {
    fn save(&mut self, auth: &AuthSession, record: NewDetectionRecord) -> Result<DetectionRecord> {
        self.save_calls += 1;
        let user = require_user(auth)?;
        if self.fail_saves {
            return Err(anyhow!("detection store unavailable"));
        }
        self.next_id += 1;
        let saved = DetectionRecord {
            id: self.next_id,
            user_id: user.id.clone(),
            detection_data: record.detection_data,
            image_url: record.image_url,
            confidence: record.confidence,
            created_at: now_ms(),
        };
        self.records.push(saved.clone());
        Ok(saved)
    }

    fn list(&mut self, auth: &AuthSession) -> Result<Vec<DetectionRecord>> {
        self.list_calls += 1;
        let user = require_user(auth)?;
        Ok(self
            .records
            .iter()
            .rev()
            .filter(|record| record.user_id == user.id)
            .cloned()
            .collect())
    }
}
