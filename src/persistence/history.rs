use anyhow::{anyhow, Result};

use super::record::{DetectionRecord, NewDetectionRecord};
use super::store::DetectionStore;
use crate::auth::AuthSession;
use crate::error::SessionError;

/// Save/list front end over a `DetectionStore`, holding the history shown to
/// the user and the last user-facing error.
///
/// Nothing is retried and nothing is updated optimistically: the local history
/// changes only when a refetch succeeds.
pub struct HistoryClient<St: DetectionStore> {
    store: St,
    auth: AuthSession,
    history: Vec<DetectionRecord>,
    error: Option<SessionError>,
}

impl<St: DetectionStore> HistoryClient<St> {
    pub fn new(store: St, auth: AuthSession) -> Self {
        Self {
            store,
            auth,
            history: Vec::new(),
            error: None,
        }
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    /// Sign out. History is no longer available afterwards.
    pub fn logout(&mut self) {
        self.auth.logout();
        self.history.clear();
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut St {
        &mut self.store
    }

    pub fn history(&self) -> &[DetectionRecord] {
        &self.history
    }

    pub fn error(&self) -> Option<SessionError> {
        self.error
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Store a capture, then refetch the history once.
    pub fn save(&mut self, capture: NewDetectionRecord) -> Result<DetectionRecord> {
        if !self.auth.is_authenticated() {
            self.error = Some(SessionError::SignInRequired);
            return Err(anyhow!(SessionError::SignInRequired));
        }
        if capture.detection_data.is_empty() {
            self.error = Some(SessionError::NothingToSave);
            return Err(anyhow!(SessionError::NothingToSave));
        }

        let saved = match self.store.save(&self.auth, capture) {
            Ok(saved) => saved,
            Err(err) => {
                log::error!("saving detections failed: {:#}", err);
                self.error = Some(SessionError::Save);
                return Err(err.context(SessionError::Save));
            }
        };
        log::info!(
            "saved detection record {} ({} objects, {}%)",
            saved.id,
            saved.object_count(),
            saved.confidence
        );
        self.error = None;

        if let Err(err) = self.refresh() {
            log::warn!("history refetch after save failed: {:#}", err);
        }
        Ok(saved)
    }

    /// Refetch the history. Disabled without a signed-in user.
    pub fn refresh(&mut self) -> Result<&[DetectionRecord]> {
        if !self.auth.is_authenticated() {
            self.history.clear();
            return Ok(self.history.as_slice());
        }
        let records = self.store.list(&self.auth)?;
        log::debug!("history refreshed: {} records", records.len());
        self.history = records;
        Ok(self.history.as_slice())
    }

    /// Ask for confirmation, then refetch.
    ///
    /// No delete request is sent to the store; the saved records survive.
    /// Returns whether the user confirmed.
    pub fn clear_history<F>(&mut self, confirm: F) -> Result<bool>
    where
        F: FnOnce() -> bool,
    {
        if !confirm() {
            return Ok(false);
        }
        self.refresh()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::User;
    use crate::detect::{BoundingBox, Detection};
    use crate::persistence::InMemoryDetectionStore;

    fn signed_in() -> AuthSession {
        AuthSession::signed_in(
            User {
                id: "alice".to_string(),
                name: Some("Alice".to_string()),
            },
            None,
        )
    }

    fn capture() -> NewDetectionRecord {
        NewDetectionRecord {
            detection_data: vec![Detection {
                label: "cat".to_string(),
                confidence: 87,
                bbox: BoundingBox::new(10.0, 20.0, 100.0, 80.0),
            }],
            image_url: "data:image/jpeg;base64,AAAA".to_string(),
            confidence: 87,
        }
    }

    #[test]
    fn successful_save_refetches_exactly_once() {
        let mut client = HistoryClient::new(InMemoryDetectionStore::new(), signed_in());
        client.save(capture()).unwrap();

        assert_eq!(client.store().save_calls(), 1);
        assert_eq!(client.store().list_calls(), 1);
        assert_eq!(client.history().len(), 1);
        assert_eq!(client.error(), None);
    }

    #[test]
    fn failed_save_keeps_history_and_reports_error() {
        let mut store = InMemoryDetectionStore::new();
        store.fail_saves(true);
        let mut client = HistoryClient::new(store, signed_in());

        let err = client.save(capture()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to save detection results"));
        assert_eq!(client.error(), Some(SessionError::Save));
        assert_eq!(client.store().list_calls(), 0);
        assert!(client.history().is_empty());
    }

    #[test]
    fn anonymous_users_cannot_save_or_list() {
        let mut client = HistoryClient::new(InMemoryDetectionStore::new(), AuthSession::anonymous());
        assert!(client.save(capture()).is_err());
        assert_eq!(client.error(), Some(SessionError::SignInRequired));
        assert_eq!(client.store().save_calls(), 0);

        assert!(client.refresh().unwrap().is_empty());
        assert_eq!(client.store().list_calls(), 0);
    }

    #[test]
    fn empty_capture_is_not_saved() {
        let mut client = HistoryClient::new(InMemoryDetectionStore::new(), signed_in());
        let mut empty = capture();
        empty.detection_data.clear();
        assert!(client.save(empty).is_err());
        assert_eq!(client.error(), Some(SessionError::NothingToSave));
        assert_eq!(client.store().save_calls(), 0);
    }

    #[test]
    fn clear_history_refetches_without_deleting() {
        let mut client = HistoryClient::new(InMemoryDetectionStore::new(), signed_in());
        client.save(capture()).unwrap();

        assert!(!client.clear_history(|| false).unwrap());
        assert_eq!(client.store().list_calls(), 1);

        assert!(client.clear_history(|| true).unwrap());
        assert_eq!(client.store().list_calls(), 2);
        assert_eq!(client.store().len(), 1);
        assert_eq!(client.history().len(), 1);
    }

    #[test]
    fn logout_drops_history() {
        let mut client = HistoryClient::new(InMemoryDetectionStore::new(), signed_in());
        client.save(capture()).unwrap();
        client.logout();
        assert!(client.history().is_empty());
        assert!(!client.auth().is_authenticated());
    }
}
