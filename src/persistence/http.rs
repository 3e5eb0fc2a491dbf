use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use url::Url;

use super::record::{DetectionRecord, NewDetectionRecord};
use super::store::{require_user, DetectionStore};
use crate::auth::AuthSession;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON-over-HTTP client for a remote detection store.
///
/// - `POST {base}/detections` with a `NewDetectionRecord` body returns the saved record.
/// - `GET {base}/detections` returns the caller's records.
///
/// Requests carry the session token as a bearer credential.
pub struct HttpDetectionStore {
    endpoint: Url,
    agent: ureq::Agent,
}

impl HttpDetectionStore {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base = Url::parse(base_url).context("parse detection store url")?;
        match base.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported detection store scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("detections")
            .context("build detections endpoint")?;
        let agent = ureq::AgentBuilder::new().timeout(DEFAULT_TIMEOUT).build();
        Ok(Self { endpoint, agent })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn authorize(&self, request: ureq::Request, auth: &AuthSession) -> Result<ureq::Request> {
        require_user(auth)?;
        Ok(match auth.token() {
            Some(token) => request.set("Authorization", &format!("Bearer {}", token)),
            None => request,
        })
    }
}

impl DetectionStore for HttpDetectionStore {
    fn save(&mut self, auth: &AuthSession, record: NewDetectionRecord) -> Result<DetectionRecord> {
        let request = self.authorize(self.agent.post(self.endpoint.as_str()), auth)?;
        let response = request
            .send_json(&record)
            .map_err(|err| anyhow!("save detection to {}: {}", self.endpoint, err))?;
        response
            .into_json::<DetectionRecord>()
            .context("decode saved detection record")
    }

    fn list(&mut self, auth: &AuthSession) -> Result<Vec<DetectionRecord>> {
        let request = self.authorize(self.agent.get(self.endpoint.as_str()), auth)?;
        let response = request
            .call()
            .map_err(|err| anyhow!("list detections from {}: {}", self.endpoint, err))?;
        response
            .into_json::<Vec<DetectionRecord>>()
            .context("decode detection history")
    }
}
