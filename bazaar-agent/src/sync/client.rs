//! Remote sync API client: idempotent HTTPS JSON endpoints per spec §6.

use std::time::Duration;

use bazaar_core::speaker::identifier::SpeakerProfile;
use bazaar_core::transaction::Transaction;
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Serialize;

use crate::error::{AgentError, Result};
use crate::storage::DailySummary;

/// Outcome of pushing an entity to the remote API.
pub enum PushOutcome<T> {
    /// Accepted; no conflict.
    Accepted,
    /// 409 — the remote copy disagrees; caller resolves.
    Conflict { remote: T, remote_ts: DateTime<Utc> },
}

/// Remote sync collaborator. A trait so the queue worker can be driven by
/// a fake in tests without a live server.
pub trait SyncClient: Send + Sync {
    fn push_transaction(&self, tx: &Transaction) -> Result<PushOutcome<Transaction>>;
    fn push_summary(&self, summary: &DailySummary) -> Result<PushOutcome<DailySummary>>;
    fn push_speaker_profile(&self, profile: &SpeakerProfile) -> Result<PushOutcome<SpeakerProfile>>;
    fn delete_transaction(&self, id: &str) -> Result<()>;
    fn fetch_transactions_since(&self, since: DateTime<Utc>) -> Result<Vec<Transaction>>;
}

/// Per spec §5: "online recognizer call ≤ 20 s per chunk" is the
/// recognizer's own timeout; the sync API gets the same discipline applied
/// to its own class of HTTP calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub struct HttpSyncClient {
    client: Client,
    base_url: String,
    api_token: String,
}

impl HttpSyncClient {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AgentError::Network(e.to_string()))?;
        Ok(Self { client, base_url: base_url.into(), api_token: api_token.into() })
    }

    fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<reqwest::blocking::Response> {
        self.client
            .post(format!("{}{path}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_token))
            .json(body)
            .send()
            .map_err(|e| AgentError::Network(e.to_string()))
    }
}

impl SyncClient for HttpSyncClient {
    fn push_transaction(&self, tx: &Transaction) -> Result<PushOutcome<Transaction>> {
        let response = self.post_json("/transactions", tx)?;
        match response.status() {
            StatusCode::OK => Ok(PushOutcome::Accepted),
            StatusCode::CONFLICT => {
                let remote: Transaction = response
                    .json()
                    .map_err(|e| AgentError::Network(format!("malformed conflict body: {e}")))?;
                Ok(PushOutcome::Conflict { remote_ts: Utc::now(), remote })
            }
            status => Err(AgentError::Network(format!("POST /transactions returned {status}"))),
        }
    }

    fn push_summary(&self, summary: &DailySummary) -> Result<PushOutcome<DailySummary>> {
        let response = self.post_json(&format!("/summaries/{}", summary.date_key), summary)?;
        match response.status() {
            StatusCode::OK => Ok(PushOutcome::Accepted),
            StatusCode::CONFLICT => {
                let remote: DailySummary = response
                    .json()
                    .map_err(|e| AgentError::Network(format!("malformed conflict body: {e}")))?;
                Ok(PushOutcome::Conflict { remote_ts: Utc::now(), remote })
            }
            status => Err(AgentError::Network(format!("POST /summaries returned {status}"))),
        }
    }

    fn push_speaker_profile(&self, profile: &SpeakerProfile) -> Result<PushOutcome<SpeakerProfile>> {
        let response = self.post_json(&format!("/speaker_profiles/{}", profile.id), profile)?;
        match response.status() {
            StatusCode::OK => Ok(PushOutcome::Accepted),
            StatusCode::CONFLICT => {
                let remote: SpeakerProfile = response
                    .json()
                    .map_err(|e| AgentError::Network(format!("malformed conflict body: {e}")))?;
                Ok(PushOutcome::Conflict { remote_ts: Utc::now(), remote })
            }
            status => Err(AgentError::Network(format!("POST /speaker_profiles returned {status}"))),
        }
    }

    fn delete_transaction(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/transactions/{id}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_token))
            .send()
            .map_err(|e| AgentError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AgentError::Network(format!(
                "DELETE /transactions/{id} returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn fetch_transactions_since(&self, since: DateTime<Utc>) -> Result<Vec<Transaction>> {
        let response = self
            .client
            .get(format!("{}/transactions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_token))
            .query(&[("since", since.timestamp_millis())])
            .send()
            .map_err(|e| AgentError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AgentError::Network(format!(
                "GET /transactions returned {}",
                response.status()
            )));
        }
        response
            .json()
            .map_err(|e| AgentError::Network(format!("malformed response: {e}")))
    }
}
