//! Client for the archival (data-availability) sink.
//!
//! The sink is untrusted storage: proofs go out as canonical JSON, and
//! everything that comes back gets re-verified by the consensus view
//! before it influences anything.

use crate::proof::TimeProof;
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT_SECS: u64 = 5;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archival request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("archival sink returned status {0}")]
    Status(u16),
}

pub struct ArchiveClient {
    base_url: String,
    http: reqwest::Client,
}

impl ArchiveClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    pub async fn submit_proof(&self, proof: &TimeProof) -> Result<(), ArchiveError> {
        let url = format!("{}/submit_proof", self.base_url);
        let resp = self.http.post(&url).json(proof).send().await?;
        if !resp.status().is_success() {
            return Err(ArchiveError::Status(resp.status().as_u16()));
        }
        Ok(())
    }

    pub async fn recent_proofs(&self) -> Result<Vec<TimeProof>, ArchiveError> {
        let url = format!("{}/get_recent_proofs", self.base_url);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(ArchiveError::Status(resp.status().as_u16()));
        }
        Ok(resp.json().await?)
    }
}
