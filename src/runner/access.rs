use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const VISIBLE_KEY_PREFIX: usize = 5;

/// Endpoint and credential a workspace uses to reach its runner.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerAccess {
    pub runner_url: String,
    pub runner_api_key: String,
}

impl RunnerAccess {
    pub fn new(runner_url: impl Into<String>, runner_api_key: impl Into<String>) -> Self {
        Self {
            runner_url: runner_url.into().trim().to_string(),
            runner_api_key: runner_api_key.into().trim().to_string(),
        }
    }

    /// Both fields must be non-empty for the workspace to count as configured.
    pub fn is_complete(&self) -> bool {
        !self.runner_url.trim().is_empty() && !self.runner_api_key.trim().is_empty()
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.runner_url.trim_end_matches('/'), path)
    }

    pub fn masked_api_key(&self) -> String {
        mask_secret(&self.runner_api_key)
    }

    pub fn api_key_fingerprint(&self) -> String {
        let digest = Sha256::digest(self.runner_api_key.as_bytes());
        digest
            .iter()
            .take(6)
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }
}

impl fmt::Debug for RunnerAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerAccess")
            .field("runner_url", &self.runner_url)
            .field("runner_api_key", &self.masked_api_key())
            .finish()
    }
}

pub fn mask_secret(secret: &str) -> String {
    let total = secret.chars().count();
    if total <= VISIBLE_KEY_PREFIX {
        return "*".repeat(VISIBLE_KEY_PREFIX);
    }
    let visible: String = secret.chars().take(VISIBLE_KEY_PREFIX).collect();
    format!("{visible}{}", "*".repeat(total - VISIBLE_KEY_PREFIX))
}
