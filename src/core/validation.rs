//! Credential validation.
//!
//! Each provider credential is probed with the catalog's minimal
//! read-only endpoint and classified as valid or invalid. Probes for
//! the same provider supersede each other: every probe takes a fresh
//! generation number, and a result only commits if no newer probe has
//! started since. Probes for different providers are independent and
//! may run concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::core::catalog::ProviderSpec;
use crate::core::transport::HttpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationState {
    /// No probe has resolved yet (or the credential was cleared).
    #[default]
    Unknown,
    /// The last probe reached the provider and was accepted.
    Valid,
    /// The credential was blank, rejected, or the probe failed.
    Invalid,
}

/// Point-in-time view of every provider's validation state.
pub type ValidationSnapshot = HashMap<String, ValidationState>;

#[derive(Default)]
struct ProbeRecord {
    generation: u64,
    state: ValidationState,
}

pub struct CredentialValidator {
    transport: Arc<dyn HttpTransport>,
    records: Mutex<HashMap<String, ProbeRecord>>,
}

impl CredentialValidator {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        CredentialValidator {
            transport,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self, provider_id: &str) -> ValidationState {
        match self.records.lock() {
            Ok(records) => records
                .get(provider_id)
                .map(|record| record.state)
                .unwrap_or_default(),
            Err(_) => ValidationState::Unknown,
        }
    }

    pub fn snapshot(&self) -> ValidationSnapshot {
        match self.records.lock() {
            Ok(records) => records
                .iter()
                .map(|(id, record)| (id.clone(), record.state))
                .collect(),
            Err(_) => ValidationSnapshot::new(),
        }
    }

    /// Back to `Unknown`, invalidating any probe still in flight. Only
    /// clearing a credential takes this path; probes themselves always
    /// resolve valid or invalid.
    pub fn reset(&self, provider_id: &str) {
        if let Ok(mut records) = self.records.lock() {
            let record = records.entry(provider_id.to_string()).or_default();
            record.generation += 1;
            record.state = ValidationState::Unknown;
        }
    }

    /// Start a probe attempt, superseding all earlier ones.
    fn begin_probe(&self, provider_id: &str) -> u64 {
        match self.records.lock() {
            Ok(mut records) => {
                let record = records.entry(provider_id.to_string()).or_default();
                record.generation += 1;
                record.generation
            }
            Err(_) => 0,
        }
    }

    /// Record a probe outcome unless a newer probe has started since.
    /// Returns whether the outcome was accepted.
    fn commit_probe(&self, provider_id: &str, generation: u64, state: ValidationState) -> bool {
        match self.records.lock() {
            Ok(mut records) => {
                let record = records.entry(provider_id.to_string()).or_default();
                if record.generation != generation {
                    debug!(provider = provider_id, generation, "discarding stale probe result");
                    return false;
                }
                record.state = state;
                true
            }
            Err(_) => false,
        }
    }

    /// Pin a provider's state without probing.
    #[cfg(test)]
    pub(crate) fn set_state_for_test(&self, provider_id: &str, state: ValidationState) {
        if let Ok(mut records) = self.records.lock() {
            records.entry(provider_id.to_string()).or_default().state = state;
        }
    }

    /// Probe one provider credential and record the outcome. Returns
    /// the provider's state after the attempt, which reflects a newer
    /// probe when this one was superseded mid-flight.
    pub async fn validate(&self, provider: &ProviderSpec, secret: &str) -> ValidationState {
        let generation = self.begin_probe(&provider.id);

        let outcome = if secret.trim().is_empty() {
            // Blank credentials are invalid by definition; no probe.
            ValidationState::Invalid
        } else {
            debug!(provider = %provider.id, "probing credential");
            match self.transport.execute(provider.probe_request(secret.trim())).await {
                Ok(response) if response.is_success() => ValidationState::Valid,
                Ok(response) => {
                    debug!(provider = %provider.id, status = response.status, "credential rejected");
                    ValidationState::Invalid
                }
                Err(err) => {
                    debug!(provider = %provider.id, error = %err, "credential probe failed");
                    ValidationState::Invalid
                }
            }
        };

        self.commit_probe(&provider.id, generation, outcome);
        self.state(&provider.id)
    }
}
