//! The set of models the current server offers.

use tracing::{debug, warn};

use crate::error::ChatError;

/// A refresh the caller must perform: list models with `config`, then hand
/// the result back with `ticket`.
#[derive(Debug, Clone)]
pub struct RefreshRequest {
    pub ticket: u64,
    pub config: crate::config::ModelConfig,
}

#[derive(Debug, Default)]
pub struct ModelDirectory {
    models: Vec<String>,
    latest_ticket: u64,
}

impl ModelDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Start a new refresh. Results from any earlier ticket will be ignored.
    pub fn begin_refresh(&mut self) -> u64 {
        self.latest_ticket += 1;
        self.latest_ticket
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        ticket == self.latest_ticket
    }

    /// Apply a fetch result. Returns false if it was stale and dropped.
    pub fn apply(&mut self, ticket: u64, result: Result<Vec<String>, ChatError>) -> bool {
        if !self.is_current(ticket) {
            debug!(ticket, latest = self.latest_ticket, "dropping stale model list");
            return false;
        }
        match result {
            Ok(models) => {
                debug!(count = models.len(), "model list updated");
                self.models = models;
            }
            Err(e) => {
                warn!(error = %e, "failed to list models");
                self.models.clear();
            }
        }
        true
    }
}
