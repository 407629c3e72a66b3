//! Run liveness registry.
//!
//! A run is live while its id is registered. Cancelling a run removes the
//! marker; the router notices at its next step boundary.

use async_trait::async_trait;
use dashmap::DashSet;

#[async_trait]
pub trait RunRegistry: Send + Sync {
  async fn register(&self, run_id: &str);

  async fn is_running(&self, run_id: &str) -> bool;

  /// Removes the liveness marker. Unknown ids are ignored.
  async fn stop_run(&self, run_id: &str);
}

/// Process-local registry keyed by run id.
#[derive(Debug, Default)]
pub struct InMemoryRunRegistry {
  live: DashSet<String>,
}

impl InMemoryRunRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.live.len()
  }

  pub fn is_empty(&self) -> bool {
    self.live.is_empty()
  }
}

#[async_trait]
impl RunRegistry for InMemoryRunRegistry {
  async fn register(&self, run_id: &str) {
    self.live.insert(run_id.to_string());
  }

  async fn is_running(&self, run_id: &str) -> bool {
    self.live.contains(run_id)
  }

  async fn stop_run(&self, run_id: &str) {
    self.live.remove(run_id);
  }
}
