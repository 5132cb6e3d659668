use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::models::AccessRecordInput;
use super::store::AccessLogStore;

/// Sink for observed requests. Implementations swallow their own failures:
/// recording an access must never affect the response being served.
#[async_trait]
pub trait AccessObserver: Send + Sync {
    async fn record_access(&self, input: AccessRecordInput);
}

/// Writes observed requests to an [`AccessLogStore`] on the blocking pool.
pub struct AccessRecorder {
    store: Arc<AccessLogStore>,
}

impl AccessRecorder {
    pub fn new(store: Arc<AccessLogStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AccessObserver for AccessRecorder {
    async fn record_access(&self, input: AccessRecordInput) {
        let store = self.store.clone();
        let path = input.path.clone();
        match tokio::task::spawn_blocking(move || store.append(input)).await {
            Ok(Ok(record)) => debug!(id = record.id, path = %record.path, "access recorded"),
            Ok(Err(e)) => warn!(%path, error = %e, "failed to record access"),
            Err(e) => warn!(%path, error = %e, "access recording task failed"),
        }
    }
}
