//! Request journal: every request the dispatcher has seen, in arrival order.

use crate::request::RequestSnapshot;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct RequestJournal {
    entries: Mutex<Vec<Arc<RequestSnapshot>>>,
}

impl RequestJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, request: Arc<RequestSnapshot>) {
        self.entries.lock().await.push(request);
    }

    /// Copy of the recorded sequence.
    pub async fn all(&self) -> Vec<Arc<RequestSnapshot>> {
        self.entries.lock().await.clone()
    }

    /// Recorded requests whose path equals `path`.
    pub async fn requests_to(&self, path: &str) -> Vec<Arc<RequestSnapshot>> {
        let path = crate::request::normalize_path(path);
        self.entries
            .lock()
            .await
            .iter()
            .filter(|r| r.path() == path)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn reset(&self) {
        self.entries.lock().await.clear();
    }
}
