//! Expectation registry.
//!
//! An ordered list of expectations behind one lock. Lookup and removal happen
//! in the same critical section, so a matching expectation is handed to at
//! most one request.

use crate::error::ProducerError;
use crate::matcher::Match;
use crate::request::RequestSnapshot;
use crate::response::MockResponse;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Function computing a response from the request that matched.
pub type ProducerFn =
    Arc<dyn Fn(&RequestSnapshot) -> Result<MockResponse, ProducerError> + Send + Sync>;

/// How an expectation answers.
#[derive(Clone)]
pub enum ResponseProducer {
    /// A fixed response.
    Static(MockResponse),
    /// A response computed from the matched request.
    Dynamic(ProducerFn),
}

impl ResponseProducer {
    /// Wrap a closure as a dynamic producer.
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&RequestSnapshot) -> Result<MockResponse, ProducerError> + Send + Sync + 'static,
    {
        ResponseProducer::Dynamic(Arc::new(f))
    }

    /// Produce the response. Static responses are moved out as-is.
    pub fn produce(self, request: &RequestSnapshot) -> Result<MockResponse, ProducerError> {
        match self {
            ResponseProducer::Static(response) => Ok(response),
            ResponseProducer::Dynamic(producer) => producer(request),
        }
    }
}

impl fmt::Debug for ResponseProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseProducer::Static(response) => {
                f.debug_tuple("Static").field(&response.status).finish()
            }
            ResponseProducer::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

impl From<MockResponse> for ResponseProducer {
    fn from(response: MockResponse) -> Self {
        ResponseProducer::Static(response)
    }
}

/// A registered (predicate, producer) pair.
pub struct Expectation {
    label: String,
    predicate: Arc<dyn Match>,
    producer: ResponseProducer,
}

impl Expectation {
    pub fn new(
        label: impl Into<String>,
        predicate: impl Match + 'static,
        producer: impl Into<ResponseProducer>,
    ) -> Self {
        Self::shared(label, Arc::new(predicate), producer.into())
    }

    /// Build from an already shared predicate, for repeated registrations.
    pub fn shared(
        label: impl Into<String>,
        predicate: Arc<dyn Match>,
        producer: ResponseProducer,
    ) -> Self {
        Self {
            label: label.into(),
            predicate,
            producer,
        }
    }

    /// Name used in log lines.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn matches(&self, request: &RequestSnapshot) -> bool {
        self.predicate.matches(request)
    }

    pub fn into_producer(self) -> ResponseProducer {
        self.producer
    }
}

impl fmt::Debug for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expectation")
            .field("label", &self.label)
            .field("producer", &self.producer)
            .finish()
    }
}

/// Ordered, lock-protected collection of expectations.
#[derive(Default)]
pub struct ExpectationRegistry {
    expectations: Mutex<Vec<Expectation>>,
}

impl ExpectationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an expectation. Earlier registrations take precedence.
    pub async fn register(&self, expectation: Expectation) {
        self.expectations.lock().await.push(expectation);
    }

    /// Remove and return the oldest expectation matching `request`.
    pub async fn find_and_consume(&self, request: &RequestSnapshot) -> Option<Expectation> {
        let mut expectations = self.expectations.lock().await;
        let index = expectations.iter().position(|e| e.matches(request))?;
        Some(expectations.remove(index))
    }

    pub async fn reset(&self) {
        self.expectations.lock().await.clear();
    }

    /// Expectations not consumed yet.
    pub async fn len(&self) -> usize {
        self.expectations.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Labels of expectations not consumed yet, in registration order.
    pub async fn pending_labels(&self) -> Vec<String> {
        self.expectations
            .lock()
            .await
            .iter()
            .map(|e| e.label.clone())
            .collect()
    }
}
