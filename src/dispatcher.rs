//! The dispatch engine.
//!
//! [`MockDispatcher`] owns the expectation registry and the request journal.
//! Transports call [`MockDispatcher::dispatch`] once per incoming request;
//! tests register expectations and inspect the journal. Share it between the
//! two through an `Arc`, and call [`MockDispatcher::reset`] between tests.

use crate::config::{MockConfig, Settings};
use crate::diagnostic;
use crate::error::{DispatchError, ProducerError, Result};
use crate::fixture::{FixtureDir, FixtureResolver, NoFixtures};
use crate::journal::RequestJournal;
use crate::matcher::{BodySource, HeaderValue, Match, MatcherSpec};
use crate::registry::{Expectation, ExpectationRegistry, ResponseProducer};
use crate::request::{IncomingRequest, RequestSnapshot};
use crate::response::MockResponse;
use crate::template::TemplateEngine;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Request counters since creation or the last reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    pub requests_total: u64,
    pub requests_matched: u64,
    pub requests_unmatched: u64,
}

/// Mock dispatcher
///
/// Matches requests against registered expectations, consuming each
/// expectation the first time it matches.
pub struct MockDispatcher {
    settings: Settings,
    registry: ExpectationRegistry,
    journal: RequestJournal,
    resolver: Arc<dyn FixtureResolver>,
    template_engine: Arc<TemplateEngine>,
    /// Total requests processed.
    requests_total: AtomicU64,
    /// Total requests matched to expectations.
    requests_matched: AtomicU64,
    /// Total requests unmatched.
    requests_unmatched: AtomicU64,
}

impl MockDispatcher {
    /// Create a new dispatcher with default settings and no fixture directory.
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    /// Create a dispatcher. Fixtures resolve against `settings.fixtures_dir`.
    pub fn with_settings(settings: Settings) -> Self {
        let resolver: Arc<dyn FixtureResolver> = match &settings.fixtures_dir {
            Some(dir) => Arc::new(FixtureDir::new(dir)),
            None => Arc::new(NoFixtures),
        };

        Self {
            settings,
            registry: ExpectationRegistry::new(),
            journal: RequestJournal::new(),
            resolver,
            template_engine: Arc::new(TemplateEngine::new()),
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
        }
    }

    /// Replace the fixture resolver.
    pub fn with_resolver(mut self, resolver: impl FixtureResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Create a dispatcher and register every expectation in `config`.
    pub async fn from_config(config: &MockConfig) -> Result<Self> {
        let dispatcher = Self::with_settings(config.settings.clone());
        dispatcher.load_config(config).await?;
        Ok(dispatcher)
    }

    /// Register the expectations of `config` in file order.
    ///
    /// Everything is resolved before anything is registered, so a bad
    /// definition leaves the registry untouched. Returns the number of
    /// registrations.
    pub async fn load_config(&self, config: &MockConfig) -> Result<usize> {
        config.validate()?;

        let mut expectations = Vec::new();
        for definition in &config.expectations {
            let matcher: Arc<dyn Match> =
                Arc::new(definition.request.to_spec()?.compile(self.resolver.as_ref())?);
            let producer = definition
                .response
                .to_producer(self.resolver.as_ref(), &self.template_engine)?;
            let label = definition.label();

            for _ in 0..definition.times {
                expectations.push(Expectation::shared(
                    label.clone(),
                    Arc::clone(&matcher),
                    producer.clone(),
                ));
            }
        }

        let count = expectations.len();
        for expectation in expectations {
            self.registry.register(expectation).await;
        }

        info!(
            definitions = config.expectations.len(),
            expectations = count,
            "Loaded expectations from configuration"
        );
        Ok(count)
    }

    /// Register a response for requests matching `spec`.
    ///
    /// Fails if the spec references a fixture that cannot be read.
    pub async fn register(
        &self,
        spec: MatcherSpec,
        response: impl Into<ResponseProducer>,
    ) -> Result<()> {
        let matcher = spec.compile(self.resolver.as_ref())?;
        let label = matcher.to_string();
        debug!(expectation = %label, "Registering expectation");
        self.registry
            .register(Expectation::new(label, matcher, response))
            .await;
        Ok(())
    }

    /// Register a response computed from the matching request.
    pub async fn register_dynamic<F>(&self, spec: MatcherSpec, producer: F) -> Result<()>
    where
        F: Fn(&RequestSnapshot) -> std::result::Result<MockResponse, ProducerError>
            + Send
            + Sync
            + 'static,
    {
        self.register(spec, ResponseProducer::dynamic(producer)).await
    }

    /// Register an arbitrary predicate.
    pub async fn register_predicate(
        &self,
        label: impl Into<String>,
        predicate: impl Match + 'static,
        producer: impl Into<ResponseProducer>,
    ) {
        self.registry
            .register(Expectation::new(label, predicate, producer))
            .await;
    }

    /// Start a fluent registration for `method` and `path`.
    pub fn whenever(
        &self,
        method: impl Into<String>,
        path: impl AsRef<str>,
    ) -> ExpectationBuilder<'_> {
        ExpectationBuilder {
            dispatcher: self,
            spec: MatcherSpec::any().method(method).path(path),
        }
    }

    /// Read a fixture through the configured resolver.
    pub fn fixture_content(&self, name: &str) -> Result<String> {
        self.resolver.resolve(name)
    }

    /// Dispatch one request.
    ///
    /// Unmatched requests get the 500 diagnostic response. Only a failing
    /// producer returns an error; its expectation stays consumed.
    ///
    /// The snapshot is taken before the returned future is first polled, so
    /// the future does not borrow `request`.
    pub fn dispatch<R: IncomingRequest + ?Sized>(
        &self,
        request: &R,
    ) -> impl Future<Output = std::result::Result<MockResponse, DispatchError>> + '_ {
        self.dispatch_snapshot(RequestSnapshot::from_incoming(request))
    }

    /// Dispatch an already extracted snapshot.
    pub async fn dispatch_snapshot(
        &self,
        snapshot: RequestSnapshot,
    ) -> std::result::Result<MockResponse, DispatchError> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        let snapshot = Arc::new(snapshot);
        self.journal.record(Arc::clone(&snapshot)).await;

        let Some(expectation) = self.registry.find_and_consume(&snapshot).await else {
            self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
            if self.settings.log_unmatched {
                warn!(
                    method = %snapshot.method(),
                    path = %snapshot.target(),
                    "No matching expectation found"
                );
            }
            return Ok(diagnostic::unmatched_response(&snapshot));
        };

        self.requests_matched.fetch_add(1, Ordering::Relaxed);
        if self.settings.log_matches {
            info!(
                expectation = %expectation.label(),
                method = %snapshot.method(),
                path = %snapshot.path(),
                "Request matched expectation"
            );
        }

        let label = expectation.label().to_string();
        let producer = expectation.into_producer();
        if let ResponseProducer::Dynamic(_) = &producer {
            debug!(expectation = %label, "Invoking response producer");
        }

        producer
            .produce(&snapshot)
            .map_err(|source| DispatchError::Producer { label, source })
    }

    /// Clear expectations, journal and counters.
    pub async fn reset(&self) {
        self.registry.reset().await;
        self.journal.reset().await;
        self.requests_total.store(0, Ordering::Relaxed);
        self.requests_matched.store(0, Ordering::Relaxed);
        self.requests_unmatched.store(0, Ordering::Relaxed);
        info!("Dispatcher reset");
    }

    /// Every dispatched request, in arrival order.
    pub async fn all_dispatched(&self) -> Vec<Arc<RequestSnapshot>> {
        self.journal.all().await
    }

    pub fn journal(&self) -> &RequestJournal {
        &self.journal
    }

    /// Number of expectations not consumed yet.
    pub async fn pending(&self) -> usize {
        self.registry.len().await
    }

    /// Labels of expectations not consumed yet.
    pub async fn pending_labels(&self) -> Vec<String> {
        self.registry.pending_labels().await
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_matched: self.requests_matched.load(Ordering::Relaxed),
            requests_unmatched: self.requests_unmatched.load(Ordering::Relaxed),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

impl Default for MockDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent registration started by [`MockDispatcher::whenever`].
pub struct ExpectationBuilder<'a> {
    dispatcher: &'a MockDispatcher,
    spec: MatcherSpec,
}

impl ExpectationBuilder<'_> {
    pub fn query<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.spec = self.spec.query(name, values);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.spec = self.spec.header(name, value);
        self
    }

    pub fn body(mut self, body: BodySource) -> Self {
        self.spec = self.spec.body(body);
        self
    }

    /// Answer with a fixed response.
    pub async fn then_respond(self, response: MockResponse) -> Result<()> {
        self.dispatcher.register(self.spec, response).await
    }

    /// Answer with a response computed from the request.
    pub async fn then_dispatch<F>(self, producer: F) -> Result<()>
    where
        F: Fn(&RequestSnapshot) -> std::result::Result<MockResponse, ProducerError>
            + Send
            + Sync
            + 'static,
    {
        self.dispatcher.register_dynamic(self.spec, producer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MockError;
    use crate::request::RawRequest;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tracing_test::traced_test;

    fn diagnostic_json(response: &MockResponse) -> Value {
        serde_json::from_slice(&response.body).expect("diagnostic body is valid JSON")
    }

    #[tokio::test]
    async fn test_static_response_for_matching_request() {
        let dispatcher = MockDispatcher::new();
        let body = json!({"status": "ok", "totalResults": 2});
        dispatcher
            .whenever("GET", "v2/top-headlines")
            .then_respond(MockResponse::ok_json(&body))
            .await
            .unwrap();

        let response = dispatcher
            .dispatch(&RawRequest::get("/v2/top-headlines"))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(serde_json::from_slice::<Value>(&response.body).unwrap(), body);
        assert_eq!(dispatcher.all_dispatched().await.len(), 1);
        assert_eq!(dispatcher.pending().await, 0);
    }

    #[tokio::test]
    async fn test_unmatched_request_gets_diagnostic() {
        let dispatcher = MockDispatcher::new();

        let request = RawRequest::get("/api/users/12345?include=profile,settings")
            .header("Authorization", "Bearer token-abc-123");
        let response = dispatcher.dispatch(&request).await.unwrap();

        assert_eq!(response.status, 500);
        let json = diagnostic_json(&response);
        let path = json["request"]["path"].as_str().unwrap();
        assert!(path.contains("/api/users/12345"));
        assert!(path.contains("include=profile,settings"));
        assert!(json["request"]["headers"]
            .as_str()
            .unwrap()
            .contains("authorization"));
        assert!(json["error"].is_string());
        assert!(json["suggestion"].is_string());
        assert_eq!(dispatcher.stats().requests_unmatched, 1);
    }

    #[tokio::test]
    async fn test_overlapping_expectations_are_consumed_in_order() {
        let dispatcher = MockDispatcher::new();
        for body in ["A", "B"] {
            dispatcher
                .whenever("POST", "/submit")
                .then_respond(MockResponse::success().with_body(body))
                .await
                .unwrap();
        }

        let first = dispatcher.dispatch(&RawRequest::post("/submit")).await.unwrap();
        let second = dispatcher.dispatch(&RawRequest::post("/submit")).await.unwrap();
        let third = dispatcher.dispatch(&RawRequest::post("/submit")).await.unwrap();

        assert_eq!(first.body_text(), "A");
        assert_eq!(second.body_text(), "B");
        assert_eq!(third.status, 500);
    }

    #[tokio::test]
    async fn test_earlier_registration_wins_over_more_specific_one() {
        let dispatcher = MockDispatcher::new();
        dispatcher
            .register(MatcherSpec::any(), MockResponse::success().with_body("catch-all"))
            .await
            .unwrap();
        dispatcher
            .whenever("GET", "/specific")
            .then_respond(MockResponse::success().with_body("specific"))
            .await
            .unwrap();

        let response = dispatcher.dispatch(&RawRequest::get("/specific")).await.unwrap();
        assert_eq!(response.body_text(), "catch-all");
        let response = dispatcher.dispatch(&RawRequest::get("/specific")).await.unwrap();
        assert_eq!(response.body_text(), "specific");
    }

    #[tokio::test]
    async fn test_large_unmatched_body_is_truncated() {
        let dispatcher = MockDispatcher::new();
        let body = json!({"data": "y".repeat(1189)}).to_string();
        assert_eq!(body.len(), 1200);

        let response = dispatcher
            .dispatch(&RawRequest::post("/bulk-upload").body(body.clone()))
            .await
            .unwrap();

        let json = diagnostic_json(&response);
        assert_eq!(
            json["request"]["body"],
            format!("{}... (truncated)", &body[..500]).as_str()
        );
    }

    #[tokio::test]
    async fn test_matched_and_unmatched_are_distinguishable() {
        let dispatcher = MockDispatcher::new();
        dispatcher
            .whenever("GET", "/items/100")
            .then_respond(MockResponse::success().with_body("item 100"))
            .await
            .unwrap();

        let first = dispatcher.dispatch(&RawRequest::get("/items/100")).await.unwrap();
        let second = dispatcher.dispatch(&RawRequest::get("/items/200")).await.unwrap();

        assert_eq!(first.status, 200);
        assert_eq!(second.status, 500);
        assert_ne!(first.body, second.body);
        let json = diagnostic_json(&second);
        assert!(json["request"]["path"].as_str().unwrap().contains("200"));
    }

    #[tokio::test]
    async fn test_dynamic_response_uses_request() {
        let dispatcher = MockDispatcher::new();
        dispatcher
            .whenever("POST", "/echo")
            .then_dispatch(|request| {
                Ok(MockResponse::success()
                    .with_header("X-Method", request.method().to_string())
                    .with_body(request.body().to_vec()))
            })
            .await
            .unwrap();

        let response = dispatcher
            .dispatch(&RawRequest::post("/echo").body("ping"))
            .await
            .unwrap();
        assert_eq!(response.body_text(), "ping");
        assert_eq!(response.header("x-method"), Some("POST"));
    }

    #[tokio::test]
    async fn test_failing_producer_propagates_and_stays_consumed() {
        let dispatcher = MockDispatcher::new();
        dispatcher
            .register_dynamic(MatcherSpec::any().path("/boom"), |_| {
                Err("database fixture missing".into())
            })
            .await
            .unwrap();

        match dispatcher.dispatch(&RawRequest::get("/boom")).await {
            Err(DispatchError::Producer { label, source }) => {
                assert_eq!(label, "path=/boom");
                assert_eq!(source.to_string(), "database fixture missing");
            }
            other => panic!("Expected producer error, got {:?}", other),
        }

        assert_eq!(dispatcher.pending().await, 0);
        assert_eq!(dispatcher.all_dispatched().await.len(), 1);
        let retry = dispatcher.dispatch(&RawRequest::get("/boom")).await.unwrap();
        assert_eq!(retry.status, 500);
    }

    #[tokio::test]
    async fn test_throttle_policy_is_forwarded() {
        let dispatcher = MockDispatcher::new();
        let response = MockResponse::success()
            .with_body("slow")
            .throttle(1024, Duration::from_secs(1));
        dispatcher
            .whenever("GET", "/slow")
            .then_respond(response.clone())
            .await
            .unwrap();

        let dispatched = dispatcher.dispatch(&RawRequest::get("/slow")).await.unwrap();
        assert_eq!(dispatched, response);
    }

    #[tokio::test]
    async fn test_fluent_criteria() {
        let dispatcher = MockDispatcher::new();
        dispatcher
            .whenever("GET", "/search")
            .query("q", ["rust"])
            .header("Authorization", "Bearer abc")
            .then_respond(MockResponse::success())
            .await
            .unwrap();

        let no_auth = dispatcher
            .dispatch(&RawRequest::get("/search?q=rust"))
            .await
            .unwrap();
        assert_eq!(no_auth.status, 500);

        let ok = dispatcher
            .dispatch(
                &RawRequest::get("/search?q=rust&page=2").header("authorization", "Bearer abc"),
            )
            .await
            .unwrap();
        assert_eq!(ok.status, 200);
    }

    #[tokio::test]
    async fn test_custom_predicate() {
        let dispatcher = MockDispatcher::new();
        dispatcher
            .register_predicate(
                "items",
                |request: &RequestSnapshot| request.path().starts_with("/items/"),
                MockResponse::success(),
            )
            .await;

        assert_eq!(dispatcher.pending_labels().await, vec!["items".to_string()]);
        let response = dispatcher.dispatch(&RawRequest::get("/items/7")).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_missing_fixture_fails_at_registration() {
        let dispatcher = MockDispatcher::new();
        let result = dispatcher
            .whenever("POST", "/orders")
            .body(BodySource::Fixture("order.json".to_string()))
            .then_respond(MockResponse::success())
            .await;

        assert!(matches!(result, Err(MockError::NoFixtureResolver(_))));
        assert_eq!(dispatcher.pending().await, 0);
    }

    #[tokio::test]
    async fn test_fixture_body_matching() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("order.json"), "{\n  \"item\": \"book\"\n}").unwrap();
        let dispatcher = MockDispatcher::new().with_resolver(FixtureDir::new(dir.path()));

        let fixture = dispatcher.fixture_content("order.json").unwrap();
        dispatcher
            .whenever("POST", "/orders")
            .body(BodySource::Fixture("order.json".to_string()))
            .then_respond(MockResponse::success().with_body(fixture))
            .await
            .unwrap();

        let response = dispatcher
            .dispatch(&RawRequest::post("/orders").body(r#"{"item":"book"}"#))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert!(response.body_text().contains("book"));
    }

    #[tokio::test]
    async fn test_journal_records_every_request_in_order() {
        let dispatcher = MockDispatcher::new();
        dispatcher
            .whenever("GET", "/a")
            .then_respond(MockResponse::success())
            .await
            .unwrap();

        for target in ["/a", "/b", "/a", "/c?x=1"] {
            dispatcher.dispatch(&RawRequest::get(target)).await.unwrap();
        }

        let targets: Vec<String> = dispatcher
            .all_dispatched()
            .await
            .iter()
            .map(|r| r.target())
            .collect();
        assert_eq!(targets, vec!["/a", "/b", "/a", "/c?x=1"]);
        assert_eq!(dispatcher.journal().requests_to("/a").await.len(), 2);
        assert_eq!(
            dispatcher.stats(),
            DispatchStats {
                requests_total: 4,
                requests_matched: 1,
                requests_unmatched: 3,
            }
        );
    }

    #[tokio::test]
    async fn test_reset() {
        let dispatcher = MockDispatcher::new();
        dispatcher.reset().await;
        assert_eq!(dispatcher.pending().await, 0);
        assert!(dispatcher.all_dispatched().await.is_empty());

        dispatcher
            .whenever("GET", "/a")
            .then_respond(MockResponse::success())
            .await
            .unwrap();
        dispatcher.dispatch(&RawRequest::get("/b")).await.unwrap();
        dispatcher.reset().await;

        assert!(dispatcher.all_dispatched().await.is_empty());
        assert_eq!(dispatcher.stats(), DispatchStats::default());
        let response = dispatcher.dispatch(&RawRequest::get("/a")).await.unwrap();
        assert_eq!(response.status, 500);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_reset_is_logged_at_info() {
        let dispatcher = MockDispatcher::new();
        dispatcher.reset().await;

        logs_assert(|lines: &[&str]| {
            if lines
                .iter()
                .any(|line| line.contains("INFO") && line.contains("Dispatcher reset"))
            {
                Ok(())
            } else {
                Err("no INFO line for the reset".to_string())
            }
        });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatch_consumes_at_most_once() {
        let dispatcher = Arc::new(MockDispatcher::new());
        dispatcher
            .whenever("GET", "/once")
            .then_respond(MockResponse::success().with_body("first"))
            .await
            .unwrap();
        dispatcher
            .whenever("GET", "/once")
            .then_respond(MockResponse::success().with_body("second"))
            .await
            .unwrap();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    dispatcher.dispatch(&RawRequest::get("/once")).await.unwrap()
                })
            })
            .collect();

        let mut bodies = Vec::new();
        for handle in handles {
            let response = handle.await.unwrap();
            if response.status == 200 {
                bodies.push(response.body_text().into_owned());
            }
        }
        bodies.sort();

        assert_eq!(bodies, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(dispatcher.all_dispatched().await.len(), 32);
        assert_eq!(dispatcher.stats().requests_unmatched, 30);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_producer_does_not_block_other_dispatches() {
        use std::sync::mpsc;
        use std::sync::Mutex;

        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let release_rx = Mutex::new(release_rx);

        let dispatcher = Arc::new(MockDispatcher::new());
        dispatcher
            .whenever("GET", "/slow")
            .then_dispatch(move |_| {
                entered_tx.lock().unwrap().send(()).ok();
                release_rx
                    .lock()
                    .unwrap()
                    .recv_timeout(Duration::from_secs(5))
                    .map_err(|e| format!("never released: {}", e))?;
                Ok(MockResponse::success().with_body("slow"))
            })
            .await
            .unwrap();
        dispatcher
            .whenever("GET", "/fast")
            .then_respond(MockResponse::success().with_body("fast"))
            .await
            .unwrap();

        let slow = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.dispatch(&RawRequest::get("/slow")).await })
        };
        tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap()
            .unwrap();

        let fast = dispatcher.dispatch(&RawRequest::get("/fast")).await.unwrap();
        assert_eq!(fast.body_text(), "fast");
        dispatcher
            .whenever("GET", "/later")
            .then_respond(MockResponse::success())
            .await
            .unwrap();

        release_tx.send(()).unwrap();
        let slow = slow.await.unwrap().unwrap();
        assert_eq!(slow.body_text(), "slow");
        assert_eq!(dispatcher.pending().await, 1);
    }

    #[tokio::test]
    async fn test_from_config_registers_in_order_with_times() {
        let yaml = r#"
settings:
  log_matches: false
expectations:
  - name: token
    times: 2
    request:
      method: POST
      path: /oauth/token
    response:
      status: 200
      body:
        type: json
        content:
          access_token: abc
  - name: greet
    request:
      path: /greet
    response:
      template: true
      body:
        type: text
        content: "Hello {{query.name}}"
"#;
        let config = MockConfig::from_yaml(yaml).unwrap();
        let dispatcher = MockDispatcher::from_config(&config).await.unwrap();
        assert_eq!(
            dispatcher.pending_labels().await,
            vec!["token", "token", "greet"]
        );

        for _ in 0..2 {
            let response = dispatcher
                .dispatch(&RawRequest::post("/oauth/token"))
                .await
                .unwrap();
            assert_eq!(response.status, 200);
            assert_eq!(response.header("content-type"), Some("application/json"));
        }
        let exhausted = dispatcher
            .dispatch(&RawRequest::post("/oauth/token"))
            .await
            .unwrap();
        assert_eq!(exhausted.status, 500);

        let greeting = dispatcher
            .dispatch(&RawRequest::get("/greet?name=Ada"))
            .await
            .unwrap();
        assert_eq!(greeting.body_text(), "Hello Ada");
    }

    #[tokio::test]
    async fn test_template_render_failure_is_a_producer_error() {
        let yaml = r#"
expectations:
  - name: roll
    request:
      path: /roll
    response:
      template: true
      body:
        type: text
        content: "{{random 10 5}}"
"#;
        let config = MockConfig::from_yaml(yaml).unwrap();
        let dispatcher = MockDispatcher::from_config(&config).await.unwrap();

        match dispatcher.dispatch(&RawRequest::get("/roll")).await {
            Err(DispatchError::Producer { label, source }) => {
                assert_eq!(label, "roll");
                assert!(source.to_string().contains("greater than max"));
            }
            other => panic!("Expected producer error, got {:?}", other),
        }

        assert_eq!(dispatcher.pending().await, 0);
        assert_eq!(dispatcher.all_dispatched().await.len(), 1);
        let retry = dispatcher.dispatch(&RawRequest::get("/roll")).await.unwrap();
        assert_eq!(retry.status, 500);
    }

    #[tokio::test]
    async fn test_load_config_is_all_or_nothing() {
        let yaml = r#"
expectations:
  - request:
      path: /fine
  - request:
      path: /orders
      body:
        type: file
        path: missing.json
"#;
        let config = MockConfig::from_yaml(yaml).unwrap();
        let dispatcher = MockDispatcher::new();

        assert!(dispatcher.load_config(&config).await.is_err());
        assert_eq!(dispatcher.pending().await, 0);
    }
}
