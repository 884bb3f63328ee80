//! Mock Dispatch
//!
//! A programmable mock HTTP dispatcher for tests. Tests register
//! expectations (a request predicate plus a response); the transport hands
//! every incoming request to the dispatcher, which answers with the first
//! matching expectation and consumes it. Unmatched requests get a 500
//! response whose JSON body shows what was received.
//!
//! # Features
//!
//! - **Request Matching**: Match by path, method, headers, query params, body
//! - **Consume Once**: Each expectation answers one request, oldest first
//! - **Dynamic Responses**: Compute responses from the matched request
//! - **Request Journal**: Every request is recorded for assertions
//! - **Diagnostics**: Escaped, truncated JSON describing unmatched requests
//! - **YAML Expectations**: Load expectations and Handlebars templates from files
//!
//! # Example
//!
//! ```no_run
//! use mock_dispatch::{MockDispatcher, MockResponse, RawRequest};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = MockDispatcher::new();
//! dispatcher
//!     .whenever("GET", "v2/top-headlines")
//!     .then_respond(MockResponse::ok_json(&serde_json::json!({"status": "ok"})))
//!     .await?;
//!
//! let response = dispatcher.dispatch(&RawRequest::get("/v2/top-headlines")).await?;
//! assert_eq!(response.status, 200);
//! assert_eq!(dispatcher.all_dispatched().await.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod diagnostic;
pub mod dispatcher;
pub mod error;
pub mod fixture;
pub mod journal;
pub mod matcher;
pub mod registry;
pub mod request;
pub mod response;
pub mod template;

pub use config::{MockConfig, Settings};
pub use dispatcher::{DispatchStats, ExpectationBuilder, MockDispatcher};
pub use error::{DispatchError, MockError, ProducerError};
pub use fixture::{FixtureDir, FixtureResolver, NoFixtures};
pub use matcher::{BodySource, HeaderValue, Match, MatcherSpec, RequestMatcher};
pub use registry::{Expectation, ResponseProducer};
pub use request::{IncomingRequest, RawRequest, RequestSnapshot};
pub use response::{MockResponse, ThrottlePolicy};
