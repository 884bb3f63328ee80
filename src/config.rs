//! Configuration for the mock dispatcher.
//!
//! Expectations can be declared in YAML instead of code. Each definition is
//! turned into a matcher spec and a response producer at load time.

use crate::error::{MockError, Result};
use crate::fixture::FixtureResolver;
use crate::matcher::{BodySource, HeaderValue, MatcherSpec};
use crate::registry::ResponseProducer;
use crate::response::{MockResponse, ThrottlePolicy};
use crate::template::TemplateEngine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Main configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockConfig {
    /// Expectations, registered in file order
    #[serde(default)]
    pub expectations: Vec<ExpectationDefinition>,

    /// Global settings
    #[serde(default)]
    pub settings: Settings,
}

impl MockConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate YAML configuration.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        for (index, expectation) in self.expectations.iter().enumerate() {
            expectation
                .validate()
                .map_err(|message| MockError::InvalidConfig { index, message })?;
        }
        Ok(())
    }
}

/// A single expectation definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectationDefinition {
    /// Optional name, used in logs
    #[serde(default)]
    pub name: Option<String>,

    /// How many requests this expectation answers
    #[serde(default = "default_times")]
    pub times: u32,

    /// Request matcher
    #[serde(default)]
    pub request: RequestDefinition,

    /// Response to return
    #[serde(default)]
    pub response: ResponseDefinition,
}

fn default_times() -> u32 {
    1
}

impl ExpectationDefinition {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.times == 0 {
            return Err("times must be at least 1".to_string());
        }
        self.request.to_spec().map_err(|e| e.to_string())?;
        self.response.validate()
    }

    /// Label for log lines: the name, or the method and path.
    pub fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        format!(
            "{} {}",
            self.request.method.as_deref().unwrap_or("*"),
            self.request.path.as_deref().unwrap_or("*")
        )
    }
}

/// Request matching configuration. Absent fields match anything.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RequestDefinition {
    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub path: Option<String>,

    /// Required query parameters and their value sets
    #[serde(default)]
    pub query: BTreeMap<String, OneOrMany>,

    #[serde(default)]
    pub headers: BTreeMap<String, HeaderDefinition>,

    #[serde(default)]
    pub body: Option<BodyDefinition>,
}

impl RequestDefinition {
    /// Build the matcher spec. Fails on invalid header patterns.
    pub fn to_spec(&self) -> Result<MatcherSpec> {
        let mut spec = MatcherSpec::any();

        if let Some(method) = &self.method {
            spec = spec.method(method.clone());
        }
        if let Some(path) = &self.path {
            spec = spec.path(path);
        }
        for (name, values) in &self.query {
            spec = spec.query(name.clone(), values.to_vec());
        }
        for (name, header) in &self.headers {
            spec = spec.header(name.clone(), header.to_header_value()?);
        }
        if let Some(body) = &self.body {
            spec = spec.body(body.to_source());
        }

        Ok(spec)
    }
}

/// A single string or a list of strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value.clone()],
            OneOrMany::Many(values) => values.clone(),
        }
    }
}

/// Header matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HeaderDefinition {
    /// Some value equals this one
    Exact { value: String },
    /// The value set equals this set
    Values { values: Vec<String> },
    /// Some value matches the regex
    Regex { pattern: String },
    /// Header must be present (any value)
    Present,
}

impl HeaderDefinition {
    fn to_header_value(&self) -> Result<HeaderValue> {
        Ok(match self {
            HeaderDefinition::Exact { value } => HeaderValue::Exact(value.clone()),
            HeaderDefinition::Values { values } => HeaderValue::Values(values.clone()),
            HeaderDefinition::Regex { pattern } => HeaderValue::pattern(pattern)?,
            HeaderDefinition::Present => HeaderValue::Present,
        })
    }
}

/// Expected request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyDefinition {
    Text { content: String },
    Json { content: serde_json::Value },
    /// Fixture name, resolved against `settings.fixtures_dir`
    File { path: String },
}

impl BodyDefinition {
    fn to_source(&self) -> BodySource {
        match self {
            BodyDefinition::Text { content } => BodySource::Text(content.clone()),
            BodyDefinition::Json { content } => BodySource::Json(content.clone()),
            BodyDefinition::File { path } => BodySource::Fixture(path.clone()),
        }
    }
}

/// Response definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Response headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Response body
    #[serde(default)]
    pub body: Option<ResponseBody>,

    /// Render text and JSON bodies as Handlebars templates
    #[serde(default)]
    pub template: bool,

    /// Simulated bandwidth, forwarded to the transport
    #[serde(default)]
    pub throttle: Option<ThrottleDefinition>,
}

fn default_status() -> u16 {
    200
}

impl Default for ResponseDefinition {
    fn default() -> Self {
        Self {
            status: default_status(),
            headers: BTreeMap::new(),
            body: None,
            template: false,
            throttle: None,
        }
    }
}

impl ResponseDefinition {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.status < 100 || self.status > 599 {
            return Err(format!("Invalid status code: {}", self.status));
        }
        if let Some(throttle) = &self.throttle {
            if throttle.bytes_per_period == 0 || throttle.period_ms == 0 {
                return Err("throttle values must be greater than zero".to_string());
            }
        }
        Ok(())
    }

    /// Response head (status, headers, throttle) without a body.
    fn head(&self) -> MockResponse {
        let mut response = MockResponse::new(self.status);

        let has_content_type = self
            .headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("content-type"));
        if !has_content_type {
            if let Some(body) = &self.body {
                response = response.with_header("Content-Type", body.content_type());
            }
        }
        for (name, value) in &self.headers {
            response = response.with_header(name.clone(), value.clone());
        }

        response.throttle = self.throttle.as_ref().map(ThrottleDefinition::to_policy);
        response
    }

    /// Build the producer. Fixtures and base64 bodies are read now; template
    /// bodies are rendered per request.
    pub fn to_producer(
        &self,
        resolver: &dyn FixtureResolver,
        engine: &Arc<TemplateEngine>,
    ) -> Result<ResponseProducer> {
        let head = self.head();

        let body = match &self.body {
            Some(body) if self.template && body.is_templatable() => body.clone(),
            Some(body) => return Ok(head.with_body(body.to_bytes(resolver)?).into()),
            None => return Ok(head.into()),
        };

        let engine = Arc::clone(engine);
        Ok(ResponseProducer::dynamic(move |request| {
            let rendered = match &body {
                ResponseBody::Json { content } => {
                    serde_json::to_vec(&engine.render_json(content, request)?)?
                }
                ResponseBody::Text { content } => engine.render(content, request)?.into_bytes(),
                // Filtered out by `is_templatable`.
                other => return Err(format!("{:?} bodies cannot be templated", other).into()),
            };
            Ok(head.clone().with_body(rendered))
        }))
    }
}

/// Response body configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Plain text body
    Text { content: String },
    /// JSON body
    Json { content: serde_json::Value },
    /// Base64 encoded binary
    Base64 { content: String },
    /// Fixture name, resolved against `settings.fixtures_dir`
    File { path: String },
}

impl ResponseBody {
    /// Get the body content as bytes.
    pub fn to_bytes(&self, resolver: &dyn FixtureResolver) -> Result<Vec<u8>> {
        match self {
            ResponseBody::Text { content } => Ok(content.as_bytes().to_vec()),
            ResponseBody::Json { content } => Ok(content.to_string().into_bytes()),
            ResponseBody::Base64 { content } => {
                use base64::Engine;
                Ok(base64::engine::general_purpose::STANDARD.decode(content)?)
            }
            ResponseBody::File { path } => Ok(resolver.resolve(path)?.into_bytes()),
        }
    }

    /// Get content type for this body.
    pub fn content_type(&self) -> &'static str {
        match self {
            ResponseBody::Text { .. } => "text/plain",
            ResponseBody::Json { .. } => "application/json",
            ResponseBody::Base64 { .. } => "application/octet-stream",
            ResponseBody::File { path } if path.ends_with(".json") => "application/json",
            ResponseBody::File { .. } => "application/octet-stream",
        }
    }

    fn is_templatable(&self) -> bool {
        matches!(self, ResponseBody::Text { .. } | ResponseBody::Json { .. })
    }
}

/// Throttle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThrottleDefinition {
    pub bytes_per_period: u64,
    pub period_ms: u64,
}

impl ThrottleDefinition {
    fn to_policy(&self) -> ThrottlePolicy {
        ThrottlePolicy::new(self.bytes_per_period, Duration::from_millis(self.period_ms))
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Log every matched request
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched requests
    #[serde(default = "default_true")]
    pub log_unmatched: bool,

    /// Directory fixtures are read from
    #[serde(default)]
    pub fixtures_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
            fixtures_dir: None,
        }
    }
}
