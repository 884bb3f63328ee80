//! Request matching logic.
//!
//! A [`MatcherSpec`] collects optional criteria. Resolving its body fixture
//! and compiling it yields a [`RequestMatcher`], the logical AND of only the
//! criteria that were supplied.

use crate::error::{MockError, Result};
use crate::fixture::FixtureResolver;
use crate::request::{normalize_path, RequestSnapshot};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A predicate over request snapshots. Must be pure.
pub trait Match: Send + Sync {
    fn matches(&self, request: &RequestSnapshot) -> bool;
}

impl<F> Match for F
where
    F: Fn(&RequestSnapshot) -> bool + Send + Sync,
{
    fn matches(&self, request: &RequestSnapshot) -> bool {
        self(request)
    }
}

/// Expected value(s) of one header.
#[derive(Debug, Clone)]
pub enum HeaderValue {
    /// Some value equals this string.
    Exact(String),
    /// The set of values equals this set, in any order.
    Values(Vec<String>),
    /// Some value matches the regex.
    Pattern(Regex),
    /// The header is present with any value.
    Present,
}

impl HeaderValue {
    /// Compile a regex header expectation.
    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(HeaderValue::Pattern)
            .map_err(|source| MockError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    fn matches(&self, actual: &[String]) -> bool {
        match self {
            HeaderValue::Exact(value) => actual.iter().any(|v| v == value),
            HeaderValue::Values(values) => same_set(values, actual),
            HeaderValue::Pattern(regex) => actual.iter().any(|v| regex.is_match(v)),
            HeaderValue::Present => true,
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Exact(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Exact(value)
    }
}

impl From<Vec<String>> for HeaderValue {
    fn from(values: Vec<String>) -> Self {
        HeaderValue::Values(values)
    }
}

/// Where an expected request body comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum BodySource {
    /// Literal text, compared as JSON when it parses as JSON.
    Text(String),
    /// A JSON document.
    Json(serde_json::Value),
    /// A named fixture, read through a [`FixtureResolver`] at registration.
    Fixture(String),
}

impl BodySource {
    /// Turn the source into text. Only fixtures touch the resolver.
    pub fn resolve(&self, resolver: &dyn FixtureResolver) -> Result<String> {
        match self {
            BodySource::Text(text) => Ok(text.clone()),
            BodySource::Json(value) => Ok(value.to_string()),
            BodySource::Fixture(name) => resolver.resolve(name),
        }
    }
}

/// One resolved criterion.
#[derive(Debug, Clone)]
pub enum Criterion {
    Path(String),
    Query(BTreeMap<String, Vec<String>>),
    Headers(Vec<(String, HeaderValue)>),
    Method(String),
    Body(ExpectedBody),
}

/// Expected body, parsed once at composition time.
#[derive(Debug, Clone)]
pub struct ExpectedBody {
    raw: String,
    json: Option<serde_json::Value>,
}

impl ExpectedBody {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let json = serde_json::from_str(&raw).ok();
        Self { raw, json }
    }

    fn matches(&self, body: &[u8]) -> bool {
        let actual = String::from_utf8_lossy(body);
        if let Some(expected) = &self.json {
            if let Ok(actual_json) = serde_json::from_str::<serde_json::Value>(&actual) {
                return *expected == actual_json;
            }
        }
        self.raw == actual
    }
}

/// Optional criteria for an expectation, before fixture resolution.
#[derive(Debug, Clone, Default)]
pub struct MatcherSpec {
    path: Option<String>,
    query: BTreeMap<String, Vec<String>>,
    headers: Vec<(String, HeaderValue)>,
    method: Option<String>,
    body: Option<BodySource>,
}

impl MatcherSpec {
    /// Spec with no criteria. Compiles to a catch-all matcher.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<str>) -> Self {
        self.path = Some(normalize_path(path.as_ref()).into_owned());
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Require a query parameter with exactly this value set.
    pub fn query<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.query
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Require a header. Names are compared case-insensitively.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: BodySource) -> Self {
        self.body = Some(body);
        self
    }

    /// Resolve the body source and compose the criteria.
    pub fn compile(&self, resolver: &dyn FixtureResolver) -> Result<RequestMatcher> {
        let mut criteria = Vec::new();

        if let Some(path) = &self.path {
            criteria.push(Criterion::Path(path.clone()));
        }
        if !self.query.is_empty() {
            criteria.push(Criterion::Query(self.query.clone()));
        }
        if !self.headers.is_empty() {
            criteria.push(Criterion::Headers(self.headers.clone()));
        }
        if let Some(method) = &self.method {
            criteria.push(Criterion::Method(method.clone()));
        }
        if let Some(body) = &self.body {
            criteria.push(Criterion::Body(ExpectedBody::new(body.resolve(resolver)?)));
        }

        Ok(compose(criteria))
    }
}

/// Compose resolved criteria into one matcher. No criteria matches anything.
pub fn compose(criteria: Vec<Criterion>) -> RequestMatcher {
    RequestMatcher { criteria }
}

/// Composite predicate: every criterion must hold.
#[derive(Debug, Clone, Default)]
pub struct RequestMatcher {
    criteria: Vec<Criterion>,
}

impl RequestMatcher {
    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }
}

impl Match for RequestMatcher {
    fn matches(&self, request: &RequestSnapshot) -> bool {
        self.criteria.iter().all(|criterion| match criterion {
            Criterion::Path(path) => request.path() == path,
            Criterion::Query(expected) => matches_query(request, expected),
            Criterion::Headers(expected) => matches_headers(request, expected),
            Criterion::Method(method) => request.method() == method,
            Criterion::Body(body) => body.matches(request.body()),
        })
    }
}

impl fmt::Display for RequestMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.criteria.is_empty() {
            return f.write_str("any request");
        }
        let parts: Vec<String> = self
            .criteria
            .iter()
            .map(|criterion| match criterion {
                Criterion::Path(path) => format!("path={}", path),
                Criterion::Query(query) => format!("query={:?}", query),
                Criterion::Headers(headers) => {
                    let names: Vec<&str> = headers.iter().map(|(n, _)| n.as_str()).collect();
                    format!("headers={}", names.join(","))
                }
                Criterion::Method(method) => format!("method={}", method),
                Criterion::Body(_) => "body".to_string(),
            })
            .collect();
        f.write_str(&parts.join(" "))
    }
}

// Extra actual parameters are allowed.
fn matches_query(request: &RequestSnapshot, expected: &BTreeMap<String, Vec<String>>) -> bool {
    expected.iter().all(|(name, values)| {
        request
            .query_values(name)
            .map(|actual| same_set(values, actual))
            .unwrap_or(false)
    })
}

fn matches_headers(request: &RequestSnapshot, expected: &[(String, HeaderValue)]) -> bool {
    expected.iter().all(|(name, value)| {
        request
            .header_values(name)
            .map(|actual| value.matches(actual))
            .unwrap_or(false)
    })
}

fn same_set(expected: &[String], actual: &[String]) -> bool {
    let expected: BTreeSet<&str> = expected.iter().map(String::as_str).collect();
    let actual: BTreeSet<&str> = actual.iter().map(String::as_str).collect();
    expected == actual
}
