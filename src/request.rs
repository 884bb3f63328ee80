//! Request snapshots.
//!
//! The transport converts its native request into a [`RequestSnapshot`]
//! through the [`IncomingRequest`] adapter. Snapshots are immutable and shared
//! between the dispatch call and the journal.

use std::borrow::Cow;
use std::collections::BTreeMap;

/// Multi-valued map keyed by name. Used for both query parameters and headers.
pub type MultiMap = BTreeMap<String, Vec<String>>;

/// Raw-request adapter implemented by transports.
pub trait IncomingRequest {
    /// HTTP method as received.
    fn method(&self) -> &str;

    /// Request target: the path, optionally followed by `?query`.
    fn target(&self) -> &str;

    /// Header name/value pairs in arrival order. Names may repeat.
    fn headers(&self) -> Vec<(&str, &str)>;

    /// Raw request body.
    fn body(&self) -> &[u8];
}

/// Immutable view of one incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSnapshot {
    method: String,
    path: String,
    raw_query: Option<String>,
    query: MultiMap,
    headers: MultiMap,
    body: Vec<u8>,
}

impl RequestSnapshot {
    /// Build a snapshot from any adapter.
    pub fn from_incoming<R: IncomingRequest + ?Sized>(request: &R) -> Self {
        let (path, raw_query) = match request.target().split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (request.target(), None),
        };

        let mut headers = MultiMap::new();
        for (name, value) in request.headers() {
            headers
                .entry(name.to_ascii_lowercase())
                .or_default()
                .push(value.to_string());
        }

        Self {
            method: request.method().to_string(),
            path: normalize_path(path).into_owned(),
            query: parse_query_string(raw_query.as_deref().unwrap_or("")),
            raw_query,
            headers,
            body: request.body().to_vec(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Path without the query string, always starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The undecoded query string, if the request had one.
    pub fn raw_query(&self) -> Option<&str> {
        self.raw_query.as_deref()
    }

    /// Path followed by the raw query string, as the client sent it.
    pub fn target(&self) -> String {
        match &self.raw_query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// Decoded query parameters.
    pub fn query(&self) -> &MultiMap {
        &self.query
    }

    /// All values of a query parameter.
    pub fn query_values(&self, name: &str) -> Option<&[String]> {
        self.query.get(name).map(Vec::as_slice)
    }

    /// Headers keyed by lowercased name.
    pub fn headers(&self) -> &MultiMap {
        &self.headers
    }

    /// All values of a header, looked up case-insensitively.
    pub fn header_values(&self, name: &str) -> Option<&[String]> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    /// First value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Plain owned request, the bundled [`IncomingRequest`] implementation.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl RawRequest {
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new("GET", target)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Self::new("POST", target)
    }

    /// Append a header. Repeating a name adds another value.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

impl IncomingRequest for RawRequest {
    fn method(&self) -> &str {
        &self.method
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        self.headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect()
    }

    fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Prefix a path with `/` when it is missing one.
pub fn normalize_path(path: &str) -> Cow<'_, str> {
    if path.starts_with('/') {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(format!("/{}", path))
    }
}

/// Parse a query string into (possibly repeated) key-value pairs.
pub(crate) fn parse_query_string(query: &str) -> MultiMap {
    let mut params = MultiMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        params
            .entry(percent_decode(key))
            .or_default()
            .push(percent_decode(value));
    }

    params
}

/// Form-style URL decoding. Malformed escapes are kept verbatim.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit() =>
            {
                decoded.push(hex_value(bytes[i + 1]) << 4 | hex_value(bytes[i + 2]));
                i += 3;
                continue;
            }
            b'+' => decoded.push(b' '),
            other => decoded.push(other),
        }
        i += 1;
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}
