//! Mock responses.

use std::borrow::Cow;
use std::time::Duration;

/// Simulated bandwidth attached to a response.
///
/// The dispatcher never acts on this; it is forwarded to the transport, which
/// delivers `bytes_per_period` bytes per `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub bytes_per_period: u64,
    pub period: Duration,
}

impl ThrottlePolicy {
    pub fn new(bytes_per_period: u64, period: Duration) -> Self {
        Self {
            bytes_per_period,
            period,
        }
    }

    /// Total time needed to deliver `len` bytes under this policy.
    ///
    /// A partial final chunk still costs a whole period.
    pub fn delivery_time(&self, len: usize) -> Duration {
        let per_period = self.bytes_per_period.max(1);
        let periods = (len as u64).div_ceil(per_period);
        self.period.saturating_mul(periods.min(u32::MAX as u64) as u32)
    }
}

/// Response returned to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub throttle: Option<ThrottlePolicy>,
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            throttle: None,
        }
    }

    /// Empty 200 response.
    pub fn success() -> Self {
        Self::new(200)
    }

    /// 200 response carrying a JSON document.
    pub fn ok_json(value: &serde_json::Value) -> Self {
        Self::success().with_json(value)
    }

    /// Empty response with an error status.
    pub fn error(status: u16) -> Self {
        Self::new(status)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Append a header. Repeating a name adds another value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body and a matching content type, unless one is set.
    pub fn with_json(mut self, value: &serde_json::Value) -> Self {
        self.body = value.to_string().into_bytes();
        if self.header("content-type").is_none() {
            self.headers
                .push(("Content-Type".to_string(), "application/json".to_string()));
        }
        self
    }

    /// Attach a throttle policy for the transport.
    pub fn throttle(mut self, bytes_per_period: u64, period: Duration) -> Self {
        self.throttle = Some(ThrottlePolicy::new(bytes_per_period, period));
        self
    }

    /// First value of a header, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}
