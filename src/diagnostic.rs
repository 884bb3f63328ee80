//! Diagnostic responses for unmatched requests.
//!
//! The body is written by hand so its layout stays fixed:
//!
//! ```json
//! {
//!     "error": "No mocked response found for this request",
//!     "request": {
//!         "method": "GET",
//!         "path": "/api/users/12345?include=profile",
//!         "headers": "authorization: Bearer abc",
//!         "body": ""
//!     },
//!     "suggestion": "..."
//! }
//! ```

use crate::request::RequestSnapshot;
use crate::response::MockResponse;
use std::fmt::Write;

/// Status code of every diagnostic response.
pub const NO_MATCH_STATUS: u16 = 500;

/// Characters of request body shown before truncating.
pub const BODY_PREVIEW_CHARS: usize = 500;

pub const TRUNCATION_MARKER: &str = "... (truncated)";

pub const NO_MATCH_ERROR: &str = "No mocked response found for this request";

pub const NO_MATCH_SUGGESTION: &str =
    "Make sure you have mocked this request with dispatcher.whenever() or dispatcher.register()";

/// Build the 500 response for a request no expectation matched.
pub fn unmatched_response(request: &RequestSnapshot) -> MockResponse {
    MockResponse::new(NO_MATCH_STATUS)
        .with_header("Content-Type", "application/json")
        .with_body(render(request))
}

/// Render the diagnostic JSON body.
pub fn render(request: &RequestSnapshot) -> String {
    format!(
        r#"{{
    "error": "{error}",
    "request": {{
        "method": "{method}",
        "path": "{path}",
        "headers": "{headers}",
        "body": "{body}"
    }},
    "suggestion": "{suggestion}"
}}"#,
        error = escape_json(NO_MATCH_ERROR),
        method = escape_json(request.method()),
        path = escape_json(&request.target()),
        headers = escape_json(&flatten_headers(request)),
        body = escape_json(&body_preview(&request.body_text())),
        suggestion = escape_json(NO_MATCH_SUGGESTION),
    )
}

/// `name: v1; v2, name2: v3`, names lowercased and sorted.
pub fn flatten_headers(request: &RequestSnapshot) -> String {
    request
        .headers()
        .iter()
        .map(|(name, values)| format!("{}: {}", name, values.join("; ")))
        .collect::<Vec<_>>()
        .join(", ")
}

/// First [`BODY_PREVIEW_CHARS`] characters, marked when cut.
pub fn body_preview(body: &str) -> String {
    let mut chars = body.chars();
    let mut preview: String = chars.by_ref().take(BODY_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        preview.push_str(TRUNCATION_MARKER);
    }
    preview
}

/// Escape text for embedding in a JSON string literal.
///
/// Single pass, so already-escaped output is never rescanned.
pub fn escape_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}
