//! Template engine for dynamic responses.
//!
//! Uses Handlebars to render response bodies against the request that
//! matched.

use crate::request::RequestSnapshot;
use chrono::Utc;
use handlebars::{
    handlebars_helper, Context, Handlebars, Helper, HelperResult, Output, RenderContext,
    RenderErrorReason,
};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Template engine for rendering dynamic responses.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

/// Context for template rendering.
#[derive(Debug, Serialize)]
pub struct TemplateContext {
    /// Request method
    pub method: String,
    /// Request path without query string
    pub path: String,
    /// First value of each query parameter
    pub query: BTreeMap<String, String>,
    /// First value of each header, keyed by lowercased name
    pub headers: BTreeMap<String, String>,
    /// Request body (as string, if text)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Request body as JSON (if parseable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
}

impl TemplateContext {
    pub fn from_request(request: &RequestSnapshot) -> Self {
        let first_values = |map: &BTreeMap<String, Vec<String>>| -> BTreeMap<String, String> {
            map.iter()
                .filter_map(|(k, v)| v.first().map(|first| (k.clone(), first.clone())))
                .collect()
        };
        let body = std::str::from_utf8(request.body())
            .ok()
            .filter(|b| !b.is_empty())
            .map(String::from);
        let json = body.as_ref().and_then(|s| serde_json::from_str(s).ok());

        Self {
            method: request.method().to_string(),
            path: request.path().to_string(),
            query: first_values(request.query()),
            headers: first_values(request.headers()),
            body,
            json,
        }
    }
}

impl TemplateEngine {
    /// Create a new template engine.
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        // Register custom helpers
        handlebars.register_helper("uuid", Box::new(uuid_helper));
        handlebars.register_helper("now", Box::new(now_helper));
        handlebars.register_helper("random", Box::new(random_helper));
        handlebars.register_helper("default", Box::new(default_helper));
        handlebars.register_helper("upper", Box::new(upper_helper));
        handlebars.register_helper("lower", Box::new(lower_helper));
        handlebars.register_helper("header", Box::new(header_helper));

        // Bodies are JSON or plain text, never HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    /// Render a template string against a request.
    pub fn render(
        &self,
        template: &str,
        request: &RequestSnapshot,
    ) -> Result<String, handlebars::RenderError> {
        let ctx = TemplateContext::from_request(request);
        self.handlebars.render_template(template, &ctx)
    }

    /// Render a JSON value with templates in string fields.
    pub fn render_json(
        &self,
        json: &serde_json::Value,
        request: &RequestSnapshot,
    ) -> Result<serde_json::Value, handlebars::RenderError> {
        let ctx = TemplateContext::from_request(request);
        self.render_json_value(json, &ctx)
    }

    fn render_json_value(
        &self,
        value: &serde_json::Value,
        ctx: &TemplateContext,
    ) -> Result<serde_json::Value, handlebars::RenderError> {
        match value {
            serde_json::Value::String(s) if s.contains("{{") => {
                let rendered = self.handlebars.render_template(s, ctx)?;
                Ok(serde_json::Value::String(rendered))
            }
            serde_json::Value::Array(arr) => arr
                .iter()
                .map(|v| self.render_json_value(v, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
            serde_json::Value::Object(obj) => {
                let mut rendered = serde_json::Map::new();
                for (k, v) in obj {
                    rendered.insert(k.clone(), self.render_json_value(v, ctx)?);
                }
                Ok(serde_json::Value::Object(rendered))
            }
            _ => Ok(value.clone()),
        }
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

// Custom Handlebars helpers

const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

handlebars_helper!(upper_helper: |value: str| value.to_uppercase());
handlebars_helper!(lower_helper: |value: str| value.to_lowercase());

/// `{{uuid}}`: a random version 4 UUID.
fn uuid_helper(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let mut bytes: [u8; 16] = rand::random();
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    out.write(&format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    ))?;
    Ok(())
}

/// `{{now}}` or `{{now "%Y-%m-%d"}}`: current UTC time.
fn now_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let format = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .unwrap_or(DEFAULT_TIME_FORMAT);

    // chrono reports unknown specifiers through fmt::Error
    let mut rendered = String::new();
    write!(rendered, "{}", Utc::now().format(format)).map_err(|_| {
        RenderErrorReason::Other(format!("now: invalid time format {:?}", format))
    })?;
    out.write(&rendered)?;
    Ok(())
}

/// `{{random}}` or `{{random min max}}`: an integer in `min..=max`.
fn random_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let bound = |index: usize, fallback: i64| match h.param(index) {
        None => Ok(fallback),
        Some(param) => param.value().as_i64().ok_or_else(|| {
            RenderErrorReason::Other(format!(
                "random: bound {} must be an integer, got {}",
                index + 1,
                param.value()
            ))
        }),
    };
    let min = bound(0, 0)?;
    let max = bound(1, 100)?;
    if min > max {
        return Err(RenderErrorReason::Other(format!(
            "random: min {} is greater than max {}",
            min, max
        ))
        .into());
    }

    out.write(&rand::thread_rng().gen_range(min..=max).to_string())?;
    Ok(())
}

/// `{{default value "fallback"}}`: `value` unless it is missing, null or "".
fn default_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let fallback = h.param(1).and_then(|v| v.value().as_str()).unwrap_or("");
    match h.param(0).map(|v| v.value()) {
        Some(Value::String(s)) if !s.is_empty() => out.write(s)?,
        Some(Value::Null) | Some(Value::String(_)) | None => out.write(fallback)?,
        Some(other) => out.write(&other.to_string())?,
    }
    Ok(())
}

/// `{{header "X-Request-Id"}}`: first value of a request header, matched
/// case-insensitively. Renders nothing when the header is absent.
fn header_helper(
    h: &Helper,
    _: &Handlebars,
    ctx: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let name = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .ok_or(RenderErrorReason::ParamNotFoundForIndex("header", 0))?;

    if let Some(value) = ctx
        .data()
        .get("headers")
        .and_then(|headers| headers.get(name.to_ascii_lowercase()))
        .and_then(Value::as_str)
    {
        out.write(value)?;
    }
    Ok(())
}
