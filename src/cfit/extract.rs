// SPDX-License-Identifier: MIT

//! Text extraction for résumé documents and job-posting URLs
//!
//! Documents go to an external parse service that answers with markdown.
//! Job postings are fetched directly and reduced to plain markdown-ish text.

use crate::adk::error::TransportError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use reqwest::{multipart, Client};
use serde_json::Value;
use std::time::Duration;
use url::Url;

const PARSE_SERVICE: &str = "parse-service";
const URL_SERVICE: &str = "jd-url";

/// An uploaded résumé file
#[derive(Debug, Clone)]
pub struct Document {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Convert an uploaded document to markdown
    async fn extract_document(&self, document: Document) -> Result<String, TransportError>;

    /// Fetch a job posting and return its readable text
    async fn extract_url(&self, url: &str) -> Result<String, TransportError>;
}

/// Accept only absolute http(s) URLs
pub fn parse_http_url(raw: &str) -> Result<Url, url::ParseError> {
    let url = Url::parse(raw.trim())?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        _ => Err(url::ParseError::EmptyHost),
    }
}

pub struct HttpExtractor {
    client: Client,
    parse_endpoint: Option<String>,
    parse_api_key: Option<String>,
}

impl HttpExtractor {
    pub fn new(
        timeout: Duration,
        parse_endpoint: Option<String>,
        parse_api_key: Option<String>,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cfit-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::from_reqwest(PARSE_SERVICE, e))?;
        Ok(Self {
            client,
            parse_endpoint,
            parse_api_key,
        })
    }
}

#[async_trait]
impl TextExtractor for HttpExtractor {
    async fn extract_document(&self, document: Document) -> Result<String, TransportError> {
        let endpoint = self.parse_endpoint.as_deref().ok_or_else(|| {
            TransportError::MissingCredentials("PDF_PARSE_API_ENDPOINT must be set".into())
        })?;

        log::info!(
            "Sending '{}' ({} bytes) to the parse service",
            document.file_name,
            document.bytes.len()
        );

        let mut part = multipart::Part::bytes(document.bytes).file_name(document.file_name);
        if let Some(content_type) = document.content_type.as_deref() {
            part = part
                .mime_str(content_type)
                .map_err(|e| TransportError::invalid_response(PARSE_SERVICE, e.to_string()))?;
        }
        let form = multipart::Form::new().part("resume_file", part);

        let mut request = self.client.post(endpoint).multipart(form);
        if let Some(key) = &self.parse_api_key {
            request = request.header("X-API-KEY", key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(PARSE_SERVICE, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(TransportError::status(PARSE_SERVICE, status.as_u16(), text));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| TransportError::from_reqwest(PARSE_SERVICE, e))?;

        match body {
            Value::String(markdown) => Ok(markdown),
            Value::Object(mut map) => match map.remove("resume") {
                Some(Value::String(markdown)) => Ok(markdown),
                _ => Err(TransportError::invalid_response(
                    PARSE_SERVICE,
                    "response has no 'resume' text",
                )),
            },
            _ => Err(TransportError::invalid_response(
                PARSE_SERVICE,
                "expected a JSON object",
            )),
        }
    }

    async fn extract_url(&self, raw: &str) -> Result<String, TransportError> {
        let url = parse_http_url(raw).map_err(|e| TransportError::Unreachable {
            service: URL_SERVICE.to_string(),
            message: format!("invalid url '{}': {}", raw, e),
        })?;

        log::info!("Fetching job description from {}", url);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(URL_SERVICE, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(TransportError::status(URL_SERVICE, status.as_u16(), text));
        }

        let is_html = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(true, |ct| ct.contains("html"));
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(URL_SERVICE, e))?;

        Ok(if is_html { html_to_text(&body) } else { body })
    }
}

struct Patterns {
    noise: Regex,
    title: Regex,
    main: Regex,
    heading: Regex,
    heading_end: Regex,
    item: Regex,
    line_break: Regex,
    tag: Regex,
}

impl Patterns {
    fn compile() -> Option<Self> {
        Some(Self {
            noise: Regex::new(
                r"(?is)<!--.*?-->|<script\b.*?</script>|<style\b.*?</style>|<noscript\b.*?</noscript>|<svg\b.*?</svg>|<nav\b.*?</nav>|<footer\b.*?</footer>",
            )
            .ok()?,
            title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok()?,
            main: Regex::new(r"(?is)<(?:main|article)\b[^>]*>(.*)</(?:main|article)>").ok()?,
            heading: Regex::new(r"(?i)<h([1-6])\b[^>]*>").ok()?,
            heading_end: Regex::new(r"(?i)</h[1-6]>").ok()?,
            item: Regex::new(r"(?i)<li\b[^>]*>").ok()?,
            line_break: Regex::new(r"(?i)<br\s*/?>|</(?:p|div|tr|ul|ol|section|table)>").ok()?,
            tag: Regex::new(r"(?s)<[^>]+>").ok()?,
        })
    }
}

static PATTERNS: Lazy<Option<Patterns>> = Lazy::new(Patterns::compile);

/// Reduce an HTML page to its readable text, keeping headings and list
/// items as markdown. The page title leads when present.
pub fn html_to_text(html: &str) -> String {
    let Some(p) = PATTERNS.as_ref() else {
        return html.to_string();
    };

    let title = p
        .title
        .captures(html)
        .map(|c| decode_entities(c[1].trim()))
        .filter(|t| !t.is_empty());

    let cleaned = p.noise.replace_all(html, "");
    let body = p
        .main
        .captures(&cleaned)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| cleaned.to_string());

    let body = p.heading.replace_all(&body, |c: &Captures| {
        let level = c[1].parse::<usize>().unwrap_or(1);
        format!("\n{} ", "#".repeat(level))
    });
    let body = p.heading_end.replace_all(&body, "\n\n");
    let body = p.item.replace_all(&body, "\n- ");
    let body = p.line_break.replace_all(&body, "\n");
    let body = p.tag.replace_all(&body, "");
    let body = decode_entities(&body);

    let mut lines: Vec<String> = Vec::new();
    if let Some(title) = title {
        lines.push(format!("# {}", title));
        lines.push(String::new());
    }
    let mut blank = true;
    for line in body.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() || line == "-" {
            if !blank {
                lines.push(String::new());
            }
            blank = true;
        } else {
            lines.push(line);
            blank = false;
        }
    }
    lines.join("\n").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
