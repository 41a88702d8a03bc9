//! Resource URI parsing and template matching.
//!
//! Templates look like `jobbuilda://invoices/{id}/payments`. A URI matches
//! when it has the same scheme and segment count, literal segments are
//! equal, and `{param}` segments are non-empty. An optional `?k=v&...`
//! query is parsed separately and never affects matching.

use std::collections::HashMap;

use crate::error::{JobBuildaError, Result};

pub const SCHEME: &str = "jobbuilda";

/// A parsed resource URI
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceUri {
    pub raw: String,
    pub segments: Vec<String>,
    pub query: HashMap<String, String>,
}

impl ResourceUri {
    pub fn parse(raw: &str) -> Result<Self> {
        let rest = raw
            .strip_prefix(SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(|| JobBuildaError::UnknownResource(raw.to_string()))?;

        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, query),
            None => (rest, ""),
        };

        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(percent_decode)
            .collect();
        if segments.is_empty() {
            return Err(JobBuildaError::UnknownResource(raw.to_string()));
        }

        let query = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (percent_decode(k), percent_decode(v)),
                None => (percent_decode(pair), String::new()),
            })
            .collect();

        Ok(Self {
            raw: raw.to_string(),
            segments,
            query,
        })
    }

    /// Match against a template, returning the bound `{param}` values.
    pub fn match_template(&self, template: &str) -> Option<HashMap<String, String>> {
        let path = template.strip_prefix(SCHEME)?.strip_prefix("://")?;
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (part, segment) in parts.iter().zip(&self.segments) {
            if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                params.insert(name.to_string(), segment.clone());
            } else if part != segment {
                return None;
            }
        }
        Some(params)
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

/// Decode `%XX` escapes and `+` in one URI component; malformed escapes pass through.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let escaped = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match escaped {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// A URI resolved to one template of one service
#[derive(Debug, Clone)]
pub struct ResourceMatch {
    pub template: String,
    pub params: HashMap<String, String>,
    pub uri: ResourceUri,
}

impl ResourceMatch {
    /// A bound path parameter; templates guarantee presence after a match.
    pub fn param(&self, name: &str) -> Result<&str> {
        self.params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| JobBuildaError::UnknownResource(self.uri.raw.clone()))
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.uri.query_param(key)
    }
}
