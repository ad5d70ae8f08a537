//! Origin URL camouflage.
//!
//! Every reference to a registered origin URL is replaced by the proxy's
//! public URL for the service. Matching is by prefix, longest origin first,
//! and only on a URL boundary so `http://origin/wms2` is not taken for
//! `http://origin/wms`.

use axum::http::{header, HeaderMap, HeaderValue};
use quick_xml::escape::escape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::AnalysisError;
use crate::catalogue::SecuredService;
use crate::config::PublicConfig;

#[derive(Debug, Clone)]
pub struct Camouflage {
    public_url: String,
    /// Origin prefixes, longest first.
    origins: Vec<String>,
}

impl Camouflage {
    pub fn for_service(service: &SecuredService, public: &PublicConfig) -> Self {
        let base = public.base_url.trim_end_matches('/');
        let prefix = public.path_prefix.trim_matches('/');
        let public_url = if prefix.is_empty() {
            format!("{base}/{}", service.id)
        } else {
            format!("{base}/{prefix}/{}", service.id)
        };

        let mut origins: Vec<String> = Vec::new();
        for url in service.origin_urls() {
            let base = url.split(['?', '#']).next().unwrap_or(url).trim_end_matches('/');
            for candidate in [url.trim_end_matches(['?', '&']), base] {
                if !candidate.is_empty() && !origins.iter().any(|o| o == candidate) {
                    origins.push(candidate.to_string());
                }
            }
        }
        origins.sort_by(|a, b| b.len().cmp(&a.len()));

        Self { public_url, origins }
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    /// Public form of `value` when it points at an origin.
    pub fn rewrite_url(&self, value: &str) -> Option<String> {
        for origin in &self.origins {
            let Some(rest) = strip_prefix_ignore_case(value, origin) else {
                continue;
            };
            return match rest.chars().next() {
                None => Some(self.public_url.clone()),
                Some('/') | Some('#') => Some(format!("{}{rest}", self.public_url)),
                Some('?') | Some('&') => {
                    let query = rest.trim_start_matches(['?', '&']);
                    if query.is_empty() {
                        Some(format!("{}?", self.public_url))
                    } else {
                        Some(format!("{}?{query}", self.public_url))
                    }
                }
                _ => continue,
            };
        }
        None
    }

    /// Rewrite a `Location` header in place.
    pub fn rewrite_headers(&self, headers: &mut HeaderMap) {
        let rewritten = headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| self.rewrite_url(v))
            .and_then(|v| HeaderValue::from_str(&v).ok());
        if let Some(value) = rewritten {
            headers.insert(header::LOCATION, value);
        }
    }

    /// Rewrite `href`, `onlineResource` and `schemaLocation` attributes and
    /// text nodes that are exactly an origin URL.
    pub fn rewrite_document(&self, body: &[u8]) -> Result<(Vec<u8>, usize), AnalysisError> {
        let mut reader = Reader::from_reader(body);
        let mut writer = Writer::new(Vec::with_capacity(body.len() + 256));
        let mut buf = Vec::new();
        let mut rewrites = 0usize;

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| AnalysisError::Xml(e.to_string()))?;
            let out = match event {
                Event::Eof => break,
                Event::Start(e) => Event::Start(self.rewrite_attributes(&e, &mut rewrites)?),
                Event::Empty(e) => Event::Empty(self.rewrite_attributes(&e, &mut rewrites)?),
                Event::Text(t) => {
                    // Unknown entities leave the node as it is.
                    let rewritten = t.unescape().ok().and_then(|text| self.rewrite_text(&text));
                    match rewritten {
                        Some(new) => {
                            rewrites += 1;
                            Event::Text(BytesText::new(&new).into_owned())
                        }
                        None => Event::Text(t.into_owned()),
                    }
                }
                other => other.into_owned(),
            };
            writer
                .write_event(out)
                .map_err(|e| AnalysisError::Xml(e.to_string()))?;
            buf.clear();
        }

        Ok((writer.into_inner(), rewrites))
    }

    fn rewrite_attributes(&self, e: &BytesStart<'_>, rewrites: &mut usize) -> Result<BytesStart<'static>, AnalysisError> {
        let mut out = e.clone().into_owned();
        out.clear_attributes();
        for attr in e.attributes() {
            let attr = attr.map_err(|e| AnalysisError::Xml(e.to_string()))?;
            let local = attr.key.local_name();
            let rewritten = match local.as_ref() {
                b"href" | b"onlineResource" => attr
                    .unescape_value()
                    .ok()
                    .and_then(|value| self.rewrite_url(value.trim())),
                b"schemaLocation" => attr
                    .unescape_value()
                    .ok()
                    .and_then(|value| self.rewrite_tokens(&value)),
                _ => None,
            };
            match rewritten {
                Some(value) => {
                    *rewrites += 1;
                    let escaped = escape(value.as_str());
                    out.push_attribute(Attribute::from((attr.key.as_ref(), escaped.as_bytes())));
                }
                None => out.push_attribute(attr),
            }
        }
        Ok(out)
    }

    fn rewrite_tokens(&self, value: &str) -> Option<String> {
        let mut changed = false;
        let tokens: Vec<String> = value
            .split_whitespace()
            .map(|token| match self.rewrite_url(token) {
                Some(new) => {
                    changed = true;
                    new
                }
                None => token.to_string(),
            })
            .collect();
        changed.then(|| tokens.join(" "))
    }

    fn rewrite_text(&self, text: &str) -> Option<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
            return None;
        }
        let new = self.rewrite_url(trimmed)?;
        let start = text.len() - text.trim_start().len();
        let end = start + trimmed.len();
        Some(format!("{}{new}{}", &text[..start], &text[end..]))
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    if value.len() >= prefix.len()
        && value.is_char_boundary(prefix.len())
        && value[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}
