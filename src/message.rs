//! RFC-822-ish message parsing: headers, MIME body walk, content digest.

use std::collections::HashMap;

use crate::error::Result;

/// One part of a (possibly multipart) message body.
#[derive(Debug, Clone)]
pub struct MimePart {
    /// Full `Content-Type` value, e.g. `"text/html; charset=utf-8"`.
    pub content_type: String,
    /// Decoded text, present only for `text/*` parts.
    pub text: Option<String>,
}

impl MimePart {
    fn main_type(&self) -> &str {
        self.content_type
            .split(';')
            .next()
            .unwrap_or("text/plain")
            .trim()
    }

    pub fn is_text(&self) -> bool {
        self.text.is_some()
    }

    /// `CT_<type>_<subtype>` token for non-text parts (§4.1 step 2).
    pub fn derived_token(&self) -> String {
        let mt = self.main_type();
        let (type_, subtype) = mt.split_once('/').unwrap_or((mt, "unknown"));
        format!(
            "CT_{}_{}",
            sanitize_for_token(type_),
            sanitize_for_token(subtype)
        )
    }
}

fn sanitize_for_token(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// A parsed RFC-822 message: case-insensitive headers, a decoded body, and a
/// stable content digest (§3).
#[derive(Debug, Clone)]
pub struct Message {
    headers: HashMap<String, String>,
    header_order: Vec<(String, String)>,
    pub body: String,
    pub parts: Vec<MimePart>,
    pub digest: String,
}

impl Message {
    /// Parse a raw RFC-822 message from bytes. Non-UTF8 bytes are replaced
    /// (lossy) rather than failing the parse — truncated/garbled messages
    /// still degrade gracefully per §7.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(raw).into_owned();
        Self::from_str(&text)
    }

    pub fn from_str(raw: &str) -> Result<Self> {
        let (header_block, body_block) = split_headers_body(raw);
        let (headers, header_order) = parse_headers(header_block)?;

        let content_type = headers
            .get("content-type")
            .cloned()
            .unwrap_or_else(|| "text/plain".to_string());

        let parts = walk_mime(&content_type, body_block);
        let body = parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");

        let digest = compute_digest(
            headers.get("from").map(String::as_str).unwrap_or(""),
            headers.get("subject").map(String::as_str).unwrap_or(""),
            &body,
        );

        Ok(Message {
            headers,
            header_order,
            body,
            parts,
            digest,
        })
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn header_or(&self, name: &str, default: &str) -> String {
        self.get_header(name).unwrap_or(default).to_string()
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(&name.to_ascii_lowercase())
    }

    /// Headers in the order they were first encountered, original casing
    /// preserved — used by the tokenizer's `Received` chain pass.
    pub fn headers_in_order(&self) -> &[(String, String)] {
        &self.header_order
    }
}

/// §3: digest over `From\nSubject\nBody`, trailing whitespace trimmed,
/// lowercase 32-hex MD5.
fn compute_digest(from: &str, subject: &str, body: &str) -> String {
    let canonical = format!("{}\n{}\n{}", from.trim_end(), subject.trim_end(), body.trim_end());
    format!("{:x}", md5::compute(canonical.as_bytes()))
}

fn split_headers_body(raw: &str) -> (&str, &str) {
    // A blank line (possibly with trailing \r) separates headers from body.
    if let Some(idx) = raw.find("\n\n") {
        return (&raw[..idx], &raw[idx + 2..]);
    }
    if let Some(idx) = raw.find("\r\n\r\n") {
        return (&raw[..idx], &raw[idx + 4..]);
    }
    (raw, "")
}

fn parse_headers(block: &str) -> Result<(HashMap<String, String>, Vec<(String, String)>)> {
    let mut headers = HashMap::new();
    let mut order = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in block.lines() {
        if line.starts_with([' ', '\t']) {
            // Folded continuation of the previous header.
            if let Some((_, val)) = current.as_mut() {
                val.push(' ');
                val.push_str(line.trim());
            }
            continue;
        }

        if let Some((name, val)) = current.take() {
            order.push((name.clone(), val.clone()));
            headers.insert(name.to_ascii_lowercase(), val);
        }

        let Some((name, val)) = line.split_once(':') else {
            // Not a header line and not a continuation: ignore, matching the
            // "tokenizer failures on a sub-part degrade, never abort" policy.
            continue;
        };
        current = Some((name.trim().to_string(), val.trim().to_string()));
    }

    if let Some((name, val)) = current.take() {
        order.push((name.clone(), val.clone()));
        headers.insert(name.to_ascii_lowercase(), val);
    }

    Ok((headers, order))
}

fn extract_boundary(content_type: &str) -> Option<String> {
    for segment in content_type.split(';').skip(1) {
        let segment = segment.trim();
        if let Some(rest) = segment.strip_prefix("boundary=") {
            let rest = rest.trim_matches('"');
            return Some(rest.to_string());
        }
    }
    None
}

fn walk_mime(content_type: &str, body: &str) -> Vec<MimePart> {
    let main_type = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();

    if main_type.starts_with("multipart/") {
        if let Some(boundary) = extract_boundary(content_type) {
            return walk_multipart(&boundary, body);
        }
        // Malformed boundary: degrade to a single plain-text part rather
        // than aborting the whole parse (§7 tokenizer degradation policy).
        return vec![MimePart {
            content_type: "text/plain".to_string(),
            text: Some(body.to_string()),
        }];
    }

    single_part(content_type, body)
}

fn single_part(content_type: &str, body: &str) -> Vec<MimePart> {
    let main_type = content_type.split(';').next().unwrap_or("text/plain").trim().to_ascii_lowercase();
    if main_type.starts_with("text/") || main_type.is_empty() {
        vec![MimePart {
            content_type: if content_type.is_empty() { "text/plain".to_string() } else { content_type.to_string() },
            text: Some(body.to_string()),
        }]
    } else {
        vec![MimePart {
            content_type: content_type.to_string(),
            text: None,
        }]
    }
}

fn walk_multipart(boundary: &str, body: &str) -> Vec<MimePart> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();

    for chunk in body.split(&delimiter as &str) {
        let chunk = chunk.trim_start_matches(['\r', '\n']);
        if chunk.is_empty() || chunk.starts_with("--") {
            continue;
        }
        let (sub_headers, sub_body) = split_headers_body(chunk);
        let Ok((headers, _)) = parse_headers(sub_headers) else { continue };
        let sub_content_type = headers
            .get("content-type")
            .cloned()
            .unwrap_or_else(|| "text/plain".to_string());

        let sub_main_type = sub_content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        if sub_main_type.starts_with("multipart/") {
            if let Some(nested_boundary) = extract_boundary(&sub_content_type) {
                parts.extend(walk_multipart(&nested_boundary, sub_body));
                continue;
            }
        }
        parts.extend(single_part(&sub_content_type, sub_body));
    }

    if parts.is_empty() {
        // No parseable subpart delimiters found: treat the whole body as
        // plain text rather than silently dropping the message content.
        parts.push(MimePart {
            content_type: "text/plain".to_string(),
            text: Some(body.to_string()),
        });
    }

    parts
}
