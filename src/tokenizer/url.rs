//! URL detection and decomposition (§4.1 step 4).

const MAX_URL_TOKEN_LEN: usize = 120;

pub struct UrlParts {
    pub full: String,
    pub host: String,
    pub path_segments: Vec<String>,
    pub query_names: Vec<String>,
}

fn is_url_like(chunk: &str) -> bool {
    let lower = chunk.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("ftp://") {
        return true;
    }
    if let Some(rest) = lower.strip_prefix("www.") {
        // Heuristic: a dotted host follows, e.g. "www.test.org".
        return rest.contains('.') && rest.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    }
    false
}

fn trim_trailing_punctuation(s: &str) -> &str {
    s.trim_end_matches(|c: char| matches!(c, '.' | ',' | '!' | '?' | ')' | ']' | '"' | '\''))
}

fn parse(url: &str) -> UrlParts {
    let full = if url.len() > MAX_URL_TOKEN_LEN {
        url[..MAX_URL_TOKEN_LEN].to_string()
    } else {
        url.to_string()
    };

    let without_scheme = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .or_else(|| url.strip_prefix("ftp://"))
        .unwrap_or(url);

    let host_end = without_scheme
        .find(['/', '?', '#'])
        .unwrap_or(without_scheme.len());
    let mut host = without_scheme[..host_end].to_ascii_lowercase();
    if let Some(colon) = host.find(':') {
        host.truncate(colon);
    }

    let remainder = &without_scheme[host_end..];
    let (path_and_query, _fragment) = match remainder.find('#') {
        Some(idx) => (&remainder[..idx], &remainder[idx..]),
        None => (remainder, ""),
    };
    let (path, query) = match path_and_query.find('?') {
        Some(idx) => (&path_and_query[..idx], &path_and_query[idx + 1..]),
        None => (path_and_query, ""),
    };

    let path_segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
        .collect();

    let query_names: Vec<String> = query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|kv| kv.split('=').next().unwrap_or(kv).to_ascii_lowercase())
        .collect();

    UrlParts {
        full,
        host,
        path_segments,
        query_names,
    }
}

/// Scan whitespace-separated `text`, pulling out URL-like chunks. Returns
/// the leftover text (URLs replaced by a single space, so general word
/// extraction doesn't re-split them) plus the parsed URL parts found, in
/// encounter order.
pub fn extract_urls(text: &str) -> (String, Vec<UrlParts>) {
    let mut leftover = String::with_capacity(text.len());
    let mut urls = Vec::new();

    for chunk in text.split_whitespace() {
        let trimmed = trim_trailing_punctuation(chunk);
        if is_url_like(trimmed) {
            urls.push(parse(trimmed));
            leftover.push(' ');
        } else {
            leftover.push_str(chunk);
            leftover.push(' ');
        }
    }

    (leftover, urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_scheme_and_www_urls() {
        let (_, urls) = extract_urls("Visit http://example.com/a/b?x=1 or www.test.org for more info.");
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].host, "example.com");
        assert_eq!(urls[0].path_segments, vec!["a", "b"]);
        assert_eq!(urls[0].query_names, vec!["x"]);
        assert_eq!(urls[1].host, "test.org");
    }

    #[test]
    fn leftover_text_excludes_urls() {
        let (leftover, _) = extract_urls("see http://example.com now");
        assert!(!leftover.contains("http"));
        assert!(leftover.contains("see"));
        assert!(leftover.contains("now"));
    }
}
