//! Turns a [`Message`](crate::message::Message) into a finite, ordered
//! stream of [`Token`]s (§2, §4.1).

mod html;
mod url;
mod words;

use crate::error::{MailProbeError, Result};
use crate::message::Message;

pub const FLAG_WORD: u8 = 1 << 0;
pub const FLAG_PHRASE: u8 = 1 << 1;
pub const FLAG_HEADER: u8 = 1 << 2;
pub const FLAG_BODY: u8 = 1 << 3;
pub const FLAG_URL: u8 = 1 << 4;
pub const FLAG_DERIVED: u8 = 1 << 5;

/// A term emitted by the tokenizer (§3 "Token").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub flags: u8,
    pub prefix: Option<String>,
}

impl Token {
    pub fn new(text: impl Into<String>, flags: u8, prefix: Option<String>) -> Self {
        Token { text: text.into(), flags, prefix }
    }

    pub fn is_phrase(&self) -> bool {
        self.flags & FLAG_PHRASE != 0
    }

    pub fn is_header(&self) -> bool {
        self.flags & FLAG_HEADER != 0
    }

    pub fn is_url(&self) -> bool {
        self.flags & FLAG_URL != 0
    }

    pub fn is_derived(&self) -> bool {
        self.flags & FLAG_DERIVED != 0
    }

    /// The term's storage identity: `prefix + "_" + text`, or bare `text`.
    pub fn key(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}_{}", self.text),
            None => self.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMode {
    Normal,
    Plain,
    All,
}

impl Default for HeaderMode {
    fn default() -> Self {
        HeaderMode::Normal
    }
}

/// Headers tokenized in `normal` mode (§4.1 step 1). Canonical names are
/// used verbatim as the `H`-prefixed token prefix.
const NORMAL_HEADERS: &[&str] = &["from", "to", "cc", "subject", "received", "content-type", "x-mailer", "message-id"];

fn canonical_name_for(lower: &str) -> String {
    match lower {
        "from" => "From".to_string(),
        "to" => "To".to_string(),
        "cc" => "Cc".to_string(),
        "subject" => "Subject".to_string(),
        "received" => "Received".to_string(),
        "content-type" => "Content-Type".to_string(),
        "x-mailer" => "X-Mailer".to_string(),
        "message-id" => "Message-ID".to_string(),
        other => other
            .split('-')
            .map(title_case)
            .collect::<Vec<_>>()
            .join("-"),
    }
}

fn title_case(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
        None => String::new(),
    }
}

#[derive(Debug, Clone)]
pub struct TokenizerConfig {
    pub max_phrase_terms: usize,
    pub min_phrase_terms: usize,
    pub min_term_length: usize,
    pub max_term_length: usize,
    pub remove_html: bool,
    pub ignore_body: bool,
    pub replace_non_ascii: char,
    pub process_headers: bool,
    pub header_mode: HeaderMode,
    pub custom_headers: Vec<String>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        TokenizerConfig {
            max_phrase_terms: 2,
            min_phrase_terms: 1,
            min_term_length: 3,
            max_term_length: 40,
            remove_html: true,
            ignore_body: false,
            replace_non_ascii: 'z',
            process_headers: true,
            header_mode: HeaderMode::Normal,
            custom_headers: Vec::new(),
        }
    }
}

impl TokenizerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=5).contains(&self.max_phrase_terms) {
            return Err(MailProbeError::ConfigInvalid(format!(
                "max_phrase_terms {} out of range [1..5]",
                self.max_phrase_terms
            )));
        }
        if self.min_phrase_terms < 1 || self.min_phrase_terms > self.max_phrase_terms {
            return Err(MailProbeError::ConfigInvalid(format!(
                "min_phrase_terms {} out of range [1..{}]",
                self.min_phrase_terms, self.max_phrase_terms
            )));
        }
        if self.min_term_length == 0 || self.min_term_length > self.max_term_length {
            return Err(MailProbeError::ConfigInvalid(
                "min_term_length must be >= 1 and <= max_term_length".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct Tokenizer {
    config: TokenizerConfig,
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Tokenizer { config })
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    pub fn tokenize_message(&self, message: &Message) -> Vec<Token> {
        let mut tokens = Vec::new();

        if self.config.process_headers {
            self.tokenize_headers(message, &mut tokens);
        }
        if !self.config.ignore_body {
            self.tokenize_body(message, &mut tokens);
        }

        tokens
    }

    fn headers_to_process<'m>(&self, message: &'m Message) -> Vec<(String, &'m str)> {
        match self.config.header_mode {
            HeaderMode::Normal => NORMAL_HEADERS
                .iter()
                .filter_map(|name| message.get_header(name).map(|v| (canonical_name_for(name), v)))
                .collect(),
            HeaderMode::Plain => {
                let mut names: Vec<String> = NORMAL_HEADERS.iter().map(|s| s.to_string()).collect();
                names.extend(self.config.custom_headers.iter().map(|s| s.to_ascii_lowercase()));
                names.dedup();
                names
                    .into_iter()
                    .filter_map(|name| message.get_header(&name).map(|v| (canonical_name_for(&name), v)))
                    .collect()
            }
            HeaderMode::All => message
                .headers_in_order()
                .iter()
                .map(|(name, val)| (canonical_name_for(&name.to_ascii_lowercase()), val.as_str()))
                .collect(),
        }
    }

    fn tokenize_headers(&self, message: &Message, tokens: &mut Vec<Token>) {
        for (canonical, value) in self.headers_to_process(message) {
            let prefix = format!("H{canonical}");
            self.tokenize_section(value, FLAG_HEADER, Some(prefix.clone()), tokens);

            if canonical == "Received" {
                for fragment in received_host_fragments(value) {
                    tokens.push(Token::new(fragment, FLAG_HEADER | FLAG_DERIVED, Some("RCVD".to_string())));
                }
            }
        }
    }

    fn tokenize_body(&self, message: &Message, tokens: &mut Vec<Token>) {
        for part in &message.parts {
            match &part.text {
                Some(text) => {
                    let is_html = part.content_type.to_ascii_lowercase().contains("text/html");
                    let processed = if self.config.remove_html && (is_html || html::looks_like_html(text)) {
                        html::strip_html(text)
                    } else {
                        text.clone()
                    };
                    self.tokenize_section(&processed, FLAG_BODY, None, tokens);
                }
                None => {
                    tokens.push(Token::new(part.derived_token(), FLAG_BODY | FLAG_DERIVED, None));
                }
            }
        }
    }

    /// Run URL detection, word extraction and phrase generation over one
    /// header value or body text section, appending to `tokens`.
    fn tokenize_section(&self, text: &str, section_flag: u8, prefix: Option<String>, tokens: &mut Vec<Token>) {
        let (leftover, urls) = url::extract_urls(text);

        for u in urls {
            tokens.push(Token::new(u.full, FLAG_URL, Some("URL".to_string())));
            tokens.push(Token::new(u.host.clone(), FLAG_WORD | FLAG_URL, Some("URL".to_string())));
            for seg in &u.path_segments {
                if seg.len() >= self.config.min_term_length && seg.len() <= self.config.max_term_length {
                    tokens.push(Token::new(seg.clone(), FLAG_WORD | FLAG_URL, Some("URL".to_string())));
                }
            }
            for name in &u.query_names {
                if name.len() >= self.config.min_term_length && name.len() <= self.config.max_term_length {
                    tokens.push(Token::new(name.clone(), FLAG_WORD | FLAG_URL, Some("URL".to_string())));
                }
            }
        }

        let words = words::extract_words(
            &leftover,
            self.config.replace_non_ascii,
            self.config.min_term_length,
            self.config.max_term_length,
        );

        for w in &words {
            tokens.push(Token::new(w.clone(), FLAG_WORD | section_flag, prefix.clone()));
        }

        for phrase in words::phrases(&words, self.config.min_phrase_terms, self.config.max_phrase_terms) {
            tokens.push(Token::new(phrase, FLAG_PHRASE | section_flag, prefix.clone()));
        }
    }
}

/// Extract host/IP-looking fragments from a `Received:` header value for the
/// DERIVED token emission in §4.1 step 1.
fn received_host_fragments(value: &str) -> Vec<String> {
    value
        .split(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | ';'))
        .filter(|frag| !frag.is_empty())
        .filter(|frag| frag.contains('.') && frag.chars().any(|c| c.is_ascii_alphanumeric()))
        .filter(|frag| frag.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-')))
        .map(|frag| frag.trim_matches('.').to_ascii_lowercase())
        .filter(|frag| !frag.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(raw: &str) -> Message {
        Message::from_str(raw).unwrap()
    }

    #[test]
    fn basic_tokenization_includes_header_and_body_words() {
        let tk = Tokenizer::new(TokenizerConfig::default()).unwrap();
        let m = msg("From: test@example.com\nTo: user@example.com\nSubject: Test message\n\nThis is a test message with some words.\n");
        let tokens = tk.tokenize_message(&m);
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert!(texts.contains(&"test"));
        assert!(texts.contains(&"message"));
        assert!(texts.contains(&"some"));
    }

    #[test]
    fn header_tokens_carry_expected_prefixes() {
        let tk = Tokenizer::new(TokenizerConfig::default()).unwrap();
        let m = msg("From: sender@example.com\nSubject: Important message\n\nBody content here.\n");
        let tokens = tk.tokenize_message(&m);
        let prefixes: Vec<&str> = tokens.iter().filter(|t| t.is_header()).filter_map(|t| t.prefix.as_deref()).collect();
        assert!(prefixes.contains(&"HFrom"));
        assert!(prefixes.contains(&"HSubject"));
    }

    #[test]
    fn phrase_generation_matches_concrete_scenario() {
        let cfg = TokenizerConfig { max_phrase_terms: 2, min_term_length: 3, ..TokenizerConfig::default() };
        let tk = Tokenizer::new(cfg).unwrap();
        let m = msg("Subject: Free money offer\n\nGet free money now!\n");
        let tokens = tk.tokenize_message(&m);
        let phrase_texts: Vec<&str> = tokens.iter().filter(|t| t.is_phrase()).map(|t| t.text.as_str()).collect();
        assert!(phrase_texts.iter().any(|p| *p == "free money"));
    }

    #[test]
    fn html_is_stripped_before_word_extraction() {
        let tk = Tokenizer::new(TokenizerConfig::default()).unwrap();
        let m = msg("Subject: HTML message\n\n<html><body>\n<p>This is <b>bold</b> text.</p>\n<a href=\"http://example.com\">Link</a>\n</body></html>\n");
        let tokens = tk.tokenize_message(&m);
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert!(!texts.contains(&"<html>"));
        assert!(texts.contains(&"bold"));
        assert!(texts.contains(&"this"));
    }

    #[test]
    fn url_components_are_emitted() {
        let tk = Tokenizer::new(TokenizerConfig::default()).unwrap();
        let m = msg("Subject: URLs\n\nVisit http://example.com or www.test.org for more info.\n");
        let tokens = tk.tokenize_message(&m);
        let url_texts: Vec<&str> = tokens.iter().filter(|t| t.is_url()).map(|t| t.text.as_str()).collect();
        assert!(url_texts.contains(&"example.com") || url_texts.contains(&"test.org"));
    }

    #[test]
    fn term_length_filtering_applies_to_words() {
        let cfg = TokenizerConfig { min_term_length: 5, max_term_length: 10, ..TokenizerConfig::default() };
        let tk = Tokenizer::new(cfg).unwrap();
        let m = msg("Subject: Test\n\na bb ccc dddd eeeee ffffff ggggggg hhhhhhhh iiiiiiiii jjjjjjjjjj kkkkkkkkkkk\n");
        let tokens = tk.tokenize_message(&m);
        for t in tokens.iter().filter(|t| !t.is_phrase() && !t.is_header() && !t.is_url()) {
            assert!(t.text.len() >= 5 && t.text.len() <= 10);
        }
    }

    #[test]
    fn ignore_body_skips_body_tokens() {
        let cfg = TokenizerConfig { ignore_body: true, ..TokenizerConfig::default() };
        let tk = Tokenizer::new(cfg).unwrap();
        let m = msg("Subject: Header only\n\nThis body content should be ignored.\n");
        let tokens = tk.tokenize_message(&m);
        assert!(tokens.iter().all(|t| t.flags & FLAG_BODY == 0));
        assert!(tokens.iter().any(|t| t.is_header()));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = TokenizerConfig { max_phrase_terms: 0, ..TokenizerConfig::default() };
        assert!(Tokenizer::new(cfg).is_err());
    }

    #[test]
    fn token_key_generation() {
        let with_prefix = Token::new("word", FLAG_WORD, Some("HSubject".to_string()));
        assert_eq!(with_prefix.key(), "HSubject_word");
        let without_prefix = Token::new("word", FLAG_WORD, None);
        assert_eq!(without_prefix.key(), "word");
    }
}
