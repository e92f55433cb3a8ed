//! Case normalization, word splitting, and phrase n-gram generation
//! (§4.1 steps 3 and 5).

/// Lowercase ASCII; replace any non-ASCII `char` with `replace_non_ascii`
/// (spec: non-ASCII bytes \u{2265} 0x80 are replaced before lowercasing).
fn normalize_case(text: &str, replace_non_ascii: char) -> String {
    text.chars()
        .map(|c| if c.is_ascii() { c.to_ascii_lowercase() } else { replace_non_ascii })
        .collect()
}

/// Split on punctuation/whitespace, keeping `.`, `-`, `@` when they sit
/// between two alphanumerics (numbers, hyphenated words, email addresses).
fn split_words(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for i in 0..chars.len() {
        let c = chars[i];
        let is_glue = matches!(c, '.' | '-' | '@');
        let keep = c.is_ascii_alphanumeric()
            || (is_glue
                && i > 0
                && i + 1 < chars.len()
                && chars[i - 1].is_ascii_alphanumeric()
                && chars[i + 1].is_ascii_alphanumeric());

        if keep {
            current.push(c);
        } else if !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Normalize case, split into words, and keep only those within
/// `[min_len, max_len]`.
pub fn extract_words(text: &str, replace_non_ascii: char, min_len: usize, max_len: usize) -> Vec<String> {
    let normalized = normalize_case(text, replace_non_ascii);
    split_words(&normalized)
        .into_iter()
        .filter(|w| w.len() >= min_len && w.len() <= max_len)
        .collect()
}

/// Contiguous n-grams of `words` for `n` in `[min_n, max_n]`, joined with a
/// single space (§4.1 step 5, §8 scenario 6). `min_n` is honored literally:
/// a `min_n` of 1 emits single-word n-grams as PHRASE-tagged tokens
/// alongside the longer ones, exactly as configured.
pub fn phrases(words: &[String], min_n: usize, max_n: usize) -> Vec<String> {
    let mut out = Vec::new();
    if words.is_empty() {
        return out;
    }
    for n in min_n..=max_n {
        if n == 0 || n > words.len() {
            continue;
        }
        for window in words.windows(n) {
            out.push(window.join(" "));
        }
    }
    out
}
