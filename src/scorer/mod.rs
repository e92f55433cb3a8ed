//! Per-term probability and message scoring (§4.3).

use std::collections::HashMap;

use crate::error::{MailProbeError, Result};
use crate::message::Message;
use crate::store::{TermRecord, TermStore};
use crate::tokenizer::{Token, Tokenizer};

const MIN_PROB: f64 = 0.01;
const MAX_PROB: f64 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMode {
    Normal,
    Graham,
    Robinson,
}

impl Default for ScoringMode {
    fn default() -> Self {
        ScoringMode::Normal
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScorerConfig {
    pub spam_threshold: f64,
    pub min_word_count: u64,
    pub new_word_score: f64,
    pub terms_for_score: usize,
    pub max_word_repeats: u64,
    pub extend_top_terms: bool,
    pub min_distance_for_score: f64,
    pub scoring_mode: ScoringMode,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        ScorerConfig {
            spam_threshold: 0.9,
            min_word_count: 5,
            new_word_score: 0.4,
            terms_for_score: 15,
            max_word_repeats: 2,
            extend_top_terms: false,
            min_distance_for_score: 0.1,
            scoring_mode: ScoringMode::Normal,
        }
    }
}

impl ScorerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.spam_threshold) {
            return Err(MailProbeError::ConfigInvalid("spam_threshold must be in [0,1]".to_string()));
        }
        if !(0.0..=1.0).contains(&self.new_word_score) {
            return Err(MailProbeError::ConfigInvalid("new_word_score must be in [0,1]".to_string()));
        }
        if self.terms_for_score == 0 {
            return Err(MailProbeError::ConfigInvalid("terms_for_score must be > 0".to_string()));
        }
        if self.max_word_repeats == 0 {
            return Err(MailProbeError::ConfigInvalid("max_word_repeats must be > 0".to_string()));
        }
        if !(0.0..=0.5).contains(&self.min_distance_for_score) {
            return Err(MailProbeError::ConfigInvalid("min_distance_for_score must be in [0,0.5]".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Score {
    pub probability: f64,
    pub is_spam: bool,
    pub confidence: f64,
    pub terms_used: usize,
    pub top_terms: Vec<(String, f64)>,
}

/// Per-term probability (§4.3): unobserved-enough terms fall back to the
/// prior; otherwise the raw frequency ratio is normalized for corpus
/// imbalance and clamped away from 0/1 so no single term can dominate.
pub fn term_probability(record: Option<TermRecord>, good_total: u64, spam_total: u64, config: &ScorerConfig) -> f64 {
    let (good, spam) = match record {
        Some(r) => (r.good_count, r.spam_count),
        None => (0, 0),
    };
    if good + spam < config.min_word_count {
        return config.new_word_score;
    }
    let s_rate = spam as f64 / (spam_total.max(1) as f64);
    let g_rate = good as f64 / (good_total.max(1) as f64);
    let denom = s_rate + g_rate;
    let p_raw = if denom == 0.0 { config.new_word_score } else { s_rate / denom };
    p_raw.clamp(MIN_PROB, MAX_PROB)
}

pub struct Scorer<'a> {
    store: &'a TermStore,
    config: ScorerConfig,
}

impl<'a> Scorer<'a> {
    pub fn new(store: &'a TermStore, config: ScorerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Scorer { store, config })
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Count per-key occurrences in `tokens`, clamped to `max_word_repeats`
    /// (§4.3 step 1, shared with the trainer's delta computation).
    pub fn clamped_counts(&self, tokens: &[Token]) -> HashMap<String, u64> {
        clamped_counts(tokens, self.config.max_word_repeats)
    }

    /// Tokenize and score a message in one step.
    pub fn score_message(&self, message: &Message, tokenizer: &Tokenizer) -> Result<Score> {
        let tokens = tokenizer.tokenize_message(message);
        self.score_tokens(&tokens)
    }

    /// Score a pre-tokenized message (§4.3 steps 2-5).
    pub fn score_tokens(&self, tokens: &[Token]) -> Result<Score> {
        let counts = self.clamped_counts(tokens);
        let (good_total, spam_total) = self.store.globals()?;

        let mut candidates: Vec<(String, f64, u64)> = Vec::with_capacity(counts.len());
        let mut any_known = false;
        for (key, count) in &counts {
            let record = self.store.get(key)?;
            if record.is_some_and(|r| r.total_count() > 0) {
                any_known = true;
            }
            let p = term_probability(record, good_total, spam_total, &self.config);
            let distance = (p - 0.5).abs();
            // Non-strict: a term sitting exactly at the threshold (e.g. an
            // under-observed term scoring at `new_word_score`, which by
            // construction sits `min_distance_for_score` away from 0.5 under
            // the default configuration) carries no more information than
            // the prior and is dropped, matching spec.md §8 scenario 1.
            if distance <= self.config.min_distance_for_score {
                continue;
            }
            candidates.push((key.clone(), p, *count));
        }

        candidates.sort_by(|a, b| {
            let da = (a.1 - 0.5).abs();
            let db = (b.1 - 0.5).abs();
            db.partial_cmp(&da).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0))
        });

        let selected = select_top(&candidates, self.config.terms_for_score, self.config.extend_top_terms);

        // No informative terms survived selection and none of the message's
        // terms were even known to the store: there is no evidence at all,
        // so fall back to the prior rather than a content-free 0.5 (§8
        // scenario 1). When terms WERE known but turned out uninformative
        // (e.g. a perfectly balanced corpus), 0.5 — what the combination
        // functions already return on empty input — is the right neutral
        // result.
        if selected.is_empty() && !any_known {
            return Ok(Score {
                probability: self.config.new_word_score,
                is_spam: self.config.new_word_score >= self.config.spam_threshold,
                confidence: 0.0,
                terms_used: 0,
                top_terms: Vec::new(),
            });
        }

        let mut expanded_probs: Vec<f64> = Vec::new();
        let mut top_terms: Vec<(String, f64)> = Vec::with_capacity(selected.len());
        for (key, p, count) in &selected {
            top_terms.push((key.clone(), *p));
            for _ in 0..*count {
                expanded_probs.push(*p);
            }
        }

        let probability = match self.config.scoring_mode {
            ScoringMode::Normal | ScoringMode::Graham => combine_bayesian(&expanded_probs),
            ScoringMode::Robinson => combine_robinson(&expanded_probs),
        };

        let confidence = top_terms.iter().map(|(_, p)| (p - 0.5).abs() * 2.0).fold(0.0_f64, f64::max);

        Ok(Score {
            probability,
            is_spam: probability >= self.config.spam_threshold,
            confidence,
            terms_used: top_terms.len(),
            top_terms,
        })
    }
}

/// Take the top `limit` candidates (already sorted by descending distance
/// from 0.5, ties broken lexicographically); when `extend` is set, also take
/// any candidates tied in distance with the last selected one (§4.3 step 3,
/// §9 tie-break resolution).
fn select_top(candidates: &[(String, f64, u64)], limit: usize, extend: bool) -> Vec<(String, f64, u64)> {
    if candidates.len() <= limit {
        return candidates.to_vec();
    }
    let mut end = limit;
    if extend {
        let boundary_distance = (candidates[limit - 1].1 - 0.5).abs();
        while end < candidates.len() && (candidates[end].1 - 0.5).abs() == boundary_distance {
            end += 1;
        }
    }
    candidates[..end].to_vec()
}

fn combine_bayesian(probs: &[f64]) -> f64 {
    if probs.is_empty() {
        return 0.5;
    }
    let log_p: f64 = probs.iter().map(|p| p.ln()).sum();
    let log_q: f64 = probs.iter().map(|p| (1.0 - p).ln()).sum();
    let m = log_p.max(log_q);
    let p_exp = (log_p - m).exp();
    let q_exp = (log_q - m).exp();
    p_exp / (p_exp + q_exp)
}

/// Fisher's combined probability test (§4.3 step 4 `robinson`): combines
/// `-2 * sum(ln(p_i))` and `-2 * sum(ln(1-p_i))` as chi-square statistics
/// with `2n` degrees of freedom.
fn combine_robinson(probs: &[f64]) -> f64 {
    let n = probs.len();
    if n == 0 {
        return 0.5;
    }
    let chi_h: f64 = -2.0 * probs.iter().map(|p| p.ln()).sum::<f64>();
    let chi_s: f64 = -2.0 * probs.iter().map(|p| (1.0 - p).ln()).sum::<f64>();
    let h = chi_square_survival(chi_h, 2 * n);
    let s = chi_square_survival(chi_s, 2 * n);
    ((1.0 + h - s) / 2.0).clamp(0.0, 1.0)
}

/// Survival function (upper tail) of the chi-square distribution with an
/// even number of degrees of freedom, which has the closed form
/// `exp(-x/2) * sum_{i=0}^{k-1} (x/2)^i / i!` for `df = 2k`.
fn chi_square_survival(x: f64, df: usize) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    let k = (df / 2).max(1);
    let half_x = x / 2.0;
    let mut term = (-half_x).exp();
    let mut sum = term;
    for i in 1..k {
        term *= half_x / i as f64;
        sum += term;
    }
    sum.clamp(0.0, 1.0)
}

fn clamped_counts(tokens: &[Token], max_repeats: u64) -> HashMap<String, u64> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for token in tokens {
        let entry = counts.entry(token.key()).or_insert(0);
        if *entry < max_repeats {
            *entry += 1;
        }
    }
    counts
}
