//! Flat, serializable configuration records for the tokenizer, store, and
//! scorer, plus named presets and a JSON-backed `ConfigManager` (§6).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MailProbeError, Result};
use crate::scorer::{ScorerConfig, ScoringMode};
use crate::store::TermStoreConfig;
use crate::tokenizer::{HeaderMode, TokenizerConfig};

/// Schema version for the persisted `meta.json` mirror (§6 "Persisted state
/// layout"); bump when the on-disk record shape changes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TokenizerSection {
    max_phrase_terms: usize,
    min_phrase_terms: usize,
    min_term_length: usize,
    max_term_length: usize,
    remove_html: bool,
    ignore_body: bool,
    replace_non_ascii: char,
    process_headers: bool,
    header_mode: HeaderModeSerde,
    custom_headers: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum HeaderModeSerde {
    Normal,
    Plain,
    All,
}

impl From<HeaderMode> for HeaderModeSerde {
    fn from(m: HeaderMode) -> Self {
        match m {
            HeaderMode::Normal => HeaderModeSerde::Normal,
            HeaderMode::Plain => HeaderModeSerde::Plain,
            HeaderMode::All => HeaderModeSerde::All,
        }
    }
}

impl From<HeaderModeSerde> for HeaderMode {
    fn from(m: HeaderModeSerde) -> Self {
        match m {
            HeaderModeSerde::Normal => HeaderMode::Normal,
            HeaderModeSerde::Plain => HeaderMode::Plain,
            HeaderModeSerde::All => HeaderMode::All,
        }
    }
}

impl From<&TokenizerConfig> for TokenizerSection {
    fn from(c: &TokenizerConfig) -> Self {
        TokenizerSection {
            max_phrase_terms: c.max_phrase_terms,
            min_phrase_terms: c.min_phrase_terms,
            min_term_length: c.min_term_length,
            max_term_length: c.max_term_length,
            remove_html: c.remove_html,
            ignore_body: c.ignore_body,
            replace_non_ascii: c.replace_non_ascii,
            process_headers: c.process_headers,
            header_mode: c.header_mode.into(),
            custom_headers: c.custom_headers.clone(),
        }
    }
}

impl From<TokenizerSection> for TokenizerConfig {
    fn from(s: TokenizerSection) -> Self {
        TokenizerConfig {
            max_phrase_terms: s.max_phrase_terms,
            min_phrase_terms: s.min_phrase_terms,
            min_term_length: s.min_term_length,
            max_term_length: s.max_term_length,
            remove_html: s.remove_html,
            ignore_body: s.ignore_body,
            replace_non_ascii: s.replace_non_ascii,
            process_headers: s.process_headers,
            header_mode: s.header_mode.into(),
            custom_headers: s.custom_headers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoreSection {
    cache_size: usize,
}

impl From<&TermStoreConfig> for StoreSection {
    fn from(c: &TermStoreConfig) -> Self {
        StoreSection { cache_size: c.cache_size }
    }
}

impl From<StoreSection> for TermStoreConfig {
    fn from(s: StoreSection) -> Self {
        TermStoreConfig { cache_size: s.cache_size }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScorerSection {
    spam_threshold: f64,
    min_word_count: u64,
    new_word_score: f64,
    terms_for_score: usize,
    max_word_repeats: u64,
    extend_top_terms: bool,
    min_distance_for_score: f64,
    scoring_mode: ScoringModeSerde,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ScoringModeSerde {
    Normal,
    Graham,
    Robinson,
}

impl From<ScoringMode> for ScoringModeSerde {
    fn from(m: ScoringMode) -> Self {
        match m {
            ScoringMode::Normal => ScoringModeSerde::Normal,
            ScoringMode::Graham => ScoringModeSerde::Graham,
            ScoringMode::Robinson => ScoringModeSerde::Robinson,
        }
    }
}

impl From<ScoringModeSerde> for ScoringMode {
    fn from(m: ScoringModeSerde) -> Self {
        match m {
            ScoringModeSerde::Normal => ScoringMode::Normal,
            ScoringModeSerde::Graham => ScoringMode::Graham,
            ScoringModeSerde::Robinson => ScoringMode::Robinson,
        }
    }
}

impl From<&ScorerConfig> for ScorerSection {
    fn from(c: &ScorerConfig) -> Self {
        ScorerSection {
            spam_threshold: c.spam_threshold,
            min_word_count: c.min_word_count,
            new_word_score: c.new_word_score,
            terms_for_score: c.terms_for_score,
            max_word_repeats: c.max_word_repeats,
            extend_top_terms: c.extend_top_terms,
            min_distance_for_score: c.min_distance_for_score,
            scoring_mode: c.scoring_mode.into(),
        }
    }
}

impl From<ScorerSection> for ScorerConfig {
    fn from(s: ScorerSection) -> Self {
        ScorerConfig {
            spam_threshold: s.spam_threshold,
            min_word_count: s.min_word_count,
            new_word_score: s.new_word_score,
            terms_for_score: s.terms_for_score,
            max_word_repeats: s.max_word_repeats,
            extend_top_terms: s.extend_top_terms,
            min_distance_for_score: s.min_distance_for_score,
            scoring_mode: s.scoring_mode.into(),
        }
    }
}

/// The public configuration surface: three flat records, serialized as one
/// JSON document (§6 "Configuration surface").
#[derive(Debug, Clone)]
pub struct MailProbeConfig {
    pub tokenizer: TokenizerConfig,
    pub store: TermStoreConfig,
    pub scorer: ScorerConfig,
}

impl Default for MailProbeConfig {
    fn default() -> Self {
        MailProbeConfig {
            tokenizer: TokenizerConfig::default(),
            store: TermStoreConfig::default(),
            scorer: ScorerConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigDocument {
    schema_version: u32,
    tokenizer: TokenizerSection,
    store: StoreSection,
    scorer: ScorerSection,
}

impl MailProbeConfig {
    pub fn validate(&self) -> Result<()> {
        self.tokenizer.validate()?;
        self.store.validate()?;
        self.scorer.validate()?;
        Ok(())
    }

    /// §6 preset: Paul Graham's original weighting scheme.
    pub fn preset_graham() -> Self {
        let mut config = MailProbeConfig::default();
        config.tokenizer.max_phrase_terms = 1;
        config.tokenizer.min_phrase_terms = 1;
        config.tokenizer.remove_html = false;
        config.scorer.terms_for_score = 15;
        config.scorer.max_word_repeats = 1;
        config.scorer.scoring_mode = ScoringMode::Graham;
        config
    }

    /// §6 preset: biased toward false negatives over false positives.
    pub fn preset_conservative() -> Self {
        let mut config = MailProbeConfig::default();
        config.scorer.spam_threshold = 0.95;
        config.scorer.min_word_count = 10;
        config
    }

    /// §6 preset: biased toward catching more spam at the cost of more
    /// false positives.
    pub fn preset_aggressive() -> Self {
        let mut config = MailProbeConfig::default();
        config.scorer.spam_threshold = 0.8;
        config.scorer.min_word_count = 3;
        config.scorer.extend_top_terms = true;
        config
    }

    fn to_document(&self) -> ConfigDocument {
        ConfigDocument {
            schema_version: SCHEMA_VERSION,
            tokenizer: (&self.tokenizer).into(),
            store: (&self.store).into(),
            scorer: (&self.scorer).into(),
        }
    }

    fn from_document(doc: ConfigDocument) -> Self {
        MailProbeConfig { tokenizer: doc.tokenizer.into(), store: doc.store.into(), scorer: doc.scorer.into() }
    }
}

/// Loads, validates, and persists a `MailProbeConfig` as a JSON file, the
/// way the original ships a JSON sidecar next to the filter database.
pub struct ConfigManager {
    path: std::path::PathBuf,
    config: MailProbeConfig,
}

impl ConfigManager {
    /// Load `path` if it exists, else fall back to `MailProbeConfig::default()`.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let config = if path.exists() { Self::read(&path)? } else { MailProbeConfig::default() };
        config.validate()?;
        Ok(ConfigManager { path, config })
    }

    fn read(path: &Path) -> Result<MailProbeConfig> {
        let text = std::fs::read_to_string(path)?;
        let doc: ConfigDocument =
            serde_json::from_str(&text).map_err(|e| MailProbeError::ConfigInvalid(format!("{}: {e}", path.display())))?;
        Ok(MailProbeConfig::from_document(doc))
    }

    pub fn config(&self) -> &MailProbeConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: MailProbeConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let doc = self.config.to_document();
        let json = serde_json::to_string_pretty(&doc).map_err(|e| MailProbeError::ConfigInvalid(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;
        log::info!("configuration saved to {}", self.path.display());
        Ok(())
    }
}
