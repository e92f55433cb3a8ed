//! N independent classifier cores selected by argmax (§9 design note).
//!
//! Deliberately thin: no shared state and no invariants beyond what each
//! underlying `(TermStore, ScorerConfig)` pair already guarantees.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{MailProbeError, Result};
use crate::message::Message;
use crate::scorer::{Score, Scorer, ScorerConfig};
use crate::store::{TermStore, TermStoreConfig};
use crate::tokenizer::Tokenizer;
use crate::trainer::Trainer;

/// One category's store directory and scoring configuration.
pub struct CategoryConfig {
    pub name: String,
    pub dir: PathBuf,
    pub scorer: ScorerConfig,
}

struct Category {
    name: String,
    store: TermStore,
    scorer_config: ScorerConfig,
}

/// Owns N independent cores and picks the highest-probability category for
/// a message. Training still targets exactly one named category at a time;
/// the wrapper adds no cross-category bookkeeping.
pub struct MultiCategoryFilter {
    categories: Vec<Category>,
}

impl MultiCategoryFilter {
    pub fn open(categories: Vec<CategoryConfig>, store_config: TermStoreConfig) -> Result<Self> {
        if categories.is_empty() {
            return Err(MailProbeError::ConfigInvalid("at least one category is required".to_string()));
        }
        let mut opened = Vec::with_capacity(categories.len());
        for cat in categories {
            let store = TermStore::open(&cat.dir, store_config)?;
            opened.push(Category { name: cat.name, store, scorer_config: cat.scorer });
        }
        Ok(MultiCategoryFilter { categories: opened })
    }

    pub fn category_names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }

    /// Run all N cores and return the category with the highest probability
    /// together with its score.
    pub fn classify(&self, message: &Message, tokenizer: &Tokenizer) -> Result<(String, Score)> {
        let tokens = tokenizer.tokenize_message(message);
        let mut best: Option<(String, Score)> = None;

        for category in &self.categories {
            let scorer = Scorer::new(&category.store, category.scorer_config)?;
            let score = scorer.score_tokens(&tokens)?;
            let is_better = match &best {
                None => true,
                Some((_, current)) => score.probability > current.probability,
            };
            if is_better {
                best = Some((category.name.clone(), score));
            }
        }

        best.ok_or_else(|| MailProbeError::ConfigInvalid("no categories configured".to_string()))
    }

    /// Train the named category's core: `is_member` marks whether `message`
    /// belongs to this category (spam-side) or not (good-side).
    pub fn train(
        &self,
        category: &str,
        message: &Message,
        is_member: bool,
        tokenizer: &Tokenizer,
        force_update: bool,
    ) -> Result<bool> {
        let cat = self.category(category)?;
        let trainer = Trainer::new(&cat.store, tokenizer, cat.scorer_config);
        trainer.train(message, is_member, force_update)
    }

    fn category(&self, name: &str) -> Result<&Category> {
        self.categories
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| MailProbeError::ConfigInvalid(format!("unknown category {name}")))
    }

    pub fn globals(&self) -> Result<HashMap<String, (u64, u64)>> {
        let mut out = HashMap::with_capacity(self.categories.len());
        for category in &self.categories {
            out.insert(category.name.clone(), category.store.globals()?);
        }
        Ok(out)
    }
}
