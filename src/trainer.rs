//! Training operations: add, remove, reclassify (§4.4).

use std::collections::HashMap;

use crate::message::Message;
use crate::scorer::{Scorer, ScorerConfig};
use crate::store::TermStore;
use crate::tokenizer::Tokenizer;
use crate::error::Result;

pub struct Trainer<'a> {
    store: &'a TermStore,
    tokenizer: &'a Tokenizer,
    scorer_config: ScorerConfig,
}

impl<'a> Trainer<'a> {
    pub fn new(store: &'a TermStore, tokenizer: &'a Tokenizer, scorer_config: ScorerConfig) -> Self {
        Trainer { store, tokenizer, scorer_config }
    }

    fn deltas_for(&self, message: &Message, is_spam: bool) -> Result<HashMap<String, (i64, i64)>> {
        let tokens = self.tokenizer.tokenize_message(message);
        let scorer = Scorer::new(self.store, self.scorer_config)?;
        let counts = scorer.clamped_counts(&tokens);

        let mut deltas = HashMap::with_capacity(counts.len());
        for (key, count) in counts {
            let count = count as i64;
            let delta = if is_spam { (0, count) } else { (count, 0) };
            deltas.insert(key, delta);
        }
        Ok(deltas)
    }

    /// Add (or, with `force_update`, reapply) evidence for `message` under
    /// `label` (§4.4 `train`).
    pub fn train(&self, message: &Message, is_spam: bool, force_update: bool) -> Result<bool> {
        let digest = message.digest.clone();
        let prior = self.store.message_known(&digest)?;

        match prior {
            None => {
                let deltas = self.deltas_for(message, is_spam)?;
                self.store.bulk_update(&deltas)?;
                self.store.register_message(&digest, is_spam)?;
                Ok(true)
            }
            Some(prior_spam) if prior_spam == is_spam => {
                if !force_update {
                    return Ok(false);
                }
                let deltas = self.deltas_for(message, is_spam)?;
                self.store.bulk_update(&deltas)?;
                Ok(true)
            }
            Some(prior_spam) => {
                let reverse = negate(self.deltas_for(message, prior_spam)?);
                let forward = self.deltas_for(message, is_spam)?;
                let combined = merge_deltas(reverse, forward);
                self.store.bulk_update(&combined)?;
                self.store.register_message(&digest, is_spam)?;
                Ok(true)
            }
        }
    }

    /// Train only when the current model disagrees, or is unconfident about,
    /// `label` (§4.4 `train_selective`).
    pub fn train_selective(&self, message: &Message, is_spam: bool) -> Result<bool> {
        let tokens = self.tokenizer.tokenize_message(message);
        let scorer = Scorer::new(self.store, self.scorer_config)?;
        let score = scorer.score_tokens(&tokens)?;

        let confident_threshold = self.scorer_config.min_distance_for_score * 2.0;
        let distance = (score.probability - 0.5).abs();
        let agrees = score.is_spam == is_spam;

        if agrees && distance >= confident_threshold {
            return Ok(false);
        }
        self.train(message, is_spam, false)
    }

    /// Reverse a message's contribution entirely and drop its registry entry
    /// (§4.4 `remove`).
    pub fn remove(&self, message: &Message) -> Result<bool> {
        let digest = message.digest.clone();
        let prior = self.store.unregister_message(&digest)?;
        let Some(prior_spam) = prior else {
            return Ok(false);
        };
        let reverse = negate(self.deltas_for(message, prior_spam)?);
        self.store.bulk_update(&reverse)?;
        Ok(true)
    }
}

fn negate(deltas: HashMap<String, (i64, i64)>) -> HashMap<String, (i64, i64)> {
    deltas.into_iter().map(|(k, (g, s))| (k, (-g, -s))).collect()
}

fn merge_deltas(a: HashMap<String, (i64, i64)>, b: HashMap<String, (i64, i64)>) -> HashMap<String, (i64, i64)> {
    let mut merged = a;
    for (key, (g, s)) in b {
        let entry = merged.entry(key).or_insert((0, 0));
        entry.0 += g;
        entry.1 += s;
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TermStoreConfig;
    use crate::tokenizer::TokenizerConfig;

    fn make_message(body: &str) -> Message {
        let raw = format!("From: a@example.com\nSubject: test\n\n{body}\n");
        Message::from_bytes(raw.as_bytes()).unwrap()
    }

    #[test]
    fn train_registers_a_new_message_and_spam_globals() {
        let dir = tempfile::tempdir().unwrap();
        let store = TermStore::open(dir.path(), TermStoreConfig::default()).unwrap();
        let tokenizer = Tokenizer::new(TokenizerConfig { min_term_length: 3, ..Default::default() }).unwrap();
        let trainer = Trainer::new(&store, &tokenizer, ScorerConfig::default());

        let msg = make_message("FREE MONEY CLICK HERE");
        let trained = trainer.train(&msg, true, false).unwrap();
        assert!(trained);
        assert_eq!(store.globals().unwrap(), (0, 1));
        assert!(store.get("free").unwrap().is_some());
    }

    #[test]
    fn train_same_label_twice_is_a_no_op_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let store = TermStore::open(dir.path(), TermStoreConfig::default()).unwrap();
        let tokenizer = Tokenizer::new(TokenizerConfig { min_term_length: 3, ..Default::default() }).unwrap();
        let trainer = Trainer::new(&store, &tokenizer, ScorerConfig::default());

        let msg = make_message("hello world test");
        assert!(trainer.train(&msg, false, false).unwrap());
        assert!(!trainer.train(&msg, false, false).unwrap());
    }

    #[test]
    fn train_opposite_label_flips_counts_and_globals() {
        let dir = tempfile::tempdir().unwrap();
        let store = TermStore::open(dir.path(), TermStoreConfig::default()).unwrap();
        let tokenizer = Tokenizer::new(TokenizerConfig { min_term_length: 3, ..Default::default() }).unwrap();
        let trainer = Trainer::new(&store, &tokenizer, ScorerConfig::default());

        let msg = make_message("reclassify this message body");
        trainer.train(&msg, false, false).unwrap();
        assert_eq!(store.globals().unwrap(), (1, 0));

        trainer.train(&msg, true, false).unwrap();
        assert_eq!(store.globals().unwrap(), (0, 1));

        let rec = store.get("reclassify").unwrap().unwrap();
        assert_eq!(rec.good_count, 0);
        assert_eq!(rec.spam_count, 1);
    }

    #[test]
    fn remove_reverses_deltas_and_unregisters() {
        let dir = tempfile::tempdir().unwrap();
        let store = TermStore::open(dir.path(), TermStoreConfig::default()).unwrap();
        let tokenizer = Tokenizer::new(TokenizerConfig { min_term_length: 3, ..Default::default() }).unwrap();
        let trainer = Trainer::new(&store, &tokenizer, ScorerConfig::default());

        let msg = make_message("removable content words");
        trainer.train(&msg, true, false).unwrap();
        assert!(trainer.remove(&msg).unwrap());
        assert_eq!(store.globals().unwrap(), (0, 0));
        assert!(store.get("removable").unwrap().is_none());
    }

    #[test]
    fn remove_on_unknown_message_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let store = TermStore::open(dir.path(), TermStoreConfig::default()).unwrap();
        let tokenizer = Tokenizer::new(TokenizerConfig { min_term_length: 3, ..Default::default() }).unwrap();
        let trainer = Trainer::new(&store, &tokenizer, ScorerConfig::default());
        let msg = make_message("never trained");
        assert!(!trainer.remove(&msg).unwrap());
    }

    #[test]
    fn train_selective_skips_confident_correct_messages() {
        let dir = tempfile::tempdir().unwrap();
        let store = TermStore::open(dir.path(), TermStoreConfig::default()).unwrap();
        let tokenizer = Tokenizer::new(TokenizerConfig { min_term_length: 3, ..Default::default() }).unwrap();
        let trainer = Trainer::new(&store, &tokenizer, ScorerConfig::default());

        let spam = make_message("free money click here buy now");
        for _ in 0..10 {
            trainer.train(&spam, true, true).unwrap();
        }
        let trained_again = trainer.train_selective(&spam, true).unwrap();
        assert!(!trained_again);
    }
}
