//! Cross-module scenarios from spec.md §8 that don't belong to any single
//! unit under test: full message → tokenize → train/score round trips
//! against a real `TermStore` on disk.

use mailprobe::message::Message;
use mailprobe::scorer::{Score, Scorer, ScorerConfig};
use mailprobe::store::{TermStore, TermStoreConfig};
use mailprobe::tokenizer::{Tokenizer, TokenizerConfig};
use mailprobe::trainer::Trainer;

fn message(body: &str) -> Message {
    let raw = format!("From: sender@example.com\nSubject: test\n\n{body}\n");
    Message::from_bytes(raw.as_bytes()).unwrap()
}

fn fresh_tokenizer() -> Tokenizer {
    Tokenizer::new(TokenizerConfig { min_term_length: 3, ..TokenizerConfig::default() }).unwrap()
}

fn score_of(store: &TermStore, tokenizer: &Tokenizer, body: &str) -> Score {
    let scorer = Scorer::new(store, ScorerConfig::default()).unwrap();
    scorer.score_message(&message(body), tokenizer).unwrap()
}

/// §8 scenario 1: scoring against an empty store always falls back to the
/// prior, with no terms selected.
#[test]
fn empty_store_scoring_falls_back_to_new_word_score() {
    let dir = tempfile::tempdir().unwrap();
    let store = TermStore::open(dir.path(), TermStoreConfig::default()).unwrap();
    let tokenizer = fresh_tokenizer();

    let score = score_of(&store, &tokenizer, "This is a perfectly ordinary message.");
    assert_eq!(score.probability, ScorerConfig::default().new_word_score);
    assert!(!score.is_spam);
    assert_eq!(score.terms_used, 0);
}

/// §8 scenario 2: training exclusively on a spam body, then scoring the same
/// body, yields a near-certain spam probability.
#[test]
fn pure_spam_corpus_scores_near_certain() {
    let dir = tempfile::tempdir().unwrap();
    let store = TermStore::open(dir.path(), TermStoreConfig::default()).unwrap();
    let tokenizer = fresh_tokenizer();
    let trainer = Trainer::new(&store, &tokenizer, ScorerConfig::default());

    let spam_body = "FREE MONEY CLICK HERE";
    for _ in 0..20 {
        trainer.train(&message(spam_body), true, true).unwrap();
    }

    let score = score_of(&store, &tokenizer, spam_body);
    assert!(score.probability >= 0.99, "expected >= 0.99, got {}", score.probability);
    assert!(score.is_spam);
}

/// §8 scenario 3: the same content trained once as good and once as spam
/// (under different digests, since body text alone isn't the digest input —
/// use distinct senders so both messages register) lands near 0.5.
#[test]
fn balanced_corpus_scores_near_half() {
    let dir = tempfile::tempdir().unwrap();
    let store = TermStore::open(dir.path(), TermStoreConfig::default()).unwrap();
    let tokenizer = fresh_tokenizer();
    let trainer = Trainer::new(&store, &tokenizer, ScorerConfig::default());

    let body = "quarterly report attached for your review";
    let good_msg = Message::from_bytes(format!("From: good@example.com\nSubject: x\n\n{body}\n").as_bytes()).unwrap();
    let spam_msg = Message::from_bytes(format!("From: spam@example.com\nSubject: y\n\n{body}\n").as_bytes()).unwrap();

    for _ in 0..20 {
        trainer.train(&good_msg, false, true).unwrap();
        trainer.train(&spam_msg, true, true).unwrap();
    }

    let score = score_of(&store, &tokenizer, body);
    assert!((0.45..=0.55).contains(&score.probability), "got {}", score.probability);
}

/// §8 scenario 4: reclassifying a message flips its term records and the
/// globals entirely to the new label.
#[test]
fn reclassification_flips_counts_and_globals() {
    let dir = tempfile::tempdir().unwrap();
    let store = TermStore::open(dir.path(), TermStoreConfig::default()).unwrap();
    let tokenizer = fresh_tokenizer();
    let trainer = Trainer::new(&store, &tokenizer, ScorerConfig::default());

    let msg = message("reclassify this exact message body");
    trainer.train(&msg, false, false).unwrap();
    trainer.train(&msg, true, true).unwrap();

    assert_eq!(store.globals().unwrap(), (0, 1));
    let rec = store.get("reclassify").unwrap().unwrap();
    assert_eq!(rec.good_count, 0);
    assert_eq!(rec.spam_count, 1);
}

/// §8 invariant: `train(M, L); remove(M)` restores the empty store exactly.
#[test]
fn removal_restores_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = TermStore::open(dir.path(), TermStoreConfig::default()).unwrap();
    let tokenizer = fresh_tokenizer();
    let trainer = Trainer::new(&store, &tokenizer, ScorerConfig::default());

    let msg = message("some unique words that get removed entirely");
    trainer.train(&msg, true, false).unwrap();
    assert!(trainer.remove(&msg).unwrap());

    assert_eq!(store.globals().unwrap(), (0, 0));
    assert_eq!(store.word_count().unwrap(), 0);
}

/// §8 invariant: after training a single good message from an empty store,
/// every emitted token's record has good >= 1 and spam == 0.
#[test]
fn first_training_leaves_one_sided_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = TermStore::open(dir.path(), TermStoreConfig::default()).unwrap();
    let tokenizer = fresh_tokenizer();
    let trainer = Trainer::new(&store, &tokenizer, ScorerConfig::default());

    let msg = message("completely uncontroversial everyday words");
    trainer.train(&msg, false, false).unwrap();
    assert_eq!(store.globals().unwrap(), (1, 0));

    for (key, _, _, _) in store.export().unwrap() {
        let rec = store.get(&key).unwrap().unwrap();
        assert!(rec.good_count >= 1);
        assert_eq!(rec.spam_count, 0);
    }
}

/// §8 scenario 5: cleanup removes low-count, stale records and returns the
/// number removed.
#[test]
fn cleanup_scenario_removes_all_low_count_stale_terms() {
    let dir = tempfile::tempdir().unwrap();
    let store = TermStore::open(dir.path(), TermStoreConfig::default()).unwrap();

    let mut deltas = std::collections::HashMap::new();
    for i in 0..1000 {
        deltas.insert(format!("synthetic_term_{i}"), (1_i64, 0_i64));
    }
    store.bulk_update(&deltas).unwrap();

    // cleanup's age predicate requires staleness; with max_age_days == 0 the
    // predicate is vacuously true (§4.2), so this still removes everything
    // without needing to backdate last_update.
    let removed = store.cleanup(1, 0).unwrap();
    assert_eq!(removed, 1000);
    assert_eq!(store.word_count().unwrap(), 0);
}

/// Digest stability: two byte sequences differing only in header order or
/// trailing whitespace digest identically (§3, §8 invariant).
#[test]
fn digest_is_stable_across_header_order_and_trailing_whitespace() {
    let a = Message::from_bytes(b"From: x@example.com\nSubject: Hi\n\nHello there\n").unwrap();
    let b = Message::from_bytes(b"Subject: Hi\nFrom: x@example.com\n\nHello there   \n\n").unwrap();
    assert_eq!(a.digest, b.digest);
}
