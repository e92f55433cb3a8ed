//! mailprobe: a Bayesian (Graham/Robinson-family) email spam classifier.
//!
//! Three tightly coupled subsystems form the core: [`tokenizer`] turns a
//! parsed [`message::Message`] into a stream of scored terms, [`store`]
//! persists per-term good/spam counts plus a message registry and global
//! counters, and [`scorer`] combines per-term probabilities into a message
//! score; [`trainer`] drives scoring-informed updates to the store. The
//! `io`, `config`, and `multi_category` modules are outer collaborators
//! that consume the core through these public contracts.

pub mod config;
pub mod error;
pub mod io;
pub mod logging;
pub mod message;
pub mod multi_category;
pub mod scorer;
pub mod store;
pub mod tokenizer;
pub mod trainer;

pub use error::{MailProbeError, Result};
pub use message::Message;
pub use scorer::{Score, Scorer, ScorerConfig, ScoringMode};
pub use store::{TermRecord, TermStore, TermStoreConfig};
pub use tokenizer::{Token, Tokenizer, TokenizerConfig};
pub use trainer::Trainer;
