//! Outer I/O collaborators: reading messages from files/mbox/Maildir, an
//! in-memory digest→label cache for batch tooling, and CSV export/import
//! of the term store (§6, §1 "out of scope for the core").

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MailProbeError, Result};
use crate::message::Message;
use crate::store::TermStore;

/// Reads `Message` values out of a single file, an mbox file, or a Maildir
/// directory (`new/` + `cur/`), lazily via an iterator-shaped `next`
/// (grounded in `examples/original_source/tests/test_message.py`'s
/// `EmailMessageReader`).
pub enum MessageReader {
    Single(Option<PathBuf>),
    Mbox { messages: std::vec::IntoIter<Vec<u8>> },
    Maildir { files: std::vec::IntoIter<PathBuf> },
}

impl MessageReader {
    /// A single RFC-822 file.
    pub fn single_file(path: impl AsRef<Path>) -> Self {
        MessageReader::Single(Some(path.as_ref().to_path_buf()))
    }

    /// An mbox file, split on `^From ` envelope lines.
    pub fn mbox(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read(path.as_ref())?;
        let messages = split_mbox(&raw);
        Ok(MessageReader::Mbox { messages: messages.into_iter() })
    }

    /// A Maildir: `new/` and `cur/` subdirectories, one message per
    /// regular file.
    pub fn maildir(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut files = Vec::new();
        for sub in ["new", "cur"] {
            let dir = path.join(sub);
            if !dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    files.push(entry.path());
                }
            }
        }
        files.sort();
        Ok(MessageReader::Maildir { files: files.into_iter() })
    }
}

impl Iterator for MessageReader {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            MessageReader::Single(slot) => {
                let path = slot.take()?;
                Some(fs::read(&path).map_err(MailProbeError::from).and_then(|raw| Message::from_bytes(&raw)))
            }
            MessageReader::Mbox { messages } => {
                let raw = messages.next()?;
                Some(Message::from_bytes(&raw))
            }
            MessageReader::Maildir { files } => {
                let path = files.next()?;
                Some(fs::read(&path).map_err(MailProbeError::from).and_then(|raw| Message::from_bytes(&raw)))
            }
        }
    }
}

fn split_mbox(raw: &[u8]) -> Vec<Vec<u8>> {
    let text = String::from_utf8_lossy(raw);
    let mut messages = Vec::new();
    let mut current = String::new();

    for line in text.split_inclusive('\n') {
        if line.starts_with("From ") && !current.is_empty() {
            messages.push(std::mem::take(&mut current).into_bytes());
        }
        if !line.starts_with("From ") || !current.is_empty() {
            current.push_str(line);
        } else {
            // First "From " envelope line of the very first message: drop it,
            // keep the rest of the message body that follows.
        }
    }
    if !current.trim().is_empty() {
        messages.push(current.into_bytes());
    }
    messages
}

/// An in-process digest→label cache, separate from the store's persistent
/// registry, used to avoid repeated store round-trips within one batch run
/// (grounded in `test_message.py::TestMessageDigestCache`).
#[derive(Debug, Default)]
pub struct MessageDigestCache {
    seen: HashMap<String, bool>,
}

impl MessageDigestCache {
    pub fn new() -> Self {
        MessageDigestCache::default()
    }

    pub fn is_known(&self, digest: &str) -> bool {
        self.seen.contains_key(digest)
    }

    pub fn label_of(&self, digest: &str) -> Option<bool> {
        self.seen.get(digest).copied()
    }

    pub fn remember(&mut self, digest: impl Into<String>, is_spam: bool) {
        self.seen.insert(digest.into(), is_spam);
    }

    pub fn forget(&mut self, digest: &str) {
        self.seen.remove(digest);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct CsvRecord {
    key: String,
    good_count: u64,
    spam_count: u64,
    last_update: i64,
}

/// Write every term record to `path` as CSV: `key,good_count,spam_count,last_update`
/// (§6 "CSV export format") — `last_update` is the record's real timestamp,
/// not a placeholder, so a CSV backup can be restored without losing the
/// history `cleanup`'s age predicate depends on.
pub fn export_csv(store: &TermStore, path: impl AsRef<Path>) -> Result<u64> {
    let records = store.export()?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path.as_ref())
        .map_err(|e| MailProbeError::ImportFormat(e.to_string()))?;

    let mut count = 0u64;
    for (key, good, spam, last_update) in records {
        writer
            .serialize(CsvRecord { key, good_count: good, spam_count: spam, last_update })
            .map_err(|e| MailProbeError::ImportFormat(e.to_string()))?;
        count += 1;
    }
    writer.flush()?;
    log::info!("exported {count} term record(s) to {}", path.as_ref().display());
    Ok(count)
}

/// Read CSV records from `path` and apply them to the store via `import`
/// (§6 "CSV export format"; unknown trailing fields ignored). When the
/// `last_update` column is present it is preserved verbatim; rows with only
/// the first three fields fall back to the current time.
pub fn import_csv(store: &TermStore, path: impl AsRef<Path>) -> Result<u64> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path.as_ref())
        .map_err(|e| MailProbeError::ImportFormat(e.to_string()))?;

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| MailProbeError::ImportFormat(e.to_string()))?;
        if record.len() < 3 {
            return Err(MailProbeError::ImportFormat(format!("expected at least 3 fields, got {}", record.len())));
        }
        let key = record.get(0).unwrap().to_string();
        let good: u64 = record
            .get(1)
            .unwrap()
            .parse()
            .map_err(|_| MailProbeError::ImportFormat(format!("invalid good_count in row for {key}")))?;
        let spam: u64 = record
            .get(2)
            .unwrap()
            .parse()
            .map_err(|_| MailProbeError::ImportFormat(format!("invalid spam_count in row for {key}")))?;
        let last_update: Option<i64> = match record.get(3) {
            Some(field) => {
                Some(field.parse().map_err(|_| MailProbeError::ImportFormat(format!("invalid last_update in row for {key}")))?)
            }
            None => None,
        };
        records.push((key, good, spam, last_update));
    }

    let applied = store.import(records)?;
    log::info!("imported {applied} term record(s) from {}", path.as_ref().display());
    Ok(applied)
}
