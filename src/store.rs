use crate::error::Result;
use crate::signatures::{AppliedSignature, SignatureKey, SignatureTemplate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

const TEMPLATE_PREFIX: &str = "signature_template:";
const LAST_APPLIED_KEY: &str = "last_applied_signature";
const RECORD_PREFIX: &str = "thread_signature:";

/// String-keyed persistent storage, one instance per user profile.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
    fn len(&self) -> usize;
    fn keys(&self) -> Vec<String>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// JSON file backed store. Every `set` rewrites the file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };

        log::debug!("Opened store {} ({} entries)", path.display(), entries.len());
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Signature decision made for one compose/reply session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSignatureRecord {
    pub recipients: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub subject: String,
    pub applied_signature: AppliedSignature,
    pub timestamp: DateTime<Utc>,
}

impl ThreadSignatureRecord {
    /// Storage id: the thread id when known, otherwise recipients and subject.
    pub fn record_id(&self) -> String {
        match self.thread_id.as_deref().filter(|id| !id.is_empty()) {
            Some(thread_id) => format!("thread:{thread_id}"),
            None => {
                let recipients: Vec<&str> = self.recipients.iter().map(String::as_str).collect();
                format!("compose:{}|{}", recipients.join(","), self.subject)
            }
        }
    }
}

/// Typed view over a [`KeyValueStore`].
pub struct SignatureStore<S> {
    backend: S,
}

impl<S: KeyValueStore> SignatureStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn template(&self, key: SignatureKey) -> Option<SignatureTemplate> {
        self.backend
            .get(&format!("{TEMPLATE_PREFIX}{key}"))
            .map(|html| SignatureTemplate { key, html })
    }

    pub fn save_template(&mut self, template: &SignatureTemplate) -> Result<()> {
        self.backend
            .set(&format!("{TEMPLATE_PREFIX}{}", template.key), &template.html)
    }

    /// Raw HTML (marker included) of the most recently inserted signature.
    pub fn last_applied(&self) -> Option<String> {
        self.backend
            .get(LAST_APPLIED_KEY)
            .filter(|html| !html.trim().is_empty())
    }

    pub fn set_last_applied(&mut self, html: &str) -> Result<()> {
        self.backend.set(LAST_APPLIED_KEY, html)
    }

    pub fn record(&self, record_id: &str) -> Option<ThreadSignatureRecord> {
        let raw = self.backend.get(&format!("{RECORD_PREFIX}{record_id}"))?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Ignoring unreadable thread record {record_id}: {e}");
                None
            }
        }
    }

    /// All thread records; unreadable entries are skipped.
    pub fn records(&self) -> Vec<ThreadSignatureRecord> {
        self.backend
            .keys()
            .iter()
            .filter_map(|key| key.strip_prefix(RECORD_PREFIX))
            .filter_map(|record_id| self.record(record_id))
            .collect()
    }

    /// Insert or overwrite a record, returning its id.
    pub fn save_record(&mut self, record: &ThreadSignatureRecord) -> Result<String> {
        let record_id = record.record_id();
        let json = serde_json::to_string(record)?;
        self.backend
            .set(&format!("{RECORD_PREFIX}{record_id}"), &json)?;
        log::debug!(
            "Saved thread record {record_id} ({})",
            String::from(record.applied_signature)
        );
        Ok(record_id)
    }

    pub fn remove_record(&mut self, record_id: &str) -> Result<()> {
        self.backend.remove(&format!("{RECORD_PREFIX}{record_id}"))?;
        log::debug!("Removed thread record {record_id}");
        Ok(())
    }
}
