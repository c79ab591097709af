//! Persistence substrates for format hints.
//!
//! A backend is a plain keyed store: it knows nothing about retirement or
//! precedence between model-specific and provider-wide hints. That logic
//! lives in [`FormatHintStore`](super::FormatHintStore).

use std::{
    collections::HashMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::RwLock,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::hint::{FormatHint, HintKey};
use crate::error::{HintStoreError, Result};

/// Keyed get/put/delete of hint records.
///
/// Implementations must be safe to share across sessions; the store
/// serializes writes per key on top of them.
pub trait HintBackend: Send + Sync + std::fmt::Debug {
    /// Returns the hint stored under exactly `key`.
    fn get(&self, key: &HintKey) -> Result<Option<FormatHint>>;

    /// Inserts or replaces the hint under its own key.
    fn put(&self, hint: &FormatHint) -> Result<()>;

    /// Removes the hint under `key`, returning whether one existed.
    fn delete(&self, key: &HintKey) -> Result<bool>;

    /// All hints of a provider, model-specific and provider-wide, ordered
    /// by model id (provider-wide first).
    fn list(&self, provider_id: &str) -> Result<Vec<FormatHint>>;
}

fn sorted_for_provider<'a>(
    hints: impl Iterator<Item = &'a FormatHint>,
    provider_id: &str,
) -> Vec<FormatHint> {
    let mut found: Vec<FormatHint> = hints
        .filter(|h| h.provider_id == provider_id)
        .cloned()
        .collect();
    found.sort_by(|a, b| a.model_id.cmp(&b.model_id));
    found
}

/// In-memory backend for tests and single-process use.
///
/// Data is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    hints: RwLock<HashMap<HintKey, FormatHint>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored hints.
    pub fn len(&self) -> usize {
        self.hints.read().map(|h| h.len()).unwrap_or(0)
    }

    /// Returns true when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HintBackend for MemoryBackend {
    fn get(&self, key: &HintKey) -> Result<Option<FormatHint>> {
        let hints = self
            .hints
            .read()
            .map_err(|_| HintStoreError::poisoned("memory backend"))?;
        Ok(hints.get(key).cloned())
    }

    fn put(&self, hint: &FormatHint) -> Result<()> {
        self.hints
            .write()
            .map_err(|_| HintStoreError::poisoned("memory backend"))?
            .insert(hint.key(), hint.clone());
        Ok(())
    }

    fn delete(&self, key: &HintKey) -> Result<bool> {
        let removed = self
            .hints
            .write()
            .map_err(|_| HintStoreError::poisoned("memory backend"))?
            .remove(key);
        Ok(removed.is_some())
    }

    fn list(&self, provider_id: &str) -> Result<Vec<FormatHint>> {
        let hints = self
            .hints
            .read()
            .map_err(|_| HintStoreError::poisoned("memory backend"))?;
        Ok(sorted_for_provider(hints.values(), provider_id))
    }
}

/// On-disk document layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct HintDocument {
    version: u32,
    hints: Vec<FormatHint>,
}

const DOCUMENT_VERSION: u32 = 1;

/// Backend that keeps every hint in one JSON file.
///
/// The whole file is rewritten on each change, via a sibling temp file and
/// a rename so readers never observe a half-written document.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    hints: RwLock<HashMap<HintKey, FormatHint>>,
}

impl JsonFileBackend {
    /// Opens (or lazily creates) the hint file at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or is not a hint document.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let hints = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => HashMap::new(),
            Ok(raw) => {
                let document: HintDocument = serde_json::from_str(&raw)?;
                document.hints.into_iter().map(|h| (h.key(), h)).collect()
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), count = hints.len(), "opened hint file");
        Ok(Self {
            path,
            hints: RwLock::new(hints),
        })
    }

    /// The file this backend writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, hints: &HashMap<HintKey, FormatHint>) -> Result<()> {
        let mut ordered: Vec<FormatHint> = hints.values().cloned().collect();
        ordered.sort_by(|a, b| a.key().cmp(&b.key()));
        let document = HintDocument {
            version: DOCUMENT_VERSION,
            hints: ordered,
        };
        let encoded = serde_json::to_vec_pretty(&document)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = temp_path(&self.path)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Sibling written before the rename: the file name with `.tmp` appended,
/// so `hints.json` and `hints.yaml` never share one.
fn temp_path(path: &Path) -> Result<PathBuf> {
    let Some(name) = path.file_name() else {
        return Err(HintStoreError::unavailable(format!(
            "hint file path has no file name: {}",
            path.display()
        )));
    };
    let mut name = name.to_os_string();
    name.push(".tmp");
    Ok(path.with_file_name(name))
}

impl HintBackend for JsonFileBackend {
    fn get(&self, key: &HintKey) -> Result<Option<FormatHint>> {
        let hints = self
            .hints
            .read()
            .map_err(|_| HintStoreError::poisoned("file backend"))?;
        Ok(hints.get(key).cloned())
    }

    fn put(&self, hint: &FormatHint) -> Result<()> {
        let mut hints = self
            .hints
            .write()
            .map_err(|_| HintStoreError::poisoned("file backend"))?;
        let previous = hints.insert(hint.key(), hint.clone());
        if let Err(e) = self.flush(&hints) {
            // Keep memory consistent with disk.
            match previous {
                Some(p) => hints.insert(p.key(), p),
                None => hints.remove(&hint.key()),
            };
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, key: &HintKey) -> Result<bool> {
        let mut hints = self
            .hints
            .write()
            .map_err(|_| HintStoreError::poisoned("file backend"))?;
        let Some(previous) = hints.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = self.flush(&hints) {
            hints.insert(previous.key(), previous);
            return Err(e);
        }
        Ok(true)
    }

    fn list(&self, provider_id: &str) -> Result<Vec<FormatHint>> {
        let hints = self
            .hints
            .read()
            .map_err(|_| HintStoreError::poisoned("file backend"))?;
        Ok(sorted_for_provider(hints.values(), provider_id))
    }
}
