//! Local Whisper model discovery.
//!
//! Scans the models directory for `ggml-*.bin` files. Downloading and
//! cataloging models is out of scope; drop a file in the directory and it
//! shows up on the next `reload`.

use std::fs;
use std::path::{Path, PathBuf};

/// A Whisper model file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhisperModel {
    /// Short identifier derived from the filename (e.g. "base.en").
    pub id: String,
    /// Absolute path to the `.bin` file.
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
}

impl WhisperModel {
    /// Display name for the model.
    pub fn name(&self) -> &str {
        &self.id
    }

    /// Build a model entry from an explicit file path.
    pub fn from_path(path: PathBuf) -> Option<Self> {
        let meta = fs::metadata(&path).ok()?;
        let id = model_id_from_filename(path.file_name()?.to_str()?)?;
        Some(Self {
            id,
            path,
            size: meta.len(),
        })
    }
}

/// Extract "base.en" from "ggml-base.en.bin". Returns None for filenames
/// that don't look like Whisper model files.
fn model_id_from_filename(name: &str) -> Option<String> {
    let stem = name.strip_suffix(".bin")?;
    Some(stem.strip_prefix("ggml-").unwrap_or(stem).to_string())
}

/// Tracks the models visible on disk and which one is loaded.
#[derive(Debug, Default)]
pub struct ModelManager {
    available: Vec<WhisperModel>,
    current: Option<WhisperModel>,
}

impl ModelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory scanned for model files:
    /// `~/.local/share/holdspeak/models`, falling back to `./models`.
    pub fn models_directory() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("holdspeak").join("models"))
            .unwrap_or_else(|| PathBuf::from("models"))
    }

    /// Rescan the models directory. Missing directory yields an empty list.
    pub fn scan(&mut self) {
        self.scan_dir(&Self::models_directory());
        if self.available.is_empty() {
            self.scan_dir(Path::new("models"));
        }
    }

    /// Rescan a specific directory (used directly by tests).
    pub fn scan_dir(&mut self, dir: &Path) {
        self.available.clear();

        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let is_bin = path
                .extension()
                .map(|e| e == "bin")
                .unwrap_or(false);
            if !is_bin {
                continue;
            }
            if let Some(model) = WhisperModel::from_path(path) {
                self.available.push(model);
            }
        }

        // Smallest first so load_first_available picks the fastest model
        self.available.sort_by_key(|m| m.size);
    }

    /// All models found by the last scan.
    pub fn available(&self) -> &[WhisperModel] {
        &self.available
    }

    /// The model currently loaded into the pipeline, if any.
    pub fn current(&self) -> Option<&WhisperModel> {
        self.current.as_ref()
    }

    /// Record which model the pipeline loaded.
    pub fn set_current(&mut self, model: WhisperModel) {
        self.current = Some(model);
    }

    /// Find a model by id or name.
    pub fn find(&self, name: &str) -> Option<&WhisperModel> {
        self.available.iter().find(|m| m.id == name)
    }

    /// The saved model if present, otherwise the first available.
    pub fn saved_or_first(&self, saved: &str) -> Option<&WhisperModel> {
        if !saved.is_empty() {
            if let Some(m) = self.find(saved) {
                return Some(m);
            }
        }
        self.available.first()
    }
}
