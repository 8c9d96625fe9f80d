use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use scribe_config::VaultConfig;

use crate::tags::extract_tags;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("note not found: {id}")]
    NotFound { id: String },
    #[error("refusing to overwrite existing note: {id}")]
    AlreadyExists { id: String },
    #[error("note id escapes the vault: {id}")]
    InvalidId { id: String },
    #[error("vault io error: {0}")]
    Io(#[from] io::Error),
}

/// The vault collaborator.  Note identifiers are vault-relative paths with
/// `/` separators (`Daily/2024-01-01.md`).
pub trait Vault: Send + Sync {
    /// Daily notes, newest first (identifiers sort lexicographically as dates).
    fn list_daily_notes(&self) -> Result<Vec<String>, VaultError>;
    fn read_note(&self, id: &str) -> Result<String, VaultError>;
    /// Stage a new draft and return its identifier.  Never overwrites.
    fn write_draft(&self, name: &str, content: &str) -> Result<String, VaultError>;
    fn update(&self, id: &str, content: &str) -> Result<(), VaultError>;
    /// Move a note into the vault-relative `destination` directory, keeping
    /// its file name, and return the new identifier.
    fn move_note(&self, id: &str, destination: &str) -> Result<String, VaultError>;
    fn delete(&self, id: &str) -> Result<(), VaultError>;
    fn exists(&self, id: &str) -> bool;
    /// Every tag used anywhere in the vault, deduplicated and sorted.
    fn list_tags(&self) -> Result<Vec<String>, VaultError>;
}

/// File-backed vault rooted at `VaultConfig::path`.
#[derive(Debug, Clone)]
pub struct ObsidianVault {
    root: PathBuf,
    daily_dir: String,
    new_dir: String,
}

impl ObsidianVault {
    pub fn new(config: &VaultConfig) -> Self {
        Self {
            root: config.root(),
            daily_dir: config.daily_dir.clone(),
            new_dir: config.new_dir.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a vault-relative identifier.  Rejects identifiers
    /// that are absolute or climb out of the vault with `..`.
    pub fn resolve(&self, id: &str) -> Result<PathBuf, VaultError> {
        let relative = Path::new(id);
        let escapes = relative
            .components()
            .any(|part| !matches!(part, Component::Normal(_) | Component::CurDir));
        if id.trim().is_empty() || escapes {
            return Err(VaultError::InvalidId { id: id.to_string() });
        }
        Ok(self.root.join(relative))
    }

    fn id_for(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn existing(&self, id: &str) -> Result<PathBuf, VaultError> {
        let path = self.resolve(id)?;
        if !path.is_file() {
            return Err(VaultError::NotFound { id: id.to_string() });
        }
        Ok(path)
    }
}

impl Vault for ObsidianVault {
    fn list_daily_notes(&self) -> Result<Vec<String>, VaultError> {
        let daily = self.root.join(&self.daily_dir);
        if !daily.is_dir() {
            return Ok(Vec::new());
        }

        let mut notes = fs::read_dir(&daily)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_markdown(path))
            .collect::<Vec<_>>();
        notes.sort_by(|left, right| right.file_stem().cmp(&left.file_stem()));

        Ok(notes.iter().map(|path| self.id_for(path)).collect())
    }

    fn read_note(&self, id: &str) -> Result<String, VaultError> {
        let path = self.existing(id)?;
        Ok(fs::read_to_string(path)?)
    }

    fn write_draft(&self, name: &str, content: &str) -> Result<String, VaultError> {
        let dir = self.root.join(&self.new_dir);
        fs::create_dir_all(&dir)?;

        let stem = slugify(name);
        let mut path = dir.join(format!("{stem}.md"));
        let mut suffix = 2;
        while path.exists() {
            path = dir.join(format!("{stem}-{suffix}.md"));
            suffix += 1;
        }

        fs::write(&path, content)?;
        let id = self.id_for(&path);
        tracing::debug!(draft = %id, "draft written");
        Ok(id)
    }

    fn update(&self, id: &str, content: &str) -> Result<(), VaultError> {
        let path = self.existing(id)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn move_note(&self, id: &str, destination: &str) -> Result<String, VaultError> {
        let source = self.existing(id)?;
        let target_dir = self.resolve(destination)?;
        fs::create_dir_all(&target_dir)?;

        let file_name = source
            .file_name()
            .ok_or_else(|| VaultError::InvalidId { id: id.to_string() })?;
        let target = target_dir.join(file_name);
        if target.exists() {
            return Err(VaultError::AlreadyExists {
                id: self.id_for(&target),
            });
        }

        fs::rename(&source, &target)?;
        let new_id = self.id_for(&target);
        tracing::debug!(from = %id, to = %new_id, "note moved");
        Ok(new_id)
    }

    fn delete(&self, id: &str) -> Result<(), VaultError> {
        let path = self.existing(id)?;
        fs::remove_file(path)?;
        Ok(())
    }

    fn exists(&self, id: &str) -> bool {
        self.resolve(id).map(|path| path.is_file()).unwrap_or(false)
    }

    fn list_tags(&self) -> Result<Vec<String>, VaultError> {
        let mut tags = BTreeSet::new();
        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|entry| !is_hidden(entry.path(), &self.root))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!("skipping unreadable vault path: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_markdown(entry.path()) {
                continue;
            }
            match fs::read_to_string(entry.path()) {
                Ok(content) => tags.extend(extract_tags(&content)),
                Err(err) => {
                    tracing::warn!(
                        path = %entry.path().display(),
                        "skipping unreadable note: {err}"
                    );
                }
            }
        }
        Ok(tags.into_iter().collect())
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("md"))
        .unwrap_or(false)
}

// `.obsidian/`, `.trash/` and friends hold app state, not notes.
fn is_hidden(path: &Path, root: &Path) -> bool {
    path != root
        && path
            .file_name()
            .map(|name| name.to_string_lossy().starts_with('.'))
            .unwrap_or(false)
}

/// Turn a title or URL into a file-name-safe slug.
pub fn slugify(raw: &str) -> String {
    let mut slug = raw
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() {
                ch.to_lowercase().next().unwrap_or(ch)
            } else {
                '-'
            }
        })
        .collect::<String>();
    while slug.contains("--") {
        slug = slug.replace("--", "-");
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug.chars().take(80).collect::<String>().trim_end_matches('-').to_string()
    }
}

/// Resolve a comma-separated list of 1-based indices (as typed at the note
/// selection menu) against `notes`.  Non-numeric and out-of-range items are
/// skipped with a warning; order of the input is preserved.
pub fn select_daily_notes(notes: &[String], input: &str) -> Vec<String> {
    let mut selected = Vec::new();
    for raw in input.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        match raw.parse::<usize>() {
            Ok(index) if (1..=notes.len()).contains(&index) => {
                selected.push(notes[index - 1].clone());
            }
            _ => tracing::warn!(selection = raw, "invalid selection, skipping"),
        }
    }
    selected
}
