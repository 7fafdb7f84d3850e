use crate::{
    error::{ModError, ModResult},
    file_store::{FileStore, StoreError},
    version::ModVersion,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    sync::{Arc, OnceLock},
};
use tracing::{debug, info, warn};

pub const BASE_MOD: &str = "base";
pub const BUILTIN_MODS: [&str; 4] = [BASE_MOD, "elevated-rails", "quality", "space-age"];
pub const DEFAULT_MODS_DIR: &str = "mods";
pub const DEFAULT_LIST_FILE: &str = "mod-list.json";

/// Content shipped with the game rather than the portal.
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_MODS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModRecord {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    /// Version to update to, when one newer than `version` runs on the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_available: Option<String>,
}

impl ModRecord {
    pub fn new(name: &str, enabled: bool) -> Self {
        Self {
            name: name.to_string(),
            enabled,
            title: None,
            summary: None,
            version: None,
            latest_version: None,
            update_available: None,
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ModListFile {
    #[serde(default)]
    mods: Vec<ModListEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ModListEntry {
    name: String,
    #[serde(default = "default_true")]
    enabled: bool,
}

/// The enabled/disabled registry the game reads at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModListDocument {
    pub mods: Vec<ModRecord>,
}

impl Default for ModListDocument {
    fn default() -> Self {
        Self {
            mods: vec![ModRecord::new(BASE_MOD, true)],
        }
    }
}

impl ModListDocument {
    pub fn from_json(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let file: ModListFile = serde_json::from_slice(raw)?;
        let mods = file
            .mods
            .into_iter()
            .map(|entry| ModRecord::new(&entry.name, entry.enabled))
            .collect();
        Ok(Self { mods }.normalized())
    }

    /// Only `name` and `enabled` reach disk.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let file = ModListFile {
            mods: self
                .mods
                .iter()
                .map(|record| ModListEntry {
                    name: record.name.clone(),
                    enabled: record.enabled,
                })
                .collect(),
        };
        serde_json::to_string_pretty(&file)
    }

    /// `base` first and enabled, one record per name, blank names dropped.
    pub fn normalized(self) -> Self {
        let mut seen = HashSet::new();
        let mut mods = vec![ModRecord::new(BASE_MOD, true)];
        seen.insert(BASE_MOD.to_string());
        for record in self.mods {
            if record.name.trim().is_empty() || !seen.insert(record.name.clone()) {
                continue;
            }
            mods.push(record);
        }
        Self { mods }
    }

    pub fn find(&self, name: &str) -> Option<&ModRecord> {
        self.mods.iter().find(|record| record.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut ModRecord> {
        self.mods.iter_mut().find(|record| record.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.find(name).map(|record| record.enabled).unwrap_or(false)
    }

    /// Sets `enabled` on an existing record or appends a new one. `base`
    /// stays enabled. Returns true when a record was appended.
    pub fn upsert(&mut self, name: &str, enabled: bool) -> bool {
        let enabled = enabled || name == BASE_MOD;
        match self.find_mut(name) {
            Some(record) => {
                record.enabled = enabled;
                false
            }
            None => {
                self.mods.push(ModRecord::new(name, enabled));
                true
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<ModRecord> {
        if name == BASE_MOD {
            return None;
        }
        let index = self.mods.iter().position(|record| record.name == name)?;
        Some(self.mods.remove(index))
    }
}

/// A `name_version.zip` file in the mods directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledArchive {
    pub file_name: String,
    pub name: String,
    pub version: String,
}

impl InstalledArchive {
    pub fn parse(file_name: &str) -> Option<Self> {
        let captures = archive_regex()?.captures(file_name)?;
        Some(Self {
            file_name: file_name.to_string(),
            name: captures.name("name")?.as_str().to_string(),
            version: captures.name("version")?.as_str().to_string(),
        })
    }
}

fn archive_regex() -> Option<&'static Regex> {
    static ARCHIVE: OnceLock<Option<Regex>> = OnceLock::new();
    ARCHIVE
        .get_or_init(|| {
            Regex::new(r"^(?P<name>.+)_(?P<version>\d+\.\d+\.\d+(?:\.\d+)?)\.zip$").ok()
        })
        .as_ref()
}

/// Highest installed version of `name` among `archives`.
pub fn installed_version(name: &str, archives: &[InstalledArchive]) -> Option<String> {
    archives
        .iter()
        .filter(|archive| archive.name == name)
        .filter_map(|archive| ModVersion::parse(&archive.version).map(|parsed| (parsed, archive)))
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, archive)| archive.version.clone())
}

/// Read-modify-write access to `mods/mod-list.json` plus the archives
/// beside it. Last writer wins.
#[derive(Clone)]
pub struct ModListStore {
    files: Arc<dyn FileStore>,
    mods_dir: String,
    list_file: String,
}

impl ModListStore {
    pub fn new(files: Arc<dyn FileStore>, mods_dir: &str, list_file: &str) -> Self {
        Self {
            files,
            mods_dir: mods_dir.trim_matches('/').to_string(),
            list_file: list_file.trim_matches('/').to_string(),
        }
    }

    pub fn with_defaults(files: Arc<dyn FileStore>) -> Self {
        Self::new(files, DEFAULT_MODS_DIR, DEFAULT_LIST_FILE)
    }

    pub fn files(&self) -> &Arc<dyn FileStore> {
        &self.files
    }

    pub fn mods_dir(&self) -> &str {
        &self.mods_dir
    }

    pub fn list_path(&self) -> String {
        format!("{}/{}", self.mods_dir, self.list_file)
    }

    pub fn archive_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.mods_dir, file_name)
    }

    /// Never fails: a missing or unreadable list is the default document.
    pub fn read(&self) -> ModListDocument {
        let path = self.list_path();
        let raw = match self.files.get_content(&path) {
            Ok(raw) => raw,
            Err(StoreError::NotFound { .. }) => {
                debug!(path, "no mod list yet");
                return ModListDocument::default();
            }
            Err(err) => {
                warn!(path, error = %err, "mod list unreadable");
                return ModListDocument::default();
            }
        };
        match ModListDocument::from_json(&raw) {
            Ok(document) => document,
            Err(err) => {
                warn!(path, error = %err, "mod list is corrupt, starting over");
                ModListDocument::default()
            }
        }
    }

    pub fn write(&self, document: &ModListDocument) -> ModResult<()> {
        let path = self.list_path();
        let raw = document
            .to_json()
            .map_err(|err| ModError::Persistence(format!("{path}: {err}")))?;
        self.files
            .create_directory(&self.mods_dir)
            .and_then(|()| self.files.put_content(&path, raw.as_bytes()))
            .map_err(|err| {
                warn!(path, error = %err, "mod list write failed");
                ModError::Persistence(format!("{path}: {err}"))
            })?;
        debug!(path, mods = document.mods.len(), "mod list written");
        Ok(())
    }

    pub fn list_installed_files(&self) -> Vec<String> {
        match self.files.get_directory(&self.mods_dir) {
            Ok(entries) => entries
                .into_iter()
                .filter(|entry| entry.is_file && entry.name.to_ascii_lowercase().ends_with(".zip"))
                .map(|entry| entry.name)
                .collect(),
            Err(StoreError::NotFound { .. }) => Vec::new(),
            Err(err) => {
                warn!(dir = %self.mods_dir, error = %err, "cannot list mods directory");
                Vec::new()
            }
        }
    }

    pub fn installed_archives(&self) -> Vec<InstalledArchive> {
        self.list_installed_files()
            .iter()
            .filter_map(|file_name| InstalledArchive::parse(file_name))
            .collect()
    }

    /// The document merged with the archives on disk. Archives the list
    /// does not know are appended disabled and the result is persisted.
    pub fn get_mods(&self) -> ModListDocument {
        let mut document = self.read();
        let mut added = Vec::new();
        for archive in self.installed_archives() {
            if !document.contains(&archive.name) {
                document.mods.push(ModRecord::new(&archive.name, false));
                added.push(archive.name);
            }
        }
        if !added.is_empty() {
            info!(mods = ?added, "reconciled archives into mod list");
            if let Err(err) = self.write(&document) {
                warn!(error = %err, "reconciled mod list not saved");
            }
        }
        document
    }

    /// Flips a mod's state and returns the new one. A mod present only as
    /// an archive is added enabled.
    pub fn toggle_mod(&self, name: &str) -> ModResult<bool> {
        if name == BASE_MOD {
            return Err(ModError::Reserved(name.to_string()));
        }
        let mut document = self.read();
        let enabled = match document.find_mut(name) {
            Some(record) => {
                record.enabled = !record.enabled;
                record.enabled
            }
            None if self.has_archive(name) => {
                document.mods.push(ModRecord::new(name, true));
                true
            }
            None => return Err(ModError::NotFound(name.to_string())),
        };
        self.write(&document)?;
        info!(mod_name = name, enabled, "mod toggled");
        Ok(enabled)
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> ModResult<()> {
        if name == BASE_MOD {
            return if enabled {
                Ok(())
            } else {
                Err(ModError::Reserved(name.to_string()))
            };
        }
        let mut document = self.read();
        if !document.contains(name) && !self.has_archive(name) {
            return Err(ModError::NotFound(name.to_string()));
        }
        document.upsert(name, enabled);
        self.write(&document)
    }

    pub fn upsert(&self, name: &str, enabled: bool) -> ModResult<()> {
        let mut document = self.read();
        document.upsert(name, enabled);
        self.write(&document)
    }

    /// Enables every non-built-in mod, or disables them all when they are
    /// already all enabled. Returns the state applied.
    pub fn toggle_all(&self) -> ModResult<bool> {
        let mut document = self.get_mods();
        let all_enabled = document
            .mods
            .iter()
            .filter(|record| !is_builtin(&record.name))
            .all(|record| record.enabled);
        let enabled = !all_enabled;
        for record in document
            .mods
            .iter_mut()
            .filter(|record| !is_builtin(&record.name))
        {
            record.enabled = enabled;
        }
        self.write(&document)?;
        info!(enabled, "all mods toggled");
        Ok(enabled)
    }

    /// Drops the mod from the list and deletes its archives. Returns the
    /// deleted file names.
    pub fn remove_mod(&self, name: &str) -> ModResult<Vec<String>> {
        if name == BASE_MOD {
            return Err(ModError::Reserved(name.to_string()));
        }
        let mut document = self.read();
        if document.remove(name).is_none() {
            return Err(ModError::NotFound(name.to_string()));
        }
        self.write(&document)?;
        let mut deleted = Vec::new();
        for file_name in self.archives_of(name) {
            match self
                .files
                .delete_files(&self.mods_dir, std::slice::from_ref(&file_name))
            {
                Ok(()) => deleted.push(file_name),
                Err(err) => {
                    warn!(mod_name = name, file = %file_name, error = %err, "archive left behind")
                }
            }
        }
        info!(mod_name = name, files = deleted.len(), "mod removed");
        Ok(deleted)
    }

    /// Deletes every `name_<version>.zip`, failing on the first archive
    /// that cannot be removed. Archives of other mods sharing the prefix
    /// are left alone.
    pub fn remove_archives(&self, name: &str) -> ModResult<Vec<String>> {
        let targets = self.archives_of(name);
        if targets.is_empty() {
            return Ok(targets);
        }
        self.files.delete_files(&self.mods_dir, &targets)?;
        debug!(mod_name = name, files = ?targets, "archives deleted");
        Ok(targets)
    }

    fn archives_of(&self, name: &str) -> Vec<String> {
        self.installed_archives()
            .into_iter()
            .filter(|archive| archive.name == name)
            .map(|archive| archive.file_name)
            .collect()
    }

    fn has_archive(&self, name: &str) -> bool {
        self.installed_archives()
            .iter()
            .any(|archive| archive.name == name)
    }
}

fn default_true() -> bool {
    true
}
