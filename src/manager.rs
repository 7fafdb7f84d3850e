use crate::{
    cache::CacheStats,
    dependency::{self, DependencySpec},
    error::{ModError, ModResult},
    installer::{InstallReport, Installer},
    mod_list::{installed_version, is_builtin, ModListStore, ModRecord},
    models::{ModDetails, SearchResult, SortField, SortOrder, VersionOption},
    portal::{Credentials, PortalClient},
    update::{enrich_record, BatchReport, UpdateDetector, UpdateInfo},
    version::TargetPlatform,
};
use serde::Serialize;
use std::{
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

/// Advisory findings when a mod is switched on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnableIssue {
    IncompatiblePlatform { required: String, target: String },
    MissingDependency { name: String },
    DisabledDependency { name: String },
}

impl fmt::Display for EnableIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnableIssue::IncompatiblePlatform { required, target } => {
                write!(f, "built for Factorio {required}, server runs {target}")
            }
            EnableIssue::MissingDependency { name } => write!(f, "requires {name}, not installed"),
            EnableIssue::DisabledDependency { name } => write!(f, "requires {name}, currently disabled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleOutcome {
    pub name: String,
    pub enabled: bool,
    pub issues: Vec<EnableIssue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModDetailView {
    pub details: ModDetails,
    pub dependencies: Vec<DependencySpec>,
    pub latest_compatible: Option<String>,
    pub thumbnail_url: Option<String>,
    pub installed: bool,
    pub enabled: bool,
}

/// The operations a panel or CLI drives. Everything goes through the
/// shared portal cache and the server's mod list.
#[derive(Clone)]
pub struct ModManager {
    portal: PortalClient,
    store: ModListStore,
    installer: Installer,
    updates: UpdateDetector,
    target: TargetPlatform,
}

impl ModManager {
    pub fn new(portal: PortalClient, store: ModListStore, target: TargetPlatform) -> Self {
        let installer = Installer::new(portal.clone(), store.clone());
        Self::assemble(portal, store, installer, target)
    }

    pub fn with_credentials(self, credentials: Option<Credentials>) -> Self {
        let installer = self.installer.with_credentials(credentials);
        Self::assemble(self.portal, self.store, installer, self.target)
    }

    pub fn with_server_settings_path(self, path: &str) -> Self {
        let installer = self.installer.with_server_settings_path(path);
        Self::assemble(self.portal, self.store, installer, self.target)
    }

    fn assemble(
        portal: PortalClient,
        store: ModListStore,
        installer: Installer,
        target: TargetPlatform,
    ) -> Self {
        let updates = UpdateDetector::new(installer.clone(), target);
        Self {
            portal,
            store,
            installer,
            updates,
            target,
        }
    }

    pub fn target(&self) -> &TargetPlatform {
        &self.target
    }

    pub fn portal(&self) -> &PortalClient {
        &self.portal
    }

    pub fn store(&self) -> &ModListStore {
        &self.store
    }

    /// Installed mods without the built-ins. With `with_portal` each record
    /// also gets its title, summary and latest compatible version.
    pub fn list_installed(&self, with_portal: bool) -> Vec<ModRecord> {
        let archives = self.store.installed_archives();
        let mut records: Vec<ModRecord> = self
            .store
            .get_mods()
            .mods
            .into_iter()
            .filter(|record| !is_builtin(&record.name))
            .collect();
        for record in &mut records {
            let details = if with_portal {
                self.portal
                    .get_mod_details(&record.name, true)
                    .inspect_err(|err| {
                        warn!(mod_name = %record.name, error = %err, "no portal data for mod")
                    })
                    .ok()
            } else {
                None
            };
            enrich_record(record, &archives, details.as_ref(), &self.target);
        }
        records
    }

    /// Portal search, optionally narrowed to mods whose latest release
    /// runs on this server.
    pub fn browse(
        &self,
        query: Option<&str>,
        category: Option<&str>,
        sort: SortField,
        order: SortOrder,
        limit: usize,
        compatible_only: bool,
    ) -> ModResult<SearchResult> {
        let mut result = self.portal.search_mods(query, category, sort, order, limit)?;
        if compatible_only {
            result.results.retain(|summary| {
                summary
                    .latest_release
                    .as_ref()
                    .map_or(true, |release| release.is_compatible_with(&self.target))
            });
        }
        Ok(result)
    }

    pub fn mod_detail(&self, name: &str) -> ModResult<ModDetailView> {
        let details = self.portal.get_mod_details(name, true)?;
        let latest_compatible = details.newest_compatible_release(&self.target);
        let shown = latest_compatible
            .clone()
            .or_else(|| details.newest_release());
        let dependencies = shown
            .map(|release| dependency::parse_all(&release.info_json.dependencies))
            .unwrap_or_default();
        let document = self.store.read();
        Ok(ModDetailView {
            thumbnail_url: self.portal.thumbnail_url(details.thumbnail.as_deref()),
            latest_compatible: latest_compatible.map(|release| release.version),
            installed: document.contains(name),
            enabled: document.is_enabled(name),
            dependencies,
            details,
        })
    }

    pub fn available_versions(&self, name: &str) -> ModResult<Vec<VersionOption>> {
        self.portal.available_versions(name, &self.target)
    }

    /// Without a version the newest release compatible with the server is
    /// chosen.
    pub fn install(&self, name: &str, version: Option<&str>, enabled: bool) -> ModResult<InstallReport> {
        if is_builtin(name) {
            return Err(ModError::Reserved(name.to_string()));
        }
        match version {
            Some(version) => Ok(self
                .installer
                .install(name, enabled, Some(version), &mut HashSet::new())),
            None => self
                .installer
                .install_latest_compatible(name, enabled, &self.target),
        }
    }

    pub fn toggle(&self, name: &str) -> ModResult<ToggleOutcome> {
        let enabled = self.store.toggle_mod(name)?;
        Ok(self.outcome(name, enabled))
    }

    /// Like `toggle`, but idempotent.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> ModResult<ToggleOutcome> {
        self.store.set_enabled(name, enabled)?;
        Ok(self.outcome(name, enabled))
    }

    fn outcome(&self, name: &str, enabled: bool) -> ToggleOutcome {
        let issues = if enabled {
            self.enable_issues(name)
        } else {
            Vec::new()
        };
        for issue in &issues {
            warn!(mod_name = name, %issue, "enabled with unmet requirement");
        }
        ToggleOutcome {
            name: name.to_string(),
            enabled,
            issues,
        }
    }

    /// Checks the installed release against the server platform and the
    /// mod list. Portal failures yield no issues.
    pub fn enable_issues(&self, name: &str) -> Vec<EnableIssue> {
        let details = match self.portal.get_mod_details(name, true) {
            Ok(details) => details,
            Err(err) => {
                warn!(mod_name = name, error = %err, "cannot check requirements");
                return Vec::new();
            }
        };
        let installed = installed_version(name, &self.store.installed_archives());
        let release = installed
            .as_deref()
            .and_then(|version| details.release(version))
            .or_else(|| details.newest_release());
        let Some(release) = release else {
            return Vec::new();
        };

        let mut issues = Vec::new();
        if !release.is_compatible_with(&self.target) {
            issues.push(EnableIssue::IncompatiblePlatform {
                required: release.factorio_version().unwrap_or_default().to_string(),
                target: self.target.label(),
            });
        }
        let document = self.store.read();
        for dependency in dependency::required(&release.info_json.dependencies) {
            if is_builtin(&dependency.name) {
                continue;
            }
            match document.find(&dependency.name) {
                None => issues.push(EnableIssue::MissingDependency {
                    name: dependency.name,
                }),
                Some(record) if !record.enabled => issues.push(EnableIssue::DisabledDependency {
                    name: dependency.name,
                }),
                Some(_) => {}
            }
        }
        issues
    }

    pub fn toggle_all(&self) -> ModResult<bool> {
        self.store.toggle_all()
    }

    pub fn remove(&self, name: &str) -> ModResult<Vec<String>> {
        self.store.remove_mod(name)
    }

    /// Always asks the portal afresh.
    pub fn check_for_updates(&self) -> Vec<UpdateInfo> {
        self.portal.clear_cache();
        self.updates.check_for_updates()
    }

    pub fn update_one(&self, name: &str) -> ModResult<InstallReport> {
        self.updates.update_one(name)
    }

    pub fn update_all(&self) -> BatchReport {
        self.portal.clear_cache();
        self.updates.update_all()
    }

    pub fn refresh_cache(&self) -> CacheStats {
        self.portal.clear_cache();
        self.portal.cache_stats()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.portal.cache_stats()
    }

    /// Saves a release archive into `directory`, named as the portal names it.
    pub fn download(&self, name: &str, version: Option<&str>, directory: &Path) -> ModResult<PathBuf> {
        let details = self.portal.get_mod_details(name, true)?;
        let release = match version {
            Some(version) => details.release(version),
            None => details.newest_compatible_release(&self.target),
        }
        .ok_or_else(|| ModError::NotFound(format!("a matching release of {name}")))?;
        let (Some(url), Some(file_name)) = (&release.download_url, &release.file_name) else {
            return Err(ModError::Malformed(format!(
                "{name} {} has no download metadata",
                release.version
            )));
        };
        let destination = directory.join(file_name);
        let credentials = self.installer.credentials();
        self.portal
            .download_mod(url, &destination, credentials.as_ref())?;
        info!(mod_name = name, version = %release.version, "release saved locally");
        Ok(destination)
    }
}
