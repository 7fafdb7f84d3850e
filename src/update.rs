use crate::{
    error::{ModError, ModResult},
    installer::{InstallReport, Installer},
    mod_list::{installed_version, is_builtin, InstalledArchive, ModRecord},
    models::{sort_newest_first, ModDetails, Release},
    version::{is_newer_version, TargetPlatform},
};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateInfo {
    pub name: String,
    pub title: Option<String>,
    pub installed_version: String,
    pub latest_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

/// First release, newest by date, that runs on `target`. A newer release
/// for another platform does not hide an older compatible one.
pub fn latest_compatible_release(releases: &[Release], target: &TargetPlatform) -> Option<Release> {
    let mut releases = releases.to_vec();
    sort_newest_first(&mut releases);
    releases
        .into_iter()
        .find(|release| release.is_compatible_with(target))
}

pub fn detect_update(
    installed: &str,
    releases: &[Release],
    target: &TargetPlatform,
) -> Option<Release> {
    latest_compatible_release(releases, target)
        .filter(|candidate| is_newer_version(&candidate.version, installed))
}

/// Fills the display fields of `record` from disk and, when given, the portal.
pub fn enrich_record(
    record: &mut ModRecord,
    archives: &[InstalledArchive],
    details: Option<&ModDetails>,
    target: &TargetPlatform,
) {
    record.version = installed_version(&record.name, archives);
    let Some(details) = details else {
        return;
    };
    record.title = details.title.clone();
    record.summary = details.summary.clone();
    let candidate = latest_compatible_release(&details.releases, target);
    record.latest_version = candidate.map(|release| release.version);
    record.update_available = match (&record.version, &record.latest_version) {
        (Some(installed), Some(latest)) if is_newer_version(latest, installed) => {
            Some(latest.clone())
        }
        _ => None,
    };
}

/// Compares installed archives with the portal's latest compatible releases.
#[derive(Clone)]
pub struct UpdateDetector {
    installer: Installer,
    target: TargetPlatform,
}

impl UpdateDetector {
    pub fn new(installer: Installer, target: TargetPlatform) -> Self {
        Self { installer, target }
    }

    pub fn target(&self) -> &TargetPlatform {
        &self.target
    }

    pub fn check_for_updates(&self) -> Vec<UpdateInfo> {
        let store = self.installer.store();
        let archives = store.installed_archives();
        let mut updates = Vec::new();
        for record in store.get_mods().mods {
            if is_builtin(&record.name) {
                continue;
            }
            let Some(installed) = installed_version(&record.name, &archives) else {
                continue;
            };
            let details = match self.installer.portal().get_mod_details(&record.name, true) {
                Ok(details) => details,
                Err(err) => {
                    warn!(mod_name = %record.name, error = %err, "update check skipped");
                    continue;
                }
            };
            if let Some(candidate) = detect_update(&installed, &details.releases, &self.target) {
                updates.push(UpdateInfo {
                    name: record.name,
                    title: details.title,
                    installed_version: installed,
                    latest_version: candidate.version,
                });
            }
        }
        info!(updates = updates.len(), game = %self.target.label(), "update check finished");
        updates
    }

    /// Replaces the installed archive with the latest compatible release,
    /// keeping the mod's enabled state. Old archives go first; if they
    /// cannot be deleted nothing is downloaded.
    pub fn update_one(&self, name: &str) -> ModResult<InstallReport> {
        let store = self.installer.store();
        let installed = installed_version(name, &store.installed_archives())
            .ok_or_else(|| ModError::NotFound(format!("an installed archive of {name}")))?;
        let details = self.installer.portal().get_mod_details(name, true)?;
        let candidate = latest_compatible_release(&details.releases, &self.target).ok_or_else(|| {
            ModError::NotFound(format!("a release of {name} for Factorio {}", self.target.label()))
        })?;
        if !is_newer_version(&candidate.version, &installed) {
            info!(mod_name = name, version = %installed, "already up to date");
            return Ok(InstallReport {
                skipped: vec![name.to_string()],
                ..InstallReport::default()
            });
        }

        let enabled = store.read().find(name).map_or(true, |record| record.enabled);
        store.remove_archives(name)?;
        let report = self
            .installer
            .install(name, enabled, Some(&candidate.version), &mut HashSet::new());
        info!(
            mod_name = name,
            from = %installed,
            to = %candidate.version,
            ok = report.is_success(),
            "mod updated"
        );
        Ok(report)
    }

    pub fn update_all(&self) -> BatchReport {
        let mut batch = BatchReport::default();
        for update in self.check_for_updates() {
            match self.update_one(&update.name) {
                Ok(report) if report.installed.contains(&update.name) => {
                    batch.succeeded.push(update.name)
                }
                Ok(_) => batch.failed.push(update.name),
                Err(err) => {
                    warn!(mod_name = %update.name, error = %err, "update failed");
                    batch.failed.push(update.name);
                }
            }
        }
        batch
    }
}
