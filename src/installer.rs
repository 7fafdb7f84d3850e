use crate::{
    dependency,
    error::{ModError, ModResult},
    mod_list::{is_builtin, ModListStore},
    models::Release,
    portal::{credentials_from_server_settings, Credentials, PortalClient},
    version::TargetPlatform,
};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

pub const SERVER_SETTINGS_PATH: &str = "data/server-settings.json";

/// Outcome of one install request, dependencies included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub installed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn mentions(&self, name: &str) -> bool {
        [&self.installed, &self.skipped, &self.failed]
            .into_iter()
            .any(|bucket| bucket.iter().any(|entry| entry == name))
    }

    fn fail(&mut self, name: &str) {
        if !self.failed.iter().any(|entry| entry == name) {
            self.failed.push(name.to_string());
        }
    }
}

struct Resolution<'a> {
    visited: &'a mut HashSet<String>,
    stack: Vec<String>,
    credentials: Option<Credentials>,
    report: InstallReport,
}

/// Depth-first installer: dependencies land before the mods needing them.
#[derive(Clone)]
pub struct Installer {
    portal: PortalClient,
    store: ModListStore,
    credentials: Option<Credentials>,
    server_settings_path: String,
}

impl Installer {
    pub fn new(portal: PortalClient, store: ModListStore) -> Self {
        Self {
            portal,
            store,
            credentials: None,
            server_settings_path: SERVER_SETTINGS_PATH.to_string(),
        }
    }

    /// Configured credentials win over the server's own settings file.
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials.filter(Credentials::is_complete);
        self
    }

    pub fn with_server_settings_path(mut self, path: &str) -> Self {
        self.server_settings_path = path.trim_start_matches('/').to_string();
        self
    }

    pub fn portal(&self) -> &PortalClient {
        &self.portal
    }

    pub fn store(&self) -> &ModListStore {
        &self.store
    }

    pub fn credentials(&self) -> Option<Credentials> {
        if let Some(credentials) = &self.credentials {
            return Some(credentials.clone());
        }
        match self.store.files().get_content(&self.server_settings_path) {
            Ok(raw) => {
                let credentials = credentials_from_server_settings(&raw);
                if credentials.is_none() {
                    warn!(
                        path = %self.server_settings_path,
                        "server settings carry no username/token"
                    );
                }
                credentials
            }
            Err(err) => {
                warn!(path = %self.server_settings_path, error = %err, "cannot read server settings");
                None
            }
        }
    }

    /// Installs `name` (at `version`, or its newest release) after its
    /// missing required dependencies. Names already in `visited` are
    /// reported as skipped.
    pub fn install(
        &self,
        name: &str,
        enabled: bool,
        version: Option<&str>,
        visited: &mut HashSet<String>,
    ) -> InstallReport {
        let mut resolution = Resolution {
            visited,
            stack: Vec::new(),
            credentials: self.credentials(),
            report: InstallReport::default(),
        };
        self.resolve(name, enabled, version, &mut resolution);
        let report = resolution.report;
        info!(
            mod_name = name,
            installed = report.installed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "install finished"
        );
        report
    }

    /// Installs the newest release that runs on `target`.
    pub fn install_latest_compatible(
        &self,
        name: &str,
        enabled: bool,
        target: &TargetPlatform,
    ) -> ModResult<InstallReport> {
        let release = self
            .portal
            .get_mod_details(name, true)?
            .newest_compatible_release(target)
            .ok_or_else(|| {
                ModError::NotFound(format!("a release of {name} for Factorio {}", target.label()))
            })?;
        Ok(self.install(name, enabled, Some(&release.version), &mut HashSet::new()))
    }

    fn resolve(&self, name: &str, enabled: bool, version: Option<&str>, state: &mut Resolution) {
        if state.visited.contains(name) {
            if !state.report.mentions(name) {
                state.report.skipped.push(name.to_string());
            }
            return;
        }
        if state.report.failed.iter().any(|failed| failed == name) {
            debug!(mod_name = name, "already failed in this run");
            return;
        }
        if state.stack.iter().any(|entry| entry == name) {
            debug!(mod_name = name, "dependency cycle, already being installed");
            return;
        }

        state.stack.push(name.to_string());
        self.resolve_inner(name, enabled, version, state);
        state.stack.pop();
    }

    fn resolve_inner(&self, name: &str, enabled: bool, version: Option<&str>, state: &mut Resolution) {
        let details = match self.portal.get_mod_details(name, true) {
            Ok(details) => details,
            Err(err) => {
                error!(mod_name = name, error = %err, "cannot resolve mod");
                state.report.fail(name);
                return;
            }
        };
        let release = match version {
            Some(version) => details.release(version),
            None => details.newest_release(),
        };
        let Some(release) = release else {
            error!(mod_name = name, version, "no matching release");
            state.report.fail(name);
            return;
        };

        for dependency in dependency::required(&release.info_json.dependencies) {
            if is_builtin(&dependency.name) {
                continue;
            }
            if self.store.read().contains(&dependency.name) {
                debug!(mod_name = name, dependency = %dependency.name, "dependency already present");
                continue;
            }
            self.resolve(&dependency.name, true, None, state);
        }

        let (Some(_), Some(_)) = (&release.download_url, &release.file_name) else {
            error!(mod_name = name, version = %release.version, "release has no download metadata");
            state.report.fail(name);
            return;
        };
        self.transfer(name, &release, state.credentials.as_ref());

        if let Err(err) = self.store.upsert(name, enabled) {
            error!(mod_name = name, error = %err, "mod not registered");
            state.report.fail(name);
            return;
        }
        state.visited.insert(name.to_string());
        state.report.installed.push(name.to_string());
        info!(mod_name = name, version = %release.version, enabled, "mod installed");
    }

    /// Download then upload. Failures are logged; registration continues.
    fn transfer(&self, name: &str, release: &Release, credentials: Option<&Credentials>) {
        let (Some(path), Some(file_name)) = (&release.download_url, &release.file_name) else {
            return;
        };
        if credentials.is_none() {
            warn!(mod_name = name, "downloading without portal credentials");
        }
        let result = self
            .portal
            .download_url(path, credentials)
            .and_then(|url| self.portal.fetch_archive(&url))
            .and_then(|bytes| {
                self.store
                    .files()
                    .put_content(&self.store.archive_path(file_name), &bytes)
                    .map_err(ModError::from)
            });
        match result {
            Ok(()) => debug!(mod_name = name, file_name, "archive uploaded"),
            Err(ModError::Unauthorized) => {
                warn!(mod_name = name, "portal refused the download, registering anyway")
            }
            Err(err) => warn!(mod_name = name, error = %err, "archive not uploaded"),
        }
    }
}
