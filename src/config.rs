use crate::{
    access::ServerProfile,
    cache::CacheTtls,
    installer::SERVER_SETTINGS_PATH,
    mod_list::{DEFAULT_LIST_FILE, DEFAULT_MODS_DIR},
    portal::{Credentials, PortalSettings, DEFAULT_ASSETS_URL, DEFAULT_PORTAL_URL},
    version::{TargetPlatform, DEFAULT_GAME_VERSION},
};
use anyhow::{bail, Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::warn;
use url::Url;

const CONFIG_FILE: &str = "config.json";
const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_server_root")]
    pub server_root: PathBuf,
    #[serde(default = "default_mods_dir")]
    pub mods_dir: String,
    #[serde(default = "default_mod_list_file")]
    pub mod_list_file: String,
    #[serde(default = "default_server_settings_path")]
    pub server_settings_path: String,
    #[serde(default = "default_portal_url")]
    pub portal_url: String,
    #[serde(default = "default_assets_url")]
    pub assets_url: String,
    #[serde(default = "default_game_version")]
    pub game_version: String,
    #[serde(default)]
    pub experimental: bool,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub cache: CacheTtls,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_max_search_pages")]
    pub max_search_pages: u32,
    #[serde(default = "ServerProfile::factorio")]
    pub server: ServerProfile,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_root: default_server_root(),
            mods_dir: default_mods_dir(),
            mod_list_file: default_mod_list_file(),
            server_settings_path: default_server_settings_path(),
            portal_url: default_portal_url(),
            assets_url: default_assets_url(),
            game_version: default_game_version(),
            experimental: false,
            credentials: None,
            cache: CacheTtls::default(),
            request_timeout_secs: default_request_timeout(),
            download_timeout_secs: default_download_timeout(),
            max_search_pages: default_max_search_pages(),
            server: ServerProfile::factorio(),
        }
    }
}

impl AppConfig {
    pub fn load_or_create_in(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).context("create app data dir")?;
        let path = dir.join(CONFIG_FILE);
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read app config")?;
            let config: AppConfig = serde_json::from_str(&raw).context("parse app config")?;
            return Ok(config);
        }

        let config = AppConfig::default();
        config.save_in(dir)?;
        Ok(config)
    }

    pub fn save_in(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).context("create app data dir")?;
        let raw = serde_json::to_string_pretty(self).context("serialize app config")?;
        fs::write(dir.join(CONFIG_FILE), raw).context("write app config")?;
        Ok(())
    }

    pub fn apply_env(&mut self) {
        self.apply_env_overrides(|key| std::env::var(key).ok());
    }

    /// `FACTORIO_*` variables override the stored file. Unparseable numbers
    /// are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(value) = lookup("FACTORIO_MODS_DIR") {
            self.mods_dir = value;
        }
        if let Some(value) = lookup("FACTORIO_MOD_LIST_FILE") {
            self.mod_list_file = value;
        }
        if let Some(value) = lookup("FACTORIO_API_BASE_URL") {
            self.portal_url = value;
        }
        if let Some(secs) = parse_secs(lookup("FACTORIO_CACHE_MOD_DETAILS"), "FACTORIO_CACHE_MOD_DETAILS") {
            self.cache.details_secs = secs;
        }
        if let Some(secs) = parse_secs(
            lookup("FACTORIO_CACHE_SEARCH_RESULTS"),
            "FACTORIO_CACHE_SEARCH_RESULTS",
        ) {
            self.cache.search_secs = secs;
            self.cache.mod_list_secs = secs;
        }
        if let Some(value) = lookup("FACTORIO_VERSION") {
            let target = TargetPlatform::from_server_variable(Some(&value));
            self.game_version = target.version.to_string();
            self.experimental = target.experimental;
        }
        if let (Some(username), Some(token)) = (lookup("FACTORIO_USERNAME"), lookup("FACTORIO_TOKEN")) {
            self.credentials = Some(Credentials::new(username, token));
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (label, raw) in [("portal_url", &self.portal_url), ("assets_url", &self.assets_url)] {
            let url = Url::parse(raw).with_context(|| format!("parse {label} {raw}"))?;
            if url.cannot_be_a_base() {
                bail!("{label} {raw} is not a base url");
            }
        }
        if self.mods_dir.trim().is_empty() || self.mod_list_file.trim().is_empty() {
            bail!("mods_dir and mod_list_file must not be empty");
        }
        for (label, secs) in [
            ("request_timeout_secs", self.request_timeout_secs),
            ("download_timeout_secs", self.download_timeout_secs),
        ] {
            if secs == 0 || secs > MAX_TIMEOUT_SECS {
                bail!("{label} must be between 1 and {MAX_TIMEOUT_SECS}, got {secs}");
            }
        }
        Ok(())
    }

    pub fn target(&self) -> TargetPlatform {
        if self.experimental {
            TargetPlatform::experimental(&self.game_version)
        } else {
            TargetPlatform::stable(&self.game_version)
        }
    }

    pub fn portal_settings(&self) -> PortalSettings {
        PortalSettings {
            base_url: self.portal_url.clone(),
            assets_url: self.assets_url.clone(),
            ttls: self.cache,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            download_timeout: Duration::from_secs(self.download_timeout_secs),
            max_search_pages: self.max_search_pages,
        }
    }
}

fn parse_secs(raw: Option<String>, key: &str) -> Option<u64> {
    let raw = raw?;
    match raw.trim().parse::<u64>() {
        Ok(secs) => Some(secs),
        Err(err) => {
            warn!(key, value = %raw, error = %err, "ignoring invalid cache ttl");
            None
        }
    }
}

pub fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("factorio-modkit"))
}

fn default_server_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_mods_dir() -> String {
    DEFAULT_MODS_DIR.to_string()
}

fn default_mod_list_file() -> String {
    DEFAULT_LIST_FILE.to_string()
}

fn default_server_settings_path() -> String {
    SERVER_SETTINGS_PATH.to_string()
}

fn default_portal_url() -> String {
    DEFAULT_PORTAL_URL.to_string()
}

fn default_assets_url() -> String {
    DEFAULT_ASSETS_URL.to_string()
}

fn default_game_version() -> String {
    DEFAULT_GAME_VERSION.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_download_timeout() -> u64 {
    120
}

fn default_max_search_pages() -> u32 {
    30
}
