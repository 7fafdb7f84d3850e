use crate::{
    cache::{CacheKey, CacheStats, CacheTtls, CachedValue, PortalCache},
    error::{ModError, ModResult},
    models::{
        sort_newest_first, sort_summaries, ModDetails, ModPage, ModSummary, Pagination, Release,
        SearchResult, SortField, SortOrder, VersionOption,
    },
    version::TargetPlatform,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs,
    io::{Cursor, Read},
    path::Path,
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_PORTAL_URL: &str = "https://mods.factorio.com";
pub const DEFAULT_ASSETS_URL: &str = "https://assets-mod.factorio.com";
const USER_AGENT: &str = concat!("factorio-modkit/", env!("CARGO_PKG_VERSION"));
const SEARCH_PAGE_SIZE: u32 = 100;
const MAX_BODY_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
#[error("request to {url} failed: {message}")]
pub struct TransportError {
    pub url: String,
    pub message: String,
}

/// Blocking GET. Non-2xx answers are responses, not errors; only
/// connection-level failures are `Err`.
pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, TransportError>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .user_agent(USER_AGENT)
            .build();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl HttpTransport for UreqTransport {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, TransportError> {
        let response = match self.agent.get(url).timeout(timeout).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(err)) => {
                return Err(TransportError {
                    url: redact(url),
                    message: err.to_string(),
                })
            }
        };
        let status = response.status();
        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut body)
            .map_err(|err| TransportError {
                url: redact(url),
                message: err.to_string(),
            })?;
        Ok(HttpResponse { status, body })
    }
}

/// Drops the query string so tokens never reach the logs.
fn redact(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_string()
}

/// Portal account used to authorize downloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub token: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.token.trim().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PortalSettings {
    pub base_url: String,
    pub assets_url: String,
    pub ttls: CacheTtls,
    pub request_timeout: Duration,
    pub download_timeout: Duration,
    pub max_search_pages: u32,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PORTAL_URL.to_string(),
            assets_url: DEFAULT_ASSETS_URL.to_string(),
            ttls: CacheTtls::default(),
            request_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(120),
            max_search_pages: 30,
        }
    }
}

/// Cached client for the mod portal. Clones share the transport and cache.
#[derive(Clone)]
pub struct PortalClient {
    transport: Arc<dyn HttpTransport>,
    cache: Arc<PortalCache>,
    settings: PortalSettings,
}

impl PortalClient {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: PortalSettings) -> Self {
        Self {
            transport,
            cache: Arc::new(PortalCache::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &PortalSettings {
        &self.settings
    }

    pub fn search_mods(
        &self,
        query: Option<&str>,
        category: Option<&str>,
        sort: SortField,
        order: SortOrder,
        limit: usize,
    ) -> ModResult<SearchResult> {
        let query = normalize(query);
        let category = normalize(category);
        let key = CacheKey::Search {
            query: query.clone(),
            category: category.clone(),
            sort,
            order,
            limit,
        };
        if let Some(CachedValue::Search(result)) = self.cache.get(&key) {
            debug!(?query, ?category, "search served from cache");
            return Ok(result);
        }

        if query.is_none() && category.is_none() {
            let (result, complete) = self.popular_up_to(limit)?;
            if complete {
                self.store(key, CachedValue::Search(result.clone()));
            }
            return Ok(result);
        }

        let needle = query.as_deref().map(str::to_lowercase);
        let mut matched: Vec<ModSummary> = Vec::new();
        let mut complete = true;
        let max_pages = self.settings.max_search_pages.max(1);
        for page_number in 1..=max_pages {
            let page = match self.fetch_page(page_number, SEARCH_PAGE_SIZE, sort, order) {
                Ok(page) => page,
                Err(err) if page_number == 1 => return Err(err),
                Err(err) => {
                    warn!(page = page_number, error = %err, "search stopped early");
                    complete = false;
                    break;
                }
            };
            let last_page = page.results.is_empty() || page_number >= page.pagination.page_count;
            matched.extend(page.results.into_iter().filter(|summary| {
                needle.as_deref().map_or(true, |needle| summary.matches(needle))
                    && category
                        .as_deref()
                        .map_or(true, |category| summary.in_category(category))
            }));
            if last_page {
                break;
            }
        }

        sort_summaries(&mut matched, sort, order);
        let count = matched.len() as u64;
        matched.truncate(limit);
        let result = SearchResult {
            pagination: Pagination {
                count,
                page: 1,
                page_count: 1,
                page_size: limit as u32,
            },
            results: matched,
        };
        if complete {
            self.store(key, CachedValue::Search(result.clone()));
        }
        info!(
            ?query,
            ?category,
            matches = result.pagination.count,
            "portal search finished"
        );
        Ok(result)
    }

    /// One page of the catalogue ordered by downloads.
    pub fn get_popular_mods(&self, page: u32, page_size: u32) -> ModResult<ModPage> {
        let mut result = self.fetch_page(page, page_size, SortField::Downloads, SortOrder::Desc)?;
        sort_summaries(&mut result.results, SortField::Downloads, SortOrder::Desc);
        Ok(result)
    }

    /// Popular mods across as many pages as `limit` needs, within
    /// `max_search_pages`. The flag is false when a later page failed.
    fn popular_up_to(&self, limit: usize) -> ModResult<(SearchResult, bool)> {
        let page_size = limit.clamp(1, SEARCH_PAGE_SIZE as usize) as u32;
        let mut result = self.get_popular_mods(1, page_size)?;
        let wanted_pages = limit
            .div_ceil(page_size as usize)
            .min(self.settings.max_search_pages.max(1) as usize) as u32;
        let last_page = wanted_pages.min(result.pagination.page_count);
        let mut complete = true;
        for page_number in 2..=last_page {
            if result.results.len() >= limit {
                break;
            }
            match self.get_popular_mods(page_number, page_size) {
                Ok(page) if page.results.is_empty() => break,
                Ok(page) => result.results.extend(page.results),
                Err(err) => {
                    warn!(page = page_number, error = %err, "popular listing stopped early");
                    complete = false;
                    break;
                }
            }
        }
        result.results.truncate(limit);
        Ok((result, complete))
    }

    pub fn get_mods_by_category(&self, category: &str, limit: usize) -> ModResult<SearchResult> {
        self.search_mods(
            None,
            Some(category),
            SortField::Downloads,
            SortOrder::Desc,
            limit,
        )
    }

    pub fn fetch_page(
        &self,
        page: u32,
        page_size: u32,
        sort: SortField,
        order: SortOrder,
    ) -> ModResult<ModPage> {
        let key = CacheKey::ModPage {
            page,
            page_size,
            sort,
            order,
        };
        if let Some(CachedValue::Page(cached)) = self.cache.get(&key) {
            return Ok(cached);
        }

        let mut url = self.api_url(&[])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("page", &page.to_string())
                .append_pair("page_size", &page_size.to_string())
                .append_pair("hide_deprecated", "true");
            if let Some(field) = sort.api_param() {
                query
                    .append_pair("sort", field)
                    .append_pair("sort_order", order.as_str());
            }
        }
        let response = self.request(&url, self.settings.request_timeout)?;
        if response.status != 200 {
            warn!(page, status = response.status, "mod list page unavailable");
            return Err(ModError::Transient(format!(
                "mod list page {page} returned {}",
                response.status
            )));
        }
        let result: ModPage = decode(&response.body, "mod list page")?;
        self.store(key, CachedValue::Page(result.clone()));
        Ok(result)
    }

    pub fn get_mod_details(&self, name: &str, full: bool) -> ModResult<ModDetails> {
        let key = CacheKey::Details {
            name: name.to_string(),
            full,
        };
        if let Some(CachedValue::Details(details)) = self.cache.get(&key) {
            debug!(mod_name = name, full, "details served from cache");
            return Ok(details);
        }

        let url = if full {
            self.api_url(&[name, "full"])?
        } else {
            self.api_url(&[name])?
        };
        let response = self.request(&url, self.settings.request_timeout)?;
        match response.status {
            200 => {}
            404 => {
                warn!(mod_name = name, "mod not found on portal");
                return Err(ModError::NotFound(name.to_string()));
            }
            status => {
                warn!(mod_name = name, status, "mod details unavailable");
                return Err(ModError::Transient(format!(
                    "details for {name} returned {status}"
                )));
            }
        }
        let details: ModDetails = decode(&response.body, name).inspect_err(|err| {
            warn!(mod_name = name, error = %err, "undecodable mod details");
        })?;
        self.store(key, CachedValue::Details(details.clone()));
        Ok(details)
    }

    pub fn get_latest_release(&self, name: &str) -> ModResult<Release> {
        self.get_mod_details(name, true)?
            .newest_release()
            .ok_or_else(|| ModError::NotFound(format!("a release of {name}")))
    }

    pub fn get_mod_release(&self, name: &str, version: &str) -> ModResult<Release> {
        self.get_mod_details(name, true)?
            .release(version)
            .ok_or_else(|| ModError::NotFound(format!("{name} {version}")))
    }

    /// Every release, newest first, flagged against `target`.
    pub fn available_versions(
        &self,
        name: &str,
        target: &TargetPlatform,
    ) -> ModResult<Vec<VersionOption>> {
        let mut releases = self.get_mod_details(name, true)?.releases;
        sort_newest_first(&mut releases);
        Ok(releases
            .into_iter()
            .map(|release| VersionOption {
                is_compatible: release.is_compatible_with(target),
                factorio_version: release.info_json.factorio_version,
                released_at: release.released_at,
                version: release.version,
            })
            .collect())
    }

    /// Resolves a release's `download_url` against the portal and attaches
    /// credentials when both halves are present.
    pub fn download_url(&self, path: &str, credentials: Option<&Credentials>) -> ModResult<Url> {
        let base = self.base_url()?;
        let mut url = base
            .join(path)
            .map_err(|err| ModError::Malformed(format!("download path {path}: {err}")))?;
        if let Some(credentials) = credentials.filter(|creds| creds.is_complete()) {
            url.query_pairs_mut()
                .append_pair("username", &credentials.username)
                .append_pair("token", &credentials.token);
        }
        Ok(url)
    }

    /// Downloads a mod archive and checks it really is one.
    pub fn fetch_archive(&self, url: &Url) -> ModResult<Vec<u8>> {
        let response = self.request(url, self.settings.download_timeout)?;
        match response.status {
            200..=299 => {}
            401 | 403 => {
                warn!(path = url.path(), status = response.status, "download refused");
                return Err(ModError::Unauthorized);
            }
            404 => return Err(ModError::NotFound(url.path().to_string())),
            status => {
                warn!(path = url.path(), status, "download failed");
                return Err(ModError::Transient(format!(
                    "download of {} returned {status}",
                    url.path()
                )));
            }
        }
        validate_archive(&response.body)?;
        debug!(path = url.path(), bytes = response.body.len(), "archive downloaded");
        Ok(response.body)
    }

    /// Fetches a portal download path into a local file. Returns the byte count.
    pub fn download_mod(
        &self,
        url: &str,
        destination: &Path,
        credentials: Option<&Credentials>,
    ) -> ModResult<u64> {
        let url = self.download_url(url, credentials)?;
        let bytes = self.fetch_archive(&url)?;
        if let Some(parent) = destination.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|err| ModError::Persistence(format!("{}: {err}", parent.display())))?;
        }
        fs::write(destination, &bytes)
            .map_err(|err| ModError::Persistence(format!("{}: {err}", destination.display())))?;
        info!(destination = %destination.display(), bytes = bytes.len(), "mod downloaded");
        Ok(bytes.len() as u64)
    }

    pub fn thumbnail_url(&self, path: Option<&str>) -> Option<String> {
        let path = path.map(str::trim).filter(|path| !path.is_empty())?;
        if path.starts_with("http://") || path.starts_with("https://") {
            return Some(path.to_string());
        }
        let base = Url::parse(&self.settings.assets_url).ok()?;
        base.join(path).ok().map(String::from)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("portal cache cleared");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn store(&self, key: CacheKey, value: CachedValue) {
        let ttl = self.settings.ttls.for_class(key.class());
        self.cache.insert(key, value, ttl);
    }

    fn base_url(&self) -> ModResult<Url> {
        Url::parse(&self.settings.base_url)
            .map_err(|err| ModError::Config(format!("portal url {}: {err}", self.settings.base_url)))
    }

    fn api_url(&self, segments: &[&str]) -> ModResult<Url> {
        let mut url = self.base_url()?;
        url.path_segments_mut()
            .map_err(|_| ModError::Config(format!("{} cannot be a base url", self.settings.base_url)))?
            .pop_if_empty()
            .extend(["api", "mods"])
            .extend(segments);
        Ok(url)
    }

    fn request(&self, url: &Url, timeout: Duration) -> ModResult<HttpResponse> {
        self.transport.get(url.as_str(), timeout).map_err(|err| {
            warn!(error = %err, "portal request failed");
            ModError::Transient(err.to_string())
        })
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn decode<T: DeserializeOwned>(body: &[u8], what: &str) -> ModResult<T> {
    serde_json::from_slice(body).map_err(|err| ModError::Malformed(format!("{what}: {err}")))
}

/// The portal answers unauthenticated downloads with an HTML login page.
fn validate_archive(bytes: &[u8]) -> ModResult<()> {
    let archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| ModError::Malformed(format!("download is not a zip archive: {err}")))?;
    let has_info = archive
        .file_names()
        .any(|name| name == "info.json" || name.ends_with("/info.json"));
    if !has_info {
        return Err(ModError::Malformed(
            "archive has no info.json".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ServerSettingsFile {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

/// Reads `username`/`token` out of a `server-settings.json` payload.
pub fn credentials_from_server_settings(raw: &[u8]) -> Option<Credentials> {
    let settings: ServerSettingsFile = serde_json::from_slice(raw).ok()?;
    let credentials = Credentials::new(
        settings.username.unwrap_or_default(),
        settings.token.unwrap_or_default(),
    );
    credentials.is_complete().then_some(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        details_url, mod_archive, page_json, portal, summary_json, FakeRelease, FakeTransport,
        PORTAL,
    };
    use serde_json::json;

    #[test]
    fn details_are_cached_per_full_flag() {
        let transport = Arc::new(FakeTransport::new());
        transport.serve_mod("flib", &[FakeRelease::new("0.12.9", "1.1", "2023-05-02T17:15:42Z")]);
        let client = portal(&transport);

        let first = client.get_mod_details("flib", true).expect("details");
        let second = client.get_mod_details("flib", true).expect("details");
        assert_eq!(first, second);
        assert_eq!(transport.call_count(&details_url("flib")), 1);

        client.get_mod_details("flib", false).expect("short details");
        assert_eq!(transport.call_count(&format!("{PORTAL}/api/mods/flib")), 1);
        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn unbounded_details_ttl_keeps_entries() {
        let transport = Arc::new(FakeTransport::new());
        transport.serve_mod("flib", &[FakeRelease::new("0.12.9", "1.1", "2023-05-02T17:15:42Z")]);
        let settings = PortalSettings {
            ttls: CacheTtls {
                details_secs: u64::MAX,
                ..CacheTtls::default()
            },
            ..PortalSettings::default()
        };
        let client = PortalClient::new(transport.clone(), settings);

        client.get_mod_details("flib", true).expect("details");
        client.get_mod_details("flib", true).expect("cached details");
        assert_eq!(transport.call_count(&details_url("flib")), 1);
    }

    #[test]
    fn missing_mod_is_not_found_and_not_cached() {
        let transport = Arc::new(FakeTransport::new());
        let client = portal(&transport);
        let err = client.get_mod_details("ghost", true).unwrap_err();
        assert!(err.is_not_found());
        let _ = client.get_mod_details("ghost", true);
        assert_eq!(transport.call_count(&details_url("ghost")), 2);
    }

    #[test]
    fn server_errors_and_garbage_are_typed() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(&details_url("busy"), 503, "unavailable");
        transport.respond(&details_url("junk"), 200, "<html>");
        transport.fail(&details_url("offline"));
        let client = portal(&transport);

        assert!(client.get_mod_details("busy", true).unwrap_err().is_transient());
        assert!(matches!(
            client.get_mod_details("junk", true),
            Err(ModError::Malformed(_))
        ));
        assert!(client.get_mod_details("offline", true).unwrap_err().is_transient());
        assert_eq!(client.cache_stats().entries, 0);
    }

    #[test]
    fn latest_release_ignores_array_order() {
        let transport = Arc::new(FakeTransport::new());
        transport.serve_mod(
            "rate-calculator",
            &[
                FakeRelease::new("3.0.0", "1.1", "2024-08-01T00:00:00Z"),
                FakeRelease::new("2.9.0", "1.1", "2023-01-01T00:00:00Z"),
                FakeRelease::new("3.1.0", "2.0", "2024-10-21T00:00:00Z"),
            ],
        );
        let client = portal(&transport);
        let latest = client.get_latest_release("rate-calculator").expect("latest");
        assert_eq!(latest.version, "3.1.0");
        let exact = client.get_mod_release("rate-calculator", "2.9.0").expect("exact");
        assert_eq!(exact.version, "2.9.0");
        assert!(client
            .get_mod_release("rate-calculator", "9.9.9")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn available_versions_flag_compatibility() {
        let transport = Arc::new(FakeTransport::new());
        transport.serve_mod(
            "flib",
            &[
                FakeRelease::new("0.12.9", "1.1", "2023-05-02T00:00:00Z"),
                FakeRelease::new("0.15.0", "2.0", "2024-10-21T00:00:00Z"),
            ],
        );
        let client = portal(&transport);
        let options = client
            .available_versions("flib", &TargetPlatform::stable("2.0"))
            .expect("versions");
        let rows: Vec<(&str, bool)> = options
            .iter()
            .map(|option| (option.version.as_str(), option.is_compatible))
            .collect();
        assert_eq!(rows, vec![("0.15.0", true), ("0.12.9", false)]);
    }

    #[test]
    fn search_filters_pages_and_caches_complete_results() {
        let transport = Arc::new(FakeTransport::new());
        let page_url = |page: u32| {
            format!("{PORTAL}/api/mods?page={page}&page_size=100&hide_deprecated=true")
        };
        transport.respond_json(
            &page_url(1),
            &page_json(
                1,
                2,
                vec![
                    summary_json("even-distribution", "Even Distribution", "tweaks", 900),
                    summary_json("helmod", "Helmod", "tweaks", 5000),
                ],
            ),
        );
        transport.respond_json(
            &page_url(2),
            &page_json(
                2,
                2,
                vec![summary_json("evenly-spaced", "Evenly Spaced Belts", "logistics", 50)],
            ),
        );
        let client = portal(&transport);

        let result = client
            .search_mods(Some("EVEN"), None, SortField::Downloads, SortOrder::Desc, 10)
            .expect("search");
        let names: Vec<&str> = result.results.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["even-distribution", "evenly-spaced"]);
        assert_eq!(result.pagination.count, 2);

        let by_category = client
            .search_mods(Some("even"), Some("logistics"), SortField::Downloads, SortOrder::Desc, 10)
            .expect("search");
        assert_eq!(by_category.results.len(), 1);

        client
            .search_mods(Some("even"), None, SortField::Downloads, SortOrder::Desc, 10)
            .expect("cached search");
        assert_eq!(transport.call_count(&page_url(1)), 1);
    }

    #[test]
    fn search_surfaces_first_page_failure() {
        let transport = Arc::new(FakeTransport::new());
        let client = portal(&transport);
        let err = client
            .search_mods(Some("x"), None, SortField::Downloads, SortOrder::Desc, 10)
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn partial_search_is_not_cached() {
        let transport = Arc::new(FakeTransport::new());
        let page_one = format!("{PORTAL}/api/mods?page=1&page_size=100&hide_deprecated=true");
        transport.respond_json(
            &page_one,
            &page_json(1, 3, vec![summary_json("alpha", "Alpha", "tweaks", 1)]),
        );
        let client = portal(&transport);
        for _ in 0..2 {
            let result = client
                .search_mods(Some("alpha"), None, SortField::Downloads, SortOrder::Desc, 10)
                .expect("partial search");
            assert_eq!(result.results.len(), 1);
        }
        assert_eq!(transport.call_count(&page_one), 1);
        let page_two = format!("{PORTAL}/api/mods?page=2&page_size=100&hide_deprecated=true");
        assert_eq!(transport.call_count(&page_two), 2);
    }

    #[test]
    fn empty_query_returns_popular_mods() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond_json(
            &format!("{PORTAL}/api/mods?page=1&page_size=2&hide_deprecated=true"),
            &page_json(
                1,
                10,
                vec![
                    summary_json("small", "Small", "tweaks", 3),
                    summary_json("big", "Big", "tweaks", 300),
                ],
            ),
        );
        let client = portal(&transport);
        let result = client
            .search_mods(Some("  "), None, SortField::Downloads, SortOrder::Desc, 2)
            .expect("popular");
        assert_eq!(result.results[0].name, "big");
    }

    #[test]
    fn popular_listing_pages_past_the_portal_page_size() {
        let transport = Arc::new(FakeTransport::new());
        let page_url =
            |page: u32| format!("{PORTAL}/api/mods?page={page}&page_size=100&hide_deprecated=true");
        let summaries = |from: u64, count: u64| {
            (from..from + count)
                .map(|n| summary_json(&format!("mod-{n}"), "Mod", "tweaks", 10_000 - n))
                .collect::<Vec<_>>()
        };
        transport.respond_json(&page_url(1), &page_json(1, 5, summaries(0, 100)));
        transport.respond_json(&page_url(2), &page_json(2, 5, summaries(100, 100)));
        let client = portal(&transport);

        let result = client
            .search_mods(None, None, SortField::Downloads, SortOrder::Desc, 150)
            .expect("popular");
        assert_eq!(result.results.len(), 150);
        assert_eq!(result.results[149].name, "mod-149");
        assert_eq!(transport.call_count(&page_url(3)), 0);
    }

    #[test]
    fn category_listing_filters_every_page() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond_json(
            &format!("{PORTAL}/api/mods?page=1&page_size=100&hide_deprecated=true"),
            &page_json(
                1,
                2,
                vec![
                    summary_json("belts", "Belts", "logistics", 50),
                    summary_json("tweak", "Tweak", "tweaks", 70),
                ],
            ),
        );
        transport.respond_json(
            &format!("{PORTAL}/api/mods?page=2&page_size=100&hide_deprecated=true"),
            &page_json(2, 2, vec![summary_json("trains", "Trains", "logistics", 90)]),
        );
        let client = portal(&transport);

        let result = client.get_mods_by_category("logistics", 10).expect("category");
        let names: Vec<&str> = result.results.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["trains", "belts"]);
        assert_eq!(result.pagination.count, 2);
    }

    #[test]
    fn download_url_appends_credentials() {
        let transport = Arc::new(FakeTransport::new());
        let client = portal(&transport);
        let creds = Credentials::new("engineer", "s3cret&x");
        let url = client
            .download_url("/download/flib/5f8e", Some(&creds))
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://mods.factorio.com/download/flib/5f8e?username=engineer&token=s3cret%26x"
        );
        let anonymous = client
            .download_url("/download/flib/5f8e", Some(&Credentials::new("engineer", "")))
            .expect("url");
        assert_eq!(anonymous.query(), None);
    }

    #[test]
    fn fetch_archive_maps_statuses_and_validates_payload() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(&format!("{PORTAL}/download/locked"), 403, "forbidden");
        transport.respond(&format!("{PORTAL}/download/login"), 200, "<html>login</html>");
        transport.respond(&format!("{PORTAL}/download/ok"), 200, mod_archive("ok", "1.0.0"));
        let client = portal(&transport);

        let locked = client.download_url("/download/locked", None).expect("url");
        assert!(matches!(client.fetch_archive(&locked), Err(ModError::Unauthorized)));
        let login = client.download_url("/download/login", None).expect("url");
        assert!(matches!(client.fetch_archive(&login), Err(ModError::Malformed(_))));
        let ok = client.download_url("/download/ok", None).expect("url");
        assert!(!client.fetch_archive(&ok).expect("archive").is_empty());
    }

    #[test]
    fn download_mod_writes_destination() {
        let dir = tempfile::tempdir().expect("tempdir");
        let transport = Arc::new(FakeTransport::new());
        transport.respond(&format!("{PORTAL}/download/flib"), 200, mod_archive("flib", "1.0.0"));
        let client = portal(&transport);
        let destination = dir.path().join("out/flib_1.0.0.zip");
        let written = client
            .download_mod("/download/flib", &destination, None)
            .expect("download");
        assert_eq!(fs::metadata(&destination).expect("file").len(), written);
    }

    #[test]
    fn clear_cache_forces_refetch() {
        let transport = Arc::new(FakeTransport::new());
        transport.serve_mod("flib", &[FakeRelease::new("0.12.9", "1.1", "2023-05-02T00:00:00Z")]);
        let client = portal(&transport);
        client.get_mod_details("flib", true).expect("details");
        client.clear_cache();
        assert!(client.cache_stats().last_refresh.is_some());
        client.get_mod_details("flib", true).expect("details");
        assert_eq!(transport.call_count(&details_url("flib")), 2);
    }

    #[test]
    fn thumbnails_resolve_against_assets_host() {
        let transport = Arc::new(FakeTransport::new());
        let client = portal(&transport);
        assert_eq!(
            client.thumbnail_url(Some("/assets/abc.thumb.png")).as_deref(),
            Some("https://assets-mod.factorio.com/assets/abc.thumb.png")
        );
        assert_eq!(client.thumbnail_url(None), None);
    }

    #[test]
    fn reads_credentials_from_server_settings() {
        let raw = json!({"name": "srv", "username": "engineer", "token": "abc"}).to_string();
        assert_eq!(
            credentials_from_server_settings(raw.as_bytes()),
            Some(Credentials::new("engineer", "abc"))
        );
        let blank = json!({"username": "", "token": "abc"}).to_string();
        assert_eq!(credentials_from_server_settings(blank.as_bytes()), None);
        assert_eq!(credentials_from_server_settings(b"not json"), None);
    }
}
