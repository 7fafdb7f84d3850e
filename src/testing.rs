//! Scripted portal and file-store doubles for unit tests.

use crate::{
    file_store::{DirEntry, FileStore, LocalFileStore, StoreError},
    portal::{HttpResponse, HttpTransport, PortalClient, PortalSettings, TransportError},
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{
    collections::{HashMap, HashSet},
    io::{Cursor, Write},
    path::Path,
    sync::Arc,
    time::Duration,
};

pub const PORTAL: &str = "https://mods.factorio.com";

pub fn details_url(name: &str) -> String {
    format!("{PORTAL}/api/mods/{name}/full")
}

pub fn download_url(name: &str, version: &str) -> String {
    format!("{PORTAL}/download/{name}/{version}")
}

/// Routes are matched on the full URL, then on the URL without its query.
/// Anything unrouted answers 404.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, HttpResponse>>,
    failures: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.routes.lock().insert(
            url.to_string(),
            HttpResponse {
                status,
                body: body.into(),
            },
        );
    }

    pub fn respond_json(&self, url: &str, value: &Value) {
        self.respond(url, 200, value.to_string());
    }

    pub fn fail(&self, url: &str) {
        self.failures.lock().insert(url.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|call| *call == url).count()
    }

    /// Serves details (full and short) plus one archive per release.
    pub fn serve_mod(&self, name: &str, releases: &[FakeRelease]) {
        let details = details_json(name, releases);
        self.respond_json(&details_url(name), &details);
        self.respond_json(&format!("{PORTAL}/api/mods/{name}"), &details);
        for release in releases {
            self.respond(
                &download_url(name, &release.version),
                200,
                mod_archive(name, &release.version),
            );
        }
    }
}

impl HttpTransport for FakeTransport {
    fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, TransportError> {
        self.calls.lock().push(url.to_string());
        let without_query = url.split('?').next().unwrap_or(url);
        if self.failures.lock().contains(url) {
            return Err(TransportError {
                url: url.to_string(),
                message: "connection refused".to_string(),
            });
        }
        let routes = self.routes.lock();
        Ok(routes
            .get(url)
            .or_else(|| routes.get(without_query))
            .cloned()
            .unwrap_or(HttpResponse {
                status: 404,
                body: b"{\"message\":\"Mod not found\"}".to_vec(),
            }))
    }
}

#[derive(Debug, Clone)]
pub struct FakeRelease {
    pub version: String,
    pub factorio_version: Option<String>,
    pub released_at: String,
    pub dependencies: Vec<String>,
}

impl FakeRelease {
    pub fn new(version: &str, factorio_version: &str, released_at: &str) -> Self {
        Self {
            version: version.to_string(),
            factorio_version: Some(factorio_version.to_string()),
            released_at: released_at.to_string(),
            dependencies: Vec::new(),
        }
    }

    pub fn deps(mut self, dependencies: &[&str]) -> Self {
        self.dependencies = dependencies.iter().map(|dep| dep.to_string()).collect();
        self
    }
}

pub fn release_json(name: &str, release: &FakeRelease) -> Value {
    let mut info = json!({ "dependencies": release.dependencies });
    if let Some(factorio_version) = &release.factorio_version {
        info["factorio_version"] = json!(factorio_version);
    }
    json!({
        "version": release.version,
        "released_at": release.released_at,
        "download_url": format!("/download/{name}/{}", release.version),
        "file_name": format!("{name}_{}.zip", release.version),
        "info_json": info,
    })
}

pub fn details_json(name: &str, releases: &[FakeRelease]) -> Value {
    json!({
        "name": name,
        "title": name.replace('-', " "),
        "owner": "tester",
        "summary": format!("The {name} mod"),
        "category": "tweaks",
        "downloads_count": 10,
        "releases": releases.iter().map(|release| release_json(name, release)).collect::<Vec<_>>(),
    })
}

pub fn summary_json(name: &str, title: &str, category: &str, downloads: u64) -> Value {
    json!({
        "name": name,
        "title": title,
        "owner": "tester",
        "summary": format!("{title} for your factory"),
        "category": category,
        "downloads_count": downloads,
    })
}

pub fn page_json(page: u32, page_count: u32, results: Vec<Value>) -> Value {
    json!({
        "pagination": {
            "count": results.len(),
            "page": page,
            "page_count": page_count,
            "page_size": 100,
        },
        "results": results,
    })
}

/// A minimal mod archive: `<name>_<version>/info.json`.
pub fn mod_archive(name: &str, version: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    writer
        .start_file(format!("{name}_{version}/info.json"), options)
        .expect("start info.json");
    let info = json!({ "name": name, "version": version, "factorio_version": "2.0" });
    writer
        .write_all(info.to_string().as_bytes())
        .expect("write info.json");
    writer.finish().expect("finish archive").into_inner()
}

pub fn portal(transport: &Arc<FakeTransport>) -> PortalClient {
    PortalClient::new(transport.clone(), PortalSettings::default())
}

/// Local store that can be told to fail specific writes or deletes.
pub struct FlakyStore {
    inner: LocalFileStore,
    failing_puts: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: LocalFileStore::new(root),
            failing_puts: Mutex::new(HashSet::new()),
            failing_deletes: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_put(&self, path: &str) {
        self.failing_puts.lock().insert(path.to_string());
    }

    pub fn fail_delete(&self, name: &str) {
        self.failing_deletes.lock().insert(name.to_string());
    }

    fn refused(path: &str) -> StoreError {
        StoreError::Io {
            path: path.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "refused"),
        }
    }
}

impl FileStore for FlakyStore {
    fn get_content(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.get_content(path)
    }

    fn put_content(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        if self.failing_puts.lock().contains(path) {
            return Err(Self::refused(path));
        }
        self.inner.put_content(path, bytes)
    }

    fn get_directory(&self, path: &str) -> Result<Vec<DirEntry>, StoreError> {
        self.inner.get_directory(path)
    }

    fn delete_files(&self, dir: &str, names: &[String]) -> Result<(), StoreError> {
        if let Some(name) = names
            .iter()
            .find(|name| self.failing_deletes.lock().contains(*name))
        {
            return Err(Self::refused(name));
        }
        self.inner.delete_files(dir, names)
    }

    fn create_directory(&self, path: &str) -> Result<(), StoreError> {
        self.inner.create_directory(path)
    }
}
