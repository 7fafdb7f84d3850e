//! Portal payloads as returned by `/api/mods`.

use crate::version::{ModVersion, TargetPlatform};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use time::OffsetDateTime;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    #[serde(default)]
    pub factorio_version: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub version: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub released_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub info_json: ReleaseInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
}

impl Release {
    pub fn factorio_version(&self) -> Option<&str> {
        self.info_json.factorio_version.as_deref()
    }

    pub fn is_compatible_with(&self, target: &TargetPlatform) -> bool {
        target.accepts(self.factorio_version())
    }

    fn released_or_epoch(&self) -> OffsetDateTime {
        self.released_at.unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

/// Newest first by `released_at`; the portal's own array order is not
/// reliable. Ties fall back to the version number.
pub fn sort_newest_first(releases: &mut [Release]) {
    releases.sort_by(|a, b| {
        b.released_or_epoch()
            .cmp(&a.released_or_epoch())
            .then_with(|| compare_versions(&b.version, &a.version))
    });
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    match (ModVersion::parse(a), ModVersion::parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModSummary {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub downloads_count: u64,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub latest_release: Option<Release>,
}

impl ModSummary {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    /// Case-insensitive substring match across the searchable text fields.
    pub fn matches(&self, needle_lower: &str) -> bool {
        [
            Some(self.name.as_str()),
            self.title.as_deref(),
            self.summary.as_deref(),
            self.owner.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle_lower))
    }

    pub fn in_category(&self, category: &str) -> bool {
        self.category
            .as_deref()
            .map(|value| value.eq_ignore_ascii_case(category))
            .unwrap_or(false)
    }

    fn updated_at(&self) -> OffsetDateTime {
        self.latest_release
            .as_ref()
            .map(Release::released_or_epoch)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub count: u64,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub page_size: u32,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModPage {
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub results: Vec<ModSummary>,
}

pub type SearchResult = ModPage;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModDetails {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub downloads_count: u64,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub releases: Vec<Release>,
}

impl ModDetails {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    pub fn releases_newest_first(&self) -> Vec<Release> {
        let mut releases = self.releases.clone();
        sort_newest_first(&mut releases);
        releases
    }

    pub fn newest_release(&self) -> Option<Release> {
        self.releases_newest_first().into_iter().next()
    }

    pub fn newest_compatible_release(&self, target: &TargetPlatform) -> Option<Release> {
        self.releases_newest_first()
            .into_iter()
            .find(|release| release.is_compatible_with(target))
    }

    pub fn release(&self, version: &str) -> Option<Release> {
        self.releases
            .iter()
            .find(|release| release.version == version)
            .cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Downloads,
    Name,
    Title,
    Updated,
}

impl SortField {
    /// The portal sorts natively by these; downloads and title are sorted
    /// client-side.
    pub fn api_param(self) -> Option<&'static str> {
        match self {
            SortField::Name => Some("name"),
            SortField::Updated => Some("updated_at"),
            SortField::Downloads | SortField::Title => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

pub fn sort_summaries(mods: &mut [ModSummary], field: SortField, order: SortOrder) {
    mods.sort_by(|a, b| {
        let ordering = match field {
            SortField::Downloads => a.downloads_count.cmp(&b.downloads_count),
            SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortField::Title => a
                .display_title()
                .to_lowercase()
                .cmp(&b.display_title().to_lowercase()),
            SortField::Updated => a.updated_at().cmp(&b.updated_at()),
        };
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

/// One row of the version picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionOption {
    pub version: String,
    pub factorio_version: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub released_at: Option<OffsetDateTime>,
    pub is_compatible: bool,
}
