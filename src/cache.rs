use crate::models::{ModDetails, ModPage, SearchResult, SortField, SortOrder};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    hash::Hash,
    time::{Duration, Instant},
};
use time::OffsetDateTime;

/// Everything that changes a portal answer is part of its key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    ModPage {
        page: u32,
        page_size: u32,
        sort: SortField,
        order: SortOrder,
    },
    Search {
        query: Option<String>,
        category: Option<String>,
        sort: SortField,
        order: SortOrder,
        limit: usize,
    },
    Details {
        name: String,
        full: bool,
    },
}

impl CacheKey {
    pub fn class(&self) -> TtlClass {
        match self {
            CacheKey::ModPage { .. } => TtlClass::ModList,
            CacheKey::Search { .. } => TtlClass::Search,
            CacheKey::Details { .. } => TtlClass::Details,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    ModList,
    Search,
    Details,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtls {
    pub mod_list_secs: u64,
    pub search_secs: u64,
    pub details_secs: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            mod_list_secs: 15 * 60,
            search_secs: 15 * 60,
            details_secs: 6 * 60 * 60,
        }
    }
}

impl CacheTtls {
    pub fn for_class(&self, class: TtlClass) -> Duration {
        let secs = match class {
            TtlClass::ModList => self.mod_list_secs,
            TtlClass::Search => self.search_secs,
            TtlClass::Details => self.details_secs,
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone)]
pub enum CachedValue {
    Page(ModPage),
    Search(SearchResult),
    Details(ModDetails),
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    /// `None` when the ttl reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_refresh: Option<OffsetDateTime>,
}

/// Expiring key-value store. No eviction beyond TTL; the key space is
/// bounded by the portal's catalogue.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    last_refresh: Mutex<Option<OffsetDateTime>>,
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            last_refresh: Mutex::new(None),
        }
    }
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.is_live(Instant::now()) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        let expires_at = Instant::now().checked_add(ttl);
        self.entries.lock().insert(key, CacheEntry { value, expires_at });
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        *self.last_refresh.lock() = Some(OffsetDateTime::now_utc());
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            last_refresh: *self.last_refresh.lock(),
        }
    }
}

pub type PortalCache = TtlCache<CacheKey, CachedValue>;
