//! Versioned offline asset cache
//!
//! Keeps the application's static assets available without a network.
//! Assets live in named stores; only the store named by the configured
//! version is written to, and activation drops every other store.
//!
//! Lookups are cache-first: a stored copy wins, otherwise the asset is
//! fetched and kept for next time. URLs matching a bypass pattern
//! (analytics, web fonts) are never cached.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::CacheConfig;

/// Error type for cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Install needs every manifest entry
    #[error("Install incomplete, no response for {url}")]
    Incomplete { url: String },
}

/// A cached response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Asset {
    pub fn new(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            content_type: None,
            body: body.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Network side of the cache
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch `url`; `Ok(None)` when there is nothing to return
    async fn fetch(&self, url: &str) -> Result<Option<Asset>, CacheError>;
}

/// How a request was answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheResolution {
    /// Not eligible for caching; the caller goes to the network itself
    Bypass,
    Hit(Asset),
    Fetched(Asset),
    Missing,
}

impl CacheResolution {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Bypass => "bypass",
            Self::Hit(_) => "hit",
            Self::Fetched(_) => "fetched",
            Self::Missing => "missing",
        }
    }

    pub fn asset(&self) -> Option<&Asset> {
        match self {
            Self::Hit(asset) | Self::Fetched(asset) => Some(asset),
            _ => None,
        }
    }
}

type Store = HashMap<String, Asset>;

/// Cache handle; clones share the same stores
#[derive(Clone)]
pub struct AssetCache {
    config: Arc<CacheConfig>,
    fetcher: Arc<dyn AssetFetcher>,
    stores: Arc<RwLock<BTreeMap<String, Store>>>,
}

impl AssetCache {
    pub fn new(config: CacheConfig, fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            config: Arc::new(config),
            fetcher,
            stores: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Name of the store new entries go to
    pub fn version(&self) -> &str {
        &self.config.version
    }

    /// Fetch every manifest entry into the current store
    ///
    /// All or nothing: the store is only touched once every entry has been
    /// fetched. Returns the number of assets stored.
    pub async fn install(&self) -> Result<usize, CacheError> {
        let mut fetched = Vec::with_capacity(self.config.manifest.len());
        for url in &self.config.manifest {
            match self.fetcher.fetch(url).await? {
                Some(asset) => fetched.push((url.clone(), asset)),
                None => return Err(CacheError::Incomplete { url: url.clone() }),
            }
        }

        let count = fetched.len();
        let mut stores = self.stores.write().await;
        stores
            .entry(self.config.version.clone())
            .or_default()
            .extend(fetched);
        tracing::info!(version = %self.config.version, count, "Cache installed");
        Ok(count)
    }

    /// Drop every store but the current one
    ///
    /// Returns the names of the purged stores.
    pub async fn activate(&self) -> Vec<String> {
        let mut stores = self.stores.write().await;
        let stale: Vec<String> = stores
            .keys()
            .filter(|name| **name != self.config.version)
            .cloned()
            .collect();
        for name in &stale {
            stores.remove(name);
            tracing::info!(version = %name, "Purged stale cache");
        }
        stale
    }

    /// Answer a request, cache first
    pub async fn respond(&self, url: &str) -> Result<CacheResolution, CacheError> {
        if self.config.is_bypassed(url) {
            tracing::debug!(url, "Not cached");
            return Ok(CacheResolution::Bypass);
        }

        if let Some(asset) = self.lookup(url).await {
            return Ok(CacheResolution::Hit(asset));
        }

        match self.fetcher.fetch(url).await {
            Ok(Some(asset)) => {
                // Keyed by the request, which may differ from a redirected asset.url
                self.store(&self.config.version, url, asset.clone()).await;
                Ok(CacheResolution::Fetched(asset))
            }
            Ok(None) => Ok(CacheResolution::Missing),
            Err(e) => {
                tracing::warn!(url, error = %e, "Error fetching and caching new data");
                Err(e)
            }
        }
    }

    /// Store `asset` under the named store, keyed by its own URL
    pub async fn put(&self, version: &str, asset: Asset) {
        let url = asset.url.clone();
        self.store(version, &url, asset).await;
    }

    /// Names of all stores
    pub async fn versions(&self) -> Vec<String> {
        self.stores.read().await.keys().cloned().collect()
    }

    /// URLs held in the named store, sorted
    pub async fn cached_urls(&self, version: &str) -> Vec<String> {
        let stores = self.stores.read().await;
        let mut urls: Vec<String> = stores
            .get(version)
            .map(|store| store.keys().cloned().collect())
            .unwrap_or_default();
        urls.sort();
        urls
    }

    async fn store(&self, version: &str, url: &str, asset: Asset) {
        let mut stores = self.stores.write().await;
        stores
            .entry(version.to_string())
            .or_default()
            .insert(url.to_string(), asset);
    }

    // Current store first, then the rest
    async fn lookup(&self, url: &str) -> Option<Asset> {
        let stores = self.stores.read().await;
        if let Some(asset) = stores.get(&self.config.version).and_then(|s| s.get(url)) {
            return Some(asset.clone());
        }
        stores.values().find_map(|s| s.get(url)).cloned()
    }
}

impl fmt::Debug for AssetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetCache")
            .field("version", &self.config.version)
            .field("manifest_len", &self.config.manifest.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// In-memory fetcher
// ============================================================================

/// Serves assets from a map and counts requests
#[derive(Debug, Default)]
pub struct MapFetcher {
    assets: HashMap<String, Asset>,
    requests: Mutex<Vec<String>>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetcher answering every URL in `urls` with a small placeholder body
    pub fn serving<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        urls.into_iter().fold(Self::new(), |fetcher, url| {
            let url = url.into();
            let body = format!("asset {}", url);
            fetcher.with_asset(Asset::new(url, body))
        })
    }

    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.assets.insert(asset.url.clone(), asset);
        self
    }

    /// URLs requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl AssetFetcher for MapFetcher {
    async fn fetch(&self, url: &str) -> Result<Option<Asset>, CacheError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());
        Ok(self.assets.get(url).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OfflineFetcher;

    #[async_trait]
    impl AssetFetcher for OfflineFetcher {
        async fn fetch(&self, url: &str) -> Result<Option<Asset>, CacheError> {
            Err(CacheError::Fetch {
                url: url.to_string(),
                reason: "offline".into(),
            })
        }
    }

    /// Answers every request with the asset found at a canonical URL
    struct RedirectingFetcher;

    #[async_trait]
    impl AssetFetcher for RedirectingFetcher {
        async fn fetch(&self, url: &str) -> Result<Option<Asset>, CacheError> {
            Ok(Some(Asset::new(format!("https://cdn.example{}", url), "body")))
        }
    }

    fn small_config() -> CacheConfig {
        CacheConfig {
            version: "v2".into(),
            manifest: vec!["/".into(), "/script.js".into()],
            ..CacheConfig::default()
        }
    }

    #[tokio::test]
    async fn test_install_default_manifest() {
        let config = CacheConfig::default();
        let fetcher = Arc::new(MapFetcher::serving(config.manifest.clone()));
        let cache = AssetCache::new(config, fetcher);

        assert_eq!(cache.install().await.unwrap(), 12);
        assert_eq!(cache.versions().await, vec!["v1"]);
        assert!(cache
            .cached_urls("v1")
            .await
            .contains(&"/index.html".to_string()));
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let fetcher = Arc::new(MapFetcher::serving(["/"]));
        let cache = AssetCache::new(small_config(), fetcher);

        let err = cache.install().await.unwrap_err();
        assert!(matches!(err, CacheError::Incomplete { ref url } if url == "/script.js"));
        assert!(cache.versions().await.is_empty());
    }

    #[tokio::test]
    async fn test_activate_purges_other_versions() {
        let fetcher = Arc::new(MapFetcher::serving(["/", "/script.js"]));
        let cache = AssetCache::new(small_config(), fetcher);
        cache.put("v1", Asset::new("/old.css", "old")).await;
        cache.install().await.unwrap();

        assert_eq!(cache.activate().await, vec!["v1"]);
        assert_eq!(cache.versions().await, vec!["v2"]);
        assert!(cache.activate().await.is_empty());
    }

    #[tokio::test]
    async fn test_respond_cache_first() {
        let fetcher = Arc::new(MapFetcher::serving(["/", "/script.js", "/extra.png"]));
        let cache = AssetCache::new(small_config(), fetcher.clone());
        cache.install().await.unwrap();

        let hit = cache.respond("/script.js").await.unwrap();
        assert_eq!(hit.label(), "hit");

        let fetched = cache.respond("/extra.png").await.unwrap();
        assert_eq!(fetched.label(), "fetched");
        let again = cache.respond("/extra.png").await.unwrap();
        assert_eq!(again.label(), "hit");
        assert_eq!(again.asset(), fetched.asset());

        assert_eq!(cache.respond("/nothing").await.unwrap(), CacheResolution::Missing);

        // Two installs plus one miss each for /extra.png and /nothing
        assert_eq!(fetcher.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_respond_serves_from_older_store() {
        let cache = AssetCache::new(small_config(), Arc::new(MapFetcher::new()));
        cache.put("v1", Asset::new("/legacy.css", "body")).await;
        assert_eq!(cache.respond("/legacy.css").await.unwrap().label(), "hit");
    }

    #[tokio::test]
    async fn test_redirected_fetch_is_cached_under_request_url() {
        let cache = AssetCache::new(small_config(), Arc::new(RedirectingFetcher));

        let fetched = cache.respond("/app.js").await.unwrap();
        assert_eq!(fetched.label(), "fetched");
        assert_eq!(fetched.asset().unwrap().url, "https://cdn.example/app.js");

        let again = cache.respond("/app.js").await.unwrap();
        assert_eq!(again.label(), "hit");
        assert_eq!(cache.cached_urls("v2").await, vec!["/app.js"]);
    }

    #[tokio::test]
    async fn test_bypass_patterns() {
        let fetcher = Arc::new(MapFetcher::new());
        let cache = AssetCache::new(CacheConfig::default(), fetcher.clone());

        for url in [
            "https://www.googletagmanager.com/gtag/js",
            "https://www.google-analytics.com/collect",
            "https://fonts.gstatic.com/s/font.woff2",
            "/__/firebase/init.js",
        ] {
            assert_eq!(cache.respond(url).await.unwrap(), CacheResolution::Bypass);
        }
        assert!(fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_error_is_returned() {
        let cache = AssetCache::new(small_config(), Arc::new(OfflineFetcher));
        assert!(matches!(
            cache.respond("/new.js").await,
            Err(CacheError::Fetch { .. })
        ));
        assert!(cache.install().await.is_err());
    }
}
