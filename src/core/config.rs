//! Application configuration
//!
//! Everything the client needs to know about the outside world lives here:
//! service endpoints, the tile source, the offline cache generation and the
//! initial view. The configuration is plain JSON on disk; any missing field
//! falls back to its default, and a handful of environment variables can
//! override the offline settings at start-up.

use crate::core::geo::LatLng;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub services: ServiceConfig,
    pub tiles: TileConfig,
    pub offline: OfflineConfig,
    pub view: ViewConfig,
    pub poi: PoiConfig,
    pub search: SearchConfig,
    pub assets: AssetConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub geocoder_url: String,
    pub routing_url: String,
    pub overpass_url: String,
    pub geolocation_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            geocoder_url: "https://nominatim.openstreetmap.org".to_string(),
            routing_url: "https://router.project-osrm.org".to_string(),
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
            geolocation_url: "http://ip-api.com/json".to_string(),
            user_agent: concat!("mapscout/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileConfig {
    pub url_template: String,
    pub subdomains: Vec<String>,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub memory_cache_size: usize,
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub attribution: String,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            url_template: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            subdomains: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            min_zoom: 0,
            max_zoom: 19,
            memory_cache_size: 512,
            max_concurrent: 8,
            max_retries: 2,
            attribution: "© OpenStreetMap contributors".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    pub enabled: bool,
    /// Shared prefix of every cache generation this app owns
    pub cache_prefix: String,
    /// Current generation; bumping it invalidates everything cached before
    pub version: String,
    /// Persistent storage root; `None` keeps the cache in memory
    pub cache_dir: Option<PathBuf>,
    /// App assets fetched during install
    pub precache: Vec<String>,
    /// Whether opaque (no-cors) responses may be stored
    pub cache_opaque: bool,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_prefix: "mapscout".to_string(),
            version: "v1".to_string(),
            cache_dir: None,
            precache: Vec::new(),
            cache_opaque: true,
        }
    }
}

impl OfflineConfig {
    /// Name of the cache generation for the configured version
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.version)
    }
}

/// Static resources the viewer loads through the offline layer. They are
/// precached when a cache generation installs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// PNG drawn for every marker; `None` draws plain dots
    pub marker_icon_url: Option<String>,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            marker_icon_url: Some(
                "https://unpkg.com/leaflet@1.9.4/dist/images/marker-icon.png".to_string(),
            ),
        }
    }
}

impl AssetConfig {
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.marker_icon_url.as_deref().into_iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub center: LatLng,
    pub zoom: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            center: LatLng::new(51.505, -0.09),
            zoom: 13.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoiConfig {
    pub radius_m: f64,
    pub limit: usize,
    pub categories: Vec<String>,
}

impl Default for PoiConfig {
    fn default() -> Self {
        Self {
            radius_m: 1000.0,
            limit: 50,
            categories: ["restaurant", "cafe", "fuel", "hospital", "pharmacy", "atm", "hotel"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { limit: 5 }
    }
}

impl AppConfig {
    /// Load a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        log::info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Apply `MAPSCOUT_*` environment overrides
    pub fn from_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(dir) = var("MAPSCOUT_CACHE_DIR") {
            self.offline.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(version) = var("MAPSCOUT_CACHE_VERSION") {
            self.offline.version = version;
        }
        if let Some(flag) = var("MAPSCOUT_OFFLINE") {
            self.offline.enabled = match flag.trim() {
                "1" | "true" => true,
                "0" | "false" => false,
                other => {
                    return Err(Error::Config(format!(
                        "MAPSCOUT_OFFLINE must be 0 or 1, got {other:?}"
                    )))
                }
            };
        }
        self.validate()?;
        Ok(self)
    }

    /// The offline settings with the viewer's assets added to the
    /// precache list
    pub fn offline_with_assets(&self) -> OfflineConfig {
        let mut offline = self.offline.clone();
        for url in self.assets.urls() {
            if !offline.precache.iter().any(|u| u == url) {
                offline.precache.push(url.to_string());
            }
        }
        offline
    }

    /// Reject configurations the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.offline.version.trim().is_empty() {
            return Err(Error::Config("offline.version must not be empty".into()));
        }
        if self.offline.cache_prefix.trim().is_empty() {
            return Err(Error::Config("offline.cache_prefix must not be empty".into()));
        }
        if self.tiles.max_zoom < self.tiles.min_zoom {
            return Err(Error::Config(format!(
                "tiles.max_zoom ({}) is below tiles.min_zoom ({})",
                self.tiles.max_zoom, self.tiles.min_zoom
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.offline.cache_name(), "mapscout-v1");
        assert_eq!(config.tiles.max_zoom, 19);
        assert_eq!(config.search.limit, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"offline": {"version": "v7"}, "view": {"zoom": 4}}"#).unwrap();
        assert_eq!(config.offline.cache_name(), "mapscout-v7");
        assert!(config.offline.enabled);
        assert_eq!(config.view.zoom, 4.0);
        assert_eq!(config.view.center, ViewConfig::default().center);
        assert_eq!(config.services, ServiceConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapscout.json");

        let mut config = AppConfig::default();
        config.offline.precache = vec!["https://example.com/app.css".to_string()];
        config.save(&path).unwrap();

        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::default()
            .with_overrides(|key| match key {
                "MAPSCOUT_CACHE_DIR" => Some("/tmp/tiles".to_string()),
                "MAPSCOUT_CACHE_VERSION" => Some("v2".to_string()),
                "MAPSCOUT_OFFLINE" => Some("0".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.offline.cache_dir, Some(PathBuf::from("/tmp/tiles")));
        assert_eq!(config.offline.cache_name(), "mapscout-v2");
        assert!(!config.offline.enabled);

        let bad = AppConfig::default()
            .with_overrides(|key| (key == "MAPSCOUT_OFFLINE").then(|| "maybe".to_string()));
        assert!(matches!(bad, Err(Error::Config(_))));
    }

    #[test]
    fn test_assets_join_precache_once() {
        let mut config = AppConfig::default();
        let icon = config.assets.marker_icon_url.clone().unwrap();
        config.offline.precache = vec!["https://example.com/app.css".to_string(), icon.clone()];

        let offline = config.offline_with_assets();
        assert_eq!(offline.precache, vec!["https://example.com/app.css".to_string(), icon]);

        config.assets.marker_icon_url = None;
        config.offline.precache.clear();
        assert!(config.offline_with_assets().precache.is_empty());
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.offline.version = "  ".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = AppConfig::default();
        config.tiles.min_zoom = 10;
        config.tiles.max_zoom = 5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
