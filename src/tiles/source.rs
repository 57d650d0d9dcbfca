use crate::core::config::TileConfig;
use crate::core::geo::TileCoord;

/// Trait representing anything that can produce tile URLs for a given coordinate.
pub trait TileSource: Send + Sync {
    /// Build a URL for the requested `coord`.
    fn url(&self, coord: TileCoord) -> String;

    fn attribution(&self) -> &str {
        ""
    }
}

/// XYZ template source: `{s}`, `{z}`, `{x}` and `{y}` are substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSource {
    template: String,
    subdomains: Vec<String>,
    attribution: String,
}

impl TemplateSource {
    pub fn new(template: impl Into<String>, subdomains: Vec<String>) -> Self {
        Self {
            template: template.into(),
            subdomains,
            attribution: String::new(),
        }
    }

    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = attribution.into();
        self
    }

    pub fn openstreetmap() -> Self {
        Self::from_config(&TileConfig::default())
    }

    pub fn from_config(config: &TileConfig) -> Self {
        Self::new(config.url_template.clone(), config.subdomains.clone())
            .with_attribution(config.attribution.clone())
    }

    /// Subdomain for a tile, spread by `(x + y) % n` so neighbours hit
    /// different hosts
    fn subdomain(&self, coord: TileCoord) -> &str {
        if self.subdomains.is_empty() {
            return "";
        }
        let idx = ((coord.x as u64 + coord.y as u64) % self.subdomains.len() as u64) as usize;
        &self.subdomains[idx]
    }
}

impl TileSource for TemplateSource {
    fn url(&self, coord: TileCoord) -> String {
        let url = self
            .template
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string());
        if self.subdomains.is_empty() {
            // `{s}.host` becomes `host`
            url.replace("{s}.", "").replace("{s}", "")
        } else {
            url.replace("{s}", self.subdomain(coord))
        }
    }

    fn attribution(&self) -> &str {
        &self.attribution
    }
}
