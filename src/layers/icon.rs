//! Marker icon image, loaded through the offline layer like any other asset.

use crate::core::constants::{MARKER_ICON_ANCHOR, MARKER_ICON_SIZE};
use crate::offline::{Fetcher, Request};
use crate::Result;
use std::sync::Arc;

/// Encoded icon bytes plus where the icon's tip sits
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerIcon {
    pub url: String,
    pub bytes: Arc<Vec<u8>>,
    /// Drawn size in points
    pub size: (u32, u32),
    /// Offset of the point that touches the marker position
    pub anchor: (u32, u32),
}

impl MarkerIcon {
    pub async fn fetch(fetcher: &dyn Fetcher, url: &str) -> Result<Self> {
        let response = fetcher.fetch(Request::get(url)).await?.error_for_status()?;
        log::debug!("loaded marker icon {} ({} bytes)", url, response.body.len());
        Ok(Self {
            url: url.to_string(),
            bytes: Arc::new(response.body),
            size: MARKER_ICON_SIZE,
            anchor: MARKER_ICON_ANCHOR,
        })
    }
}
