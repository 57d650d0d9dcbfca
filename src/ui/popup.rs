use crate::core::geo::LatLng;
use crate::services::geocoder::Place;
use crate::services::geolocation::Position;
use crate::services::overpass::Poi;
use crate::services::routing::{format_distance, Route};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Text shown in a popup: a bold title and plain lines below it
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PopupContent {
    pub title: String,
    pub lines: Vec<String>,
}

impl PopupContent {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            lines: Vec::new(),
        }
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        let line = line.into();
        if !line.trim().is_empty() {
            self.lines.push(line);
        }
        self
    }

    pub fn place(place: &Place) -> Self {
        let mut content = Self::new(place.name.clone());
        if place.display_name != place.name {
            content = content.line(place.display_name.clone());
        }
        if let Some(category) = &place.category {
            content = content.line(category.replace('_', " "));
        }
        content
    }

    /// Name and category plus the contact details OSM has for it
    pub fn poi(poi: &Poi) -> Self {
        let mut content = Self::new(poi.title()).line(poi.category.label());
        for (key, label) in [
            ("opening_hours", "Hours"),
            ("website", "Web"),
            ("phone", "Phone"),
        ] {
            if let Some(value) = poi.tag(key) {
                content = content.line(format!("{}: {}", label, value));
            }
        }
        content.line(format!("{} away", format_distance(poi.distance_m)))
    }

    /// Coordinates of a picked point, with the address once it is known
    pub fn picked(at: LatLng, address: Option<&Place>) -> Self {
        let content = Self::new("Selected point").line(at.to_display());
        match address {
            Some(place) => content.line(place.display_name.clone()),
            None => content,
        }
    }

    pub fn route(route: &Route) -> Self {
        let mut content = Self::new("Driving directions").line(route.summary());
        for step in route.steps.iter().take(5) {
            content = content.line(format!(
                "{} ({})",
                step.instruction,
                format_distance(step.distance_m)
            ));
        }
        if route.steps.len() > 5 {
            content = content.line(format!("… {} more steps", route.steps.len() - 5));
        }
        content
    }

    pub fn location(position: &Position) -> Self {
        let content = Self::new("You are here").line(position.location.to_display());
        match position.accuracy_m {
            Some(accuracy) if accuracy > 0.0 => {
                content.line(format!("Accuracy: ±{}", format_distance(accuracy)))
            }
            _ => content,
        }
    }

    /// Title and lines joined with newlines
    pub fn text(&self) -> String {
        std::iter::once(self.title.as_str())
            .chain(self.lines.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The single popup the map shows, anchored to a geographic point
#[derive(Debug, Clone)]
pub struct Popup {
    pub anchor: LatLng,
    pub content: PopupContent,
    visible: bool,
    opened_at: Instant,
    auto_close: Option<Duration>,
}

impl Popup {
    pub fn new(anchor: LatLng, content: PopupContent) -> Self {
        Self {
            anchor,
            content,
            visible: false,
            opened_at: Instant::now(),
            auto_close: None,
        }
    }

    pub fn with_auto_close(mut self, duration: Duration) -> Self {
        self.auto_close = Some(duration);
        self
    }

    pub fn open(&mut self) {
        self.visible = true;
        self.opened_at = Instant::now();
    }

    pub fn close(&mut self) {
        self.visible = false;
    }

    pub fn is_open(&self) -> bool {
        self.visible && !self.expired()
    }

    fn expired(&self) -> bool {
        self.auto_close
            .map(|duration| self.opened_at.elapsed() > duration)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::HashMap;
    use crate::services::overpass::{ElementKind, PoiCategory};

    #[test]
    fn test_poi_popup_includes_tagged_details() {
        let mut tags = HashMap::default();
        tags.insert("name".to_string(), "Monmouth".to_string());
        tags.insert("opening_hours".to_string(), "Mo-Sa 08:00-18:00".to_string());
        tags.insert("phone".to_string(), "+44 20 7232 3010".to_string());
        let poi = Poi {
            id: 7,
            kind: ElementKind::Node,
            location: LatLng::new(51.505, -0.09),
            name: Some("Monmouth".to_string()),
            category: PoiCategory::Cafe,
            tags,
            distance_m: 240.0,
        };

        let content = PopupContent::poi(&poi);
        assert_eq!(content.title, "Monmouth");
        assert_eq!(
            content.lines,
            vec![
                "Café".to_string(),
                "Hours: Mo-Sa 08:00-18:00".to_string(),
                "Phone: +44 20 7232 3010".to_string(),
                "240 m away".to_string(),
            ]
        );
    }

    #[test]
    fn test_picked_point_without_and_with_address() {
        let at = LatLng::new(51.5, -0.12);
        let bare = PopupContent::picked(at, None);
        assert_eq!(bare.lines.len(), 1);

        let place = Place {
            name: "Parliament Square".to_string(),
            display_name: "Parliament Square, London".to_string(),
            location: at,
            bounds: None,
            category: None,
        };
        let full = PopupContent::picked(at, Some(&place));
        assert_eq!(full.lines[1], "Parliament Square, London");
        assert!(full.text().starts_with("Selected point\n"));
    }

    #[test]
    fn test_popup_open_close() {
        let mut popup = Popup::new(LatLng::new(0.0, 0.0), PopupContent::new("x"));
        assert!(!popup.is_open());
        popup.open();
        assert!(popup.is_open());
        popup.close();
        assert!(!popup.is_open());

        let mut expiring = Popup::new(LatLng::new(0.0, 0.0), PopupContent::new("x"))
            .with_auto_close(Duration::ZERO);
        expiring.open();
        std::thread::sleep(Duration::from_millis(2));
        assert!(!expiring.is_open());
    }
}
