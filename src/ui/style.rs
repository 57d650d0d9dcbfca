use crate::layers::marker::MarkerKind;
use egui::{Color32, FontId, Stroke};

/// Colours and sizes the map widget paints with
#[derive(Debug, Clone)]
pub struct MapStyle {
    /// Background color where no tile is available
    pub background_color: Color32,
    pub route_stroke: Stroke,
    pub markers: MarkerStyle,
    pub popup: PopupStyle,
    pub controls: ZoomControlStyle,
    pub attribution_font: FontId,
    pub attribution_color: Color32,
}

#[derive(Debug, Clone)]
pub struct MarkerStyle {
    pub radius: f32,
    pub border: Stroke,
    /// Extra pixels around the dot that still count as a click on it
    pub hit_slop: f32,
}

impl MarkerStyle {
    pub fn color(&self, kind: MarkerKind) -> Color32 {
        match kind {
            MarkerKind::Search => Color32::from_rgb(37, 99, 235),
            MarkerKind::Location => Color32::from_rgb(14, 165, 233),
            MarkerKind::Picked => Color32::from_rgb(234, 88, 12),
            MarkerKind::RouteStart => Color32::from_rgb(22, 163, 74),
            MarkerKind::RouteEnd => Color32::from_rgb(220, 38, 38),
            MarkerKind::Poi => Color32::from_rgb(147, 51, 234),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PopupStyle {
    pub background_color: Color32,
    pub border: Stroke,
    pub rounding: f32,
    pub padding: f32,
    pub title_font: FontId,
    pub body_font: FontId,
    pub text_color: Color32,
    pub max_width: f32,
}

#[derive(Debug, Clone)]
pub struct ZoomControlStyle {
    pub background_color: Color32,
    pub text_color: Color32,
    pub border: Stroke,
    pub button_size: f32,
    pub margin: f32,
    pub rounding: f32,
}

impl Default for MapStyle {
    fn default() -> Self {
        Self {
            background_color: Color32::from_rgb(229, 227, 223),
            route_stroke: Stroke::new(5.0, Color32::from_rgba_unmultiplied(37, 99, 235, 200)),
            markers: MarkerStyle {
                radius: 7.0,
                border: Stroke::new(2.0, Color32::WHITE),
                hit_slop: 4.0,
            },
            popup: PopupStyle {
                background_color: Color32::WHITE,
                border: Stroke::new(1.0, Color32::GRAY),
                rounding: 4.0,
                padding: 8.0,
                title_font: FontId::proportional(14.0),
                body_font: FontId::proportional(12.0),
                text_color: Color32::BLACK,
                max_width: 280.0,
            },
            controls: ZoomControlStyle {
                background_color: Color32::from_rgba_unmultiplied(255, 255, 255, 220),
                text_color: Color32::BLACK,
                border: Stroke::new(1.0, Color32::from_gray(100)),
                button_size: 30.0,
                margin: 10.0,
                rounding: 3.0,
            },
            attribution_font: FontId::proportional(10.0),
            attribution_color: Color32::from_gray(90),
        }
    }
}

impl MapStyle {
    pub fn dark() -> Self {
        let mut style = Self::default();
        style.background_color = Color32::from_rgb(38, 38, 38);
        style.popup.background_color = Color32::from_gray(40);
        style.popup.text_color = Color32::from_gray(230);
        style.controls.background_color = Color32::from_rgba_unmultiplied(40, 40, 40, 220);
        style.controls.text_color = Color32::WHITE;
        style.attribution_color = Color32::from_gray(180);
        style
    }
}
