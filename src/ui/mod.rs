//! Presentation: popup content is plain data, the widget needs `egui`.

pub mod popup;
#[cfg(feature = "egui")]
pub mod style;
#[cfg(feature = "egui")]
pub mod widget;

pub use popup::{Popup, PopupContent};
#[cfg(feature = "egui")]
pub use style::MapStyle;
#[cfg(feature = "egui")]
pub use widget::{MapEvent, MapView, MapTextures};
