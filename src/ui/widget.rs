use crate::core::constants::DEFAULT_ZOOM_DELTA;
use crate::core::geo::{LatLng, Point, TileCoord};
use crate::core::viewport::Viewport;
use crate::layers::icon::MarkerIcon;
use crate::layers::marker::Marker;
use crate::prelude::{Duration, HashMap, HashSet};
use crate::session::MapSession;
use crate::tiles::TileLoader;
use crate::ui::popup::Popup;
use crate::ui::style::MapStyle;
use egui::{
    Align2, Color32, ColorImage, Context, Pos2, Rect, Response, Sense, Shape, TextureHandle,
    TextureId, TextureOptions, Ui, Vec2,
};

/// Scroll-wheel pixels per zoom level
const SCROLL_ZOOM_RATE: f64 = 0.0025;

/// What the user did on the map this frame that the caller has to act on
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapEvent {
    /// Primary click on empty map
    Clicked(LatLng),
    /// Secondary click on empty map
    ContextClicked(LatLng),
    /// A marker was clicked; its popup is already open
    MarkerClicked(u64),
}

/// Marker icon texture and where its tip sits, in points
struct IconTexture {
    handle: TextureHandle,
    size: Vec2,
    anchor: Vec2,
}

/// GPU textures for decoded tiles and the marker icon, kept across frames
#[derive(Default)]
pub struct MapTextures {
    textures: HashMap<TileCoord, TextureHandle>,
    broken: HashSet<TileCoord>,
    marker_icon: Option<IconTexture>,
}

impl MapTextures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload the marker icon. Markers fall back to dots when the image
    /// does not decode.
    pub fn set_marker_icon(&mut self, ctx: &Context, icon: &MarkerIcon) -> bool {
        let Some(image) = decode_image(&icon.bytes) else {
            log::warn!("marker icon {} is not a decodable image", icon.url);
            return false;
        };
        let handle = ctx.load_texture("marker-icon", image, TextureOptions::LINEAR);
        self.marker_icon = Some(IconTexture {
            handle,
            size: Vec2::new(icon.size.0 as f32, icon.size.1 as f32),
            anchor: Vec2::new(icon.anchor.0 as f32, icon.anchor.1 as f32),
        });
        true
    }

    pub fn has_marker_icon(&self) -> bool {
        self.marker_icon.is_some()
    }

    fn texture(&mut self, ctx: &Context, coord: TileCoord, bytes: &[u8]) -> Option<TextureId> {
        if let Some(handle) = self.textures.get(&coord) {
            return Some(handle.id());
        }
        if self.broken.contains(&coord) {
            return None;
        }
        match decode_image(bytes) {
            Some(image) => {
                let name = format!("tile-{}-{}-{}", coord.z, coord.x, coord.y);
                let handle = ctx.load_texture(name, image, TextureOptions::LINEAR);
                let id = handle.id();
                self.textures.insert(coord, handle);
                Some(id)
            }
            None => {
                log::warn!("tile {:?} is not a decodable image", coord);
                self.broken.insert(coord);
                None
            }
        }
    }

    /// Free textures whose bytes left the tile cache
    fn prune(&mut self, loader: &TileLoader) {
        let cache = loader.cache();
        self.textures.retain(|coord, _| cache.contains(coord));
        self.broken.retain(|coord| cache.contains(coord));
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

fn decode_image(bytes: &[u8]) -> Option<ColorImage> {
    let img = image::load_from_memory(bytes).ok()?;
    let rgba = img.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    Some(ColorImage::from_rgba_unmultiplied(size, rgba.as_raw()))
}

/// Interactive map: tiles, route line, markers and the popup of a
/// [`MapSession`].
///
/// Drag pans, the wheel zooms around the pointer, clicking a marker opens
/// its popup, and clicks on the map itself come back as [`MapEvent`]s.
///
/// ```ignore
/// let (response, event) = MapView::new(handle.session_mut(), &loader, &mut textures).show(ui);
/// if let Some(MapEvent::Clicked(at)) = event {
///     handle.dispatch(Command::PickPoint(at));
/// }
/// ```
pub struct MapView<'a> {
    session: &'a mut MapSession,
    loader: &'a TileLoader,
    textures: &'a mut MapTextures,
    style: MapStyle,
    interactive: bool,
    show_controls: bool,
    attribution: Option<String>,
}

impl<'a> MapView<'a> {
    pub fn new(
        session: &'a mut MapSession,
        loader: &'a TileLoader,
        textures: &'a mut MapTextures,
    ) -> Self {
        let attribution = Some(loader.source().attribution().to_string()).filter(|a| !a.is_empty());
        Self {
            session,
            loader,
            textures,
            style: MapStyle::default(),
            interactive: true,
            show_controls: true,
            attribution,
        }
    }

    pub fn style(mut self, style: MapStyle) -> Self {
        self.style = style;
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn controls(mut self, show: bool) -> Self {
        self.show_controls = show;
        self
    }

    pub fn show(self, ui: &mut Ui) -> (Response, Option<MapEvent>) {
        let MapView {
            session,
            loader,
            textures,
            style,
            interactive,
            show_controls,
            attribution,
        } = self;

        let (rect, mut response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        session
            .viewport_mut()
            .set_size(Point::new(rect.width() as f64, rect.height() as f64));

        let mut event = None;
        if interactive {
            if handle_zoom_controls(ui, rect, &style, session.viewport_mut(), show_controls) {
                response.mark_changed();
            }
            if handle_navigation(ui, rect, &response, session.viewport_mut()) {
                response.mark_changed();
            }
            event = handle_clicks(
                ui,
                rect,
                &response,
                &style,
                session,
                textures.marker_icon.as_ref(),
            );
        }

        let loaded = loader.poll();
        loader.request_visible(session.viewport());
        textures.prune(loader);
        if !loaded.is_empty() {
            ui.ctx().request_repaint();
        } else if loader.pending() > 0 {
            ui.ctx().request_repaint_after(Duration::from_millis(100));
        }

        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, style.background_color);
        paint_tiles(ui.ctx(), &painter, rect, session.viewport(), loader, textures);
        paint_route(&painter, rect, session, &style);
        let icon = textures.marker_icon.as_ref();
        for marker in session.overlays().markers() {
            paint_marker(&painter, rect, session.viewport(), marker, &style, icon);
        }
        if let Some(popup) = session.popup() {
            paint_popup(&painter, rect, session.viewport(), popup, &style);
        }
        if show_controls {
            paint_zoom_controls(&painter, rect, &style);
        }
        if let Some(text) = attribution {
            painter.text(
                rect.right_bottom() + Vec2::new(-5.0, -3.0),
                Align2::RIGHT_BOTTOM,
                text,
                style.attribution_font.clone(),
                style.attribution_color,
            );
        }

        (response, event)
    }
}

fn to_screen(rect: Rect, point: Point) -> Pos2 {
    Pos2::new(rect.min.x + point.x as f32, rect.min.y + point.y as f32)
}

fn to_local(rect: Rect, pos: Pos2) -> Point {
    Point::new((pos.x - rect.min.x) as f64, (pos.y - rect.min.y) as f64)
}

fn zoom_buttons(rect: Rect, style: &MapStyle) -> (Rect, Rect) {
    let c = &style.controls;
    let zoom_in = Rect::from_min_size(
        rect.right_top() + Vec2::new(-(c.margin + c.button_size), c.margin),
        Vec2::splat(c.button_size),
    );
    let zoom_out = zoom_in.translate(Vec2::new(0.0, c.button_size + 5.0));
    (zoom_in, zoom_out)
}

fn handle_zoom_controls(
    ui: &mut Ui,
    rect: Rect,
    style: &MapStyle,
    viewport: &mut Viewport,
    show_controls: bool,
) -> bool {
    if !show_controls {
        return false;
    }
    let (zoom_in, zoom_out) = zoom_buttons(rect, style);
    let id = ui.id().with("map_zoom");
    let mut changed = false;
    if ui.interact(zoom_in, id.with("in"), Sense::click()).clicked() {
        viewport.zoom_to(viewport.zoom.round() + DEFAULT_ZOOM_DELTA, None);
        changed = true;
    }
    if ui.interact(zoom_out, id.with("out"), Sense::click()).clicked() {
        viewport.zoom_to(viewport.zoom.round() - DEFAULT_ZOOM_DELTA, None);
        changed = true;
    }
    changed
}

fn handle_navigation(ui: &Ui, rect: Rect, response: &Response, viewport: &mut Viewport) -> bool {
    let mut changed = false;

    if response.dragged() {
        let delta = response.drag_delta();
        if delta.length_sq() > 0.0 {
            viewport.pan(Point::new(delta.x as f64, delta.y as f64));
            changed = true;
        }
    }

    if response.hovered() {
        let scroll = ui.input(|i| i.raw_scroll_delta.y) as f64;
        if scroll.abs() > 0.1 {
            let focus = response.hover_pos().map(|pos| to_local(rect, pos));
            viewport.zoom_to(viewport.zoom + scroll * SCROLL_ZOOM_RATE, focus);
            changed = true;
        }
    }
    changed
}

/// Marker under the pointer, topmost first
fn marker_at(
    rect: Rect,
    session: &MapSession,
    pos: Pos2,
    style: &MapStyle,
    icon: Option<&IconTexture>,
) -> Option<u64> {
    let reach = style.markers.radius + style.markers.hit_slop;
    session
        .overlays()
        .markers()
        .into_iter()
        .rev()
        .find(|m| {
            let at = to_screen(rect, session.viewport().lat_lng_to_pixel(&m.position));
            match icon {
                Some(icon) => Rect::from_min_size(at - icon.anchor, icon.size)
                    .expand(style.markers.hit_slop)
                    .contains(pos),
                None => at.distance(pos) <= reach,
            }
        })
        .map(|m| m.id)
}

fn handle_clicks(
    ui: &Ui,
    rect: Rect,
    response: &Response,
    style: &MapStyle,
    session: &mut MapSession,
    icon: Option<&IconTexture>,
) -> Option<MapEvent> {
    let pos = response.interact_pointer_pos()?;
    let (zoom_in, zoom_out) = zoom_buttons(rect, style);
    if zoom_in.contains(pos) || zoom_out.contains(pos) {
        return None;
    }

    if response.clicked() {
        if let Some(popup) = session.popup() {
            if popup_rect(ui.ctx(), rect, session.viewport(), popup, style).contains(pos) {
                session.close_popup();
                return None;
            }
        }
        if let Some(id) = marker_at(rect, session, pos, style, icon) {
            session.select_marker(id);
            return Some(MapEvent::MarkerClicked(id));
        }
        let at = session.viewport().pixel_to_lat_lng(&to_local(rect, pos));
        return Some(MapEvent::Clicked(at));
    }
    if response.secondary_clicked() {
        let at = session.viewport().pixel_to_lat_lng(&to_local(rect, pos));
        return Some(MapEvent::ContextClicked(at));
    }
    None
}

/// Part of `ancestor`'s image that covers `coord`, in UV space
fn ancestor_uv(coord: TileCoord, ancestor: TileCoord) -> Rect {
    let scale = (1u32 << (coord.z - ancestor.z)) as f32;
    let u = (coord.x as f32 - ancestor.x as f32 * scale) / scale;
    let v = (coord.y as f32 - ancestor.y as f32 * scale) / scale;
    Rect::from_min_size(Pos2::new(u, v), Vec2::splat(1.0 / scale))
}

fn paint_tiles(
    ctx: &Context,
    painter: &egui::Painter,
    rect: Rect,
    viewport: &Viewport,
    loader: &TileLoader,
    textures: &mut MapTextures,
) {
    let full = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
    for coord in viewport.visible_tiles() {
        let (min, max) = viewport.tile_screen_bounds(&coord);
        let tile_rect = Rect::from_min_max(to_screen(rect, min), to_screen(rect, max));

        let cache = loader.cache();
        let drawn = cache
            .get(&coord)
            .and_then(|bytes| textures.texture(ctx, coord, &bytes))
            .map(|id| painter.image(id, tile_rect, full, Color32::WHITE))
            .is_some();
        if drawn {
            continue;
        }
        if let Some((ancestor, bytes)) = cache.fallback(&coord) {
            if let Some(id) = textures.texture(ctx, ancestor, &bytes) {
                painter.image(id, tile_rect, ancestor_uv(coord, ancestor), Color32::WHITE);
            }
        }
    }
}

fn paint_route(painter: &egui::Painter, rect: Rect, session: &MapSession, style: &MapStyle) {
    let Some(route) = session.overlays().route() else {
        return;
    };
    let points: Vec<Pos2> = route
        .points
        .iter()
        .map(|p| to_screen(rect, session.viewport().lat_lng_to_pixel(p)))
        .collect();
    if points.len() >= 2 {
        painter.add(Shape::line(points, style.route_stroke));
    }
}

fn paint_marker(
    painter: &egui::Painter,
    rect: Rect,
    viewport: &Viewport,
    marker: &Marker,
    style: &MapStyle,
    icon: Option<&IconTexture>,
) {
    let at = to_screen(rect, viewport.lat_lng_to_pixel(&marker.position));
    let color = style.markers.color(marker.kind);
    let Some(icon) = icon else {
        if rect.expand(style.markers.radius).contains(at) {
            painter.circle(at, style.markers.radius, color, style.markers.border);
        }
        return;
    };

    let icon_rect = Rect::from_min_size(at - icon.anchor, icon.size);
    if !rect.intersects(icon_rect) {
        return;
    }
    painter.image(
        icon.handle.id(),
        icon_rect,
        Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
        Color32::WHITE,
    );
    // Kind badge on the icon's head
    let head = Pos2::new(icon_rect.center().x, icon_rect.top() + icon.size.x / 2.0);
    painter.circle(head, icon.size.x / 5.0, color, style.markers.border);
}

fn popup_rect(ctx: &Context, rect: Rect, viewport: &Viewport, popup: &Popup, style: &MapStyle) -> Rect {
    let s = &style.popup;
    let galley = ctx.fonts(|f| {
        f.layout(
            popup.content.text(),
            s.body_font.clone(),
            s.text_color,
            s.max_width,
        )
    });
    let size = galley.size() + Vec2::splat(s.padding * 2.0);
    let anchor = to_screen(rect, viewport.lat_lng_to_pixel(&popup.anchor));
    let offset = style.markers.radius + 6.0;
    Rect::from_min_size(
        Pos2::new(anchor.x - size.x / 2.0, anchor.y - offset - size.y),
        size,
    )
}

fn paint_popup(painter: &egui::Painter, rect: Rect, viewport: &Viewport, popup: &Popup, style: &MapStyle) {
    let s = &style.popup;
    let bubble = popup_rect(painter.ctx(), rect, viewport, popup, style);
    let anchor = to_screen(rect, viewport.lat_lng_to_pixel(&popup.anchor));

    painter.add(Shape::convex_polygon(
        vec![
            Pos2::new(anchor.x - 6.0, bubble.max.y - 1.0),
            Pos2::new(anchor.x + 6.0, bubble.max.y - 1.0),
            Pos2::new(anchor.x, anchor.y - style.markers.radius),
        ],
        s.background_color,
        s.border,
    ));
    painter.rect(bubble, s.rounding, s.background_color, s.border);

    let mut cursor = bubble.min + Vec2::splat(s.padding);
    let title = painter.layout(
        popup.content.title.clone(),
        s.title_font.clone(),
        s.text_color,
        s.max_width,
    );
    let title_height = title.size().y;
    painter.galley(cursor, title, s.text_color);
    cursor.y += title_height + 2.0;

    if !popup.content.lines.is_empty() {
        let body = painter.layout(
            popup.content.lines.join("\n"),
            s.body_font.clone(),
            s.text_color,
            s.max_width,
        );
        painter.galley(cursor, body, s.text_color);
    }
}

fn paint_zoom_controls(painter: &egui::Painter, rect: Rect, style: &MapStyle) {
    let c = &style.controls;
    let (zoom_in, zoom_out) = zoom_buttons(rect, style);
    for (button, label) in [(zoom_in, "+"), (zoom_out, "−")] {
        painter.rect(button, c.rounding, c.background_color, c.border);
        painter.text(
            button.center(),
            Align2::CENTER_CENTER,
            label,
            egui::FontId::proportional(16.0),
            c.text_color,
        );
    }
}
