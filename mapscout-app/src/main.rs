use anyhow::Context as _;
use clap::Parser;
use mapscout::core::config::AppConfig;
use mapscout::layers::{MarkerIcon, MarkerKind};
use mapscout::offline::{Fetcher, HttpFetcher, OfflineFetcher, WorkerRegistry};
use mapscout::services::geolocation::{FixedLocation, IpLocation, LocationProvider};
use mapscout::services::overpass::PoiCategory;
use mapscout::session::{Command, MapSession, Services, SessionHandle};
use mapscout::tiles::{TemplateSource, TileLoader};
use mapscout::ui::{MapEvent, MapView, MapTextures};
use mapscout::LatLng;
use std::path::PathBuf;
use std::sync::Arc;

/// Offline-capable map viewer
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON configuration file; missing fields take their defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Keep the offline cache on disk in this directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    /// Offline cache generation; changing it discards older generations
    #[arg(long)]
    cache_version: Option<String>,
    /// Pretend the network is down and serve only what is cached
    #[arg(long)]
    offline: bool,
    /// Empty the active cache generation at start-up
    #[arg(long)]
    clear_cache: bool,
    /// Report this position instead of looking it up by IP, as `lat,lng`
    #[arg(long, value_parser = parse_lat_lng)]
    location: Option<LatLng>,
}

fn parse_lat_lng(raw: &str) -> Result<LatLng, String> {
    let (lat, lng) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected lat,lng, got {raw:?}"))?;
    let at = LatLng::new(
        lat.trim().parse().map_err(|e| format!("bad latitude: {e}"))?,
        lng.trim().parse().map_err(|e| format!("bad longitude: {e}"))?,
    );
    if !at.is_valid() {
        return Err(format!("{raw} is out of range"));
    }
    Ok(at)
}

impl Args {
    fn load_config(&self) -> anyhow::Result<AppConfig> {
        let config = match &self.config {
            Some(path) => AppConfig::load(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => AppConfig::default(),
        };
        let mut config = config.from_env_overrides()?;
        if let Some(dir) = &self.cache_dir {
            config.offline.cache_dir = Some(dir.clone());
        }
        if let Some(version) = &self.cache_version {
            config.offline.version = version.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mapscout::init_logging();
    let args = Args::parse();
    let config = args.load_config()?;

    let network: Arc<dyn Fetcher> = if args.offline {
        log::warn!("running with the network disabled");
        Arc::new(OfflineFetcher)
    } else {
        Arc::new(HttpFetcher::new(&config.services)?)
    };
    let registry = WorkerRegistry::bootstrap(&config.offline_with_assets(), network)
        .await
        .context("starting the offline cache")?;
    if args.clear_cache {
        if let Some(worker) = registry.controller() {
            let removed = worker.clear()?;
            log::info!("cleared {} cached responses", removed);
        }
    }

    let fetcher: Arc<dyn Fetcher> = Arc::new(registry.clone());
    let locator: Arc<dyn LocationProvider> = match args.location {
        Some(at) => Arc::new(FixedLocation::new(at)),
        None => Arc::new(IpLocation::new(
            config.services.geolocation_url.clone(),
            fetcher.clone(),
        )),
    };
    let marker_icon = match config.assets.marker_icon_url.as_deref() {
        Some(url) => match MarkerIcon::fetch(fetcher.as_ref(), url).await {
            Ok(icon) => Some(icon),
            Err(e) => {
                log::warn!("drawing plain markers, icon unavailable: {}", e);
                None
            }
        },
        None => None,
    };
    let services = Services::new(&config, fetcher.clone(), locator);
    let loader = TileLoader::new(
        Arc::new(TemplateSource::from_config(&config.tiles)),
        fetcher,
        &config.tiles,
    );
    let mut app = MapscoutApp::new(
        SessionHandle::new(MapSession::new(&config, services)),
        loader,
        registry,
        &config,
    );
    app.marker_icon = marker_icon;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_title("Mapscout"),
        ..Default::default()
    };
    eframe::run_native("mapscout-app", options, Box::new(move |_cc| Box::new(app)))
        .map_err(|e| anyhow::anyhow!("viewer exited with an error: {e}"))
}

struct MapscoutApp {
    handle: SessionHandle,
    loader: TileLoader,
    textures: MapTextures,
    /// Uploaded on the first frame, once there is a GPU context
    marker_icon: Option<MarkerIcon>,
    registry: WorkerRegistry,
    categories: Vec<PoiCategory>,
    category: PoiCategory,
    query: String,
    show_panel: bool,
}

impl MapscoutApp {
    fn new(handle: SessionHandle, loader: TileLoader, registry: WorkerRegistry, config: &AppConfig) -> Self {
        let categories: Vec<PoiCategory> = config
            .poi
            .categories
            .iter()
            .filter_map(|name| match name.parse() {
                Ok(category) => Some(category),
                Err(e) => {
                    log::warn!("ignoring POI category: {}", e);
                    None
                }
            })
            .collect();
        let category = categories.first().copied().unwrap_or(PoiCategory::Restaurant);
        Self {
            handle,
            loader,
            textures: MapTextures::new(),
            marker_icon: None,
            registry,
            categories,
            category,
            query: String::new(),
            show_panel: true,
        }
    }

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let edit = ui.add(egui::TextEdit::singleline(&mut self.query).hint_text("Search places"));
            let submitted = edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if submitted || ui.button("Search").clicked() {
                self.handle.dispatch(Command::Search(self.query.clone()));
            }
            ui.separator();

            if ui.button("Locate me").clicked() {
                self.handle.dispatch(Command::Locate);
            }
            ui.separator();

            egui::ComboBox::from_id_source("poi_category")
                .selected_text(self.category.label())
                .show_ui(ui, |ui| {
                    for category in &self.categories {
                        ui.selectable_value(&mut self.category, *category, category.label());
                    }
                });
            if ui.button("Nearby").clicked() {
                self.handle.dispatch(Command::FindNearby(self.category));
            }
            ui.separator();

            if ui.button("Directions").clicked() {
                self.handle.dispatch(Command::Directions);
            }
            if ui.button("Clear").clicked() {
                self.handle.session_mut().clear();
            }
            ui.checkbox(&mut self.show_panel, "Details");

            if self.handle.is_loading() {
                ui.spinner();
            }
        });
    }

    fn details(&mut self, ui: &mut egui::Ui) {
        ui.heading("Route");
        let picked = self
            .handle
            .session()
            .overlays()
            .first_of(MarkerKind::Picked)
            .map(|m| m.position);
        ui.add_enabled_ui(picked.is_some(), |ui| {
            ui.horizontal(|ui| {
                if let Some(at) = picked {
                    if ui.button("Start here").clicked() {
                        self.handle.session_mut().set_route_start(at);
                    }
                    if ui.button("End here").clicked() {
                        self.handle.session_mut().set_route_end(at);
                    }
                }
            });
        });
        let (start, end) = self.handle.session().route_endpoints();
        let show = |p: Option<LatLng>| p.map(|p| p.to_display()).unwrap_or_else(|| "not set".into());
        ui.label(format!("From: {}", show(start)));
        ui.label(format!("To: {}", show(end)));
        if let Some(route) = self.handle.session().overlays().route() {
            ui.label(&route.summary);
        }

        ui.separator();
        ui.heading("Offline cache");
        match self.registry.controller() {
            Some(worker) => {
                let stats = worker.stats();
                ui.label(format!("{} ({})", worker.cache_name(), worker.state()));
                ui.label(format!("{} entries", stats.entries));
                ui.label(format!("{} hits / {} misses", stats.hits, stats.misses));
                if stats.network_errors > 0 {
                    ui.label(format!("{} requests failed offline", stats.network_errors));
                }
            }
            None => {
                ui.label("disabled");
            }
        }
        if let Some(waiting) = self.registry.waiting() {
            ui.label(format!("{} is waiting", waiting.cache_name()));
            if ui.button("Switch now").clicked() {
                if let Err(e) = self.registry.skip_waiting() {
                    log::error!("could not activate {}: {}", waiting.cache_name(), e);
                }
            }
        }

        ui.separator();
        let viewport = self.handle.session().viewport();
        ui.label(format!(
            "Center: {} | Zoom: {:.1}",
            viewport.center.to_display(),
            viewport.zoom
        ));
        ui.label(format!(
            "Tiles: {} cached, {} loading",
            self.loader.cache().len(),
            self.loader.pending()
        ));
    }

    fn alert(&mut self, ctx: &egui::Context) {
        let Some(alert) = self.handle.session().alert().cloned() else {
            return;
        };
        egui::Window::new("Notice")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_TOP, [0.0, 40.0])
            .show(ctx, |ui| {
                ui.label(&alert.message);
                if ui.button("OK").clicked() {
                    self.handle.session_mut().dismiss_alert();
                }
            });
    }
}

impl eframe::App for MapscoutApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some(icon) = self.marker_icon.take() {
            self.textures.set_marker_icon(ctx, &icon);
        }
        if self.handle.poll() > 0 {
            ctx.request_repaint();
        }
        if self.handle.is_loading() {
            ctx.request_repaint_after(std::time::Duration::from_millis(50));
        }

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| self.toolbar(ui));
        if self.show_panel {
            egui::SidePanel::right("details")
                .resizable(true)
                .show(ctx, |ui| self.details(ui));
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let (_, event) =
                    MapView::new(self.handle.session_mut(), &self.loader, &mut self.textures)
                        .show(ui);
                match event {
                    Some(MapEvent::Clicked(at)) => self.handle.dispatch(Command::PickPoint(at)),
                    Some(MapEvent::ContextClicked(at)) => {
                        let session = self.handle.session_mut();
                        match session.route_endpoints() {
                            (None, _) => session.set_route_start(at),
                            _ => session.set_route_end(at),
                        }
                    }
                    Some(MapEvent::MarkerClicked(_)) | None => {}
                }
            });

        self.alert(ctx);
    }
}
