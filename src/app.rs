//! The application controller.
//!
//! `App` owns every piece of session state: the workout list, the rendered
//! list, the map markers and the id index tying them together. Whoever runs
//! the event loop calls its methods for each user action; every mutation of
//! the list is written back to the store before the method returns.

use crate::config::{Config, EnrichmentMode};
use crate::database::{KvStore, clear_workouts, load_workouts, save_workouts};
use crate::dlog;
use crate::enrich::{self, Enricher, Geocoder, WeatherService};
use crate::form::{FormInput, FormState};
use crate::locate::Locator;
use crate::map::{Icon, MapWidget, Popup};
use crate::render::{ListView, ViewIndex, popup_content};
use crate::types::{Coords, Enrichment, Workout, WorkoutKind};
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// External collaborators that are not drawn on screen.
pub struct Services {
    pub locator: Box<dyn Locator>,
    pub geocoder: Option<Arc<dyn Geocoder>>,
    pub weather: Option<Arc<dyn WeatherService>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Locating,
    MapReady,
    Idle,
    FormOpen { coords: CoordsKey, form: FormState },
    /// Terminal: no position, no map.
    Unavailable { message: String },
}

/// Click position carried by an open form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordsKey(pub Coords);

// Coordinates come from map clicks and are never NaN.
impl Eq for CoordsKey {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SortField {
    /// Longest first.
    Distance,
    /// Shortest first.
    Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Blocks the user until acknowledged.
    Alert(String),
    /// Informational, goes away on its own.
    Message(String),
}

pub type Clock = Box<dyn FnMut() -> DateTime<Utc>>;

pub struct App<M: MapWidget, S: KvStore> {
    config: Config,
    services: Services,
    map: M,
    store: S,
    clock: Clock,

    phase: Phase,
    home: Option<Coords>,
    workouts: Vec<Workout>,
    list: ListView,
    index: ViewIndex,

    enricher: Option<Enricher>,
    enrichment: Enrichment,
    notices: Vec<Notice>,
}

impl<M: MapWidget, S: KvStore> App<M, S> {
    /// Loads stored workouts and renders their list entries. Markers wait
    /// for [`App::start`].
    pub fn new(config: Config, services: Services, map: M, store: S) -> Result<Self> {
        let workouts = load_workouts(&store)?.unwrap_or_default();

        let mut app = Self {
            config,
            services,
            map,
            store,
            clock: Box::new(Utc::now),
            phase: Phase::Locating,
            home: None,
            workouts,
            list: ListView::default(),
            index: ViewIndex::new(),
            enricher: None,
            enrichment: Enrichment::default(),
            notices: Vec::new(),
        };

        for w in &app.workouts {
            app.list.insert_after_form(w);
            app.index.entry(w.id().to_string()).or_default();
        }
        tracing::info!(workouts = app.workouts.len(), "session loaded");

        Ok(app)
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl FnMut() -> DateTime<Utc> + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Locates the user, then brings up the map. A failed lookup leaves the
    /// app in [`Phase::Unavailable`] for good.
    pub fn start(&mut self) -> Result<()> {
        if self.phase != Phase::Locating {
            bail!("already started");
        }

        let position = match self.services.locator.locate() {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(err = %e, "geolocation failed");
                let message = e.to_string();
                self.notices.push(Notice::Alert(message.clone()));
                self.phase = Phase::Unavailable { message };
                return Ok(());
            }
        };
        dlog!("located position={position}");

        self.home = Some(position);
        self.map.initialize(position, self.config.zoom);
        self.phase = Phase::MapReady;

        for i in 0..self.workouts.len() {
            self.draw_marker(i);
        }

        self.enricher = self.spawn_enricher(position);

        self.phase = Phase::Idle;
        tracing::info!(markers = self.workouts.len(), "map ready");
        Ok(())
    }

    /// Shows the form for a new workout at `coords`.
    pub fn map_click(&mut self, coords: Coords) -> Result<()> {
        match self.phase {
            Phase::Idle | Phase::FormOpen { .. } => {
                self.phase = Phase::FormOpen {
                    coords: CoordsKey(coords),
                    form: FormState::default(),
                };
                Ok(())
            }
            _ => bail!("map is not ready"),
        }
    }

    pub fn toggle_kind(&mut self) -> Result<WorkoutKind> {
        match &mut self.phase {
            Phase::FormOpen { form, .. } => Ok(form.toggle_kind()),
            _ => bail!("form is not open"),
        }
    }

    pub fn cancel_form(&mut self) {
        if matches!(self.phase, Phase::FormOpen { .. }) {
            self.phase = Phase::Idle;
        }
    }

    /// Validates the form and records the workout. A rejected form raises an
    /// alert and leaves everything as it was.
    pub fn submit(&mut self, input: &FormInput) -> Result<&Workout> {
        let Phase::FormOpen { coords, .. } = &self.phase else {
            bail!("form is not open");
        };
        let coords = coords.0;

        let valid = match input.validate() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(err = %e, "rejected workout input");
                self.notices.push(Notice::Alert(e.to_string()));
                return Err(e.into());
            }
        };

        match self.config.enrichment {
            EnrichmentMode::Stale => self.pump_enrichment(),
            EnrichmentMode::Await => self.await_enrichment(),
        }

        let workout = Workout::new(valid, coords, (self.clock)(), &self.enrichment);
        tracing::info!(
            id = workout.id(),
            kind = %workout.kind(),
            distance = workout.distance(),
            duration = workout.duration(),
            "new workout"
        );

        self.workouts.push(workout);
        if let Err(e) = save_workouts(&mut self.store, &self.workouts) {
            self.workouts.pop();
            return Err(e);
        }

        let i = self.workouts.len() - 1;
        self.index.entry(self.workouts[i].id().to_string()).or_default();
        self.draw_marker(i);
        self.list.insert_after_form(&self.workouts[i]);

        self.phase = Phase::Idle;
        Ok(&self.workouts[i])
    }

    /// Centers the map on a workout. `false` for an unknown id.
    pub fn move_to(&mut self, id: &str) -> Result<bool> {
        if !self.map_ready() {
            bail!("map is not ready");
        }
        let Some(w) = self.find(id) else {
            return Ok(false);
        };
        let coords = w.coords();
        self.map.set_view(coords, self.config.zoom);
        Ok(true)
    }

    /// Removes one workout everywhere. Unknown ids are a no-op. When two
    /// workouts share an id the oldest goes first, along with its own list
    /// node and marker.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        let Some(pos) = self.workouts.iter().position(|w| w.id() == id) else {
            tracing::warn!(id, "delete of unknown workout");
            return Ok(false);
        };

        let removed = self.workouts.remove(pos);
        if let Err(e) = save_workouts(&mut self.store, &self.workouts) {
            self.workouts.insert(pos, removed);
            return Err(e);
        }

        self.list.remove(id);
        if let Some(entry) = self.index.get_mut(id)
            && !entry.markers.is_empty()
        {
            let handle = entry.markers.remove(0);
            if !self.map.remove_marker(handle) {
                dlog!("marker already gone id={id}");
            }
        }
        if self.find(id).is_none() {
            self.index.remove(id);
        }

        tracing::info!(id, remaining = self.workouts.len(), "deleted workout");
        Ok(true)
    }

    /// Re-orders the list and redraws every entry and marker.
    pub fn sort(&mut self, field: SortField) -> Result<()> {
        let mut sorted = self.workouts.clone();
        match field {
            SortField::Distance => sorted.sort_by(|a, b| b.distance().total_cmp(&a.distance())),
            SortField::Duration => sorted.sort_by(|a, b| a.duration().total_cmp(&b.duration())),
        }
        save_workouts(&mut self.store, &sorted)?;

        self.workouts = sorted;
        self.clear_views();
        for i in 0..self.workouts.len() {
            self.index.entry(self.workouts[i].id().to_string()).or_default();
            self.list.insert_after_form(&self.workouts[i]);
            self.draw_marker(i);
        }

        dlog!("sorted field={field:?} count={}", self.workouts.len());
        Ok(())
    }

    /// Back to a first run: nothing stored, nothing drawn, and place and
    /// weather looked up afresh.
    pub fn reset(&mut self) -> Result<()> {
        clear_workouts(&mut self.store)?;
        self.workouts.clear();
        self.clear_views();

        self.enrichment = Enrichment::default();
        self.enricher = None;
        if let Some(home) = self.home
            && self.map_ready()
        {
            self.map.set_view(home, self.config.zoom);
            self.enricher = self.spawn_enricher(home);
        }
        self.cancel_form();

        tracing::info!("reset all workouts");
        Ok(())
    }

    /// Zooms the map out to show every workout.
    pub fn fit_all(&mut self) -> Result<()> {
        if !self.map_ready() {
            bail!("map is not ready");
        }
        let points: Vec<Coords> = self.workouts.iter().map(Workout::coords).collect();
        self.map.fit_bounds(&points);
        Ok(())
    }

    /// Folds finished lookups into the cache without blocking.
    pub fn pump_enrichment(&mut self) {
        let Some(enricher) = &self.enricher else {
            return;
        };
        for event in enricher.poll() {
            if let Some(msg) = enrich::apply(&mut self.enrichment, event) {
                self.notices.push(Notice::Message(msg));
            }
        }
    }

    fn spawn_enricher(&self, position: Coords) -> Option<Enricher> {
        if self.services.geocoder.is_none() && self.services.weather.is_none() {
            return None;
        }
        Some(Enricher::spawn(
            position,
            self.services.geocoder.clone(),
            self.services.weather.clone(),
        ))
    }

    fn await_enrichment(&mut self) {
        let Some(enricher) = self.enricher.take() else {
            return;
        };
        for event in enricher.wait() {
            if let Some(msg) = enrich::apply(&mut self.enrichment, event) {
                self.notices.push(Notice::Message(msg));
            }
        }
    }

    fn draw_marker(&mut self, i: usize) {
        if !self.map_ready() {
            return;
        }
        let w = &self.workouts[i];
        let handle = self.map.add_marker(
            w.coords(),
            Icon::for_workout(w.id()),
            Popup::new(w.kind(), popup_content(w)),
        );
        self.index
            .entry(w.id().to_string())
            .or_default()
            .markers
            .push(handle);
    }

    fn clear_views(&mut self) {
        self.list.clear();
        self.index.clear();
        if self.map_ready() {
            self.map.clear_markers();
        }
    }

    fn find(&self, id: &str) -> Option<&Workout> {
        self.workouts.iter().find(|w| w.id() == id)
    }

    pub const fn map_ready(&self) -> bool {
        matches!(
            self.phase,
            Phase::MapReady | Phase::Idle | Phase::FormOpen { .. }
        )
    }

    pub const fn phase(&self) -> &Phase {
        &self.phase
    }

    pub const fn home(&self) -> Option<Coords> {
        self.home
    }

    pub fn workouts(&self) -> &[Workout] {
        &self.workouts
    }

    pub fn workout(&self, id: &str) -> Option<&Workout> {
        self.find(id)
    }

    pub const fn list(&self) -> &ListView {
        &self.list
    }

    pub const fn index(&self) -> &ViewIndex {
        &self.index
    }

    pub const fn map(&self) -> &M {
        &self.map
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn enrichment(&self) -> &Enrichment {
        &self.enrichment
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }
}
