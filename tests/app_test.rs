use anyhow::{Result, bail};
use chrono::{DateTime, Duration, TimeZone, Utc};
use crossbeam_channel::Receiver;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use workmap::app::{App, Notice, Phase, Services, SortField};
use workmap::config::{Config, EnrichmentMode};
use workmap::database::{
    KvStore, MemoryStore, SqliteStore, WORKOUTS_KEY, clear_workouts, load_workouts, save_workouts,
};
use workmap::enrich::{Geocoder, Place, WeatherService};
use workmap::form::{FormInput, InputError};
use workmap::locate::FixedLocator;
use workmap::map::FeatureMap;
use workmap::types::{Coords, Details, Enrichment, KindInput, Workout, WorkoutInput, WorkoutKind};

const HOME: Coords = Coords::new(48.39, -4.48);

struct FakeGeocoder;

impl Geocoder for FakeGeocoder {
    fn reverse(&self, _coords: Coords) -> Result<Place> {
        Ok(Place {
            city: "Brest".into(),
            country: "France".into(),
        })
    }
}

/// Answers only once the test lets it.
struct GatedGeocoder {
    gate: Receiver<()>,
}

impl Geocoder for GatedGeocoder {
    fn reverse(&self, coords: Coords) -> Result<Place> {
        let _ = self.gate.recv();
        FakeGeocoder.reverse(coords)
    }
}

struct FakeWeather(f64);

impl WeatherService for FakeWeather {
    fn kelvin(&self, _coords: Coords) -> Result<f64> {
        Ok(self.0)
    }
}

struct DownWeather;

impl WeatherService for DownWeather {
    fn kelvin(&self, _coords: Coords) -> Result<f64> {
        bail!("Problem getting weather data (503 Service Unavailable)")
    }
}

/// Memory store whose writes fail while `down` is set.
struct FlakyStore {
    inner: MemoryStore,
    down: Rc<Cell<bool>>,
}

impl KvStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if self.down.get() {
            bail!("disk full");
        }
        self.inner.set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.down.get() {
            bail!("disk full");
        }
        self.inner.remove(key)
    }
}

fn flaky(store: MemoryStore) -> (App<FeatureMap, FlakyStore>, Rc<Cell<bool>>) {
    let down = Rc::new(Cell::new(false));
    let store = FlakyStore {
        inner: store,
        down: Rc::clone(&down),
    };
    let mut app = App::new(Config::default(), offline(), FeatureMap::new(), store)
        .unwrap()
        .with_clock(ticking_clock());
    app.start().unwrap();
    (app, down)
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 10, 12, 0, 0).unwrap()
}

fn ticking_clock() -> impl FnMut() -> DateTime<Utc> {
    let mut n = 0;
    move || {
        n += 1;
        base_time() + Duration::seconds(n)
    }
}

fn offline() -> Services {
    Services {
        locator: Box::new(FixedLocator(Some(HOME))),
        geocoder: None,
        weather: None,
    }
}

fn app_with(services: Services, config: Config, store: MemoryStore) -> App<FeatureMap, MemoryStore> {
    App::new(config, services, FeatureMap::new(), store)
        .unwrap()
        .with_clock(ticking_clock())
}

fn started(store: MemoryStore) -> App<FeatureMap, MemoryStore> {
    let mut app = app_with(offline(), Config::default(), store);
    app.start().unwrap();
    app
}

fn running(distance: &str, duration: &str, cadence: &str) -> FormInput {
    FormInput {
        cadence: cadence.into(),
        distance: distance.into(),
        duration: duration.into(),
        ..FormInput::new(WorkoutKind::Running)
    }
}

fn cycling(distance: &str, duration: &str, elevation: &str) -> FormInput {
    FormInput {
        elevation: elevation.into(),
        distance: distance.into(),
        duration: duration.into(),
        ..FormInput::new(WorkoutKind::Cycling)
    }
}

fn add(app: &mut App<FeatureMap, MemoryStore>, at: Coords, input: &FormInput) -> String {
    app.map_click(at).unwrap();
    app.submit(input).unwrap().id().to_string()
}

fn persisted(app: &App<FeatureMap, MemoryStore>) -> Vec<Workout> {
    load_workouts(app.store()).unwrap().unwrap()
}

fn stored(n: usize) -> MemoryStore {
    let mut store = MemoryStore::new();
    let workouts: Vec<Workout> = (0..n)
        .map(|i| {
            let input = WorkoutInput {
                distance: 5.0 + i as f64,
                duration: 30.0,
                extra: KindInput::Running { cadence: 170.0 },
            };
            let date = base_time() - Duration::days(i as i64 + 1);
            Workout::new(input, Coords::new(48.0 + i as f64 / 100.0, -4.5), date, &Enrichment::default())
        })
        .collect();
    save_workouts(&mut store, &workouts).unwrap();
    store
}

#[test]
fn persisted_markers_wait_for_the_map() {
    let mut app = app_with(offline(), Config::default(), stored(2));

    assert_eq!(app.phase(), &Phase::Locating);
    assert_eq!(app.list().len(), 2);
    assert_eq!(app.map().marker_count(), 0);
    assert!(app.map_click(HOME).is_err());

    app.start().unwrap();

    assert_eq!(app.phase(), &Phase::Idle);
    assert_eq!(app.home(), Some(HOME));
    assert_eq!(app.map().view(), Some((HOME, 17)));
    assert_eq!(app.map().marker_count(), 2);
    assert!(app.index().values().all(|e| e.markers.len() == 1));
}

#[test]
fn denied_geolocation_is_terminal() {
    let services = Services {
        locator: Box::new(FixedLocator(None)),
        geocoder: Some(Arc::new(FakeGeocoder)),
        weather: None,
    };
    let mut app = app_with(services, Config::default(), stored(1));
    app.start().unwrap();

    assert!(matches!(app.phase(), Phase::Unavailable { .. }));
    assert!(matches!(app.notices(), [Notice::Alert(msg)] if msg.contains("permission denied")));
    assert!(app.map_click(HOME).is_err());
    let id = app.workouts()[0].id().to_string();
    assert!(app.move_to(&id).is_err());
    assert!(app.start().is_err());

    // The list still shows what was stored.
    assert_eq!(app.list().len(), 1);
    assert_eq!(app.map().marker_count(), 0);
}

#[test]
fn submit_records_renders_and_persists() {
    let mut app = started(MemoryStore::new());
    let at = Coords::new(48.40, -4.49);

    app.map_click(at).unwrap();
    assert!(matches!(app.phase(), Phase::FormOpen { .. }));

    let w = app.submit(&running("5", "25", "170")).unwrap().clone();
    assert_eq!(w.coords(), at);
    assert_eq!(w.details(), &Details::Running { cadence: 170.0, pace: 5.0 });
    assert!(w.description().starts_with("Running on "));

    assert_eq!(app.phase(), &Phase::Idle);
    assert_eq!(app.list().ids(), vec![w.id()]);
    assert!(app.list().nodes()[0].html.contains("workout--running"));

    let handle = app.index()[w.id()].markers[0];
    let marker = app.map().marker(handle).unwrap();
    assert_eq!(marker.coords, at);
    assert_eq!(marker.popup.content, format!("🏃‍♀️ {}", w.description()));
    assert_eq!(marker.icon.class_name, w.id());

    assert_eq!(persisted(&app), vec![w]);
}

#[test]
fn rejected_input_changes_nothing() {
    let mut app = started(MemoryStore::new());
    app.map_click(HOME).unwrap();

    for bad in [
        running("-5", "25", "170"),
        running("5", "abc", "170"),
        cycling("20", "60", "-3"),
        cycling("20", "inf", "100"),
    ] {
        let err = app.submit(&bad).unwrap_err();
        assert!(err.downcast_ref::<InputError>().is_some(), "{bad:?}");
    }

    assert!(app.workouts().is_empty());
    assert!(app.list().is_empty());
    assert_eq!(app.map().marker_count(), 0);
    assert!(app.store().get(WORKOUTS_KEY).unwrap().is_none());
    assert!(matches!(app.phase(), Phase::FormOpen { .. }));
    assert_eq!(app.notices().len(), 4);
    assert!(app.notices().iter().all(|n| matches!(n, Notice::Alert(_))));
}

#[test]
fn submit_needs_an_open_form() {
    let mut app = started(MemoryStore::new());
    assert!(app.submit(&running("5", "25", "170")).is_err());

    app.map_click(HOME).unwrap();
    app.cancel_form();
    assert_eq!(app.phase(), &Phase::Idle);
    assert!(app.submit(&running("5", "25", "170")).is_err());
}

#[test]
fn toggle_switches_the_visible_field() {
    let mut app = started(MemoryStore::new());
    assert!(app.toggle_kind().is_err());

    app.map_click(HOME).unwrap();
    assert_eq!(app.toggle_kind().unwrap(), WorkoutKind::Cycling);
    assert_eq!(app.toggle_kind().unwrap(), WorkoutKind::Running);
}

#[test]
fn sort_by_distance_is_descending() {
    let mut app = started(MemoryStore::new());
    for d in ["5", "10", "2"] {
        add(&mut app, HOME, &running(d, "30", "170"));
    }

    app.sort(SortField::Distance).unwrap();

    let distances: Vec<f64> = app.workouts().iter().map(Workout::distance).collect();
    assert_eq!(distances, vec![10.0, 5.0, 2.0]);
    let stored: Vec<f64> = persisted(&app).iter().map(Workout::distance).collect();
    assert_eq!(stored, distances);

    assert_eq!(app.map().marker_count(), 3);
    assert_eq!(app.list().len(), 3);
    assert!(app.index().values().all(|e| e.markers.len() == 1));
}

#[test]
fn sort_by_duration_is_ascending() {
    let mut app = started(MemoryStore::new());
    for t in ["30", "10", "20"] {
        add(&mut app, HOME, &cycling("20", t, "100"));
    }

    app.sort(SortField::Duration).unwrap();

    let durations: Vec<f64> = app.workouts().iter().map(Workout::duration).collect();
    assert_eq!(durations, vec![10.0, 20.0, 30.0]);
    let stored: Vec<f64> = persisted(&app).iter().map(Workout::duration).collect();
    assert_eq!(stored, durations);
    assert_eq!(app.map().marker_count(), 3);
}

#[test]
fn delete_removes_exactly_one() {
    let mut app = started(MemoryStore::new());
    let a = add(&mut app, Coords::new(1.0, 1.0), &running("5", "25", "170"));
    let b = add(&mut app, Coords::new(2.0, 2.0), &running("6", "30", "170"));
    let c = add(&mut app, Coords::new(3.0, 3.0), &cycling("20", "60", "100"));

    assert!(app.delete(&b).unwrap());

    let ids: Vec<String> = persisted(&app).iter().map(|w| w.id().to_string()).collect();
    assert_eq!(ids, vec![a.clone(), c.clone()]);
    assert_eq!(app.list().ids(), vec![c.as_str(), a.as_str()]);
    assert_eq!(app.map().marker_count(), 2);
    assert!(!app.index().contains_key(&b));

    // Second delete of the same id is a no-op.
    assert!(!app.delete(&b).unwrap());
    assert_eq!(persisted(&app).len(), 2);
}

#[test]
fn delete_before_the_map_is_ready() {
    let store = stored(2);
    let id = load_workouts(&store).unwrap().unwrap()[1].id().to_string();
    let mut app = app_with(offline(), Config::default(), store);

    assert!(app.delete(&id).unwrap());
    assert_eq!(app.list().len(), 1);
    assert_eq!(persisted(&app).len(), 1);
}

#[test]
fn reset_returns_to_first_run() {
    let mut app = started(stored(3));
    let id = app.workouts()[0].id().to_string();
    assert!(app.move_to(&id).unwrap());

    app.reset().unwrap();

    assert!(app.workouts().is_empty());
    assert!(app.list().is_empty());
    assert!(app.index().is_empty());
    assert_eq!(app.map().marker_count(), 0);
    assert_eq!(app.map().view(), Some((HOME, 17)));
    assert!(app.store().get(WORKOUTS_KEY).unwrap().is_none());

    let reloaded = app_with(offline(), Config::default(), app.store().clone());
    assert!(reloaded.workouts().is_empty());
}

#[test]
fn reload_from_sqlite_keeps_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workmap.sqlite3");

    let ids: Vec<String> = {
        let store = SqliteStore::open(&path).unwrap();
        let mut app = App::new(Config::default(), offline(), FeatureMap::new(), store)
            .unwrap()
            .with_clock(ticking_clock());
        app.start().unwrap();
        app.map_click(HOME).unwrap();
        app.submit(&running("5.2", "24", "178")).unwrap();
        app.map_click(HOME).unwrap();
        app.submit(&cycling("27", "95", "523")).unwrap();
        app.workouts().iter().map(|w| w.id().to_string()).collect()
    };

    let store = SqliteStore::open(&path).unwrap();
    let app = App::new(Config::default(), offline(), FeatureMap::new(), store).unwrap();
    let got: Vec<&str> = app.workouts().iter().map(Workout::id).collect();
    assert_eq!(got, ids);
    assert_eq!(app.workouts()[0].details().rate(), 24.0 / 5.2);
    assert_eq!(app.workouts()[1].details().rate(), 27.0 / (95.0 / 60.0));
}

#[test]
fn move_to_and_fit_all_drive_the_map() {
    let mut app = started(MemoryStore::new());
    let id = add(&mut app, Coords::new(10.0, -2.0), &running("5", "25", "170"));
    add(&mut app, Coords::new(20.0, 4.0), &running("5", "25", "170"));

    assert!(app.move_to(&id).unwrap());
    assert_eq!(app.map().view(), Some((Coords::new(10.0, -2.0), 17)));
    assert!(!app.move_to("0000000000").unwrap());

    app.fit_all().unwrap();
    assert_eq!(app.map().view().unwrap().0, Coords::new(15.0, 1.0));
}

#[test]
fn awaited_enrichment_is_in_the_description() {
    let services = Services {
        locator: Box::new(FixedLocator(Some(HOME))),
        geocoder: Some(Arc::new(FakeGeocoder)),
        weather: Some(Arc::new(FakeWeather(290.15))),
    };
    let config = Config {
        enrichment: EnrichmentMode::Await,
        ..Config::default()
    };
    let mut app = app_with(services, config, MemoryStore::new());
    app.start().unwrap();
    app.map_click(HOME).unwrap();
    let w = app.submit(&running("5", "25", "170")).unwrap().clone();

    assert_eq!(w.city(), Some("Brest"));
    assert_eq!(w.country(), Some("France"));
    assert_eq!(w.weather_data(), Some("17.0°C"));
    assert!(w.description().starts_with("Running in Brest, France on "));
    assert!(w.description().ends_with("(17.0°C)"));
}

#[test]
fn stale_enrichment_is_captured_as_is() {
    let (open, gate) = crossbeam_channel::bounded(1);
    let services = Services {
        locator: Box::new(FixedLocator(Some(HOME))),
        geocoder: Some(Arc::new(GatedGeocoder { gate })),
        weather: None,
    };
    let mut app = app_with(services, Config::default(), MemoryStore::new());
    app.start().unwrap();
    assert_eq!(app.phase(), &Phase::Idle);

    let early = add(&mut app, HOME, &running("5", "25", "170"));
    let early_desc = app.workout(&early).unwrap().description().to_string();
    assert!(app.workout(&early).unwrap().city().is_none());

    open.send(()).unwrap();
    for _ in 0..500 {
        app.pump_enrichment();
        if app.enrichment().city.is_some() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    assert_eq!(app.enrichment().city.as_deref(), Some("Brest"));

    // Earlier workouts keep what they were built with.
    assert_eq!(app.workout(&early).unwrap().description(), early_desc);
    assert!(app.workout(&early).unwrap().city().is_none());

    let late = add(&mut app, HOME, &running("5", "25", "170"));
    assert_eq!(app.workout(&late).unwrap().city(), Some("Brest"));
}

#[test]
fn failed_lookup_degrades_gracefully() {
    let services = Services {
        locator: Box::new(FixedLocator(Some(HOME))),
        geocoder: Some(Arc::new(FakeGeocoder)),
        weather: Some(Arc::new(DownWeather)),
    };
    let config = Config {
        enrichment: EnrichmentMode::Await,
        ..Config::default()
    };
    let mut app = app_with(services, config, MemoryStore::new());
    app.start().unwrap();
    app.map_click(HOME).unwrap();
    let w = app.submit(&cycling("20", "60", "0")).unwrap().clone();

    assert_eq!(w.city(), Some("Brest"));
    assert!(w.weather_data().is_none());
    assert!(!w.description().contains("°C"));

    let notices = app.take_notices();
    assert!(matches!(&notices[..], [Notice::Message(msg)] if msg.contains("503")));
    assert!(app.notices().is_empty());
}

#[test]
fn failed_save_leaves_submit_uncommitted() {
    let (mut app, down) = flaky(stored(1));
    app.map_click(HOME).unwrap();

    down.set(true);
    assert!(app.submit(&running("5", "25", "170")).is_err());
    assert_eq!(app.workouts().len(), 1);
    assert_eq!(app.list().len(), 1);
    assert_eq!(app.map().marker_count(), 1);
    assert!(matches!(app.phase(), Phase::FormOpen { .. }));

    down.set(false);
    app.submit(&running("5", "25", "170")).unwrap();
    assert_eq!(app.workouts().len(), 2);
    assert_eq!(app.list().len(), 2);
    assert_eq!(app.map().marker_count(), 2);
    assert_eq!(load_workouts(app.store()).unwrap().unwrap().len(), 2);
}

#[test]
fn failed_save_leaves_delete_and_sort_undone() {
    let (mut app, down) = flaky(stored(3));
    let before: Vec<String> = app.workouts().iter().map(|w| w.id().to_string()).collect();
    let listed: Vec<String> = app.list().ids().into_iter().map(String::from).collect();

    down.set(true);
    assert!(app.delete(&before[1]).is_err());
    assert!(app.sort(SortField::Distance).is_err());

    let after: Vec<String> = app.workouts().iter().map(|w| w.id().to_string()).collect();
    assert_eq!(after, before);
    assert_eq!(app.list().ids(), listed);
    assert_eq!(app.map().marker_count(), 3);
    assert!(app.index().values().all(|e| e.markers.len() == 1));
    assert_eq!(load_workouts(app.store()).unwrap().unwrap().len(), 3);
}

#[test]
fn failed_clear_leaves_reset_undone() {
    let (mut app, down) = flaky(stored(3));

    down.set(true);
    assert!(app.reset().is_err());
    assert_eq!(app.workouts().len(), 3);
    assert_eq!(app.list().len(), 3);
    assert_eq!(app.map().marker_count(), 3);
    assert_eq!(load_workouts(app.store()).unwrap().unwrap().len(), 3);
}

#[test]
fn colliding_ids_keep_a_marker_each() {
    let mut app = app_with(offline(), Config::default(), MemoryStore::new()).with_clock(base_time);
    app.start().unwrap();
    let first = Coords::new(1.0, 1.0);
    let second = Coords::new(2.0, 2.0);
    let id = add(&mut app, first, &running("5", "25", "170"));
    assert_eq!(add(&mut app, second, &cycling("20", "60", "100")), id);

    assert_eq!(app.map().marker_count(), 2);
    assert_eq!(app.index()[&id].markers.len(), 2);

    assert!(app.delete(&id).unwrap());
    assert_eq!(app.workouts().len(), 1);
    assert_eq!(app.workouts()[0].kind(), WorkoutKind::Cycling);
    assert_eq!(app.list().len(), 1);
    assert!(app.list().nodes()[0].html.contains("workout--cycling"));
    let handle = app.index()[&id].markers[0];
    assert_eq!(app.map().marker(handle).unwrap().coords, second);

    assert!(app.delete(&id).unwrap());
    assert!(app.workouts().is_empty());
    assert!(app.list().is_empty());
    assert!(app.index().is_empty());
    assert_eq!(app.map().marker_count(), 0);
}

#[test]
fn reset_forgets_place_and_looks_it_up_again() {
    let services = Services {
        locator: Box::new(FixedLocator(Some(HOME))),
        geocoder: Some(Arc::new(FakeGeocoder)),
        weather: None,
    };
    let config = Config {
        enrichment: EnrichmentMode::Await,
        ..Config::default()
    };
    let mut app = app_with(services, config, MemoryStore::new());
    app.start().unwrap();
    add(&mut app, HOME, &running("5", "25", "170"));
    assert_eq!(app.enrichment().city.as_deref(), Some("Brest"));

    app.reset().unwrap();
    assert_eq!(app.enrichment(), &Enrichment::default());

    add(&mut app, HOME, &running("5", "25", "170"));
    assert_eq!(app.workouts()[0].city(), Some("Brest"));
}

#[test]
fn unreadable_store_recovers_once_cleared() {
    let mut store = MemoryStore::new();
    store.set(WORKOUTS_KEY, "{not json").unwrap();
    assert!(App::new(Config::default(), offline(), FeatureMap::new(), store.clone()).is_err());

    clear_workouts(&mut store).unwrap();
    let app = app_with(offline(), Config::default(), store);
    assert!(app.workouts().is_empty());
}
