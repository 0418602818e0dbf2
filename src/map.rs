use crate::types::{Coords, WorkoutKind};
use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeMap;

pub const DEFAULT_ZOOM: u8 = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerHandle(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    pub url: String,
    pub size: [i32; 2],
    pub anchor: [i32; 2],
    pub popup_anchor: [i32; 2],
    pub class_name: String,
}

impl Icon {
    pub fn for_workout(id: &str) -> Self {
        Self {
            url: "icon.png".to_string(),
            size: [40, 40],
            anchor: [22, 20],
            popup_anchor: [-1, -15],
            class_name: id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Popup {
    pub content: String,
    pub class_name: String,
    pub max_width: u32,
    pub min_width: u32,
}

impl Popup {
    pub fn new(kind: WorkoutKind, content: String) -> Self {
        Self {
            content,
            class_name: format!("{kind}-popup"),
            max_width: 250,
            min_width: 150,
        }
    }
}

/// The interactive map. Implementations own tiles and drawing.
pub trait MapWidget {
    fn initialize(&mut self, center: Coords, zoom: u8);
    fn add_marker(&mut self, coords: Coords, icon: Icon, popup: Popup) -> MarkerHandle;
    /// `false` if the marker was already gone.
    fn remove_marker(&mut self, handle: MarkerHandle) -> bool;
    fn clear_markers(&mut self);
    fn set_view(&mut self, center: Coords, zoom: u8);
    fn fit_bounds(&mut self, points: &[Coords]);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub coords: Coords,
    pub icon: Icon,
    pub popup: Popup,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub south_west: Coords,
    pub north_east: Coords,
}

impl Bounds {
    pub fn around(points: &[Coords]) -> Option<Self> {
        let first = *points.first()?;
        let mut sw = first;
        let mut ne = first;
        for p in &points[1..] {
            sw.lat = sw.lat.min(p.lat);
            sw.lng = sw.lng.min(p.lng);
            ne.lat = ne.lat.max(p.lat);
            ne.lng = ne.lng.max(p.lng);
        }
        Some(Self {
            south_west: sw,
            north_east: ne,
        })
    }

    pub fn center(&self) -> Coords {
        Coords::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }
}

/// Map that keeps its state in memory and renders to GeoJSON.
#[derive(Debug, Default, Clone)]
pub struct FeatureMap {
    view: Option<(Coords, u8)>,
    bounds: Option<Bounds>,
    markers: BTreeMap<MarkerHandle, Marker>,
    next_handle: u64,
}

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn view(&self) -> Option<(Coords, u8)> {
        self.view
    }

    pub const fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn marker(&self, handle: MarkerHandle) -> Option<&Marker> {
        self.markers.get(&handle)
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    /// One Point per marker, `[lng, lat]` order; bbox from the last fit.
    pub fn to_feature_collection(&self) -> FeatureCollection {
        let features = self.markers.values().map(marker_to_feature).collect();

        let bbox = self.bounds.map(|b| {
            vec![
                b.south_west.lng,
                b.south_west.lat,
                b.north_east.lng,
                b.north_east.lat,
            ]
        });

        let mut foreign = Map::new();
        if let Some((center, zoom)) = self.view {
            foreign.insert(
                "view".to_string(),
                json!({ "center": [center.lat, center.lng], "zoom": zoom }),
            );
        }

        FeatureCollection {
            bbox,
            features,
            foreign_members: (!foreign.is_empty()).then_some(foreign),
        }
    }
}

fn marker_to_feature(m: &Marker) -> Feature {
    let geometry = Geometry::new(Value::Point(vec![m.coords.lng, m.coords.lat]));

    let mut props = Map::new();
    props.insert("id".to_string(), JsonValue::String(m.icon.class_name.clone()));
    props.insert("popup".to_string(), JsonValue::String(m.popup.content.clone()));
    props.insert(
        "popupClass".to_string(),
        JsonValue::String(m.popup.class_name.clone()),
    );
    props.insert("icon".to_string(), JsonValue::String(m.icon.url.clone()));

    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}

impl MapWidget for FeatureMap {
    fn initialize(&mut self, center: Coords, zoom: u8) {
        self.view = Some((center, zoom));
    }

    fn add_marker(&mut self, coords: Coords, icon: Icon, popup: Popup) -> MarkerHandle {
        let handle = MarkerHandle(self.next_handle);
        self.next_handle += 1;
        self.markers.insert(handle, Marker { coords, icon, popup });
        handle
    }

    fn remove_marker(&mut self, handle: MarkerHandle) -> bool {
        self.markers.remove(&handle).is_some()
    }

    fn clear_markers(&mut self) {
        self.markers.clear();
    }

    fn set_view(&mut self, center: Coords, zoom: u8) {
        self.view = Some((center, zoom));
    }

    fn fit_bounds(&mut self, points: &[Coords]) {
        let Some(bounds) = Bounds::around(points) else {
            return;
        };
        let zoom = self.view.map_or(DEFAULT_ZOOM, |(_, z)| z);
        self.view = Some((bounds.center(), zoom));
        self.bounds = Some(bounds);
    }
}
