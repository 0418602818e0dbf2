//! Reverse geocoding and weather lookups for the user's position.
//!
//! Both lookups run on a worker thread started once the position is known.
//! Results land in an [`Enrichment`] cache that new workouts copy from, so a
//! workout created before the worker finishes gets whatever was known then.

use crate::types::{Coords, Enrichment};
use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, Sender};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::thread;

pub const DEFAULT_GEOCODE_URL: &str = "https://api.bigdatacloud.net/data/reverse-geocode-client";
pub const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

const KELVIN_OFFSET: f64 = 273.15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Place {
    pub city: String,
    pub country: String,
}

pub trait Geocoder: Send + Sync {
    fn reverse(&self, coords: Coords) -> Result<Place>;
}

pub trait WeatherService: Send + Sync {
    /// Current temperature in Kelvin.
    fn kelvin(&self, coords: Coords) -> Result<f64>;
}

/// Celsius, one decimal, degree sign.
pub fn format_temperature(kelvin: f64) -> String {
    format!("{:.1}°C", kelvin - KELVIN_OFFSET)
}

pub struct HttpGeocoder {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReverseGeocodeResponse {
    #[serde(default)]
    city: String,
    #[serde(default)]
    locality: String,
    #[serde(default)]
    country_name: String,
}

impl HttpGeocoder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

impl Geocoder for HttpGeocoder {
    fn reverse(&self, coords: Coords) -> Result<Place> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("latitude", coords.lat), ("longitude", coords.lng)])
            .send()
            .context("Requesting location data")?;
        if !response.status().is_success() {
            bail!("Problem getting location data ({})", response.status());
        }
        let body: ReverseGeocodeResponse =
            response.json().context("Parsing location data")?;
        place_from_response(body)
    }
}

fn place_from_response(body: ReverseGeocodeResponse) -> Result<Place> {
    let city = if body.city.is_empty() {
        body.locality
    } else {
        body.city
    };
    if city.is_empty() || body.country_name.is_empty() {
        bail!("Location data has no city or country");
    }
    Ok(Place {
        city,
        country: body.country_name,
    })
}

pub struct HttpWeather {
    client: Client,
    url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    main: WeatherMain,
}

#[derive(Debug, Deserialize)]
struct WeatherMain {
    temp: f64,
}

impl HttpWeather {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            api_key: api_key.into(),
        }
    }
}

impl WeatherService for HttpWeather {
    fn kelvin(&self, coords: Coords) -> Result<f64> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("lat", coords.lat.to_string()),
                ("lon", coords.lng.to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .context("Requesting weather data")?;
        if !response.status().is_success() {
            bail!("Problem getting weather data ({})", response.status());
        }
        let body: WeatherResponse = response.json().context("Parsing weather data")?;
        Ok(body.main.temp)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentEvent {
    Place(Place),
    Weather(String),
    Failed(String),
}

/// Folds an event into the cache. Returns the message to show on failure.
pub fn apply(cache: &mut Enrichment, event: EnrichmentEvent) -> Option<String> {
    match event {
        EnrichmentEvent::Place(Place { city, country }) => {
            cache.city = Some(city);
            cache.country = Some(country);
            None
        }
        EnrichmentEvent::Weather(w) => {
            cache.weather_data = Some(w);
            None
        }
        EnrichmentEvent::Failed(msg) => Some(msg),
    }
}

/// Handle on a running lookup worker. Dropping it detaches the worker.
pub struct Enricher {
    rx: Receiver<EnrichmentEvent>,
}

impl Enricher {
    pub fn spawn(
        coords: Coords,
        geocoder: Option<Arc<dyn Geocoder>>,
        weather: Option<Arc<dyn WeatherService>>,
    ) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        thread::spawn(move || run_lookups(coords, geocoder.as_deref(), weather.as_deref(), &tx));
        Self { rx }
    }

    /// Events that arrived so far, without blocking.
    pub fn poll(&self) -> Vec<EnrichmentEvent> {
        self.rx.try_iter().collect()
    }

    /// Blocks until the worker has finished both lookups.
    pub fn wait(&self) -> Vec<EnrichmentEvent> {
        self.rx.iter().collect()
    }
}

fn run_lookups(
    coords: Coords,
    geocoder: Option<&dyn Geocoder>,
    weather: Option<&dyn WeatherService>,
    tx: &Sender<EnrichmentEvent>,
) {
    if let Some(geocoder) = geocoder {
        let event = match geocoder.reverse(coords) {
            Ok(place) => {
                tracing::info!(city = %place.city, country = %place.country, "reverse geocoded");
                EnrichmentEvent::Place(place)
            }
            Err(e) => {
                tracing::warn!(err = %format!("{e:#}"), "reverse geocoding failed");
                EnrichmentEvent::Failed(e.to_string())
            }
        };
        if tx.send(event).is_err() {
            return;
        }
    }

    if let Some(weather) = weather {
        let event = match weather.kelvin(coords) {
            Ok(k) => {
                let formatted = format_temperature(k);
                tracing::info!(weather = %formatted, "weather fetched");
                EnrichmentEvent::Weather(formatted)
            }
            Err(e) => {
                tracing::warn!(err = %format!("{e:#}"), "weather lookup failed");
                EnrichmentEvent::Failed(e.to_string())
            }
        };
        let _ = tx.send(event);
    }
}
