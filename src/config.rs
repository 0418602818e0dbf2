use crate::app::Services;
use crate::enrich::{
    DEFAULT_GEOCODE_URL, DEFAULT_WEATHER_URL, Geocoder, HttpGeocoder, HttpWeather, WeatherService,
};
use crate::locate::{DEFAULT_LOCATE_URL, FixedLocator, IpLocator, Locator};
use crate::map::DEFAULT_ZOOM;
use crate::types::Coords;
use std::sync::Arc;

/// How a new workout picks up place and weather data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnrichmentMode {
    /// Use whatever the lookups have returned so far.
    #[default]
    Stale,
    /// Block until both lookups have finished.
    Await,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub zoom: u8,
    pub enrichment: EnrichmentMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zoom: DEFAULT_ZOOM,
            enrichment: EnrichmentMode::Stale,
        }
    }
}

/// Where the external collaborators live.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub home: Option<Coords>,
    pub offline: bool,
    pub locate_url: String,
    pub geocode_url: String,
    pub weather_url: String,
    pub weather_key: Option<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            home: None,
            offline: false,
            locate_url: DEFAULT_LOCATE_URL.to_string(),
            geocode_url: DEFAULT_GEOCODE_URL.to_string(),
            weather_url: DEFAULT_WEATHER_URL.to_string(),
            weather_key: None,
        }
    }
}

impl Endpoints {
    /// A pinned home position wins over the IP lookup. Offline mode
    /// disables every HTTP service; without a pinned home the position is
    /// then unavailable.
    pub fn services(&self) -> Services {
        let locator: Box<dyn Locator> = match (self.home, self.offline) {
            (Some(home), _) => Box::new(FixedLocator(Some(home))),
            (None, true) => Box::new(FixedLocator(None)),
            (None, false) => Box::new(IpLocator::new(self.locate_url.clone())),
        };

        if self.offline {
            return Services {
                locator,
                geocoder: None,
                weather: None,
            };
        }

        let geocoder: Arc<dyn Geocoder> =
            Arc::new(HttpGeocoder::new(self.geocode_url.clone()));

        let weather = self.weather_key.as_ref().map(|key| {
            Arc::new(HttpWeather::new(self.weather_url.clone(), key.clone()))
                as Arc<dyn WeatherService>
        });
        if weather.is_none() {
            tracing::info!("no weather API key; weather lookups disabled");
        }

        Services {
            locator,
            geocoder: Some(geocoder),
            weather,
        }
    }
}
