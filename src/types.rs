use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A map position, stored as `[lat, lng]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coords {
    pub lat: f64,
    pub lng: f64,
}

impl Coords {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl From<[f64; 2]> for Coords {
    fn from([lat, lng]: [f64; 2]) -> Self {
        Self { lat, lng }
    }
}

impl From<Coords> for [f64; 2] {
    fn from(c: Coords) -> Self {
        [c.lat, c.lng]
    }
}

impl fmt::Display for Coords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5},{:.5}", self.lat, self.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WorkoutKind {
    Running,
    Cycling,
}

impl WorkoutKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Cycling => "cycling",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Cycling => "Cycling",
        }
    }

    pub const fn emoji(self) -> &'static str {
        match self {
            Self::Running => "🏃‍♀️",
            Self::Cycling => "🚴‍♀️",
        }
    }

    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Running => Self::Cycling,
            Self::Cycling => Self::Running,
        }
    }
}

impl fmt::Display for WorkoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minutes per kilometre.
pub fn pace(distance_km: f64, duration_min: f64) -> f64 {
    duration_min / distance_km
}

/// Kilometres per hour.
pub fn speed(distance_km: f64, duration_min: f64) -> f64 {
    distance_km / (duration_min / 60.0)
}

/// Type-specific fields, tagged by `type` in the persisted blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Details {
    Running {
        cadence: f64,
        pace: f64,
    },
    #[serde(rename_all = "camelCase")]
    Cycling {
        elevation_gain: f64,
        speed: f64,
    },
}

impl Details {
    pub const fn kind(&self) -> WorkoutKind {
        match self {
            Self::Running { .. } => WorkoutKind::Running,
            Self::Cycling { .. } => WorkoutKind::Cycling,
        }
    }

    /// Pace for running, speed for cycling.
    pub const fn rate(&self) -> f64 {
        match self {
            Self::Running { pace, .. } => *pace,
            Self::Cycling { speed, .. } => *speed,
        }
    }
}

/// Validated numbers for a new workout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkoutInput {
    pub distance: f64,
    pub duration: f64,
    pub extra: KindInput,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KindInput {
    Running { cadence: f64 },
    Cycling { elevation_gain: f64 },
}

/// Place and weather known at the time a workout is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub city: Option<String>,
    pub country: Option<String>,
    pub weather_data: Option<String>,
}

/// A logged workout. Everything is fixed at construction; the rate and the
/// description are never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workout {
    id: String,
    date: DateTime<Utc>,
    coords: Coords,
    distance: f64,
    duration: f64,
    city: Option<String>,
    country: Option<String>,
    weather_data: Option<String>,
    description: String,
    #[serde(flatten)]
    details: Details,
}

impl Workout {
    /// Builds a workout from already validated input.
    pub fn new(
        input: WorkoutInput,
        coords: Coords,
        date: DateTime<Utc>,
        enrichment: &Enrichment,
    ) -> Self {
        let WorkoutInput {
            distance,
            duration,
            extra,
        } = input;

        let details = match extra {
            KindInput::Running { cadence } => Details::Running {
                cadence,
                pace: pace(distance, duration),
            },
            KindInput::Cycling { elevation_gain } => Details::Cycling {
                elevation_gain,
                speed: speed(distance, duration),
            },
        };

        let Enrichment {
            city,
            country,
            weather_data,
        } = enrichment.clone();

        let description = describe(
            details.kind(),
            date,
            city.as_deref(),
            country.as_deref(),
            weather_data.as_deref(),
        );

        Self {
            id: id_from_date(date),
            date,
            coords,
            distance,
            duration,
            city,
            country,
            weather_data,
            description,
            details,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub const fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub const fn coords(&self) -> Coords {
        self.coords
    }

    pub const fn distance(&self) -> f64 {
        self.distance
    }

    pub const fn duration(&self) -> f64 {
        self.duration
    }

    pub fn city(&self) -> Option<&str> {
        self.city.as_deref()
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    pub fn weather_data(&self) -> Option<&str> {
        self.weather_data.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub const fn details(&self) -> &Details {
        &self.details
    }

    pub const fn kind(&self) -> WorkoutKind {
        self.details.kind()
    }
}

/// Last 10 digits of the creation time in milliseconds.
fn id_from_date(date: DateTime<Utc>) -> String {
    let ms = date.timestamp_millis().unsigned_abs().to_string();
    let start = ms.len().saturating_sub(10);
    ms[start..].to_string()
}

fn describe(
    kind: WorkoutKind,
    date: DateTime<Utc>,
    city: Option<&str>,
    country: Option<&str>,
    weather: Option<&str>,
) -> String {
    let mut out = kind.label().to_string();

    if let (Some(city), Some(country)) = (city, country) {
        out.push_str(&format!(" in {city}, {country}"));
    }

    let day = date.with_timezone(&Local).format("%B %-d");
    out.push_str(&format!(" on {day}"));

    if let Some(w) = weather {
        out.push_str(&format!(" ({w})"));
    }

    out
}
