use crate::types::{KindInput, WorkoutInput, WorkoutKind};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Distance,
    Duration,
    Cadence,
    Elevation,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Distance => "distance",
            Self::Duration => "duration",
            Self::Cadence => "cadence",
            Self::Elevation => "elevation",
        })
    }
}

/// Rejected form submission. Shown to the user as a blocking alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    NotFinite { field: Field },
    Negative { field: Field },
    NotPositive { field: Field },
}

impl InputError {
    pub const fn field(&self) -> Field {
        match self {
            Self::NotFinite { field } | Self::Negative { field } | Self::NotPositive { field } => {
                *field
            }
        }
    }
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFinite { field } => write!(f, "{field} must be a number"),
            Self::Negative { field } => write!(f, "{field} must be a positive number"),
            Self::NotPositive { field } => write!(f, "{field} must be greater than zero"),
        }
    }
}

impl std::error::Error for InputError {}

/// Raw text of the workout form, as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormInput {
    pub kind: WorkoutKind,
    pub distance: String,
    pub duration: String,
    pub cadence: String,
    pub elevation: String,
}

impl FormInput {
    pub fn new(kind: WorkoutKind) -> Self {
        Self {
            kind,
            distance: String::new(),
            duration: String::new(),
            cadence: String::new(),
            elevation: String::new(),
        }
    }

    /// Only the field matching `kind` is read; the hidden one is ignored.
    pub fn validate(&self) -> Result<WorkoutInput, InputError> {
        let distance = positive(Field::Distance, &self.distance)?;
        let duration = positive(Field::Duration, &self.duration)?;

        let extra = match self.kind {
            WorkoutKind::Running => KindInput::Running {
                cadence: positive(Field::Cadence, &self.cadence)?,
            },
            WorkoutKind::Cycling => KindInput::Cycling {
                elevation_gain: non_negative(Field::Elevation, &self.elevation)?,
            },
        };

        Ok(WorkoutInput {
            distance,
            duration,
            extra,
        })
    }
}

/// State of the form while it is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState {
    kind: WorkoutKind,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            kind: WorkoutKind::Running,
        }
    }
}

impl FormState {
    pub const fn kind(&self) -> WorkoutKind {
        self.kind
    }

    /// Swaps the cadence row for the elevation row (or back).
    pub const fn toggle_kind(&mut self) -> WorkoutKind {
        self.kind = self.kind.toggled();
        self.kind
    }

    pub const fn visible_field(&self) -> Field {
        match self.kind {
            WorkoutKind::Running => Field::Cadence,
            WorkoutKind::Cycling => Field::Elevation,
        }
    }
}

/// Browser-style numeric coercion: blank is zero, garbage is NaN.
pub fn coerce(raw: &str) -> f64 {
    let s = raw.trim();
    if s.is_empty() {
        return 0.0;
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}

fn non_negative(field: Field, raw: &str) -> Result<f64, InputError> {
    let v = coerce(raw);
    if !v.is_finite() {
        return Err(InputError::NotFinite { field });
    }
    if v < 0.0 {
        return Err(InputError::Negative { field });
    }
    Ok(v)
}

fn positive(field: Field, raw: &str) -> Result<f64, InputError> {
    let v = non_negative(field, raw)?;
    if v == 0.0 {
        return Err(InputError::NotPositive { field });
    }
    Ok(v)
}
