use crate::types::Coords;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::fmt;

pub const DEFAULT_LOCATE_URL: &str = "http://ip-api.com/json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateError {
    PermissionDenied,
    Unavailable(String),
}

impl fmt::Display for LocateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => f.write_str("Could not get your position: permission denied"),
            Self::Unavailable(reason) => write!(f, "Could not get your position: {reason}"),
        }
    }
}

impl std::error::Error for LocateError {}

/// Source of the user's current position.
pub trait Locator {
    fn locate(&self) -> Result<Coords, LocateError>;
}

/// A position given up front. `None` behaves like a denied permission.
pub struct FixedLocator(pub Option<Coords>);

impl Locator for FixedLocator {
    fn locate(&self) -> Result<Coords, LocateError> {
        self.0.ok_or(LocateError::PermissionDenied)
    }
}

/// Approximate position from the caller's public IP address.
pub struct IpLocator {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl IpLocator {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

impl Locator for IpLocator {
    fn locate(&self) -> Result<Coords, LocateError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|e| LocateError::Unavailable(format!("request error: {e}")))?;
        if !response.status().is_success() {
            return Err(LocateError::Unavailable(format!(
                "locate server responded with {}",
                response.status()
            )));
        }
        let body: IpApiResponse = response
            .json()
            .map_err(|e| LocateError::Unavailable(format!("bad locate response: {e}")))?;
        parse_ip_api(body)
    }
}

fn parse_ip_api(body: IpApiResponse) -> Result<Coords, LocateError> {
    if body.status != "success" {
        let reason = body.message.unwrap_or(body.status);
        return Err(LocateError::Unavailable(reason));
    }
    match (body.lat, body.lon) {
        (Some(lat), Some(lon)) => Ok(Coords::new(lat, lon)),
        _ => Err(LocateError::Unavailable("response has no coordinates".into())),
    }
}
