use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::NOT_AVAILABLE;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn in_range(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A resolved location, or the explicit marker that none could be found.
/// `(0, 0)` is a real place and never stands in for `Absent`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum GeoCoordinate {
    Known(GeoPoint),
    #[default]
    Absent,
}

impl GeoCoordinate {
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Self {
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => GeoCoordinate::Known(GeoPoint {
                latitude,
                longitude,
            }),
            _ => GeoCoordinate::Absent,
        }
    }

    pub fn point(&self) -> Option<GeoPoint> {
        match self {
            GeoCoordinate::Known(point) => Some(*point),
            GeoCoordinate::Absent => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, GeoCoordinate::Known(_))
    }

    pub fn latitude(&self) -> Option<f64> {
        self.point().map(|p| p.latitude)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.point().map(|p| p.longitude)
    }
}

impl fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoCoordinate::Known(p) => write!(f, "{:.5}, {:.5}", p.latitude, p.longitude),
            GeoCoordinate::Absent => f.write_str(NOT_AVAILABLE),
        }
    }
}

/// Where the stored coordinate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSource {
    Client,
    Exif,
}

impl CoordinateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinateSource::Client => "client",
            CoordinateSource::Exif => "exif",
        }
    }
}

impl std::str::FromStr for CoordinateSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(CoordinateSource::Client),
            "exif" => Ok(CoordinateSource::Exif),
            _ => Err(format!("Unknown coordinate source: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateError {
    NotANumber { field: &'static str, raw: String },
    OutOfRange { field: &'static str, value: f64 },
}

impl fmt::Display for CoordinateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateError::NotANumber { field, raw } => {
                write!(f, "{field} is not a number: {raw:?}")
            }
            CoordinateError::OutOfRange { field, value } => {
                write!(f, "{field} out of range: {value}")
            }
        }
    }
}

impl std::error::Error for CoordinateError {}

/// Latitude/longitude as submitted by the browser's geolocation API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientCoordinate {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

impl ClientCoordinate {
    pub fn new(latitude: Option<&str>, longitude: Option<&str>) -> Self {
        Self {
            latitude: latitude.map(str::to_string),
            longitude: longitude.map(str::to_string),
        }
    }

    fn present(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    /// `Ok(None)` for an incomplete pair, `Err` for a pair that is present
    /// but not a usable coordinate.
    pub fn parse(&self) -> Result<Option<GeoPoint>, CoordinateError> {
        let (Some(lat), Some(lon)) = (Self::present(&self.latitude), Self::present(&self.longitude))
        else {
            return Ok(None);
        };

        let latitude = parse_axis("latitude", lat, 90.0)?;
        let longitude = parse_axis("longitude", lon, 180.0)?;
        Ok(Some(GeoPoint {
            latitude,
            longitude,
        }))
    }
}

fn parse_axis(field: &'static str, raw: &str, limit: f64) -> Result<f64, CoordinateError> {
    let value: f64 = raw.parse().map_err(|_| CoordinateError::NotANumber {
        field,
        raw: raw.to_string(),
    })?;
    if !value.is_finite() || value.abs() > limit {
        return Err(CoordinateError::OutOfRange { field, value });
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResolvedCoordinate {
    pub coordinate: GeoCoordinate,
    pub source: Option<CoordinateSource>,
}

/// The browser's live reading wins over embedded metadata, which may describe
/// another place or nothing at all. A client pair that is present but invalid
/// is dropped with a warning and the EXIF value is used instead.
pub fn resolve_coordinate(client: &ClientCoordinate, exif: GeoCoordinate) -> ResolvedCoordinate {
    match client.parse() {
        Ok(Some(point)) => {
            return ResolvedCoordinate {
                coordinate: GeoCoordinate::Known(point),
                source: Some(CoordinateSource::Client),
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Rejecting client coordinate: {}", e),
    }

    match exif {
        GeoCoordinate::Known(_) => ResolvedCoordinate {
            coordinate: exif,
            source: Some(CoordinateSource::Exif),
        },
        GeoCoordinate::Absent => ResolvedCoordinate::default(),
    }
}
