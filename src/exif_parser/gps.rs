use std::collections::BTreeMap;
use std::fmt;

use super::metadata::{MetadataMap, Rational, TagValue};
use crate::location::{GeoCoordinate, GeoPoint};

const LATITUDE: &str = "GPSLatitude";
const LATITUDE_REF: &str = "GPSLatitudeRef";
const LONGITUDE: &str = "GPSLongitude";
const LONGITUDE_REF: &str = "GPSLongitudeRef";

/// Why a GPS block could not be turned into a coordinate.
#[derive(Debug, Clone, PartialEq)]
pub enum GpsError {
    BlockMissing,
    MissingTag(&'static str),
    UnexpectedType(&'static str),
    WrongArity { tag: &'static str, found: usize },
    ZeroDenominator(&'static str),
    OutOfRange { tag: &'static str, value: f64 },
}

impl GpsError {
    /// Everything except a missing block means the image carried broken GPS data.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, GpsError::BlockMissing)
    }
}

impl fmt::Display for GpsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpsError::BlockMissing => write!(f, "no GPS block in metadata"),
            GpsError::MissingTag(tag) => write!(f, "{tag} is missing"),
            GpsError::UnexpectedType(tag) => write!(f, "{tag} has an unexpected value type"),
            GpsError::WrongArity { tag, found } => {
                write!(f, "{tag} has {found} components, expected 3")
            }
            GpsError::ZeroDenominator(tag) => write!(f, "{tag} has a zero denominator"),
            GpsError::OutOfRange { tag, value } => write!(f, "{tag} out of range: {value}"),
        }
    }
}

impl std::error::Error for GpsError {}

/// Degrees, minutes and seconds of one angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RationalTriplet {
    degrees: f64,
    minutes: f64,
    seconds: f64,
}

impl RationalTriplet {
    pub fn new(tag: &'static str, values: &[Rational]) -> Result<Self, GpsError> {
        let [degrees, minutes, seconds] = values else {
            return Err(GpsError::WrongArity {
                tag,
                found: values.len(),
            });
        };
        let value = |r: &Rational| {
            let v = r.to_f64().ok_or(GpsError::ZeroDenominator(tag))?;
            if v < 0.0 {
                return Err(GpsError::OutOfRange { tag, value: v });
            }
            Ok(v)
        };
        Ok(Self {
            degrees: value(degrees)?,
            minutes: value(minutes)?,
            seconds: value(seconds)?,
        })
    }

    /// `d + m/60 + s/3600`
    pub fn to_degrees(&self) -> f64 {
        self.degrees + self.minutes / 60.0 + self.seconds / 3600.0
    }
}

/// Signs an unsigned angle by its reference letter. Anything other than the
/// positive hemisphere (`N` or `E`) negates.
pub fn apply_hemisphere(value: f64, reference: &str, positive: &str) -> f64 {
    if reference.trim() == positive {
        value
    } else {
        -value
    }
}

fn decode_axis(
    gps: &BTreeMap<String, TagValue>,
    tag: &'static str,
    ref_tag: &'static str,
    positive: &str,
    limit: f64,
) -> Result<f64, GpsError> {
    let rationals = gps
        .get(tag)
        .ok_or(GpsError::MissingTag(tag))?
        .as_rationals()
        .ok_or(GpsError::UnexpectedType(tag))?;
    let reference = gps
        .get(ref_tag)
        .ok_or(GpsError::MissingTag(ref_tag))?
        .as_text()
        .ok_or(GpsError::UnexpectedType(ref_tag))?;

    let degrees = RationalTriplet::new(tag, rationals)?.to_degrees();
    if !degrees.is_finite() || degrees.abs() > limit {
        return Err(GpsError::OutOfRange { tag, value: degrees });
    }

    Ok(apply_hemisphere(degrees, reference, positive))
}

/// Decodes the GPS sub-block into signed decimal degrees.
pub fn decode_gps(metadata: &MetadataMap) -> Result<GeoPoint, GpsError> {
    let gps = metadata.gps_block().ok_or(GpsError::BlockMissing)?;

    let latitude = decode_axis(gps, LATITUDE, LATITUDE_REF, "N", 90.0)?;
    let longitude = decode_axis(gps, LONGITUDE, LONGITUDE_REF, "E", 180.0)?;

    Ok(GeoPoint {
        latitude,
        longitude,
    })
}

/// Best-effort form of [`decode_gps`]: never fails, logs why it gave up.
pub fn gps_coordinate(metadata: &MetadataMap) -> GeoCoordinate {
    match decode_gps(metadata) {
        Ok(point) => GeoCoordinate::Known(point),
        Err(e) if e.is_malformed() => {
            tracing::warn!("Ignoring malformed GPS metadata: {}", e);
            GeoCoordinate::Absent
        }
        Err(e) => {
            tracing::debug!("{}", e);
            GeoCoordinate::Absent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif_parser::metadata::GPS_BLOCK;

    fn r(num: i64, den: i64) -> Rational {
        Rational::new(num, den)
    }

    fn triplet(d: (i64, i64), m: (i64, i64), s: (i64, i64)) -> TagValue {
        TagValue::Rationals(vec![r(d.0, d.1), r(m.0, m.1), r(s.0, s.1)])
    }

    fn gps_map(entries: Vec<(&str, TagValue)>) -> MetadataMap {
        let block = entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        [(GPS_BLOCK, TagValue::Group(block))].into_iter().collect()
    }

    fn new_york() -> Vec<(&'static str, TagValue)> {
        vec![
            (LATITUDE, triplet((40, 1), (30, 1), (0, 1))),
            (LATITUDE_REF, TagValue::Text("N".into())),
            (LONGITUDE, triplet((73, 1), (59, 1), (0, 1))),
            (LONGITUDE_REF, TagValue::Text("W".into())),
        ]
    }

    #[test]
    fn converts_north_west_scenario() {
        let point = decode_gps(&gps_map(new_york())).unwrap();
        assert!((point.latitude - 40.5).abs() < 1e-9);
        assert!((point.longitude - (-73.983_333_333_333_33)).abs() < 1e-9);
    }

    #[test]
    fn degree_conversion_matches_formula() {
        let cases = [
            ((12, 1), (34, 1), (5678, 100)),
            ((0, 1), (0, 1), (1, 1)),
            ((89, 1), (59, 1), (5999, 100)),
            ((51, 1), (2850, 100), (0, 1)),
        ];
        for (d, m, s) in cases {
            let t = RationalTriplet::new(LATITUDE, &[r(d.0, d.1), r(m.0, m.1), r(s.0, s.1)]).unwrap();
            let expected = d.0 as f64 / d.1 as f64
                + (m.0 as f64 / m.1 as f64) / 60.0
                + (s.0 as f64 / s.1 as f64) / 3600.0;
            assert!((t.to_degrees() - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn conversion_is_monotonic_in_each_component() {
        let base = RationalTriplet::new(LATITUDE, &[r(10, 1), r(10, 1), r(10, 1)])
            .unwrap()
            .to_degrees();
        for bumped in [
            [r(11, 1), r(10, 1), r(10, 1)],
            [r(10, 1), r(11, 1), r(10, 1)],
            [r(10, 1), r(10, 1), r(11, 1)],
        ] {
            assert!(RationalTriplet::new(LATITUDE, &bumped).unwrap().to_degrees() > base);
        }
    }

    #[test]
    fn hemisphere_sign_rule() {
        assert_eq!(apply_hemisphere(12.5, "S", "N"), -12.5);
        assert_eq!(apply_hemisphere(12.5, "W", "E"), -12.5);
        assert_eq!(apply_hemisphere(12.5, "N", "N"), 12.5);
        assert_eq!(apply_hemisphere(12.5, " E ", "E"), 12.5);
        assert_eq!(apply_hemisphere(12.5, "X", "N"), -12.5);
        assert_eq!(apply_hemisphere(12.5, "", "N"), -12.5);
        assert_eq!(apply_hemisphere(12.5, "n", "N"), -12.5);
    }

    #[test]
    fn unexpected_references_negate() {
        let entries = vec![
            (LATITUDE, triplet((10, 1), (0, 1), (0, 1))),
            (LATITUDE_REF, TagValue::Text(String::new())),
            (LONGITUDE, triplet((20, 1), (0, 1), (0, 1))),
            (LONGITUDE_REF, TagValue::Text("x".into())),
        ];
        let point = decode_gps(&gps_map(entries)).unwrap();
        assert_eq!(point.latitude, -10.0);
        assert_eq!(point.longitude, -20.0);
    }

    #[test]
    fn negative_components_are_rejected() {
        let mut entries = new_york();
        entries[0].1 = triplet((-40, 1), (30, 1), (0, 1));
        entries[1].1 = TagValue::Text("S".into());
        let metadata = gps_map(entries);
        assert!(matches!(
            decode_gps(&metadata),
            Err(GpsError::OutOfRange { tag: LATITUDE, .. })
        ));
        assert_eq!(gps_coordinate(&metadata), GeoCoordinate::Absent);
    }

    #[test]
    fn south_east_signs() {
        let mut entries = new_york();
        entries[1].1 = TagValue::Text("S".into());
        entries[3].1 = TagValue::Text("E".into());
        let point = decode_gps(&gps_map(entries)).unwrap();
        assert!((point.latitude + 40.5).abs() < 1e-9);
        assert!(point.longitude > 73.98);
    }

    #[test]
    fn missing_block_is_not_malformed() {
        let err = decode_gps(&MetadataMap::new()).unwrap_err();
        assert_eq!(err, GpsError::BlockMissing);
        assert!(!err.is_malformed());
        assert_eq!(gps_coordinate(&MetadataMap::new()), GeoCoordinate::Absent);
    }

    #[test]
    fn missing_longitude_gives_absent() {
        let entries = new_york().into_iter().filter(|(k, _)| *k != LONGITUDE).collect();
        let metadata = gps_map(entries);
        assert_eq!(decode_gps(&metadata), Err(GpsError::MissingTag(LONGITUDE)));
        assert_eq!(gps_coordinate(&metadata), GeoCoordinate::Absent);
    }

    #[test]
    fn missing_reference_is_malformed() {
        let entries = new_york().into_iter().filter(|(k, _)| *k != LATITUDE_REF).collect();
        let err = decode_gps(&gps_map(entries)).unwrap_err();
        assert_eq!(err, GpsError::MissingTag(LATITUDE_REF));
        assert!(err.is_malformed());
    }

    #[test]
    fn zero_denominator_gives_absent() {
        let mut entries = new_york();
        entries[0].1 = triplet((40, 0), (30, 1), (0, 1));
        let metadata = gps_map(entries);
        assert_eq!(decode_gps(&metadata), Err(GpsError::ZeroDenominator(LATITUDE)));
        assert_eq!(gps_coordinate(&metadata), GeoCoordinate::Absent);
    }

    #[test]
    fn wrong_arity_and_type_are_rejected() {
        let mut entries = new_york();
        entries[0].1 = TagValue::Rationals(vec![r(40, 1), r(30, 1)]);
        assert_eq!(
            decode_gps(&gps_map(entries)),
            Err(GpsError::WrongArity { tag: LATITUDE, found: 2 })
        );

        let mut entries = new_york();
        entries[2].1 = TagValue::Text("73".into());
        assert_eq!(decode_gps(&gps_map(entries)), Err(GpsError::UnexpectedType(LONGITUDE)));
    }

    #[test]
    fn out_of_range_latitude_is_rejected() {
        let mut entries = new_york();
        entries[0].1 = triplet((95, 1), (0, 1), (0, 1));
        assert!(matches!(
            decode_gps(&gps_map(entries)),
            Err(GpsError::OutOfRange { tag: LATITUDE, .. })
        ));
    }
}
