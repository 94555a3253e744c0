use std::collections::BTreeMap;

/// Key under which the GPS IFD is nested inside a [`MetadataMap`].
pub const GPS_BLOCK: &str = "GPSInfo";

/// A numerator/denominator pair as stored in EXIF RATIONAL/SRATIONAL fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl Rational {
    pub fn new(num: i64, den: i64) -> Self {
        Self { num, den }
    }

    /// `None` when the denominator is zero.
    pub fn to_f64(self) -> Option<f64> {
        if self.den == 0 {
            None
        } else {
            Some(self.num as f64 / self.den as f64)
        }
    }
}

impl From<exif::Rational> for Rational {
    fn from(r: exif::Rational) -> Self {
        Self::new(i64::from(r.num), i64::from(r.denom))
    }
}

impl From<exif::SRational> for Rational {
    fn from(r: exif::SRational) -> Self {
        Self::new(i64::from(r.num), i64::from(r.denom))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Text(String),
    Integers(Vec<i64>),
    Rationals(Vec<Rational>),
    Floats(Vec<f64>),
    Bytes(Vec<u8>),
    /// Nested block, used for the GPS IFD
    Group(BTreeMap<String, TagValue>),
}

impl TagValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TagValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_rationals(&self) -> Option<&[Rational]> {
        match self {
            TagValue::Rationals(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&BTreeMap<String, TagValue>> {
        match self {
            TagValue::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Converts a kamadak-exif value; `None` for entries with an unknown type.
    pub fn from_exif(value: &exif::Value) -> Option<Self> {
        use exif::Value;

        let converted = match value {
            Value::Ascii(parts) => TagValue::Text(
                parts
                    .iter()
                    .map(|p| String::from_utf8_lossy(p).trim_end_matches('\0').to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            Value::Byte(v) => TagValue::Integers(v.iter().map(|&x| i64::from(x)).collect()),
            Value::Short(v) => TagValue::Integers(v.iter().map(|&x| i64::from(x)).collect()),
            Value::Long(v) => TagValue::Integers(v.iter().map(|&x| i64::from(x)).collect()),
            Value::SByte(v) => TagValue::Integers(v.iter().map(|&x| i64::from(x)).collect()),
            Value::SShort(v) => TagValue::Integers(v.iter().map(|&x| i64::from(x)).collect()),
            Value::SLong(v) => TagValue::Integers(v.iter().map(|&x| i64::from(x)).collect()),
            Value::Rational(v) => TagValue::Rationals(v.iter().map(|&r| r.into()).collect()),
            Value::SRational(v) => TagValue::Rationals(v.iter().map(|&r| r.into()).collect()),
            Value::Float(v) => TagValue::Floats(v.iter().map(|&x| f64::from(x)).collect()),
            Value::Double(v) => TagValue::Floats(v.clone()),
            Value::Undefined(bytes, _) => TagValue::Bytes(bytes.clone()),
            _ => return None,
        };
        Some(converted)
    }
}

/// Human-readable tag name -> value, as read from one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataMap {
    tags: BTreeMap<String, TagValue>,
}

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Primary-image fields only; GPS fields are collected into a nested
    /// block under [`GPS_BLOCK`].
    pub fn from_exif(exif: &exif::Exif) -> Self {
        let mut tags = BTreeMap::new();
        let mut gps = BTreeMap::new();

        for field in exif.fields().filter(|f| f.ifd_num == exif::In::PRIMARY) {
            let Some(value) = TagValue::from_exif(&field.value) else {
                continue;
            };
            let name = field.tag.to_string();
            if field.tag.context() == exif::Context::Gps {
                gps.insert(name, value);
            } else {
                tags.insert(name, value);
            }
        }

        if !gps.is_empty() {
            tags.insert(GPS_BLOCK.to_string(), TagValue::Group(gps));
        }

        Self { tags }
    }

    pub fn get(&self, name: &str) -> Option<&TagValue> {
        self.tags.get(name)
    }

    pub fn gps_block(&self) -> Option<&BTreeMap<String, TagValue>> {
        self.get(GPS_BLOCK).and_then(TagValue::as_group)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, TagValue)> for MetadataMap {
    fn from_iter<I: IntoIterator<Item = (K, TagValue)>>(iter: I) -> Self {
        Self {
            tags: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
