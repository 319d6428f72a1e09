use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// `i64::MIN` as a float. It is exact, and its negation is the first float
/// past `i64::MAX`.
const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;

/// Possible values that can be stored in a record field
///
/// Serialized untagged, so a JSON document maps onto it directly. Timestamps
/// serialize as RFC 3339 strings and only come back as `Date` through
/// [`FieldValue::coerce_to`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// UTC date/time value
    Date(DateTime<Utc>),
    /// Null value
    Null,
}

/// The declared type of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// UTF-8 text
    String,
    /// Signed 64-bit integer
    Integer,
    /// 64-bit float; integers widen into it
    Float,
    /// `true` / `false`
    Boolean,
    /// UTC timestamp; RFC 3339 strings parse into it
    Date,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Date => "date",
        };
        write!(f, "{name}")
    }
}

impl FieldValue {
    /// Position of the variant family in the total order.
    /// Integers and floats share a rank so they compare numerically.
    const fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::Integer(_) | Self::Float(_) => 2,
            Self::String(_) => 3,
            Self::Date(_) => 4,
        }
    }

    /// The kind of this value, or `None` for `Null`
    #[must_use]
    pub const fn kind(&self) -> Option<FieldKind> {
        match self {
            Self::String(_) => Some(FieldKind::String),
            Self::Integer(_) => Some(FieldKind::Integer),
            Self::Float(_) => Some(FieldKind::Float),
            Self::Boolean(_) => Some(FieldKind::Boolean),
            Self::Date(_) => Some(FieldKind::Date),
            Self::Null => None,
        }
    }

    /// Get the type name as a string
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::Date(_) => "date",
            Self::Null => "null",
        }
    }

    /// Check whether this is the null value
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert this value to the requested kind.
    ///
    /// Only lossless conversions are performed: a value already of `kind` is
    /// returned as is, integers widen to floats, and RFC 3339 strings parse into
    /// dates. `Null` converts to `Null`. Returns `None` when no conversion applies.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn coerce_to(&self, kind: FieldKind) -> Option<Self> {
        match (self, kind) {
            (Self::Null, _) => Some(Self::Null),
            (value, kind) if value.kind() == Some(kind) => Some(value.clone()),
            (Self::Integer(i), FieldKind::Float) => Some(Self::Float(*i as f64)),
            (Self::String(s), FieldKind::Date) => Self::date_from_iso(s).ok(),
            _ => None,
        }
    }

    /// Numeric view of the value. Returns `None` unless the variant is
    /// `Integer` or `Float`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Borrow the string content, if this is a `String`
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Create date from ISO string
    ///
    /// # Errors
    ///
    /// Returns a `chrono::ParseError` if the ISO string cannot be parsed.
    pub fn date_from_iso(iso_string: &str) -> Result<Self, chrono::ParseError> {
        Ok(Self::Date(DateTime::parse_from_rfc3339(iso_string)?.with_timezone(&Utc)))
    }

    /// Create date from a UTC timestamp in seconds. Returns `None` when the
    /// timestamp is outside the range chrono can represent.
    #[must_use]
    pub fn date_from_timestamp(timestamp: i64) -> Option<Self> {
        DateTime::from_timestamp(timestamp, 0).map(Self::Date)
    }

    /// The integer an integral float is numerically equal to
    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    fn integral_value(f: f64) -> Option<i64> {
        if f.fract() == 0.0 && (I64_LOWER..-I64_LOWER).contains(&f) { Some(f as i64) } else { None }
    }
}

/// Exact comparison of an integer with a float, without rounding the integer
#[allow(clippy::cast_possible_truncation)]
fn cmp_integer_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() {
        return if f.is_sign_negative() { Ordering::Greater } else { Ordering::Less };
    }
    if f >= -I64_LOWER {
        return Ordering::Less;
    }
    if f < I64_LOWER {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    i.cmp(&(whole as i64)).then_with(|| {
        let fraction = f - whole;
        if fraction > 0.0 {
            Ordering::Less
        } else if fraction < 0.0 {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    })
}

impl Ord for FieldValue {
    #[allow(clippy::float_cmp)]
    fn cmp(&self, other: &Self) -> Ordering {
        use FieldValue::{Boolean, Date, Float, Integer, String};
        match (self, other) {
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            // 0.0 and -0.0 are one value; NaNs keep their total_cmp position
            (Float(a), Float(b)) => if a == b { Ordering::Equal } else { a.total_cmp(b) },
            // Mixed numerics compare by value: Integer(100) == Float(100.0)
            (Integer(a), Float(b)) => cmp_integer_float(*a, *b),
            (Float(a), Integer(b)) => cmp_integer_float(*b, *a).reverse(),
            (String(a), String(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FieldValue {}

impl Hash for FieldValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::String(s) => {
                0u8.hash(state);
                s.hash(state);
            }
            Self::Integer(i) => {
                1u8.hash(state);
                i.hash(state);
            }
            // Integral floats hash as the integer they equal
            Self::Float(f) => match Self::integral_value(*f) {
                Some(i) => {
                    1u8.hash(state);
                    i.hash(state);
                }
                None => {
                    2u8.hash(state);
                    f.to_bits().hash(state);
                }
            },
            Self::Boolean(b) => {
                3u8.hash(state);
                b.hash(state);
            }
            Self::Date(dt) => {
                4u8.hash(state);
                dt.hash(state);
            }
            Self::Null => {
                5u8.hash(state);
            }
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(fl) => write!(f, "{fl}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Date(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

impl From<&FieldValue> for serde_json::Value {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::String(s) => Self::String(s.clone()),
            FieldValue::Integer(i) => Self::Number(serde_json::Number::from(*i)),
            FieldValue::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(Self::Null, Self::Number)
            }
            FieldValue::Boolean(b) => Self::Bool(*b),
            FieldValue::Date(dt) => Self::String(dt.to_rfc3339()),
            FieldValue::Null => Self::Null,
        }
    }
}

impl TryFrom<&serde_json::Value> for FieldValue {
    type Error = anyhow::Error;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        Ok(match value {
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Float(f)
                } else {
                    return Err(anyhow!("Unsupported number value: {}", n));
                }
            }
            serde_json::Value::Bool(b) => Self::Boolean(*b),
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                return Err(anyhow!("Nested values cannot be stored in a field: {}", value));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(value: &FieldValue) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_cross_family_ordering() {
        let ordered = vec![
            FieldValue::Null,
            FieldValue::Boolean(false),
            FieldValue::Boolean(true),
            FieldValue::Integer(-5),
            FieldValue::Float(-1.5),
            FieldValue::Integer(3),
            FieldValue::Float(3.5),
            FieldValue::from("apple"),
            FieldValue::from("banana"),
            FieldValue::date_from_timestamp(0).unwrap(),
            FieldValue::date_from_timestamp(1_000).unwrap(),
        ];

        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1], "{:?} should sort before {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_numerically_equal_integer_and_float() {
        assert_eq!(FieldValue::Integer(100), FieldValue::Float(100.0));
        assert_eq!(hash_of(&FieldValue::Integer(100)), hash_of(&FieldValue::Float(100.0)));
        assert_eq!(FieldValue::Float(0.0), FieldValue::Float(-0.0));
        assert_eq!(hash_of(&FieldValue::Float(0.0)), hash_of(&FieldValue::Float(-0.0)));

        assert!(FieldValue::Integer(2) < FieldValue::Float(2.5));
        assert!(FieldValue::Float(-2.5) < FieldValue::Integer(-2));
        assert_ne!(FieldValue::Integer(1), FieldValue::Float(1.5));
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        // 2^53 + 1 has no f64 representation and must not collapse onto 2^53
        let exact = FieldValue::Integer((1 << 53) + 1);
        let float = FieldValue::Float(9_007_199_254_740_992.0);
        assert!(float < exact);
        assert_eq!(FieldValue::Integer(1 << 53), float);

        assert!(FieldValue::Integer(i64::MAX) < FieldValue::Float(9.3e18));
        assert!(FieldValue::Integer(i64::MIN) > FieldValue::Float(-9.3e18));
        assert_eq!(FieldValue::Integer(i64::MIN), FieldValue::Float(-9_223_372_036_854_775_808.0));
        assert!(FieldValue::Integer(i64::MAX) < FieldValue::Float(f64::INFINITY));
    }

    #[test]
    fn test_timestamp_out_of_range() {
        assert!(FieldValue::date_from_timestamp(i64::MAX).is_none());
        assert_eq!(
            FieldValue::date_from_timestamp(0),
            FieldValue::date_from_iso("1970-01-01T00:00:00Z").ok()
        );
    }

    #[test]
    fn test_nan_has_a_stable_position() {
        let nan = FieldValue::Float(f64::NAN);
        assert_eq!(nan, nan.clone());
        assert!(FieldValue::Float(f64::MAX) < nan);
    }

    #[test]
    fn test_equal_values_hash_equally() {
        assert_eq!(hash_of(&FieldValue::from("sales")), hash_of(&FieldValue::from("sales")));
        assert_eq!(hash_of(&FieldValue::Float(120.0)), hash_of(&FieldValue::Float(120.0)));
        assert_ne!(hash_of(&FieldValue::Integer(1)), hash_of(&FieldValue::from("1")));
    }

    #[test]
    fn test_coercion_rules() {
        assert_eq!(
            FieldValue::Integer(100).coerce_to(FieldKind::Float),
            Some(FieldValue::Float(100.0))
        );
        assert_eq!(FieldValue::Float(1.5).coerce_to(FieldKind::Integer), None);
        assert_eq!(FieldValue::Null.coerce_to(FieldKind::Date), Some(FieldValue::Null));

        let parsed = FieldValue::from("2024-03-01T10:00:00Z").coerce_to(FieldKind::Date);
        assert!(matches!(parsed, Some(FieldValue::Date(_))));
        assert_eq!(FieldValue::from("yesterday").coerce_to(FieldKind::Date), None);
    }

    #[test]
    fn test_untagged_json_decoding() {
        let values: Vec<FieldValue> =
            serde_json::from_str(r#"[true, 42, 12.5, "sales", null]"#).unwrap();
        assert_eq!(
            values,
            vec![
                FieldValue::Boolean(true),
                FieldValue::Integer(42),
                FieldValue::Float(12.5),
                FieldValue::from("sales"),
                FieldValue::Null,
            ]
        );
    }

    #[test]
    fn test_json_value_conversion_rejects_nested() {
        assert!(FieldValue::try_from(&serde_json::json!([1, 2])).is_err());
        assert_eq!(
            FieldValue::try_from(&serde_json::json!(7)).unwrap(),
            FieldValue::Integer(7)
        );
    }
}
