use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde_json::Value as JsonValue;

/// Comparable form of a JSON scalar.
///
/// Ordering across types is null < bool < number < datetime < string.
/// Strings shaped like ISO dates are compared as millisecond timestamps, so
/// `"2024-02-01"` sorts after `"2024-01-15T23:00:00Z"` regardless of format.
#[derive(Debug, Clone)]
pub enum IndexValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    DateTime(i64),
    String(String),
}

impl Eq for IndexValue {}

impl Hash for IndexValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            IndexValue::Null => 0u8.hash(state),
            IndexValue::Boolean(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            // A whole float equals the integer of the same value, so both hash
            // as that integer.
            IndexValue::Integer(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            IndexValue::Float(f) => match exact_i64(*f) {
                Some(i) => {
                    2u8.hash(state);
                    i.hash(state);
                }
                None => {
                    5u8.hash(state);
                    f.to_bits().hash(state);
                }
            },
            IndexValue::DateTime(ms) => {
                3u8.hash(state);
                ms.hash(state);
            }
            IndexValue::String(s) => {
                4u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl PartialEq for IndexValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for IndexValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use IndexValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,

            (Boolean(a), Boolean(b)) => a.cmp(b),
            (Boolean(_), _) => Ordering::Less,
            (_, Boolean(_)) => Ordering::Greater,

            (Integer(a), Integer(b)) => a.cmp(b),
            (Integer(a), Float(b)) => cmp_int_float(*a, *b),
            (Float(a), Integer(b)) => cmp_int_float(*b, *a).reverse(),
            (Float(a), Float(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
            (Integer(_) | Float(_), _) => Ordering::Less,
            (_, Integer(_) | Float(_)) => Ordering::Greater,

            (DateTime(a), DateTime(b)) => a.cmp(b),
            (DateTime(_), _) => Ordering::Less,
            (_, DateTime(_)) => Ordering::Greater,

            (String(a), String(b)) => a.cmp(b),
        }
    }
}

// 2^63, the first float above i64::MAX.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// The integer a float represents exactly, if any.
fn exact_i64(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&f)).then(|| f as i64)
}

/// Compare an integer with a float without rounding the integer through f64.
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() {
        return if f.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if f >= I64_BOUND {
        return Ordering::Less;
    }
    if f < -I64_BOUND {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal if f > whole => Ordering::Less,
        Ordering::Equal if f < whole => Ordering::Greater,
        other => other,
    }
}

impl IndexValue {
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => IndexValue::Null,
            JsonValue::Bool(b) => IndexValue::Boolean(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    IndexValue::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    IndexValue::Float(f)
                } else {
                    IndexValue::Null
                }
            }
            JsonValue::String(s) => Self::parse_string(s),
            // Arrays and objects compare by their serialized form.
            other => IndexValue::String(other.to_string()),
        }
    }

    pub fn parse_string(s: &str) -> Self {
        // Anything not starting with YYYY-MM is a plain string.
        let b = s.as_bytes();
        if b.len() < 10
            || !b[..4].iter().all(u8::is_ascii_digit)
            || b[4] != b'-'
            || !b[5].is_ascii_digit()
            || !b[6].is_ascii_digit()
        {
            return IndexValue::String(s.to_string());
        }

        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
            return IndexValue::DateTime(dt.timestamp_millis());
        }
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
            return IndexValue::DateTime(dt.and_utc().timestamp_millis());
        }
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return IndexValue::DateTime(dt.and_utc().timestamp_millis());
        }
        if let Ok(d) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            if let Some(dt) = d.and_hms_opt(0, 0, 0) {
                return IndexValue::DateTime(dt.and_utc().timestamp_millis());
            }
        }
        IndexValue::String(s.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, IndexValue::Null)
    }
}
