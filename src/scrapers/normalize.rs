use crate::models::{NormalizedRecord, UNKNOWN_PROPERTY_TYPE};
use serde_json::{Number, Value};

/// Follow `path` through nested objects. Missing keys, non-object
/// intermediates and explicit `null` all come back as `None`.
fn lookup<'a>(raw: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(raw, |value, key| value.get(*key))
        .filter(|value| !value.is_null())
}

fn number_at(raw: &Value, path: &[&str]) -> Option<Number> {
    match lookup(raw, path)? {
        Value::Number(n) => Some(n.clone()),
        _ => None,
    }
}

/// Integer counts; `3.0` is accepted, `2.5` and strings are not.
fn count_at(raw: &Value, path: &[&str]) -> Option<i64> {
    let value = lookup(raw, path)?;
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn float_at(raw: &Value, path: &[&str]) -> Option<f64> {
    lookup(raw, path)?.as_f64()
}

fn text_at(raw: &Value, path: &[&str]) -> Option<String> {
    lookup(raw, path)?.as_str().map(str::to_string)
}

/// Prefix a listing path with the site origin.
///
/// Tolerates a trailing slash on `origin` and a missing leading slash on
/// `path`. Paths that are already absolute URLs are returned unchanged.
pub fn join_origin(origin: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let origin = origin.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{origin}{path}")
    } else {
        format!("{origin}/{path}")
    }
}

/// Map one raw listing object onto the fixed output schema.
///
/// Never fails: anything missing or of the wrong type becomes an absent value
/// (or `"N/A"` for the property type), so schema drift upstream costs a
/// column, not the page.
pub fn normalize(raw: &Value, origin: &str) -> NormalizedRecord {
    NormalizedRecord {
        price: number_at(raw, &["price", "amount"]),
        bedrooms: count_at(raw, &["bedrooms"]),
        bathrooms: count_at(raw, &["bathrooms"]),
        latitude: float_at(raw, &["location", "latitude"]),
        longitude: float_at(raw, &["location", "longitude"]),
        property_type: text_at(raw, &["propertySubType"])
            .unwrap_or_else(|| UNKNOWN_PROPERTY_TYPE.to_string()),
        tenure: text_at(raw, &["tenure", "tenureType"]),
        listing_update_reason: text_at(raw, &["listingUpdate", "listingUpdateReason"]),
        summary: text_at(raw, &["summary"]),
        url: text_at(raw, &["propertyUrl"]).map(|path| join_origin(origin, &path)),
    }
}
