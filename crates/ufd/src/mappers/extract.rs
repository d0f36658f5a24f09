// ai
//! 🪝 Defensive field extraction — pulling typed values out of JSON nobody promised us.
//!
//! Every helper here answers "is this field usable as an X?" and says `None` when it isn't.
//! No helper ever fails. A string where a bool should be is just an absent bool. 🦆

use std::sync::LazyLock;

use chrono::Utc;
use serde_json::{Map, Number, Value};

static NO_FIELDS: LazyLock<Map<String, Value>> = LazyLock::new(Map::new);

/// 🗺️ The object's fields, borrowed. Raw values that showed up as something else entirely
/// read as an object with no fields.
pub(crate) fn fields_of(raw: &Value) -> &Map<String, Value> {
    raw.as_object().unwrap_or(&NO_FIELDS)
}

/// 🔑 The record's external id: a non-empty string id, a numeric id rendered as text,
/// or, failing both, a synthesized `missing-{source}-{unix_millis}-{suffix}`.
pub fn external_id(rec: &Map<String, Value>, source: &str) -> String {
    match rec.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
        Some(Value::Number(id)) => number_id(id),
        _ => synthesize_missing_id(source),
    }
}

/// 🔢 A numeric id as text, the way it reads to a human: `1`, `1.0` and `1e3` become `"1"`,
/// `"1"` and `"1000"`. Integral values print without a fraction so one listing keeps one key
/// whichever way the feed spelled it this time.
fn number_id(id: &Number) -> String {
    if let Some(n) = id.as_u64() {
        return n.to_string();
    }
    if let Some(n) = id.as_i64() {
        return n.to_string();
    }
    match id.as_f64() {
        // -- 🧮 below 1e21 an integral f64 prints exactly with {:.0}; past that it's exponent land
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e21 => {
            if f == 0.0 {
                "0".to_string()
            } else {
                format!("{f:.0}")
            }
        }
        _ => id.to_string(),
    }
}

/// 🎲 `missing-source1-1718000000000-k3x9` style ids. The suffix is four lowercase
/// alphanumerics taken from a fresh v4 uuid, so two misses in the same millisecond don't collide
/// (usually).
pub fn synthesize_missing_id(source: &str) -> String {
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(4)
        .collect();
    format!("missing-{source}-{}-{suffix}", Utc::now().timestamp_millis())
}

const PREVIEW_CHARS: usize = 120;

/// ✂️ A log-sized rendering of a raw value. Long records get an ellipsis, not a novella.
pub fn preview(raw: &Value) -> String {
    let rendered = raw.to_string();
    if rendered.chars().count() <= PREVIEW_CHARS {
        return rendered;
    }
    let mut clipped: String = rendered.chars().take(PREVIEW_CHARS).collect();
    clipped.push_str("...");
    clipped
}

pub fn as_string(rec: &Map<String, Value>, key: &str) -> Option<String> {
    match rec.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

pub fn as_bool(rec: &Map<String, Value>, key: &str) -> Option<bool> {
    rec.get(key).and_then(Value::as_bool)
}

/// 🔢 A JSON number, or a string that trims down to a finite number. `"100"` → 100.0,
/// `""` → absent, `"cheap"` → absent, `true` → absent.
pub fn as_number(rec: &Map<String, Value>, key: &str) -> Option<f64> {
    match rec.get(key)? {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// 🏠 City and country from a nested `address` object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub city: Option<String>,
    pub country: Option<String>,
}

pub fn address(rec: &Map<String, Value>) -> Address {
    match rec.get("address") {
        Some(Value::Object(addr)) => Address {
            city: as_string(addr, "city"),
            country: as_string(addr, "country"),
        },
        _ => Address::default(),
    }
}
