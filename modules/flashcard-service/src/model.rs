//! Card normalization: turns loosely-typed JSON into valid cards and applies
//! partial patches field by field.

use chrono::{SecondsFormat, Utc};
use flashcard_types::{Card, DEFAULT_EASE, DEFAULT_LANG_FROM, DEFAULT_LANG_TO, MAX_TAGS};
use rand::Rng;
use serde_json::{Map, Value};

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LEN: usize = 12;
const BACK_SEPARATOR: &str = " / ";

/// Random 12-symbol id over lowercase letters and digits.
///
/// No uniqueness check happens here; upsert handles collisions.
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Current time as an RFC 3339 UTC string with millisecond precision.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Strip every leading `=` and whitespace character (in any mix), then trailing
/// whitespace. Inner `=` is kept.
fn clean_text(s: &str) -> String {
    s.trim_start_matches(|c: char| c == '=' || c.is_whitespace())
        .trim_end()
        .to_string()
}

/// Render a JSON value as card text. Sequences are joined with " / ".
fn text_of(value: &Value) -> String {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(BACK_SEPARATOR),
        Value::Null | Value::Object(_) => String::new(),
    };
    clean_text(&raw)
}

/// First non-null field among `keys`, rendered as card text.
fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
        .map(text_of)
}

fn number_of(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

fn count_of(value: &Value) -> Option<u32> {
    number_of(value).map(|n| n.max(0.0).min(u32::MAX as f64) as u32)
}

fn string_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn tags_of(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|t| match t {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .take(MAX_TAGS)
                .collect(),
        ),
        _ => None,
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

fn id_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Normalize a raw record into a [`Card`], or `None` if it is not an object
/// or its front/back text is empty after cleaning.
///
/// `front` falls back to the legacy `portuguese` field and `back` to
/// `translation`. A fresh id is assigned only when `id` is missing or falsy.
pub fn sanitize(raw: &Value) -> Option<Card> {
    let obj = raw.as_object()?;

    let front = text_field(obj, &["front", "portuguese"]).unwrap_or_default();
    let back = text_field(obj, &["back", "translation"]).unwrap_or_default();
    if front.is_empty() || back.is_empty() {
        return None;
    }

    let id = match obj.get("id") {
        Some(v) if !is_falsy(v) => id_of(v),
        _ => generate_id(),
    };
    let now = now_timestamp();

    Some(Card {
        id,
        front,
        back,
        lang_from: obj
            .get("lang_from")
            .and_then(string_of)
            .unwrap_or_else(|| DEFAULT_LANG_FROM.to_string()),
        lang_to: obj
            .get("lang_to")
            .and_then(string_of)
            .unwrap_or_else(|| DEFAULT_LANG_TO.to_string()),
        tags: obj.get("tags").and_then(tags_of).unwrap_or_default(),
        ease: obj.get("ease").and_then(number_of).unwrap_or(DEFAULT_EASE),
        interval: obj.get("interval").and_then(number_of).unwrap_or(0.0),
        next_review: obj
            .get("next_review")
            .and_then(string_of)
            .unwrap_or_else(|| now.clone()),
        lapses: obj.get("lapses").and_then(count_of).unwrap_or(0),
        created_at: obj.get("created_at").and_then(string_of).unwrap_or(now),
    })
}

/// True when the raw record carried its own non-falsy id.
pub fn has_supplied_id(raw: &Value) -> bool {
    raw.get("id").is_some_and(|v| !is_falsy(v))
}

/// Apply a partial patch to `existing`, one field at a time.
///
/// Absent fields are untouched. `id` and `created_at` never change. Front and
/// back are re-cleaned; a patch that cleans to empty text leaves the old text
/// in place. Values of the wrong type are ignored.
pub fn merge_patch(existing: &Card, patch: &Map<String, Value>) -> Card {
    let mut card = existing.clone();

    if let Some(front) = text_field(patch, &["front", "portuguese"]) {
        if front.is_empty() {
            log::warn!("[CARD_MODEL] Ignoring empty front in patch for {}", card.id);
        } else {
            card.front = front;
        }
    }
    if let Some(back) = text_field(patch, &["back", "translation"]) {
        if back.is_empty() {
            log::warn!("[CARD_MODEL] Ignoring empty back in patch for {}", card.id);
        } else {
            card.back = back;
        }
    }
    if let Some(lang) = patch.get("lang_from").and_then(string_of) {
        card.lang_from = lang;
    }
    if let Some(lang) = patch.get("lang_to").and_then(string_of) {
        card.lang_to = lang;
    }
    if let Some(tags) = patch.get("tags").and_then(tags_of) {
        card.tags = tags;
    }
    if let Some(ease) = patch.get("ease").and_then(number_of) {
        card.ease = ease;
    }
    if let Some(interval) = patch.get("interval").and_then(number_of) {
        card.interval = interval;
    }
    if let Some(next_review) = patch.get("next_review").and_then(string_of) {
        card.next_review = next_review;
    }
    if let Some(lapses) = patch.get("lapses").and_then(count_of) {
        card.lapses = lapses;
    }

    card
}

/// Upsert merge: the incoming card wins on every field except `created_at`.
pub fn absorb(existing: &Card, incoming: Card) -> Card {
    Card {
        id: existing.id.clone(),
        created_at: existing.created_at.clone(),
        ..incoming
    }
}
