//! Shared types for the flashcard store service and its HTTP clients.

use serde::{Deserialize, Serialize};

pub const DEFAULT_LANG_FROM: &str = "pt";
pub const DEFAULT_LANG_TO: &str = "de";
pub const DEFAULT_EASE: f64 = 2.5;
/// Cards keep at most this many tags; extra tags are dropped on sanitize.
pub const MAX_TAGS: usize = 10;

// =====================================================
// Domain Types
// =====================================================

/// One flashcard: a front/back text pair plus its review schedule.
///
/// Fields missing from a stored record fall back to their defaults so that
/// hand-edited or older store files still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub front: String,
    pub back: String,
    #[serde(default = "default_lang_from")]
    pub lang_from: String,
    #[serde(default = "default_lang_to")]
    pub lang_to: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_ease")]
    pub ease: f64,
    #[serde(default)]
    pub interval: f64,
    #[serde(default)]
    pub next_review: String,
    #[serde(default)]
    pub lapses: u32,
    #[serde(default)]
    pub created_at: String,
}

fn default_lang_from() -> String {
    DEFAULT_LANG_FROM.to_string()
}

fn default_lang_to() -> String {
    DEFAULT_LANG_TO.to_string()
}

fn default_ease() -> f64 {
    DEFAULT_EASE
}

// =====================================================
// Response Types
// =====================================================

/// Body of `GET /cards`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CardListing {
    pub cards: Vec<Card>,
    pub count: usize,
}

/// Body of a successful `POST /cards`.
#[derive(Debug, Serialize, Deserialize)]
pub struct UpsertResponse {
    pub ok: bool,
    pub added: usize,
    pub total: usize,
}

/// Body of a successful `PUT /cards/:id` or `DELETE /cards/:id`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MutationAck {
    pub ok: bool,
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>) -> Self {
        Self { error: code.into() }
    }
}

// =====================================================
// Service Status
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub uptime_secs: u64,
    pub total_cards: usize,
    pub store_path: String,
}
