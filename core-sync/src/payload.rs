//! Progress payload carried by each `data:` frame of a sync stream.
//!
//! Servers use two spellings for the item label and the new-item count.
//! When both are present, `currentCard` wins over `name` and `newCards` wins
//! over `added`.

use serde::Deserialize;
use serde_json::Value;

use crate::{Result, SyncError};

/// Decoded progress frame
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressFrame {
    /// Error reported by the source; terminal for the run
    pub error: Option<String>,
    /// Progress percentage, rounded and clamped to 0-100 for display
    pub progress: Option<u8>,
    /// The unrounded progress reached 100
    pub complete: bool,
    /// Label of the item currently being processed
    pub current_item: Option<String>,
    /// Running count of new items
    pub new_items: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    current_card: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    new_cards: Option<u64>,
    #[serde(default)]
    added: Option<u64>,
}

impl ProgressFrame {
    /// Parse the JSON text of one frame
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MalformedFrame`] when the text is not a JSON
    /// object of the expected shape
    pub fn parse(data: &str) -> Result<Self> {
        let raw: RawFrame = serde_json::from_str(data.trim())
            .map_err(|e| SyncError::MalformedFrame(e.to_string()))?;

        Ok(Self {
            error: raw.error.and_then(error_message),
            progress: raw.progress.map(clamp_percent),
            complete: raw.progress.is_some_and(|p| p >= 100.0),
            current_item: raw.current_card.or(raw.name),
            new_items: raw.new_cards.or(raw.added),
        })
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.complete
    }
}

fn error_message(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(false) => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        Value::Object(map) => match map.get("message").and_then(Value::as_str) {
            Some(message) => Some(message.to_string()),
            None => Some(Value::Object(map).to_string()),
        },
        other => Some(other.to_string()),
    }
}

fn clamp_percent(progress: f64) -> u8 {
    if progress.is_nan() {
        0
    } else {
        progress.round().clamp(0.0, 100.0) as u8
    }
}
