//! Pulls the hydration JSON out of a fetched result page.
//!
//! The search page ships its client-side state as a single JSON document
//! inside `<script id="__NEXT_DATA__">`. Reading that is far more stable than
//! walking the rendered listing cards.

use crate::error::{ConfigError, EmbeddedDataError};
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;

/// Deepest carrier document we accept. Parsing itself is not depth bound,
/// but the parsed value is dropped recursively, so it is capped here.
pub const MAX_CARRIER_DEPTH: usize = 1000;

/// Finds and parses the data carrier script on a page.
#[derive(Debug, Clone)]
pub struct EmbeddedDataLocator {
    carrier_id: String,
    selector: Selector,
}

impl EmbeddedDataLocator {
    pub fn new(carrier_id: &str) -> Result<Self, ConfigError> {
        let selector = Selector::parse(&format!(r#"script[id="{carrier_id}"]"#)).map_err(|e| {
            ConfigError::InvalidCarrierId {
                id: carrier_id.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            carrier_id: carrier_id.to_string(),
            selector,
        })
    }

    /// Extract the carrier's JSON, saying why when there is none.
    pub fn extract(&self, page: &[u8]) -> Result<Value, EmbeddedDataError> {
        let html = String::from_utf8_lossy(page);
        let document = Html::parse_document(&html);

        let element = document
            .select(&self.selector)
            .next()
            .ok_or_else(|| EmbeddedDataError::Missing {
                carrier_id: self.carrier_id.clone(),
            })?;

        let text = element.text().collect::<String>();
        if nesting_depth_exceeds(&text, MAX_CARRIER_DEPTH) {
            return Err(EmbeddedDataError::TooDeep {
                limit: MAX_CARRIER_DEPTH,
            });
        }
        parse_unbounded(&text).map_err(|source| EmbeddedDataError::Malformed { source })
    }

    /// Same as [`extract`](Self::extract), dropping the reason.
    pub fn locate(&self, page: &[u8]) -> Option<Value> {
        self.extract(page).ok()
    }
}

/// Parse JSON of any depth, growing the stack on the heap as needed.
fn parse_unbounded(text: &str) -> Result<Value, serde_json::Error> {
    let mut json = serde_json::Deserializer::from_str(text);
    json.disable_recursion_limit();
    let value = Value::deserialize(serde_stacker::Deserializer::new(&mut json))?;
    json.end()?;
    Ok(value)
}

/// Whether brackets in `text` nest deeper than `limit`, ignoring brackets
/// inside string literals.
fn nesting_depth_exceeds(text: &str, limit: usize) -> bool {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;
    for c in text.chars() {
        if escape {
            escape = false;
            continue;
        }
        if in_string {
            match c {
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => {
                depth += 1;
                if depth > limit {
                    return true;
                }
            }
            ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    false
}
