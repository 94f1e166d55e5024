// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Content sanitization for text and structured document blocks.
//!
//! ## Text
//!
//! 1. Drop control and invisible formatting characters (newline and tab kept)
//! 2. HTML-escape `& < > " '`
//! 3. Truncate to `max_length` characters, ending in `...`
//!
//! Escaping leaves existing entities alone and truncation never splits one,
//! so sanitizing sanitized text returns it unchanged.
//!
//! ## Blocks
//!
//! Blocks are JSON objects of the form `{"type": t, t: {...}}`. Only the
//! recognized types below pass, and each type keeps only its own fields;
//! anything else is dropped. Rich text is rebuilt from its text content and
//! links that fail URL validation are dropped. A bookmark whose URL fails
//! validation rejects the block.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::url::UrlValidator;
use super::{ValidationError, ValidationResult};

pub const MAX_TEXT_LENGTH: usize = 2000;
pub const MAX_TITLE_LENGTH: usize = 2000;
pub const MAX_BLOCKS: usize = 100;
pub const MAX_NESTING_DEPTH: usize = 2;

const ELLIPSIS: &str = "...";

/// Entities produced by the escaper (plus the numeric apostrophe form).
const KNOWN_ENTITIES: [&str; 6] = ["amp;", "lt;", "gt;", "quot;", "#x27;", "#39;"];

const BLOCK_TYPES: [&str; 13] = [
    "paragraph",
    "heading_1",
    "heading_2",
    "heading_3",
    "bulleted_list_item",
    "numbered_list_item",
    "quote",
    "callout",
    "toggle",
    "to_do",
    "code",
    "divider",
    "bookmark",
];

/// Named colors accepted on text blocks.
const COLORS: [&str; 19] = [
    "default",
    "gray",
    "brown",
    "orange",
    "yellow",
    "green",
    "blue",
    "purple",
    "pink",
    "red",
    "gray_background",
    "brown_background",
    "orange_background",
    "yellow_background",
    "green_background",
    "blue_background",
    "purple_background",
    "pink_background",
    "red_background",
];

const MAX_LANGUAGE_LENGTH: usize = 32;
const MAX_EMOJI_LENGTH: usize = 8;

/// Fields kept inside the type-specific object of each block type.
fn allowed_fields(block_type: &str) -> &'static [&'static str] {
    match block_type {
        "heading_1" | "heading_2" | "heading_3" => {
            &["rich_text", "color", "is_toggleable", "children"]
        }
        "callout" => &["rich_text", "color", "icon", "children"],
        "to_do" => &["rich_text", "color", "checked", "children"],
        "code" => &["rich_text", "caption", "language"],
        "bookmark" => &["url", "caption"],
        "divider" => &[],
        _ => &["rich_text", "color", "children"],
    }
}

/// Sanitize free text for storage in a remote document.
///
/// The result never exceeds `max_length` characters.
pub fn sanitize_text(text: &str, max_length: usize) -> String {
    let stripped: String = text.chars().filter(|&c| is_allowed_char(c)).collect();
    let escaped = escape_html(&stripped);
    truncate(escaped, max_length)
}

/// [`sanitize_text`] with the title limit.
pub fn sanitize_title(title: &str) -> String {
    sanitize_text(title, MAX_TITLE_LENGTH)
}

fn is_allowed_char(c: char) -> bool {
    if c == '\n' || c == '\t' {
        return true;
    }
    !c.is_control() && !is_invisible_format(c)
}

/// Zero-width and bidirectional override characters.
fn is_invisible_format(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{2069}'
            | '\u{FEFF}'
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        match c {
            '&' if starts_entity(&text[i + 1..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

fn starts_entity(rest: &str) -> bool {
    KNOWN_ENTITIES.iter().any(|entity| rest.starts_with(entity))
}

fn truncate(text: String, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text;
    }

    let (keep, suffix) = if max_length > ELLIPSIS.len() {
        (max_length - ELLIPSIS.len(), ELLIPSIS)
    } else {
        (max_length, "")
    };

    let end = text
        .char_indices()
        .nth(keep)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    let mut head = &text[..end];

    // Do not leave half an entity behind.
    if let Some(amp) = head.rfind('&') {
        if !head[amp..].contains(';') {
            head = &head[..amp];
        }
    }

    format!("{head}{suffix}")
}

// =============================================================================
// Blocks
// =============================================================================

/// Validate and sanitize a list of document blocks.
///
/// On rejection the returned block list is empty.
pub fn validate_content_blocks(
    blocks: &[Value],
    urls: &UrlValidator,
) -> (ValidationResult, Vec<Value>) {
    match sanitize_blocks(blocks, urls) {
        Ok(sanitized) => (ValidationResult::valid(), sanitized),
        Err(error) => (ValidationResult::reject(error), Vec::new()),
    }
}

fn sanitize_blocks(blocks: &[Value], urls: &UrlValidator) -> Result<Vec<Value>, ValidationError> {
    if blocks.len() > MAX_BLOCKS {
        return Err(ValidationError::TooManyBlocks {
            count: blocks.len(),
            max: MAX_BLOCKS,
        });
    }

    blocks
        .iter()
        .enumerate()
        .map(|(index, block)| {
            sanitize_block(block, 0, urls).map_err(|e| match e {
                BlockError::TooDeep => ValidationError::NestingTooDeep {
                    max: MAX_NESTING_DEPTH,
                },
                BlockError::Invalid(reason) => ValidationError::InvalidBlock { index, reason },
            })
        })
        .collect()
}

enum BlockError {
    TooDeep,
    Invalid(String),
}

fn sanitize_block(block: &Value, depth: usize, urls: &UrlValidator) -> Result<Value, BlockError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(BlockError::TooDeep);
    }

    let object = block
        .as_object()
        .ok_or_else(|| BlockError::Invalid("block is not an object".to_string()))?;
    let block_type = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| BlockError::Invalid("missing 'type' field".to_string()))?;
    if !BLOCK_TYPES.contains(&block_type) {
        return Err(BlockError::Invalid(format!(
            "unrecognized block type {block_type:?}"
        )));
    }
    let content = object
        .get(block_type)
        .and_then(Value::as_object)
        .ok_or_else(|| BlockError::Invalid("missing type-specific content".to_string()))?;

    let mut sanitized_content = Map::new();
    for &field in allowed_fields(block_type) {
        let Some(value) = content.get(field) else {
            continue;
        };
        if let Some(clean) = sanitize_field(field, value, depth, urls)? {
            sanitized_content.insert(field.to_string(), clean);
        }
    }

    let mut out = Map::new();
    out.insert("object".to_string(), json!("block"));
    out.insert("type".to_string(), json!(block_type));
    out.insert(block_type.to_string(), Value::Object(sanitized_content));
    Ok(Value::Object(out))
}

/// Sanitize one allowed field. `None` drops it.
fn sanitize_field(
    field: &str,
    value: &Value,
    depth: usize,
    urls: &UrlValidator,
) -> Result<Option<Value>, BlockError> {
    let clean = match field {
        "rich_text" | "caption" => Some(sanitize_rich_text(value, urls)),
        "children" => {
            let children = value
                .as_array()
                .ok_or_else(|| BlockError::Invalid("'children' is not a list".to_string()))?;
            let sanitized = children
                .iter()
                .map(|child| sanitize_block(child, depth + 1, urls))
                .collect::<Result<Vec<_>, _>>()?;
            Some(Value::Array(sanitized))
        }
        "url" => {
            let url = value
                .as_str()
                .ok_or_else(|| BlockError::Invalid("'url' is not a string".to_string()))?;
            let result = urls.validate_url(url);
            if !result.ok {
                return Err(BlockError::Invalid(format!(
                    "bookmark url rejected: {}",
                    result.reason
                )));
            }
            Some(json!(url))
        }
        "color" => value
            .as_str()
            .filter(|color| COLORS.contains(color))
            .map(|color| json!(color)),
        "checked" | "is_toggleable" => value.as_bool().map(Value::Bool),
        "language" => value
            .as_str()
            .filter(|lang| {
                lang.len() <= MAX_LANGUAGE_LENGTH
                    && lang
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || " +#-._".contains(c))
            })
            .map(|lang| json!(lang)),
        "icon" => value
            .get("emoji")
            .and_then(Value::as_str)
            .filter(|emoji| {
                !emoji.is_empty()
                    && emoji.chars().count() <= MAX_EMOJI_LENGTH
                    && emoji.chars().all(|c| !c.is_ascii() && is_allowed_char(c))
            })
            .map(|emoji| json!({ "type": "emoji", "emoji": emoji })),
        _ => None,
    };
    Ok(clean)
}

/// Rebuild rich text from its `text` segments only.
fn sanitize_rich_text(rich_text: &Value, urls: &UrlValidator) -> Value {
    let segments = rich_text.as_array().map(Vec::as_slice).unwrap_or_default();

    let sanitized: Vec<Value> = segments
        .iter()
        .filter_map(|segment| segment.get("text"))
        .map(|text| {
            let content = text.get("content").and_then(Value::as_str).unwrap_or_default();
            let mut out = json!({
                "type": "text",
                "text": { "content": sanitize_text(content, MAX_TEXT_LENGTH) },
            });

            let link = text
                .get("link")
                .and_then(|link| link.get("url"))
                .and_then(Value::as_str);
            if let Some(url) = link {
                if urls.validate_url(url).ok {
                    out["text"]["link"] = json!({ "url": url });
                }
            }
            out
        })
        .collect();

    Value::Array(sanitized)
}

// =============================================================================
// Export Content
// =============================================================================

/// A source reference, either a bare URL or a titled link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    Link(String),
    Titled { title: String, url: String },
}

impl Source {
    pub fn url(&self) -> &str {
        match self {
            Source::Link(url) => url,
            Source::Titled { url, .. } => url,
        }
    }
}

/// Research content about to be written to the destination document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportContent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub related_questions: Vec<String>,
}

/// Sanitize every text field and drop sources whose URL fails validation.
pub fn sanitize_export_content(content: ExportContent, urls: &UrlValidator) -> ExportContent {
    let sources = content
        .sources
        .into_iter()
        .filter(|source| urls.validate_url(source.url()).ok)
        .map(|source| match source {
            Source::Titled { title, url } => Source::Titled {
                title: sanitize_text(&title, MAX_TEXT_LENGTH),
                url,
            },
            link => link,
        })
        .collect();

    ExportContent {
        title: sanitize_title(&content.title),
        content: sanitize_text(&content.content, MAX_TEXT_LENGTH),
        sources,
        timestamp: content.timestamp.map(|t| sanitize_text(&t, 64)),
        related_questions: content
            .related_questions
            .iter()
            .map(|q| sanitize_text(q, MAX_TEXT_LENGTH))
            .collect(),
    }
}
