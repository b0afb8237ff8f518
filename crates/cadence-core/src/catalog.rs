//! Item Catalog
//!
//! Items are the questions a learner answers. The catalog is read-only to the
//! scheduling core; documents enter it once through [`normalize_document`],
//! which folds the historical field names into the typed [`Item`] record.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Difficulty assumed when a document declares none
pub const DEFAULT_ITEM_DIFFICULTY: u8 = 3;

/// A learning item (multiple-choice question)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    /// Indices into `options` that make up the correct answer
    pub correct_indices: Vec<usize>,
    /// Lower-cased topic (skill category)
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_topic: Option<String>,
    /// Declared difficulty, 1 (very easy) to 5 (very hard)
    pub difficulty: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Item {
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    /// Check the invariants every stored item holds: a non-empty id, at
    /// least one option, and a non-empty answer key inside the options.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("item id is empty".to_string());
        }
        if self.options.is_empty() {
            return Err(format!("item {}: no answer options", self.id));
        }
        if self.correct_indices.is_empty() {
            return Err(format!("item {}: missing correct answer", self.id));
        }
        if let Some(&index) = self.correct_indices.iter().find(|&&i| i >= self.options.len()) {
            return Err(format!(
                "item {}: correct answer index {} out of range for {} options",
                self.id,
                index,
                self.options.len()
            ));
        }
        Ok(())
    }
}

/// What a learner sees when an item is presented (no answer key)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    pub topic: String,
    pub difficulty: u8,
    /// Number of options that must be selected
    pub answer_count: usize,
}

impl From<&Item> for ItemView {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            text: item.text.clone(),
            options: item.options.clone(),
            topic: item.topic.clone(),
            difficulty: item.difficulty,
            answer_count: item.correct_indices.len(),
        }
    }
}

/// Summary of a catalog import
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported: usize,
    pub topics: Vec<String>,
}

// ============================================================================
// NORMALIZATION
// ============================================================================

fn first_str<'a>(doc: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| doc.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn index_list(value: &Value) -> Option<Vec<i64>> {
    match value {
        Value::Number(n) => n.as_i64().map(|i| vec![i]),
        Value::String(s) => s.trim().parse::<i64>().ok().map(|i| vec![i]),
        Value::Array(values) => values
            .iter()
            .map(|v| match v {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

/// Turn a raw catalog document into an [`Item`].
///
/// Accepted spellings:
/// - text: `text`, `question_text`
/// - answer key: `correct_indices`, `correct_answers`, `correct_answer`
/// - topic: `topic`, `skill_category`, `category`
/// - difficulty: `difficulty`, `difficulty_level` (clamped to 1-5)
///
/// A document without an `id` gets a fresh UUID.
pub fn normalize_document(doc: &Value) -> Result<Item, String> {
    if !doc.is_object() {
        return Err("item document must be a JSON object".to_string());
    }

    let id = match doc.get("id").or_else(|| doc.get("_id")) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    };

    let text = first_str(doc, &["text", "question_text"])
        .ok_or_else(|| format!("item {}: missing question text", id))?
        .to_string();

    let options: Vec<String> = match doc.get("options") {
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    };
    if options.is_empty() {
        return Err(format!("item {}: no answer options", id));
    }

    let raw_indices = ["correct_indices", "correct_answers", "correct_answer"]
        .iter()
        .filter_map(|k| doc.get(*k))
        .find(|v| !v.is_null())
        .and_then(index_list)
        .ok_or_else(|| format!("item {}: missing correct answer", id))?;

    let mut correct_indices = Vec::with_capacity(raw_indices.len());
    for index in raw_indices {
        if index < 0 || index as usize >= options.len() {
            return Err(format!(
                "item {}: correct answer index {} out of range for {} options",
                id,
                index,
                options.len()
            ));
        }
        correct_indices.push(index as usize);
    }
    correct_indices.sort_unstable();
    correct_indices.dedup();
    if correct_indices.is_empty() {
        return Err(format!("item {}: missing correct answer", id));
    }

    let topic = first_str(doc, &["topic", "skill_category", "category"])
        .ok_or_else(|| format!("item {}: missing topic", id))?
        .to_lowercase();

    let difficulty = ["difficulty", "difficulty_level"]
        .iter()
        .filter_map(|k| doc.get(*k))
        .find_map(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .map(|d| d.round().clamp(1.0, 5.0) as u8)
        .unwrap_or(DEFAULT_ITEM_DIFFICULTY);

    let tags = match doc.get("tags") {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    Ok(Item {
        id,
        text,
        options,
        correct_indices,
        topic,
        sub_topic: first_str(doc, &["sub_topic", "subtopic"]).map(str::to_string),
        difficulty,
        explanation: first_str(doc, &["explanation"]).map(str::to_string),
        tags,
    })
}
