//! Test Data Factory
//!
//! Item fixtures for journey tests:
//! - Single items with a chosen answer key
//! - Topic batches for session sizing
//! - Catalog documents, including legacy field spellings

use cadence_core::{Item, Storage};
use serde_json::{json, Value};

/// Factory for items and catalog documents
///
/// # Example
///
/// ```rust,ignore
/// let storage = Storage::new(Some(path))?;
///
/// // Ten algebra items, ids "algebra-0".."algebra-9"
/// let ids = TestDataFactory::seed_topic(&storage, "algebra", 10);
///
/// // Import a legacy-shaped catalog
/// service.import_items(&TestDataFactory::legacy_catalog_json())?;
/// ```
pub struct TestDataFactory;

impl TestDataFactory {
    // ========================================================================
    // SINGLE ITEMS
    // ========================================================================

    /// Four-option item whose only correct option is `correct`
    pub fn item(id: &str, topic: &str, correct: usize) -> Item {
        Self::item_with_difficulty(id, topic, correct, 3)
    }

    pub fn item_with_difficulty(id: &str, topic: &str, correct: usize, difficulty: u8) -> Item {
        Item {
            id: id.to_string(),
            text: format!("Question {} about {}", id, topic),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct_indices: vec![correct],
            topic: topic.to_lowercase(),
            sub_topic: None,
            difficulty,
            explanation: Some(format!("Option {} is correct", correct)),
            tags: vec![topic.to_lowercase()],
        }
    }

    /// Item that needs two options selected
    pub fn multi_answer_item(id: &str, topic: &str) -> Item {
        Item {
            correct_indices: vec![0, 2],
            ..Self::item(id, topic, 0)
        }
    }

    // ========================================================================
    // BATCHES
    // ========================================================================

    /// `count` items in `topic`, ids `<topic>-<n>`, correct option `n % 4`
    pub fn topic_batch(topic: &str, count: usize) -> Vec<Item> {
        (0..count)
            .map(|n| Self::item(&format!("{}-{}", topic, n), topic, n % 4))
            .collect()
    }

    /// Insert a topic batch and return its ids
    pub fn seed_topic(storage: &Storage, topic: &str, count: usize) -> Vec<String> {
        Self::topic_batch(topic, count)
            .into_iter()
            .filter_map(|item| storage.upsert_item(&item).ok().map(|_| item.id))
            .collect()
    }

    // ========================================================================
    // CATALOG DOCUMENTS
    // ========================================================================

    /// Catalog in the current field spelling
    pub fn catalog_json(topics: &[&str], per_topic: usize) -> String {
        let docs: Vec<Value> = topics
            .iter()
            .flat_map(|topic| {
                (0..per_topic).map(move |n| {
                    json!({
                        "id": format!("{}-{}", topic, n),
                        "text": format!("Question {} about {}", n, topic),
                        "options": ["A", "B", "C", "D"],
                        "correct_indices": [n % 4],
                        "topic": topic,
                        "difficulty": 1 + (n % 5),
                    })
                })
            })
            .collect();
        Value::Array(docs).to_string()
    }

    /// Catalog written by older exporters: `_id`, `question_text`,
    /// `correct_answer(s)`, `skill_category`, `difficulty_level`
    pub fn legacy_catalog_json() -> String {
        json!([
            {
                "_id": "legacy-single",
                "question_text": "Which planet is largest?",
                "options": ["Mars", "Jupiter", "Venus"],
                "correct_answer": 1,
                "skill_category": "Astronomy",
                "difficulty_level": 2.4
            },
            {
                "_id": "legacy-string",
                "question_text": "Which gas do plants absorb?",
                "options": ["Oxygen", "Nitrogen", "Carbon dioxide"],
                "correct_answer": "2",
                "skill_category": "Biology"
            },
            {
                "_id": "legacy-multi",
                "question_text": "Which are gas giants?",
                "options": ["Saturn", "Earth", "Jupiter", "Mercury"],
                "correct_answers": [2, 0, 2],
                "skill_category": "ASTRONOMY",
                "difficulty_level": 9
            }
        ])
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_batch_ids_and_keys() {
        let items = TestDataFactory::topic_batch("Algebra", 6);
        assert_eq!(items.len(), 6);
        assert_eq!(items[5].id, "Algebra-5");
        assert_eq!(items[5].topic, "algebra");
        assert_eq!(items[5].correct_indices, vec![1]);
    }

    #[test]
    fn test_catalog_json_is_an_array() {
        let json = TestDataFactory::catalog_json(&["a", "b"], 3);
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 6);
    }
}
