//! Catalog Import Journey
//!
//! Catalogs arrive in more than one field spelling; once imported, every
//! item behaves the same in sessions.

use cadence_core::{NextItem, SessionKind, StartOutcome, StorageError, Submission};
use cadence_e2e_tests::harness::db_manager::TestDatabaseManager;
use cadence_e2e_tests::TestDataFactory;
use chrono::Utc;

#[test]
fn test_legacy_catalog_is_normalized() {
    let db = TestDatabaseManager::new_temp();
    let report = db
        .storage
        .import_items(&TestDataFactory::legacy_catalog_json())
        .unwrap();

    assert_eq!(report.imported, 3);
    assert_eq!(report.topics, vec!["astronomy", "biology"]);

    let single = db.storage.get_item("legacy-single").unwrap().unwrap();
    assert_eq!(single.text, "Which planet is largest?");
    assert_eq!(single.correct_indices, vec![1]);
    assert_eq!(single.difficulty, 2);

    let string_key = db.storage.get_item("legacy-string").unwrap().unwrap();
    assert_eq!(string_key.correct_indices, vec![2]);
    assert_eq!(string_key.difficulty, 3);

    let multi = db.storage.get_item("legacy-multi").unwrap().unwrap();
    assert_eq!(multi.correct_indices, vec![0, 2]);
    assert_eq!(multi.topic, "astronomy");
    assert_eq!(multi.difficulty, 5);
}

#[test]
fn test_reimport_replaces_items() {
    let db = TestDatabaseManager::new_temp();
    let json = TestDataFactory::catalog_json(&["algebra", "geometry"], 5);
    db.storage.import_items(&json).unwrap();
    db.storage.import_items(&json).unwrap();
    assert_eq!(db.item_count(), 10);
    assert_eq!(
        db.storage.distinct_topics().unwrap(),
        vec!["algebra", "geometry"]
    );
}

#[test]
fn test_one_bad_document_rejects_the_import() {
    let db = TestDatabaseManager::new_temp();
    let json = r#"[
        {"id": "ok", "text": "fine", "options": ["a", "b"], "correct_indices": [0], "topic": "t"},
        {"id": "bad", "text": "broken", "options": ["a", "b"], "correct_indices": [5], "topic": "t"}
    ]"#;

    let err = db.storage.import_items(json).unwrap_err();
    assert!(matches!(err, StorageError::InvalidDocument(_)));
    assert!(db.is_empty());

    assert!(matches!(
        db.storage.import_items("42").unwrap_err(),
        StorageError::InvalidDocument(_)
    ));
    assert!(matches!(
        db.storage.import_items("not json").unwrap_err(),
        StorageError::Serialization(_)
    ));
}

#[test]
fn test_partial_topic_name_falls_back_to_substring_match() {
    let db = TestDatabaseManager::new_temp();
    db.storage
        .import_items(&TestDataFactory::legacy_catalog_json())
        .unwrap();
    let now = Utc::now();

    let session = db.start("learner", &["astro"], SessionKind::Practice, 10, now);
    assert_eq!(session.item_count, 2);

    // An exact match wins over substring matches
    db.storage
        .upsert_item(&TestDataFactory::item("exact", "astro", 0))
        .unwrap();
    let session = db.start("learner", &["astro"], SessionKind::Practice, 10, now);
    assert_eq!(session.item_count, 1);
}

#[test]
fn test_imported_multi_answer_item_in_a_session() {
    let db = TestDatabaseManager::new_temp();
    db.storage
        .import_items(&TestDataFactory::legacy_catalog_json())
        .unwrap();
    let now = Utc::now();

    let session = match db.try_start("learner", &["ASTRONOMY"], SessionKind::Practice, 10, now) {
        StartOutcome::Started(summary) => summary,
        other => panic!("unexpected {:?}", other),
    };

    let mut graded = 0;
    while let NextItem::Presented { item, .. } = db.sessions.next(&session.session_id, now).unwrap() {
        let answer = if item.id == "legacy-multi" { vec![2, 0] } else { vec![1] };
        let result = db
            .sessions
            .submit(
                &session.session_id,
                &Submission {
                    item_id: item.id.clone(),
                    answer,
                    response_time_secs: 20.0,
                },
                now,
            )
            .unwrap();
        assert!(result.is_correct, "{} graded wrong", item.id);
        graded += 1;
    }
    assert_eq!(graded, 2);
    assert_eq!(db.storage.get_progress("learner").unwrap().best_streak, 2);
}
