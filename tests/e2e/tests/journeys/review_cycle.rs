//! Review Cycle Journey
//!
//! Cards graduate, time passes, and Review sessions bring back exactly the
//! cards that came due, oldest first.

use cadence_core::{ErrorKind, LearningState, NextItem, SessionKind, StartOutcome};
use cadence_e2e_tests::harness::db_manager::{AnswerPolicy, TestDatabaseManager};
use chrono::{Duration, Utc};

#[test]
fn test_initial_session_skips_items_already_seen() {
    let db = TestDatabaseManager::new_temp();
    let ids = db.seed_topic("biology", 6);
    let now = Utc::now();
    db.graduate("learner", &ids[..2], now);

    let session = db.start("learner", &["biology"], SessionKind::Initial, 10, now);
    assert_eq!(session.item_count, 4);

    let stored = db.sessions.get(&session.session_id).unwrap();
    assert!(stored.available_items.iter().all(|id| !ids[..2].contains(id)));

    // Another learner still sees everything
    let other = db.start("other", &["biology"], SessionKind::Initial, 10, now);
    assert_eq!(other.item_count, 6);
}

#[test]
fn test_due_cards_come_back_after_time_passes() {
    let db = TestDatabaseManager::new_temp();
    let ids = db.seed_topic("physics", 3);
    let t0 = Utc::now();

    // Staggered first reviews give distinct due dates
    for (i, id) in ids.iter().enumerate() {
        db.graduate("learner", std::slice::from_ref(id), t0 + Duration::days(5 * i as i64));
    }

    let counts = db.selector.count("learner", t0).unwrap();
    assert_eq!(counts.due_count, 0);
    assert!(matches!(
        db.try_start("learner", &["physics"], SessionKind::Review, 10, t0),
        StartOutcome::NoItemsAvailable { .. }
    ));

    let later = t0 + Duration::days(60);
    let counts = db.selector.count("learner", later).unwrap();
    assert_eq!(counts.due_count, 3);
    assert_eq!(counts.review_count, 3);

    let expected: Vec<String> = db
        .selector
        .select("learner", None, 10, false, later)
        .unwrap()
        .into_iter()
        .map(|due| due.item_id)
        .collect();
    assert_eq!(expected, ids);

    // Review sessions keep due order instead of sampling
    let session = db.start("learner", &["physics"], SessionKind::Review, 10, later);
    let mut presented = Vec::new();
    while let NextItem::Presented { item, is_review, .. } =
        db.sessions.next(&session.session_id, later).unwrap()
    {
        assert!(is_review);
        presented.push(item.id);
    }
    assert_eq!(presented, expected);
}

#[test]
fn test_answering_a_review_session_clears_the_backlog() {
    let db = TestDatabaseManager::new_temp();
    let ids = db.seed_topic("physics", 4);
    let t0 = Utc::now();
    db.graduate("learner", &ids, t0);

    let later = t0 + Duration::days(60);
    let session = db.start("learner", &["physics"], SessionKind::Review, 10, later);
    let results = db.answer_all(&session.session_id, AnswerPolicy::AllCorrect, 4.0, later);
    assert_eq!(results.len(), 4);

    for (_, result) in &results {
        assert_eq!(result.card.reps, 2);
        assert_eq!(result.card.state, LearningState::Review);
        assert!(result.card.due_date > later);
    }
    assert_eq!(db.selector.count("learner", later).unwrap().due_count, 0);
}

#[test]
fn test_lapse_moves_card_out_of_review() {
    let db = TestDatabaseManager::new_temp();
    let ids = db.seed_topic("physics", 2);
    let t0 = Utc::now();
    db.graduate("learner", &ids, t0);

    let later = t0 + Duration::days(60);
    let session = db.start("learner", &["physics"], SessionKind::Review, 1, later);
    let results = db.answer_all(&session.session_id, AnswerPolicy::AllWrong, 4.0, later);
    assert_eq!(results.len(), 1);

    let (lapsed_id, result) = &results[0];
    assert_eq!(result.card.state, LearningState::Relearning);
    assert_eq!(result.card.lapses, 1);

    let records = db.storage.review_records("learner", 10).unwrap();
    let record = records.iter().find(|r| &r.item_id == lapsed_id).unwrap();
    assert_eq!(record.state_before, LearningState::Review);
    assert!(record.elapsed_days >= 59);

    // Both are due a day later, but only the untouched one is still in Review
    let next_day = later + Duration::days(1);
    let counts = db.selector.count("learner", next_day).unwrap();
    assert_eq!(counts.due_count, 2);
    assert_eq!(counts.review_count, 1);
}

#[test]
fn test_reset_makes_card_due_again() {
    let db = TestDatabaseManager::new_temp();
    let ids = db.seed_topic("physics", 1);
    let t0 = Utc::now();
    let graduated = db.graduate("learner", &ids, t0).remove(0);
    assert!(graduated.due_date > t0 + Duration::days(1));

    let t1 = t0 + Duration::hours(1);
    let reset = db.engine.reset("learner", &ids[0], t1).unwrap();
    assert_eq!(reset.state, LearningState::Learning);
    assert_eq!(reset.due_date, t1);
    assert_eq!(reset.reps, graduated.reps);
    assert_eq!(reset.version, graduated.version + 1);

    assert_eq!(db.selector.count("learner", t1).unwrap().due_count, 1);

    let err = db.engine.reset("nobody", &ids[0], t1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_preview_does_not_write() {
    let db = TestDatabaseManager::new_temp();
    let ids = db.seed_topic("physics", 1);
    let now = Utc::now();

    let previews = db.engine.preview("learner", &ids[0], now).unwrap();
    assert_eq!(previews.len(), 4);
    assert!(previews.windows(2).all(|w| w[0].due_date <= w[1].due_date));
    assert!(db.storage.get_card("learner", &ids[0]).unwrap().is_none());
}
